use crate::app::command_support::{
    filter_label, map_dashboard_err, parse_conversation_id, parse_filter_flags, CommandContext,
};
use crate::config::SendTransport;
use crate::dashboard::DashboardView;
use crate::push::OfflinePush;
use std::time::Instant;

const CONVERSATIONS_USAGE: &str = "conversations [--filter unassigned|yours|team|all] [--channel webchat|whatsapp|instagram]";

pub fn cmd_conversations(args: &[String]) -> Result<String, String> {
    let filter = parse_filter_flags(args, CONVERSATIONS_USAGE)?;
    let context = CommandContext::load()?;
    let mut client = context.signed_in_client()?;
    client
        .refresh_conversations(filter.clone())
        .map_err(map_dashboard_err)?;

    let DashboardView::Dashboard(pane) = client.render(Instant::now()) else {
        return Err("session ended while listing conversations".to_string());
    };
    let mut lines = vec![
        filter_label(&filter),
        format!(
            "counts=unassigned:{} yours:{} team:{} all:{}",
            pane.counts.unassigned, pane.counts.yours, pane.counts.team, pane.counts.all
        ),
        format!("conversations={}", pane.rows.len()),
    ];
    lines.extend(pane.rows.iter().map(ToString::to_string));
    Ok(lines.join("\n"))
}

pub fn cmd_show(args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: show <id>".to_string());
    }
    let conversation_id = parse_conversation_id(args.first(), "show <id>")?;
    let context = CommandContext::load()?;
    let mut client = context.signed_in_client()?;
    client
        .select_conversation(conversation_id)
        .map_err(map_dashboard_err)?;
    transcript_output(&client.render(Instant::now()))
}

pub fn cmd_send(args: &[String]) -> Result<String, String> {
    if args.len() < 2 {
        return Err("usage: send <id> <message>".to_string());
    }
    let conversation_id = parse_conversation_id(args.first(), "send <id> <message>")?;
    let message = args[1..].join(" ");

    let mut context = CommandContext::load()?;
    // One-shot commands hold no live push connection.
    context.settings.send_transport = SendTransport::Http;
    let mut client = context.signed_in_client()?;
    client
        .select_conversation(conversation_id.clone())
        .map_err(map_dashboard_err)?;
    client.send_message(&message).map_err(map_dashboard_err)?;
    Ok(format!(
        "message sent\nconversation={conversation_id}\ntransport=http"
    ))
}

fn transcript_output(view: &DashboardView) -> Result<String, String> {
    match view {
        DashboardView::Dashboard(pane) => pane
            .transcript
            .as_ref()
            .map(|transcript| transcript.to_string().trim_end().to_string())
            .ok_or_else(|| "conversation is no longer open".to_string()),
        DashboardView::Login(_) => Err("session ended while loading the transcript".to_string()),
    }
}
