use crate::api::AuthStatus;
use crate::app::command_support::{map_dashboard_err, CommandContext};
use crate::dashboard::{AssignmentFilter, DashboardView};
use crate::push::OfflinePush;
use std::time::Instant;

pub fn cmd_login(args: &[String]) -> Result<String, String> {
    if args.len() != 2 {
        return Err("usage: login <username> <password>".to_string());
    }
    let context = CommandContext::load()?;
    let mut client = context.client(OfflinePush)?;
    let agent_id = client
        .login(&args[0], &args[1])
        .map_err(map_dashboard_err)?;
    Ok(format!(
        "login complete\nagent={agent_id}\nsession={}",
        context.paths.session_path().display()
    ))
}

pub fn cmd_logout() -> Result<String, String> {
    let context = CommandContext::load()?;
    let mut client = context.client(OfflinePush)?;
    let was_signed_in = matches!(
        client.restore_session(),
        AuthStatus::Authenticated { .. }
    );
    let server = match client.logout() {
        Ok(()) => "ok",
        Err(_) => "failed",
    };
    Ok(format!(
        "logout complete\nwas_signed_in={was_signed_in}\nserver_logout={server}"
    ))
}

pub fn cmd_status() -> Result<String, String> {
    let context = CommandContext::load()?;
    let mut client = context.client(OfflinePush)?;
    let status = client.restore_session();

    let mut lines = vec![
        format!("api_base={}", context.settings.api_base()),
        format!("push_url={}", context.settings.resolved_push_url()),
        format!("state_root={}", context.paths.root.display()),
    ];
    match status {
        AuthStatus::Unauthenticated => {
            lines.insert(0, "session=signed_out".to_string());
            for notice in client.state().notices().all() {
                lines.push(format!("notice={}", notice.text));
            }
        }
        AuthStatus::Authenticated { agent_id } => {
            lines.insert(0, "session=signed_in".to_string());
            lines.insert(1, format!("agent={agent_id}"));
            if let DashboardView::Dashboard(pane) = client.render(Instant::now()) {
                let ai = pane
                    .ai_enabled
                    .map(|enabled| enabled.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                lines.push(format!("ai_enabled={ai}"));
                for filter in AssignmentFilter::ALL {
                    lines.push(format!("count_{filter}={}", pane.counts.get(filter)));
                }
            }
        }
    }
    Ok(lines.join("\n"))
}
