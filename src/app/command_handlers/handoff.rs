use crate::app::command_support::{map_dashboard_err, parse_conversation_id, CommandContext};

pub fn cmd_take_over(args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: take-over <id>".to_string());
    }
    let conversation_id = parse_conversation_id(args.first(), "take-over <id>")?;
    let context = CommandContext::load()?;
    let mut client = context.signed_in_client()?;
    let message = client
        .take_over(&conversation_id)
        .map_err(map_dashboard_err)?;
    let assigned = client
        .state()
        .conversation(&conversation_id)
        .and_then(|conversation| conversation.assigned_agent.clone())
        .unwrap_or_default();
    Ok(format!(
        "take-over complete\nconversation={conversation_id}\nassigned_agent={assigned}\nmessage={message}"
    ))
}

pub fn cmd_hand_back(args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: hand-back <id>".to_string());
    }
    let conversation_id = parse_conversation_id(args.first(), "hand-back <id>")?;
    let context = CommandContext::load()?;
    let mut client = context.signed_in_client()?;
    let message = client
        .hand_back_to_ai(&conversation_id)
        .map_err(map_dashboard_err)?;
    Ok(format!(
        "hand-back complete\nconversation={conversation_id}\nmessage={message}"
    ))
}
