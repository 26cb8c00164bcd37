#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Login,
    Logout,
    Status,
    Conversations,
    Show,
    Send,
    TakeOver,
    HandBack,
    Ai,
    Watch,
    Logs,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "login" => CliVerb::Login,
        "logout" => CliVerb::Logout,
        "status" => CliVerb::Status,
        "conversations" | "list" => CliVerb::Conversations,
        "show" => CliVerb::Show,
        "send" => CliVerb::Send,
        "take-over" | "takeover" => CliVerb::TakeOver,
        "hand-back" | "handback" => CliVerb::HandBack,
        "ai" => CliVerb::Ai,
        "watch" => CliVerb::Watch,
        "logs" => CliVerb::Logs,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  login <username> <password>          Sign in and store the session".to_string(),
        "  logout                               Sign out and forget the stored session"
            .to_string(),
        "  status                               Show session, AI and bucket counts".to_string(),
        "  conversations [--filter F] [--channel C]".to_string(),
        "                                       List conversations (unassigned|yours|team|all)"
            .to_string(),
        "  show <id>                            Print a conversation transcript".to_string(),
        "  send <id> <message>                  Reply in a conversation as the agent".to_string(),
        "  take-over <id>                       Assign a conversation to yourself".to_string(),
        "  hand-back <id>                       Return a conversation to the AI".to_string(),
        "  ai [on|off]                          Show or set the global AI responder".to_string(),
        "  watch [--filter F] [--channel C]     Open the live terminal dashboard".to_string(),
        "  logs                                 Print recent client log lines".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}
