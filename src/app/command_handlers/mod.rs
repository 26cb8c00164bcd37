use crate::app::cli::{help_text, parse_cli_verb, CliVerb};

pub mod auth;
pub mod conversations;
pub mod handoff;
pub mod logs;
pub mod settings;
pub mod watch;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Login => auth::cmd_login(&args[1..]),
        CliVerb::Logout => auth::cmd_logout(),
        CliVerb::Status => auth::cmd_status(),
        CliVerb::Conversations => conversations::cmd_conversations(&args[1..]),
        CliVerb::Show => conversations::cmd_show(&args[1..]),
        CliVerb::Send => conversations::cmd_send(&args[1..]),
        CliVerb::TakeOver => handoff::cmd_take_over(&args[1..]),
        CliVerb::HandBack => handoff::cmd_hand_back(&args[1..]),
        CliVerb::Ai => settings::cmd_ai(&args[1..]),
        CliVerb::Watch => watch::cmd_watch(&args[1..]),
        CliVerb::Logs => logs::cmd_logs(),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
