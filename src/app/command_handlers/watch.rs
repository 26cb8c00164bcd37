use crate::app::command_support::{parse_filter_flags, CommandContext};
use crate::dashboard::ConversationFilter;
use crate::runtime::DashboardRuntime;
use crate::tui::run_dashboard_tui;
use std::time::Instant;

const WATCH_USAGE: &str = "watch [--filter unassigned|yours|team|all] [--channel webchat|whatsapp|instagram]";

pub fn cmd_watch(args: &[String]) -> Result<String, String> {
    let filter = parse_filter_flags(args, WATCH_USAGE)?;
    let context = CommandContext::load()?;
    let client = context.client(context.push_channel())?;
    let mut runtime = DashboardRuntime::from_settings(client, &context.settings);

    runtime.start(Instant::now());
    if filter != ConversationFilter::default() && runtime.client().state().is_signed_in() {
        let _ = runtime.client_mut().refresh_conversations(filter);
        runtime.note_fetch(Instant::now());
    }
    context.log.info("watch.started", "terminal dashboard opened");
    let result = run_dashboard_tui(&mut runtime);
    context.log.info("watch.stopped", "terminal dashboard closed");
    result
}
