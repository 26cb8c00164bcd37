use crate::app::command_support::ensure_state_root;
use std::fs;

const RECENT_LOG_LINES: usize = 20;

pub fn cmd_logs() -> Result<String, String> {
    let paths = ensure_state_root()?;
    let path = paths.log_path();
    if !path.exists() {
        return Ok("no logs".to_string());
    }
    let raw =
        fs::read_to_string(&path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let mut recent = raw.lines().rev().take(RECENT_LOG_LINES).collect::<Vec<_>>();
    if recent.is_empty() {
        return Ok("no logs".to_string());
    }
    recent.reverse();
    Ok(recent.join("\n"))
}
