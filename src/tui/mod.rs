pub mod dashboard;

pub use dashboard::{map_key, parse_script_keys, run_dashboard_tui, InputMode, UiAction};
