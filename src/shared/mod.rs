pub mod fs_atomic;
pub mod ids;
pub mod logging;

use std::time::{SystemTime, UNIX_EPOCH};

pub use ids::ConversationId;
pub use logging::ClientLog;

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
