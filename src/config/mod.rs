pub mod error;
pub mod load;
pub mod paths;
pub mod settings;

pub use error::ConfigError;
pub use load::{load_settings, load_state_paths};
pub use paths::{
    default_config_path, default_state_root, StatePaths, CONFIG_PATH_ENV, SESSION_FILE_NAME,
    SETTINGS_FILE_NAME, STATE_DIR,
};
pub use settings::{SendTransport, Settings, MAX_POLL_INTERVAL_SECONDS, MIN_POLL_INTERVAL_SECONDS};
