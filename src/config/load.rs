use super::{default_config_path, default_state_root, ConfigError, Settings, StatePaths};

pub fn load_settings() -> Result<Settings, ConfigError> {
    let path = default_config_path()?;
    let settings = Settings::from_path(&path)?;
    settings.validate()?;
    Ok(settings)
}

pub fn load_state_paths() -> Result<StatePaths, ConfigError> {
    let paths = StatePaths::new(default_state_root()?);
    paths.bootstrap()?;
    Ok(paths)
}
