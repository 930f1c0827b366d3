use std::path::Path;

use super::{AppConfig, ConfigError};

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    // An empty file is a valid "all defaults" config
    if content.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    let config: AppConfig = serde_yaml::from_str(&content)?;

    Ok(config)
}
