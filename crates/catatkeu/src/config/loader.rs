use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.watch_dir.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "watch_dir must not be empty".to_string(),
        });
    }
    if Path::new(&config.watch_dir).is_absolute() {
        return Err(ConfigError::Validation {
            message: "watch_dir must be relative to root".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&config.min_conf) {
        return Err(ConfigError::Validation {
            message: format!("min_conf must be within [0, 1], got {}", config.min_conf),
        });
    }
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "database_path must not be empty".to_string(),
        });
    }
    if config.ocr_lang.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "ocr_lang must not be empty".to_string(),
        });
    }
    Ok(())
}
