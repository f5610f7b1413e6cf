//! TOML config loading

use std::path::Path;

use thiserror::Error;

use crate::Config;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The config document is malformed
    #[error("failed to parse config: {0}")]
    Parse(String),
}

pub fn parse(source: &str) -> Result<Config, ConfigError> {
    toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
}

pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&source)
}
