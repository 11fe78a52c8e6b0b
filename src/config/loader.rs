// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{FactoryConfig, RawFactoryConfig};
use crate::errors::ConfigError;

/// Read and deserialize a config file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawFactoryConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: RawFactoryConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Read, deserialize, and validate a config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<FactoryConfig, ConfigError> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let config = FactoryConfig::try_from(raw)?;
    debug!(path = %path.display(), ?config, "loaded factory config");
    Ok(config)
}
