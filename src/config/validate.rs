// src/config/validate.rs

use std::env;

use crate::config::model::{FactoryConfig, RawFactoryConfig};
use crate::errors::ConfigError;
use crate::exec::split_env_entry;

impl TryFrom<RawFactoryConfig> for FactoryConfig {
    type Error = ConfigError;

    fn try_from(raw: RawFactoryConfig) -> Result<Self, Self::Error> {
        validate_search_path(&raw)?;
        validate_command_defaults(&raw)?;

        let search_path = match raw.lookup.search_path {
            Some(dirs) => Some(env::join_paths(dirs).map_err(|e| {
                ConfigError::Invalid(format!("[lookup].search_path: {e}"))
            })?),
            None => None,
        };
        Ok(FactoryConfig::new_unchecked(
            search_path,
            raw.command.env,
            raw.command.dir,
        ))
    }
}

fn validate_search_path(cfg: &RawFactoryConfig) -> Result<(), ConfigError> {
    let Some(dirs) = &cfg.lookup.search_path else {
        return Ok(());
    };
    if let Some(pos) = dirs.iter().position(|d| d.as_os_str().is_empty()) {
        return Err(ConfigError::Invalid(format!(
            "[lookup].search_path entry {pos} is empty"
        )));
    }
    Ok(())
}

fn validate_command_defaults(cfg: &RawFactoryConfig) -> Result<(), ConfigError> {
    if let Some(env) = &cfg.command.env {
        for entry in env {
            split_env_entry(entry).map_err(|_| {
                ConfigError::Invalid(format!(
                    "[command].env entry {entry:?} must look like KEY=value"
                ))
            })?;
        }
    }
    if let Some(dir) = &cfg.command.dir {
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "[command].dir must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}
