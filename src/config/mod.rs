// src/config/mod.rs

//! Factory configuration.
//!
//! - `model.rs`: the TOML-backed data model and the validated [`FactoryConfig`].
//! - `loader.rs`: read a config file from disk.
//! - `validate.rs`: the `RawFactoryConfig -> FactoryConfig` checks.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{CommandDefaults, FactoryConfig, LookupSection, RawFactoryConfig};
