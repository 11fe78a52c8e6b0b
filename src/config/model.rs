// src/config/model.rs

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Factory configuration as read from a TOML file.
///
/// ```toml
/// [lookup]
/// search_path = ["/usr/local/bin", "/usr/bin"]
///
/// [command]
/// env = ["LANG=C"]
/// dir = "/srv/app"
/// ```
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFactoryConfig {
    #[serde(default)]
    pub lookup: LookupSection,

    #[serde(default)]
    pub command: CommandDefaults,
}

/// `[lookup]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupSection {
    /// Directories searched by `look_path`, in order. `None` uses `$PATH`.
    #[serde(default)]
    pub search_path: Option<Vec<PathBuf>>,
}

/// `[command]` section: defaults applied to every command the factory builds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandDefaults {
    /// Replaces the inherited environment when set.
    #[serde(default)]
    pub env: Option<Vec<String>>,

    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Validated configuration used by [`OsFactory`](crate::OsFactory).
///
/// Built from [`RawFactoryConfig`] with `TryFrom` (see `validate.rs`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactoryConfig {
    search_path: Option<OsString>,
    env: Option<Vec<String>>,
    dir: Option<PathBuf>,
}

impl FactoryConfig {
    pub(crate) fn new_unchecked(
        search_path: Option<OsString>,
        env: Option<Vec<String>>,
        dir: Option<PathBuf>,
    ) -> Self {
        Self {
            search_path,
            env,
            dir,
        }
    }

    /// `:`-joined search path, or `None` to use `$PATH`.
    pub fn search_path(&self) -> Option<&OsString> {
        self.search_path.as_ref()
    }

    pub fn env(&self) -> Option<&[String]> {
        self.env.as_deref()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}
