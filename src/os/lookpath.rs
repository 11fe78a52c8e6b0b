// src/os/lookpath.rs

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::debug;

use crate::errors::{ExecError, Result};

/// Resolve `file` against `$PATH`.
pub fn look_path(file: &str) -> Result<String> {
    look_path_in(file, None)
}

/// Resolve `file` against `search` (a `:`-separated list), or `$PATH` when
/// `search` is `None`.
///
/// Names containing a `/` are not searched: they are checked in place and
/// returned unchanged.
pub fn look_path_in(file: &str, search: Option<&OsStr>) -> Result<String> {
    if file.is_empty() {
        return Err(ExecError::NotFound {
            name: String::new(),
        });
    }
    if file.contains('/') {
        check_executable(Path::new(file)).map_err(|source| ExecError::Lookup {
            name: file.to_string(),
            source,
        })?;
        return Ok(file.to_string());
    }

    let paths: OsString = match search {
        Some(search) => search.to_os_string(),
        None => env::var_os("PATH").unwrap_or_default(),
    };
    let cwd = env::current_dir().unwrap_or_default();

    let found = which::which_in(file, Some(&paths), &cwd).map_err(|err| {
        debug!(file, error = %err, "executable not found");
        ExecError::NotFound {
            name: file.to_string(),
        }
    })?;

    let resolved = found
        .into_os_string()
        .into_string()
        .map_err(|raw| ExecError::Lookup {
            name: file.to_string(),
            source: io::Error::new(
                io::ErrorKind::InvalidData,
                format!("resolved path {raw:?} is not valid UTF-8"),
            ),
        })?;
    debug!(file, path = %resolved, "resolved executable");
    Ok(resolved)
}

fn check_executable(path: &Path) -> io::Result<()> {
    let meta = fs::metadata(path)?;
    if !meta.is_dir() && meta.permissions().mode() & 0o111 != 0 {
        Ok(())
    } else {
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }
}
