// src/errors.rs

//! Crate-wide error types.
//!
//! Failures fall into three groups:
//! - spawn-time errors (lookup, spawn, misuse of the pipe helpers), returned
//!   exactly as they happened;
//! - exit-status errors, always normalised into [`ExitError`];
//! - cancellation, reported as [`ExecError::Cancelled`].
//!
//! Mutating a command after it started is not an error at all: it panics
//! with [`ALREADY_STARTED`](crate::ALREADY_STARTED).

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::context::ContextError;
use crate::exec::ProcessState;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("exec: {name:?}: executable file not found in $PATH")]
    NotFound { name: String },

    #[error("exec: {name:?}: {source}")]
    Lookup {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("fork/exec {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("exec: invalid environment entry {0:?} (expected KEY=value)")]
    InvalidEnv(String),

    #[error("exec: already started")]
    AlreadyStarted,

    #[error("exec: not started")]
    NotStarted,

    #[error("exec: Wait was already called")]
    WaitAlreadyCalled,

    #[error("exec: Stdin already set")]
    StdinAlreadySet,

    #[error("exec: Stdout already set")]
    StdoutAlreadySet,

    #[error("exec: Stderr already set")]
    StderrAlreadySet,

    #[error("os: process already finished")]
    ProcessFinished,

    #[error("os: process already released")]
    ProcessReleased,

    #[error("os: failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("{reason}")]
    Cancelled {
        reason: ContextError,
        #[source]
        exit: Option<ExitError>,
    },

    #[error(transparent)]
    Exit(#[from] ExitError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ExecError {
    /// The exit error carried by this error, if the process ran and failed.
    ///
    /// Cancelled runs that were killed also carry one.
    pub fn exit_error(&self) -> Option<&ExitError> {
        match self {
            ExecError::Exit(e) => Some(e),
            ExecError::Cancelled { exit, .. } => exit.as_ref(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecError::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;

/// The OS-level "process exited unsuccessfully" error.
///
/// Rendered the same way a shell reports it: `exit status 3`,
/// `signal: SIGKILL`.
#[derive(Debug, Clone)]
pub struct StatusError {
    state: Arc<dyn ProcessState>,
}

impl StatusError {
    pub fn new(state: Arc<dyn ProcessState>) -> Self {
        Self { state }
    }

    pub fn process_state(&self) -> &Arc<dyn ProcessState> {
        &self.state
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe_state(self.state.as_ref()))
    }
}

impl std::error::Error for StatusError {}

/// Render a finished process the way `wait` reports it.
pub fn describe_state(state: &dyn ProcessState) -> String {
    if state.exited() {
        return format!("exit status {}", state.exit_code());
    }
    match state.signal() {
        Some(sig) => format!("signal: {}", sig.as_str()),
        None => format!("exit status {}", state.exit_code()),
    }
}

/// A process ran and did not succeed.
///
/// Exposes the reaped [`ProcessState`] (also through the [`ProcessState`]
/// impl on `ExitError` itself) and, for `output`/`combined_output`, the bytes
/// captured from the child. [`std::error::Error::source`] returns the
/// underlying [`StatusError`].
#[derive(Debug, Clone)]
pub struct ExitError {
    status: StatusError,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ExitError {
    pub fn new(state: Arc<dyn ProcessState>) -> Self {
        Self {
            status: StatusError::new(state),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    pub fn with_stdout(mut self, stdout: Vec<u8>) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn with_stderr(mut self, stderr: Vec<u8>) -> Self {
        self.stderr = stderr;
        self
    }

    pub fn process_state(&self) -> &Arc<dyn ProcessState> {
        self.status.process_state()
    }

    pub fn status_error(&self) -> &StatusError {
        &self.status
    }

    /// Captured standard error; empty unless produced by `output`.
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Captured standard output; empty unless produced by `output` or
    /// `combined_output`.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.status, f)
    }
}

impl std::error::Error for ExitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.status)
    }
}

impl ProcessState for ExitError {
    fn exit_code(&self) -> i32 {
        self.process_state().exit_code()
    }

    fn exited(&self) -> bool {
        self.process_state().exited()
    }

    fn pid(&self) -> u32 {
        self.process_state().pid()
    }

    fn success(&self) -> bool {
        self.process_state().success()
    }

    fn signal(&self) -> Option<crate::exec::Signal> {
        self.process_state().signal()
    }

    fn system_time(&self) -> Duration {
        self.process_state().system_time()
    }

    fn user_time(&self) -> Duration {
        self.process_state().user_time()
    }

    fn sys(&self) -> Option<&dyn std::any::Any> {
        self.process_state().sys()
    }

    fn sys_usage(&self) -> Option<&dyn std::any::Any> {
        self.process_state().sys_usage()
    }
}

/// Errors produced while loading a [`FactoryConfig`](crate::config::FactoryConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Exited(i32);

    impl ProcessState for Exited {
        fn exit_code(&self) -> i32 {
            self.0
        }
        fn exited(&self) -> bool {
            true
        }
        fn pid(&self) -> u32 {
            42
        }
        fn system_time(&self) -> Duration {
            Duration::ZERO
        }
        fn user_time(&self) -> Duration {
            Duration::ZERO
        }
    }

    #[test]
    fn exit_error_unwraps_to_status_error() {
        let exit = ExitError::new(Arc::new(Exited(5))).with_stderr(b"boom\n".to_vec());
        let err = ExecError::from(exit);

        assert_eq!(err.to_string(), "exit status 5");

        let source = err.source().expect("exit error has a source");
        let status = source
            .downcast_ref::<StatusError>()
            .expect("source is the status error");
        assert_eq!(status.process_state().exit_code(), 5);

        let exit = err.exit_error().unwrap();
        assert_eq!(exit.stderr(), b"boom\n");
        assert_eq!(exit.exit_code(), 5);
        assert!(!exit.success());
    }

    #[test]
    fn spawn_errors_are_not_exit_errors() {
        let err = ExecError::NotFound {
            name: "nope".into(),
        };
        assert!(err.exit_error().is_none());
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("executable file not found"));
    }
}
