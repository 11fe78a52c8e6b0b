// src/exec/process.rs

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

pub use nix::sys::signal::Signal;

use crate::errors::Result;
use crate::exec::BoxFuture;

/// Handle to a started child process.
pub trait Process: Send + Sync + Debug {
    fn pid(&self) -> u32;

    /// Terminate the process with the strongest stop signal available.
    fn kill(&self) -> Result<()> {
        self.signal(Signal::SIGKILL)
    }

    /// Stop tracking the process without waiting for it. Later `signal` and
    /// `wait` calls fail.
    fn release(&self) -> Result<()>;

    /// Deliver `sig`. Fails once the process has been reaped or released.
    fn signal(&self, sig: Signal) -> Result<()>;

    /// Wait for the process to exit and reap it.
    ///
    /// Waiting again afterwards returns an error rather than a second state.
    fn wait(&self) -> BoxFuture<'_, Result<Arc<dyn ProcessState>>>;
}

/// Exit information of a reaped process.
pub trait ProcessState: Send + Sync + Debug {
    /// Exit code, or `-1` when the process was terminated by a signal.
    fn exit_code(&self) -> i32;

    /// Whether the process exited on its own rather than by a signal.
    fn exited(&self) -> bool;

    fn pid(&self) -> u32;

    fn success(&self) -> bool {
        self.exited() && self.exit_code() == 0
    }

    /// The signal that terminated the process, if any.
    fn signal(&self) -> Option<Signal> {
        None
    }

    fn system_time(&self) -> Duration;

    fn user_time(&self) -> Duration;

    /// Raw platform wait status.
    fn sys(&self) -> Option<&dyn Any> {
        None
    }

    /// Raw platform resource usage.
    fn sys_usage(&self) -> Option<&dyn Any> {
        None
    }
}
