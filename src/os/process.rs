// src/os/process.rs

//! Live handle to a spawned child, reaped with `wait4` so the exit status
//! comes with resource usage.
//!
//! Signals and reaping are serialised through a lifecycle lock: once the pid
//! is reaped it may be reused by the OS, so no signal is sent after that
//! point. On Linux the reaper first blocks with `waitid(WNOWAIT)` and only
//! takes the write lock for the non-blocking `wait4` that follows.

// `wait4` has no safe wrapper in `nix`.
#![allow(unsafe_code)]

use std::io;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::{ExecError, Result};
use crate::exec::{BoxFuture, Process, ProcessState, Signal};
use crate::os::state::OsProcessState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Reaped,
    Released,
}

#[derive(Debug)]
struct Shared {
    pid: Pid,
    lifecycle: RwLock<Lifecycle>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct OsProcess {
    shared: Arc<Shared>,
    // Only one waiter reaps; the rest observe the finished lifecycle.
    waiting: Mutex<()>,
}

impl OsProcess {
    pub(crate) fn new(pid: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                pid: Pid::from_raw(pid as i32),
                lifecycle: RwLock::new(Lifecycle::Running),
            }),
            waiting: Mutex::new(()),
        }
    }

    fn check_running(lifecycle: Lifecycle) -> Result<()> {
        match lifecycle {
            Lifecycle::Running => Ok(()),
            Lifecycle::Reaped => Err(ExecError::ProcessFinished),
            Lifecycle::Released => Err(ExecError::ProcessReleased),
        }
    }
}

impl Process for OsProcess {
    fn pid(&self) -> u32 {
        self.shared.pid.as_raw() as u32
    }

    fn release(&self) -> Result<()> {
        let mut lifecycle = self.shared.write();
        if *lifecycle == Lifecycle::Running {
            *lifecycle = Lifecycle::Released;
            debug!(pid = self.pid(), "process released");
        }
        Ok(())
    }

    fn signal(&self, sig: Signal) -> Result<()> {
        let lifecycle = self.shared.read();
        Self::check_running(*lifecycle)?;

        match kill(self.shared.pid, sig) {
            Ok(()) => {
                debug!(pid = self.pid(), signal = sig.as_str(), "signal delivered");
                Ok(())
            }
            Err(Errno::ESRCH) => Err(ExecError::ProcessFinished),
            Err(errno) => {
                warn!(
                    pid = self.pid(),
                    signal = sig.as_str(),
                    error = %errno,
                    "failed to signal process"
                );
                Err(ExecError::Signal {
                    pid: self.pid(),
                    source: io::Error::from(errno),
                })
            }
        }
    }

    fn wait(&self) -> BoxFuture<'_, Result<Arc<dyn ProcessState>>> {
        Box::pin(async move {
            let _waiter = self.waiting.lock().await;
            Self::check_running(*self.shared.read())?;

            let shared = Arc::clone(&self.shared);
            let state = tokio::task::spawn_blocking(move || reap(&shared))
                .await
                .map_err(io::Error::other)??;

            debug!(
                pid = state.pid(),
                exit_code = state.exit_code(),
                success = state.success(),
                "process reaped"
            );
            Ok(Arc::new(state) as Arc<dyn ProcessState>)
        })
    }
}

#[cfg(target_os = "linux")]
fn reap(shared: &Shared) -> io::Result<OsProcessState> {
    block_until_waitable(shared.pid)?;
    let mut lifecycle = shared.write();
    let state = wait4(shared.pid)?;
    *lifecycle = Lifecycle::Reaped;
    Ok(state)
}

#[cfg(not(target_os = "linux"))]
fn reap(shared: &Shared) -> io::Result<OsProcessState> {
    let state = wait4(shared.pid)?;
    *shared.write() = Lifecycle::Reaped;
    Ok(state)
}

/// Wait for the child to exit while leaving it reapable.
#[cfg(target_os = "linux")]
fn block_until_waitable(pid: Pid) -> io::Result<()> {
    use nix::sys::wait::{Id, WaitPidFlag, waitid};

    loop {
        match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(io::Error::from(errno)),
        }
    }
}

fn wait4(pid: Pid) -> io::Result<OsProcessState> {
    let mut status: libc::c_int = 0;
    // SAFETY: rusage is plain old data; all-zero is a valid value.
    let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        // SAFETY: both out-pointers refer to live, writable locals.
        let rc = unsafe { libc::wait4(pid.as_raw(), &mut status, 0, &mut rusage) };
        if rc >= 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
    Ok(OsProcessState::new(pid.as_raw() as u32, status, rusage))
}
