// src/os/state.rs

use std::any::Any;
use std::fmt;
use std::time::Duration;

use crate::exec::{ProcessState, Signal};

/// Exit information captured by `wait4`.
///
/// [`ProcessState::sys`] yields the raw wait status (`libc::c_int`) and
/// [`ProcessState::sys_usage`] the raw `libc::rusage`.
#[derive(Clone, Copy)]
pub struct OsProcessState {
    pid: u32,
    status: libc::c_int,
    rusage: libc::rusage,
}

impl OsProcessState {
    pub(crate) fn new(pid: u32, status: libc::c_int, rusage: libc::rusage) -> Self {
        Self {
            pid,
            status,
            rusage,
        }
    }

    pub fn wait_status(&self) -> libc::c_int {
        self.status
    }

    pub fn core_dumped(&self) -> bool {
        libc::WIFSIGNALED(self.status) && libc::WCOREDUMP(self.status)
    }
}

impl ProcessState for OsProcessState {
    fn exit_code(&self) -> i32 {
        if self.exited() {
            libc::WEXITSTATUS(self.status)
        } else {
            -1
        }
    }

    fn exited(&self) -> bool {
        libc::WIFEXITED(self.status)
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn signal(&self) -> Option<Signal> {
        if libc::WIFSIGNALED(self.status) {
            Signal::try_from(libc::WTERMSIG(self.status)).ok()
        } else {
            None
        }
    }

    fn system_time(&self) -> Duration {
        timeval_to_duration(self.rusage.ru_stime)
    }

    fn user_time(&self) -> Duration {
        timeval_to_duration(self.rusage.ru_utime)
    }

    fn sys(&self) -> Option<&dyn Any> {
        Some(&self.status)
    }

    fn sys_usage(&self) -> Option<&dyn Any> {
        Some(&self.rusage)
    }
}

impl fmt::Debug for OsProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsProcessState")
            .field("pid", &self.pid)
            .field("status", &self.status)
            .field("user_time", &self.user_time())
            .field("system_time", &self.system_time())
            .finish_non_exhaustive()
    }
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
    let secs = u64::try_from(tv.tv_sec).unwrap_or(0);
    let micros = u64::try_from(tv.tv_usec).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(micros)
}
