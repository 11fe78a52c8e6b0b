// crates/test-utils/src/fake_process.rs

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use procshim::{BoxFuture, ExecError, Process, ProcessState, Signal};
use tokio::sync::watch;

/// Scripted exit information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeProcessState {
    pub pid: u32,
    pub exit_code: i32,
    pub signal: Option<Signal>,
    pub user_time: Duration,
    pub system_time: Duration,
}

impl FakeProcessState {
    /// A normal exit with `code`.
    pub fn exit(pid: u32, code: i32) -> Self {
        Self {
            pid,
            exit_code: code,
            signal: None,
            user_time: Duration::from_millis(1),
            system_time: Duration::from_millis(1),
        }
    }

    /// Terminated by `sig`; the exit code is -1.
    pub fn killed_by(pid: u32, sig: Signal) -> Self {
        Self {
            signal: Some(sig),
            exit_code: -1,
            ..Self::exit(pid, 0)
        }
    }
}

impl ProcessState for FakeProcessState {
    fn exit_code(&self) -> i32 {
        self.exit_code
    }

    fn exited(&self) -> bool {
        self.signal.is_none()
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn signal(&self) -> Option<Signal> {
        self.signal
    }

    fn system_time(&self) -> Duration {
        self.system_time
    }

    fn user_time(&self) -> Duration {
        self.user_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Reaped,
    Released,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    signals: Vec<Signal>,
}

/// In-memory [`Process`].
///
/// Exits when [`FakeProcess::finish`] is called or when it receives a
/// terminating signal (`SIGKILL`, `SIGTERM`, `SIGINT`, `SIGHUP`, `SIGQUIT`).
/// Unlike a real zombie, a fake that has exited but was not reaped yet
/// rejects signals with `ProcessFinished`.
#[derive(Debug)]
pub struct FakeProcess {
    pid: u32,
    inner: Mutex<Inner>,
    exit_tx: watch::Sender<Option<Arc<FakeProcessState>>>,
}

impl FakeProcess {
    pub fn new(pid: u32) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            pid,
            inner: Mutex::new(Inner {
                phase: Phase::Running,
                signals: Vec::new(),
            }),
            exit_tx,
        }
    }

    /// Make the process exit. Later calls are ignored.
    pub fn finish(&self, state: FakeProcessState) {
        self.exit_tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Arc::new(state));
            true
        });
    }

    pub fn has_exited(&self) -> bool {
        self.exit_tx.borrow().is_some()
    }

    /// Resolves once the process has exited.
    pub async fn exited(&self) -> Arc<FakeProcessState> {
        let mut rx = self.exit_tx.subscribe();
        let state = rx
            .wait_for(Option::is_some)
            .await
            .expect("sender lives as long as the process");
        state.clone().expect("checked by wait_for")
    }

    /// Every signal delivered so far, in order.
    pub fn signals(&self) -> Vec<Signal> {
        self.inner.lock().unwrap().signals.clone()
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().unwrap().phase == Phase::Released
    }

    fn terminates(sig: Signal) -> bool {
        matches!(
            sig,
            Signal::SIGKILL | Signal::SIGTERM | Signal::SIGINT | Signal::SIGHUP | Signal::SIGQUIT
        )
    }
}

impl Process for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn release(&self) -> procshim::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.phase == Phase::Running {
            inner.phase = Phase::Released;
        }
        Ok(())
    }

    fn signal(&self, sig: Signal) -> procshim::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.phase {
            Phase::Released => return Err(ExecError::ProcessReleased),
            Phase::Reaped => return Err(ExecError::ProcessFinished),
            Phase::Running => {}
        }
        if self.has_exited() {
            return Err(ExecError::ProcessFinished);
        }
        inner.signals.push(sig);
        if Self::terminates(sig) {
            self.finish(FakeProcessState::killed_by(self.pid, sig));
        }
        Ok(())
    }

    fn wait(&self) -> BoxFuture<'_, procshim::Result<Arc<dyn ProcessState>>> {
        Box::pin(async move {
            let phase = self.inner.lock().unwrap().phase;
            match phase {
                Phase::Released => return Err(ExecError::ProcessReleased),
                Phase::Reaped => return Err(ExecError::ProcessFinished),
                Phase::Running => {}
            }
            let state = self.exited().await;

            let mut inner = self.inner.lock().unwrap();
            match inner.phase {
                Phase::Running => inner.phase = Phase::Reaped,
                Phase::Reaped => return Err(ExecError::ProcessFinished),
                Phase::Released => {
                    return Err(ExecError::Io(io::Error::other(
                        "process released while waiting",
                    )));
                }
            }
            Ok(state as Arc<dyn ProcessState>)
        })
    }
}
