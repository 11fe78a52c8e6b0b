// src/os/command.rs

//! [`Command`] backed by a real child process.
//!
//! `start` spawns the child and the stdio pump tasks; `wait` reaps the child,
//! drains the pumps, and translates the outcome. Commands bound to a
//! [`Context`] also get a watcher task that kills the child when the context
//! ends first.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{Context, ContextError};
use crate::errors::{ExecError, ExitError, Result};
use crate::exec::{
    BoxFuture, Command, CommandSpec, Input, Output, OutputPipe, Process, ProcessState,
    SharedReader, SharedWriter, StdinPipe,
};
use crate::os::pipes::{child_output_pipe, child_stdin_pipe};
use crate::os::process::OsProcess;
use crate::os::spawn::{self, PendingPipes, Prepared};

const PUMP_CHUNK: usize = 8 * 1024;

/// How long `wait` keeps draining stdio after the context killed the child.
/// Descendants that inherited the pipes can hold them open indefinitely.
const KILL_DRAIN_GRACE: Duration = Duration::from_millis(500);

pub struct OsCommand {
    spec: CommandSpec,
    ctx: Option<Context>,
    /// Set when the factory could not resolve the executable; replayed by
    /// every `start`.
    lookup_err: Option<ExecError>,
    pending: PendingPipes,
    process: Option<Arc<OsProcess>>,
    running: Option<Running>,
    state: Option<Arc<dyn ProcessState>>,
    waited: bool,
}

impl OsCommand {
    /// A command that runs `name` as given. `std::process` searches `$PATH`
    /// for names without a `/`; use [`OsFactory`](crate::OsFactory) for
    /// lookup errors reported up front.
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self::from_spec(CommandSpec::new(name, args))
    }

    pub fn from_spec(spec: CommandSpec) -> Self {
        Self {
            spec,
            ctx: None,
            lookup_err: None,
            pending: PendingPipes::default(),
            process: None,
            running: None,
            state: None,
            waited: false,
        }
    }

    pub(crate) fn bind_context(&mut self, ctx: Context) {
        self.ctx = Some(ctx);
    }

    pub(crate) fn set_lookup_error(&mut self, err: ExecError) {
        self.lookup_err = Some(err);
    }

    fn spawn_child(&mut self) -> Result<()> {
        let Prepared {
            mut command,
            stdin_pump,
            output_pumps,
            reserved_fds,
        } = spawn::prepare(&self.spec, &mut self.pending)?;

        let child = command.spawn().map_err(|source| {
            warn!(path = %self.spec.path(), error = %source, "spawn failed");
            ExecError::Spawn {
                path: self.spec.path().to_string(),
                source,
            }
        })?;
        // Close our copies of the child's pipe ends so the pumps see EOF.
        drop(command);
        drop(reserved_fds);
        let pid = child.id();
        drop(child);

        self.spec.freeze();
        let process = Arc::new(OsProcess::new(pid));
        debug!(pid, path = %self.spec.path(), "process started");

        let stdin_pump =
            stdin_pump.map(|(reader, sender)| tokio::spawn(pump_stdin(reader, sender)));
        let output_pumps = output_pumps
            .into_iter()
            .map(|(receiver, writer)| tokio::spawn(pump_output(receiver, writer)))
            .collect();
        let watcher = self
            .ctx
            .clone()
            .map(|ctx| Watcher::spawn(ctx, Arc::clone(&process)));

        self.process = Some(process);
        self.running = Some(Running {
            stdin_pump,
            output_pumps,
            watcher,
        });
        Ok(())
    }
}

impl Command for OsCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut CommandSpec {
        &mut self.spec
    }

    fn process(&self) -> Option<Arc<dyn Process>> {
        self.process
            .as_ref()
            .map(|p| Arc::clone(p) as Arc<dyn Process>)
    }

    fn process_state(&self) -> Option<Arc<dyn ProcessState>> {
        self.state.clone()
    }

    fn start(&mut self) -> Result<()> {
        if self.spec.is_started() {
            return Err(ExecError::AlreadyStarted);
        }
        if let Some(err) = &self.lookup_err {
            return Err(replay_lookup_error(err));
        }
        if let Some(reason) = self.ctx.as_ref().and_then(Context::err) {
            debug!(path = %self.spec.path(), %reason, "context ended before start");
            return Err(ExecError::Cancelled { reason, exit: None });
        }
        self.spawn_child()
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let Some(process) = self.process.clone() else {
                return Err(ExecError::NotStarted);
            };
            if self.waited {
                return Err(ExecError::WaitAlreadyCalled);
            }
            self.waited = true;

            let reaped = process.wait().await;
            let Some(running) = self.running.take() else {
                return reaped.map(drop);
            };
            let state = match reaped {
                Ok(state) => state,
                Err(err) => {
                    running.abandon();
                    return Err(err);
                }
            };
            let (killed_by, copy_err) = running.finish().await;
            self.state = Some(Arc::clone(&state));

            if let Some(reason) = killed_by {
                let exit = (!state.success()).then(|| ExitError::new(Arc::clone(&state)));
                return Err(ExecError::Cancelled { reason, exit });
            }
            if !state.success() {
                return Err(ExitError::new(state).into());
            }
            match copy_err {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        })
    }

    fn stdin_pipe(&mut self) -> Result<StdinPipe> {
        if self.spec.is_started() {
            return Err(ExecError::AlreadyStarted);
        }
        if self.spec.stdin().is_some() {
            return Err(ExecError::StdinAlreadySet);
        }
        let (child_end, sender) = child_stdin_pipe()?;
        self.spec.set_stdin(Some(Input::Pipe));
        self.pending.stdin = Some(child_end);
        Ok(Box::new(sender))
    }

    fn stdout_pipe(&mut self) -> Result<OutputPipe> {
        if self.spec.is_started() {
            return Err(ExecError::AlreadyStarted);
        }
        if self.spec.stdout().is_some() {
            return Err(ExecError::StdoutAlreadySet);
        }
        let (receiver, child_end) = child_output_pipe()?;
        self.spec.set_stdout(Some(Output::Pipe));
        self.pending.stdout = Some(child_end);
        Ok(Box::new(receiver))
    }

    fn stderr_pipe(&mut self) -> Result<OutputPipe> {
        if self.spec.is_started() {
            return Err(ExecError::AlreadyStarted);
        }
        if self.spec.stderr().is_some() {
            return Err(ExecError::StderrAlreadySet);
        }
        let (receiver, child_end) = child_output_pipe()?;
        self.spec.set_stderr(Some(Output::Pipe));
        self.pending.stderr = Some(child_end);
        Ok(Box::new(receiver))
    }
}

impl fmt::Display for OsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec.command_line(self.lookup_err.is_none()))
    }
}

impl fmt::Debug for OsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsCommand")
            .field("spec", &self.spec)
            .field("process", &self.process)
            .field("waited", &self.waited)
            .finish_non_exhaustive()
    }
}

fn replay_lookup_error(err: &ExecError) -> ExecError {
    match err {
        ExecError::NotFound { name } => ExecError::NotFound { name: name.clone() },
        ExecError::Lookup { name, source } => ExecError::Lookup {
            name: name.clone(),
            source: io::Error::new(source.kind(), source.to_string()),
        },
        other => ExecError::Io(io::Error::other(other.to_string())),
    }
}

/// Background work tied to one started child.
struct Running {
    stdin_pump: Option<JoinHandle<io::Result<()>>>,
    output_pumps: Vec<JoinHandle<io::Result<()>>>,
    watcher: Option<Watcher>,
}

impl Running {
    /// Join everything after the child was reaped. Returns the context
    /// reason if the watcher killed the child, and the first copy error.
    ///
    /// After a kill the output pumps get [`KILL_DRAIN_GRACE`] to reach EOF;
    /// the ones still running are dropped with whatever they already copied.
    async fn finish(mut self) -> (Option<ContextError>, Option<io::Error>) {
        let killed_by = match self.watcher.as_mut() {
            Some(watcher) => watcher.stop().await,
            None => None,
        };

        let mut first_err = None;
        if let Some(pump) = self.stdin_pump.take() {
            // The child is gone; a reader that has not hit EOF yet never will
            // be read again.
            if pump.is_finished() {
                keep_first(&mut first_err, join_pump(pump).await);
            } else {
                pump.abort();
            }
        }
        let drain_until = killed_by.map(|_| Instant::now() + KILL_DRAIN_GRACE);
        for pump in self.output_pumps.drain(..) {
            let result = match drain_until {
                Some(deadline) => join_pump_until(pump, deadline).await,
                None => join_pump(pump).await,
            };
            keep_first(&mut first_err, result);
        }
        (killed_by, first_err)
    }

    fn abandon(self) {
        if let Some(pump) = &self.stdin_pump {
            pump.abort();
        }
        for pump in &self.output_pumps {
            pump.abort();
        }
    }
}

async fn join_pump(pump: JoinHandle<io::Result<()>>) -> io::Result<()> {
    pump.await.unwrap_or_else(|err| Err(io::Error::other(err)))
}

async fn join_pump_until(
    mut pump: JoinHandle<io::Result<()>>,
    deadline: Instant,
) -> io::Result<()> {
    match tokio::time::timeout_at(deadline, &mut pump).await {
        Ok(joined) => joined.unwrap_or_else(|err| Err(io::Error::other(err))),
        Err(_) => {
            debug!("stdio still open after kill, abandoning copy");
            pump.abort();
            Ok(())
        }
    }
}

fn keep_first(slot: &mut Option<io::Error>, result: io::Result<()>) {
    if let Err(err) = result {
        debug!(error = %err, "stdio copy failed");
        slot.get_or_insert(err);
    }
}

async fn pump_stdin(reader: SharedReader, mut sender: pipe::Sender) -> io::Result<()> {
    let mut reader = reader.lock().await;
    match tokio::io::copy(&mut *reader, &mut sender).await {
        Ok(_) => Ok(()),
        // The child closed stdin or exited before reading everything.
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err),
    }
}

async fn pump_output(mut receiver: pipe::Receiver, writer: SharedWriter) -> io::Result<()> {
    let mut buf = vec![0u8; PUMP_CHUNK];
    loop {
        let n = receiver.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let mut writer = writer.lock().await;
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
    }
}

/// Kills the child when the bound context ends before `wait` stops it.
struct Watcher {
    stop: CancellationToken,
    handle: JoinHandle<Option<ContextError>>,
}

impl Watcher {
    fn spawn(ctx: Context, process: Arc<OsProcess>) -> Self {
        let stop = CancellationToken::new();
        let stopped = stop.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = stopped.cancelled() => None,
                reason = ctx.done() => match process.kill() {
                    Ok(()) => {
                        info!(pid = process.pid(), %reason, "context ended, process killed");
                        Some(reason)
                    }
                    Err(ExecError::ProcessFinished) => None,
                    Err(err) => {
                        warn!(pid = process.pid(), %reason, error = %err, "failed to kill process");
                        Some(reason)
                    }
                },
            }
        });
        Self { stop, handle }
    }

    async fn stop(&mut self) -> Option<ContextError> {
        self.stop.cancel();
        (&mut self.handle).await.unwrap_or(None)
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
