// crates/test-utils/src/fake_command.rs

use std::fmt;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use procshim::exec::{OutputPipe, StdinPipe};
use procshim::{
    BoxFuture, Command, CommandSpec, Context, ContextError, ExecError, ExitError, Input, Output,
    Process, ProcessState,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::fake_process::{FakeProcess, FakeProcessState};

const PIPE_CAPACITY: usize = 64 * 1024;

/// What a fake program does once started.
///
/// The default script reads nothing, writes nothing and exits 0.
#[derive(Debug, Clone, Default)]
pub struct FakeScript {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    /// Copy everything read from stdin to stdout, like `cat`.
    pub echo_stdin: bool,
    /// Never exit on its own; only a terminating signal ends it.
    pub hang: bool,
    /// `start` fails with `ExecError::NotFound`.
    pub not_found: bool,
    /// `start` fails with `ExecError::Spawn` carrying this kind.
    pub spawn_error: Option<io::ErrorKind>,
}

impl FakeScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdout = bytes.into();
        self
    }

    pub fn stderr(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stderr = bytes.into();
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn echo_stdin(mut self) -> Self {
        self.echo_stdin = true;
        self
    }

    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn not_found(mut self) -> Self {
        self.not_found = true;
        self
    }

    pub fn spawn_error(mut self, kind: io::ErrorKind) -> Self {
        self.spawn_error = Some(kind);
        self
    }
}

/// What a fake command was started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub path: String,
    pub args: Vec<String>,
    pub env: Option<Vec<String>>,
    pub dir: PathBuf,
    /// Bytes the program consumed from stdin, filled in once it exits.
    pub stdin: Vec<u8>,
}

pub type InvocationLog = Arc<Mutex<Vec<Invocation>>>;

#[derive(Debug, Default)]
struct PendingPipes {
    stdin: Option<DuplexStream>,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
}

/// [`Command`] that runs a [`FakeScript`] instead of a process.
///
/// Shares the configuration guard, pipe rules and error translation of the
/// OS implementation, so code under test sees the same contract.
pub struct FakeCommand {
    spec: CommandSpec,
    script: FakeScript,
    pid: u32,
    ctx: Option<Context>,
    log: InvocationLog,
    pending: PendingPipes,
    process: Option<Arc<FakeProcess>>,
    child: Option<JoinHandle<io::Result<()>>>,
    /// Yields the context reason when it killed the process.
    watcher: Option<JoinHandle<Option<ContextError>>>,
    state: Option<Arc<dyn ProcessState>>,
    waited: bool,
}

impl FakeCommand {
    pub fn new(name: &str, args: &[&str], script: FakeScript) -> Self {
        Self {
            spec: CommandSpec::new(name, args),
            script,
            pid: 4242,
            ctx: None,
            log: InvocationLog::default(),
            pending: PendingPipes::default(),
            process: None,
            child: None,
            watcher: None,
            state: None,
            waited: false,
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = Some(ctx);
        self
    }

    pub fn with_log(mut self, log: InvocationLog) -> Self {
        self.log = log;
        self
    }

    /// The fake process, for tests that want to drive it directly.
    pub fn fake_process(&self) -> Option<Arc<FakeProcess>> {
        self.process.clone()
    }

    fn spawn_child(
        &mut self,
        process: Arc<FakeProcess>,
        index: usize,
    ) -> JoinHandle<io::Result<()>> {
        let script = self.script.clone();
        let stdin = self.spec.stdin().cloned();
        let stdout = self.spec.stdout().cloned();
        let stderr = self.spec.stderr().cloned();
        let mut pending = std::mem::take(&mut self.pending);
        let log = Arc::clone(&self.log);
        let pid = self.pid;

        tokio::spawn(async move {
            let consumed = read_stdin(stdin.as_ref(), pending.stdin.take()).await?;
            if let Some(entry) = log.lock().unwrap().get_mut(index) {
                entry.stdin = consumed.clone();
            }

            let mut out = script.stdout.clone();
            if script.echo_stdin {
                out.extend_from_slice(&consumed);
            }
            let shared = match (&stdout, &stderr) {
                (Some(a @ Output::Writer(_)), Some(b)) => a.same(b),
                _ => false,
            };
            let mut stdout_pipe = pending.stdout.take();
            write_sink(stdout.as_ref(), &mut stdout_pipe, &out).await?;
            if shared {
                write_sink(stdout.as_ref(), &mut stdout_pipe, &script.stderr).await?;
            } else {
                write_sink(stderr.as_ref(), &mut pending.stderr, &script.stderr).await?;
            }
            // Close the pipes before exiting, as a real child would.
            drop(stdout_pipe);
            drop(pending);

            if !script.hang {
                process.finish(FakeProcessState::exit(pid, script.exit_code));
            }
            Ok(())
        })
    }
}

async fn read_stdin(input: Option<&Input>, pipe: Option<DuplexStream>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    match input {
        None | Some(Input::Inherit) => {}
        Some(Input::File(file)) => {
            let mut file = file.try_clone()?;
            buf = tokio::task::spawn_blocking(move || {
                let mut read = Vec::new();
                file.read_to_end(&mut read).map(|_| read)
            })
            .await
            .map_err(io::Error::other)??;
        }
        Some(Input::Reader(reader)) => {
            reader.lock().await.read_to_end(&mut buf).await?;
        }
        Some(Input::Pipe) => {
            if let Some(mut pipe) = pipe {
                pipe.read_to_end(&mut buf).await?;
            }
        }
    }
    Ok(buf)
}

async fn write_sink(
    output: Option<&Output>,
    pipe: &mut Option<DuplexStream>,
    bytes: &[u8],
) -> io::Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    match output {
        None | Some(Output::Inherit) => Ok(()),
        Some(Output::File(file)) => {
            let mut file = file.try_clone()?;
            let bytes = bytes.to_vec();
            tokio::task::spawn_blocking(move || file.write_all(&bytes))
                .await
                .map_err(io::Error::other)?
        }
        Some(Output::Writer(writer)) => {
            let mut writer = writer.lock().await;
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        Some(Output::Pipe) => match pipe {
            // The reader may have gone away; a real child would get EPIPE.
            Some(pipe) => match pipe.write_all(bytes).await {
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            },
            None => Ok(()),
        },
    }
}

impl Command for FakeCommand {
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

    fn start(&mut self) -> procshim::Result<()> {
        if self.spec.is_started() {
            return Err(ExecError::AlreadyStarted);
        }
        if self.script.not_found {
            return Err(ExecError::NotFound {
                name: self.spec.args().first().cloned().unwrap_or_default(),
            });
        }
        if let Some(reason) = self.ctx.as_ref().and_then(Context::err) {
            return Err(ExecError::Cancelled { reason, exit: None });
        }
        self.spec.env_pairs()?;
        if let Some(kind) = self.script.spawn_error {
            return Err(ExecError::Spawn {
                path: self.spec.path().to_string(),
                source: io::Error::from(kind),
            });
        }

        self.spec.freeze();
        let index = {
            let mut log = self.log.lock().unwrap();
            log.push(Invocation {
                path: self.spec.path().to_string(),
                args: self.spec.args().to_vec(),
                env: self.spec.env().map(<[String]>::to_vec),
                dir: self.spec.dir().to_path_buf(),
                stdin: Vec::new(),
            });
            log.len() - 1
        };

        debug!(pid = self.pid, command = %self, "fake process started");
        let process = Arc::new(FakeProcess::new(self.pid));
        self.child = Some(self.spawn_child(Arc::clone(&process), index));

        if let Some(ctx) = self.ctx.clone() {
            let process = Arc::clone(&process);
            self.watcher = Some(tokio::spawn(async move {
                tokio::select! {
                    reason = ctx.done() => process.kill().is_ok().then_some(reason),
                    _ = process.exited() => None,
                }
            }));
        }
        self.process = Some(process);
        Ok(())
    }

    fn wait(&mut self) -> BoxFuture<'_, procshim::Result<()>> {
        Box::pin(async move {
            let Some(process) = self.process.clone() else {
                return Err(ExecError::NotStarted);
            };
            if self.waited {
                return Err(ExecError::WaitAlreadyCalled);
            }
            self.waited = true;

            let state = process.wait().await?;
            // The watcher ends as soon as the process has exited.
            let killed_by = match self.watcher.take() {
                Some(watcher) => watcher.await.unwrap_or(None),
                None => None,
            };
            let copy_result = match self.child.take() {
                Some(child) if child.is_finished() => {
                    child.await.unwrap_or_else(|e| Err(io::Error::other(e)))
                }
                Some(child) => {
                    // Killed while still feeding stdio.
                    child.abort();
                    Ok(())
                }
                None => Ok(()),
            };
            self.state = Some(Arc::clone(&state));

            if let Some(reason) = killed_by {
                let exit = (!state.success()).then(|| ExitError::new(Arc::clone(&state)));
                return Err(ExecError::Cancelled { reason, exit });
            }
            if !state.success() {
                return Err(ExitError::new(state).into());
            }
            copy_result.map_err(ExecError::from)
        })
    }

    fn stdin_pipe(&mut self) -> procshim::Result<StdinPipe> {
        if self.spec.is_started() {
            return Err(ExecError::AlreadyStarted);
        }
        if self.spec.stdin().is_some() {
            return Err(ExecError::StdinAlreadySet);
        }
        let (caller, child) = tokio::io::duplex(PIPE_CAPACITY);
        self.spec.set_stdin(Some(Input::Pipe));
        self.pending.stdin = Some(child);
        Ok(Box::new(caller))
    }

    fn stdout_pipe(&mut self) -> procshim::Result<OutputPipe> {
        if self.spec.is_started() {
            return Err(ExecError::AlreadyStarted);
        }
        if self.spec.stdout().is_some() {
            return Err(ExecError::StdoutAlreadySet);
        }
        let (caller, child) = tokio::io::duplex(PIPE_CAPACITY);
        self.spec.set_stdout(Some(Output::Pipe));
        self.pending.stdout = Some(child);
        Ok(Box::new(caller))
    }

    fn stderr_pipe(&mut self) -> procshim::Result<OutputPipe> {
        if self.spec.is_started() {
            return Err(ExecError::AlreadyStarted);
        }
        if self.spec.stderr().is_some() {
            return Err(ExecError::StderrAlreadySet);
        }
        let (caller, child) = tokio::io::duplex(PIPE_CAPACITY);
        self.spec.set_stderr(Some(Output::Pipe));
        self.pending.stderr = Some(child);
        Ok(Box::new(caller))
    }
}

impl fmt::Display for FakeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec.command_line(!self.script.not_found))
    }
}

impl Drop for FakeCommand {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}
