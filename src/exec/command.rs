// src/exec/command.rs

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::errors::{ExecError, Result};
use crate::exec::process::{Process, ProcessState};
use crate::exec::spec::{CommandSpec, SysProcAttr};
use crate::exec::stdio::{Capture, Input, Output, OutputPipe, StdinPipe};
use crate::exec::BoxFuture;

/// A process to launch, configured before it starts and frozen afterwards.
///
/// The configuration accessors are provided on top of [`Command::spec`] and
/// [`Command::spec_mut`]; every setter panics with
/// [`ALREADY_STARTED`](crate::ALREADY_STARTED) once the process has started.
/// `Display` renders the command line.
pub trait Command: Send + fmt::Display {
    fn spec(&self) -> &CommandSpec;
    fn spec_mut(&mut self) -> &mut CommandSpec;

    fn path(&self) -> &str {
        self.spec().path()
    }

    #[track_caller]
    fn set_path(&mut self, path: &str) {
        self.spec_mut().set_path(path)
    }

    fn args(&self) -> &[String] {
        self.spec().args()
    }

    #[track_caller]
    fn set_args(&mut self, args: Vec<String>) {
        self.spec_mut().set_args(args)
    }

    #[track_caller]
    fn append_args(&mut self, args: &[&str]) {
        self.spec_mut().append_args(args)
    }

    fn env(&self) -> Option<&[String]> {
        self.spec().env()
    }

    #[track_caller]
    fn set_env(&mut self, env: Option<Vec<String>>) {
        self.spec_mut().set_env(env)
    }

    #[track_caller]
    fn append_env(&mut self, env: &[&str]) {
        self.spec_mut().append_env(env)
    }

    fn dir(&self) -> &Path {
        self.spec().dir()
    }

    #[track_caller]
    fn set_dir(&mut self, dir: &Path) {
        self.spec_mut().set_dir(dir)
    }

    fn stdin(&self) -> Option<&Input> {
        self.spec().stdin()
    }

    #[track_caller]
    fn set_stdin(&mut self, stdin: Option<Input>) {
        self.spec_mut().set_stdin(stdin)
    }

    fn stdout(&self) -> Option<&Output> {
        self.spec().stdout()
    }

    #[track_caller]
    fn set_stdout(&mut self, stdout: Option<Output>) {
        self.spec_mut().set_stdout(stdout)
    }

    fn stderr(&self) -> Option<&Output> {
        self.spec().stderr()
    }

    #[track_caller]
    fn set_stderr(&mut self, stderr: Option<Output>) {
        self.spec_mut().set_stderr(stderr)
    }

    fn extra_files(&self) -> &[Arc<File>] {
        self.spec().extra_files()
    }

    #[track_caller]
    fn set_extra_files(&mut self, files: Vec<Arc<File>>) {
        self.spec_mut().set_extra_files(files)
    }

    #[track_caller]
    fn append_extra_files(&mut self, files: &[Arc<File>]) {
        self.spec_mut().append_extra_files(files)
    }

    fn sys_proc_attr(&self) -> Option<&SysProcAttr> {
        self.spec().sys_proc_attr()
    }

    #[track_caller]
    fn set_sys_proc_attr(&mut self, attr: Option<SysProcAttr>) {
        self.spec_mut().set_sys_proc_attr(attr)
    }

    /// The running process; `None` until `start` succeeded. Every call
    /// returns the same handle.
    fn process(&self) -> Option<Arc<dyn Process>>;

    /// The reaped state; `None` until `wait` (or `run`/`output`/
    /// `combined_output`) returned.
    fn process_state(&self) -> Option<Arc<dyn ProcessState>>;

    /// Spawn the process and return without waiting for it.
    fn start(&mut self) -> Result<()>;

    /// Wait for a started process to exit and for its stdio to drain.
    fn wait(&mut self) -> BoxFuture<'_, Result<()>>;

    fn run(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.start()?;
            self.wait().await
        })
    }

    /// Run to completion and return stdout.
    ///
    /// When stderr was not configured it is captured too and attached to the
    /// [`ExitError`](crate::ExitError) on failure.
    fn output(&mut self) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move {
            if self.spec().is_started() {
                return Err(ExecError::AlreadyStarted);
            }
            if self.stdout().is_some() {
                return Err(ExecError::StdoutAlreadySet);
            }
            let stdout = Capture::new();
            self.set_stdout(Some(stdout.output()));
            let stderr = if self.stderr().is_none() {
                let capture = Capture::new();
                self.set_stderr(Some(capture.output()));
                Some(capture)
            } else {
                None
            };

            let result = self.run().await;
            let out = stdout.take().await;
            match result {
                Ok(()) => Ok(out),
                Err(err) => {
                    let err_bytes = match stderr {
                        Some(capture) => capture.take().await,
                        None => Vec::new(),
                    };
                    Err(attach_captured(err, out, err_bytes))
                }
            }
        })
    }

    /// Run to completion and return stdout and stderr interleaved in the
    /// order the child wrote them.
    fn combined_output(&mut self) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move {
            if self.spec().is_started() {
                return Err(ExecError::AlreadyStarted);
            }
            if self.stdout().is_some() {
                return Err(ExecError::StdoutAlreadySet);
            }
            if self.stderr().is_some() {
                return Err(ExecError::StderrAlreadySet);
            }
            let combined = Capture::new();
            self.set_stdout(Some(combined.output()));
            self.set_stderr(Some(combined.output()));

            let result = self.run().await;
            let out = combined.take().await;
            match result {
                Ok(()) => Ok(out),
                Err(err) => Err(attach_captured(err, out, Vec::new())),
            }
        })
    }

    fn stdin_pipe(&mut self) -> Result<StdinPipe>;
    fn stdout_pipe(&mut self) -> Result<OutputPipe>;
    fn stderr_pipe(&mut self) -> Result<OutputPipe>;
}

fn attach_captured(err: ExecError, stdout: Vec<u8>, stderr: Vec<u8>) -> ExecError {
    match err {
        ExecError::Exit(exit) => ExecError::Exit(exit.with_stdout(stdout).with_stderr(stderr)),
        ExecError::Cancelled {
            reason,
            exit: Some(exit),
        } => ExecError::Cancelled {
            reason,
            exit: Some(exit.with_stdout(stdout).with_stderr(stderr)),
        },
        other => other,
    }
}
