// src/lib.rs

//! Mockable process execution.
//!
//! Code that launches external programs depends on the [`Factory`],
//! [`Command`], [`Process`] and [`ProcessState`] traits. Production code
//! hands it an [`OsFactory`]; tests hand it the fakes from
//! `procshim-test-utils`.
//!
//! ```no_run
//! # async fn demo() -> procshim::Result<()> {
//! use procshim::{Factory, OsFactory};
//!
//! let factory = OsFactory::new();
//! let mut cmd = factory.command("echo", &["hello"]);
//! let stdout = cmd.output().await?;
//! assert_eq!(stdout, b"hello\n");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

#[cfg(not(unix))]
compile_error!("procshim only supports Unix targets");

pub mod cli;
pub mod config;
pub mod context;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod os;

use anyhow::Context as _;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::cli::{CaptureMode, CliArgs, CliCommand, RunArgs};
use crate::config::FactoryConfig;
use crate::config::loader::load_and_validate;

pub use crate::context::{CancelHandle, Context, ContextError};
pub use crate::errors::{ConfigError, ExecError, ExitError, Result, StatusError};
pub use crate::exec::{
    ALREADY_STARTED, BoxFuture, Capture, Command, CommandSpec, Factory, Input, Output, Process,
    ProcessState, Signal, SysProcAttr,
};
pub use crate::os::{OsCommand, OsFactory, OsProcess, OsProcessState};

/// High-level entry point used by `main.rs`. Returns the exit code for the
/// `procshim` process.
pub async fn run(args: CliArgs) -> anyhow::Result<i32> {
    let config = match &args.config {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FactoryConfig::default(),
    };
    let factory = OsFactory::with_config(config);

    match args.command {
        CliCommand::Run(run_args) => run_program(&factory, run_args).await,
        CliCommand::Which { names } => Ok(which(&factory, &names)),
    }
}

fn which(factory: &dyn Factory, names: &[String]) -> i32 {
    let mut code = 0;
    for name in names {
        match factory.look_path(name) {
            Ok(path) => println!("{path}"),
            Err(err) => {
                eprintln!("{err}");
                code = 1;
            }
        }
    }
    code
}

async fn run_program(factory: &dyn Factory, args: RunArgs) -> anyhow::Result<i32> {
    let (program, rest) = args
        .argv
        .split_first()
        .context("no program given after `--`")?;
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

    let root = Context::background();
    let (ctx, cancel) = match args.timeout {
        Some(timeout) => root.with_timeout(timeout),
        None => root.with_cancel(),
    };

    // Ctrl-C cancels the context, which kills the child.
    let ctrl_c = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received, cancelling");
        cancel.cancel();
    });

    let mut cmd = factory.command_context(&ctx, program, &rest);
    if let Some(dir) = &args.dir {
        cmd.set_dir(dir);
    }
    if !args.env.is_empty() {
        let mut env = match cmd.env() {
            Some(env) => env.to_vec(),
            None => inherited_env(),
        };
        env.extend(args.env.iter().cloned());
        cmd.set_env(Some(env));
    }
    debug!(command = %cmd, capture = ?args.capture, "running");

    let result = match args.capture {
        CaptureMode::None => {
            cmd.set_stdin(Some(Input::Inherit));
            cmd.set_stdout(Some(Output::Inherit));
            cmd.set_stderr(Some(Output::Inherit));
            cmd.run().await
        }
        CaptureMode::Stdout => {
            cmd.set_stderr(Some(Output::Inherit));
            emit(cmd.output().await).await?
        }
        CaptureMode::Combined => emit(cmd.combined_output().await).await?,
    };
    ctrl_c.abort();

    report(cmd.as_ref(), result)
}

fn inherited_env() -> Vec<String> {
    std::env::vars_os()
        .filter_map(|(key, value)| {
            let (key, value) = (key.into_string().ok()?, value.into_string().ok()?);
            Some(format!("{key}={value}"))
        })
        .collect()
}

/// Print captured bytes, including those attached to a failed run.
async fn emit(captured: Result<Vec<u8>>) -> anyhow::Result<Result<()>> {
    let (bytes, result) = match captured {
        Ok(bytes) => (bytes, Ok(())),
        Err(err) => {
            let bytes = err
                .exit_error()
                .map(|exit| exit.stdout().to_vec())
                .unwrap_or_default();
            (bytes, Err(err))
        }
    };
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&bytes).await?;
    stdout.flush().await?;
    Ok(result)
}

fn report(cmd: &dyn Command, result: Result<()>) -> anyhow::Result<i32> {
    if let Some(state) = cmd.process_state() {
        info!(
            pid = state.pid(),
            exit_code = state.exit_code(),
            user_time = ?state.user_time(),
            system_time = ?state.system_time(),
            "process finished"
        );
    }

    match result {
        Ok(()) => Ok(0),
        Err(ExecError::Exit(exit)) => Ok(exit_code_of(&exit)),
        Err(err @ ExecError::Cancelled { .. }) => {
            warn!(command = %cmd, error = %err, "run cancelled");
            Ok(1)
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!("running {cmd}"))),
    }
}

/// Shell convention: the exit code, or 128 + signal number.
fn exit_code_of(state: &dyn ProcessState) -> i32 {
    if state.exited() {
        return state.exit_code();
    }
    match state.signal() {
        Some(sig) => 128 + sig as i32,
        None => 1,
    }
}
