// src/exec/mod.rs

//! The process-execution contract.
//!
//! - [`command`] holds the [`Command`] trait (configuration, start/wait,
//!   captured output, streaming pipes).
//! - [`process`] holds [`Process`] (signal, kill, release, wait) and
//!   [`ProcessState`] (exit inspection).
//! - [`factory`] holds [`Factory`], the entry point calling code depends on.
//! - [`spec`] is the launch configuration every implementation shares,
//!   including the already-started guard.
//! - [`stdio`] describes stdin sources and stdout/stderr sinks.
//!
//! The OS-backed implementation lives in [`crate::os`]; fakes for tests live
//! in the `procshim-test-utils` crate.

use std::future::Future;
use std::pin::Pin;

pub mod command;
pub mod factory;
pub mod process;
pub mod spec;
pub mod stdio;

pub use command::Command;
pub use factory::Factory;
pub use process::{Process, ProcessState, Signal};
pub use spec::{ALREADY_STARTED, CommandSpec, SysProcAttr, split_env_entry};
pub use stdio::{Capture, Input, Output, OutputPipe, SharedReader, SharedWriter, StdinPipe};

/// Future returned by the asynchronous trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
