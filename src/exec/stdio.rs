// src/exec/stdio.rs

//! Standard stream sources and sinks for a command.

use std::fmt;
use std::fs::File;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

/// A reader shared between the caller and the stdin pump.
pub type SharedReader = Arc<Mutex<dyn AsyncRead + Send + Unpin>>;

/// A writer shared between the caller and the stdout/stderr pumps.
pub type SharedWriter = Arc<Mutex<dyn AsyncWrite + Send + Unpin>>;

/// Caller end of a pipe feeding the child's stdin. Drop it to signal EOF.
pub type StdinPipe = Box<dyn AsyncWrite + Send + Unpin>;

/// Caller end of a pipe carrying the child's stdout or stderr.
pub type OutputPipe = Box<dyn AsyncRead + Send + Unpin>;

/// Where the child reads stdin from. An unset stdin reads the null device.
#[derive(Clone)]
pub enum Input {
    /// Share the caller's stdin.
    Inherit,
    /// Hand the file to the child directly.
    File(Arc<File>),
    /// Copy from the reader into a pipe while the child runs.
    Reader(SharedReader),
    /// Fed through the handle returned by `stdin_pipe`.
    Pipe,
}

impl Input {
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Input::Reader(Arc::new(Mutex::new(reader)))
    }

    pub fn file(file: File) -> Self {
        Input::File(Arc::new(file))
    }

    /// Same source, by identity for shared values.
    pub fn same(&self, other: &Input) -> bool {
        match (self, other) {
            (Input::Inherit, Input::Inherit) | (Input::Pipe, Input::Pipe) => true,
            (Input::File(a), Input::File(b)) => Arc::ptr_eq(a, b),
            (Input::Reader(a), Input::Reader(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Inherit => f.write_str("Inherit"),
            Input::File(file) => f.debug_tuple("File").field(file).finish(),
            Input::Reader(_) => f.write_str("Reader(..)"),
            Input::Pipe => f.write_str("Pipe"),
        }
    }
}

/// Where the child writes stdout or stderr. An unset sink discards output.
#[derive(Clone)]
pub enum Output {
    Inherit,
    File(Arc<File>),
    /// Copy from a pipe into the writer while the child runs. When stdout and
    /// stderr name the same writer they share one pipe, so the bytes keep the
    /// order the child wrote them in.
    Writer(SharedWriter),
    /// Read through the handle returned by `stdout_pipe`/`stderr_pipe`.
    Pipe,
}

impl Output {
    pub fn writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Output::Writer(Arc::new(Mutex::new(writer)))
    }

    pub fn file(file: File) -> Self {
        Output::File(Arc::new(file))
    }

    pub fn same(&self, other: &Output) -> bool {
        match (self, other) {
            (Output::Inherit, Output::Inherit) | (Output::Pipe, Output::Pipe) => true,
            (Output::File(a), Output::File(b)) => Arc::ptr_eq(a, b),
            (Output::Writer(a), Output::Writer(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Inherit => f.write_str("Inherit"),
            Output::File(file) => f.debug_tuple("File").field(file).finish(),
            Output::Writer(_) => f.write_str("Writer(..)"),
            Output::Pipe => f.write_str("Pipe"),
        }
    }
}

/// In-memory sink used by `output` and `combined_output`.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink writing into this capture.
    pub fn output(&self) -> Output {
        let writer: SharedWriter = self.buf.clone();
        Output::Writer(writer)
    }

    /// Take everything written so far.
    pub async fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buf.lock().await)
    }

    pub async fn contents(&self) -> Vec<u8> {
        self.buf.lock().await.clone()
    }
}
