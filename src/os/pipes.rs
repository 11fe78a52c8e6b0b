// src/os/pipes.rs

use std::io::{self, PipeReader, PipeWriter};
use std::os::fd::OwnedFd;

use tokio::net::unix::pipe;

/// A pipe feeding the child's stdin: the child reads the blocking end, we
/// write the async end.
pub(crate) fn child_stdin_pipe() -> io::Result<(PipeReader, pipe::Sender)> {
    let (reader, writer) = io::pipe()?;
    let sender = pipe::Sender::from_owned_fd(OwnedFd::from(writer))?;
    Ok((reader, sender))
}

/// A pipe draining one of the child's output streams.
pub(crate) fn child_output_pipe() -> io::Result<(pipe::Receiver, PipeWriter)> {
    let (reader, writer) = io::pipe()?;
    let receiver = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
    Ok((receiver, writer))
}
