// src/os/spawn.rs

//! Translate a [`CommandSpec`] into a `std::process::Command` ready to spawn.
//!
//! Stdio that cannot be handed to the child as a descriptor (readers and
//! writers) is routed through an OS pipe plus a pump task; [`Prepared`]
//! carries the parent ends so the caller can start those pumps after the
//! spawn succeeded.

// `pre_exec` hooks and the descriptor shuffling inside them.
#![allow(unsafe_code)]

use std::fs::File;
use std::io::{self, PipeReader, PipeWriter};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{self, Stdio};

use tokio::net::unix::pipe;

use crate::errors::Result;
use crate::exec::{CommandSpec, Input, Output, SharedReader, SharedWriter, SysProcAttr};
use crate::os::pipes::{child_output_pipe, child_stdin_pipe};

/// Child ends of pipes handed out by `stdin_pipe`/`stdout_pipe`/`stderr_pipe`
/// before the process started.
#[derive(Debug, Default)]
pub(crate) struct PendingPipes {
    pub stdin: Option<PipeReader>,
    pub stdout: Option<PipeWriter>,
    pub stderr: Option<PipeWriter>,
}

pub(crate) struct Prepared {
    pub command: process::Command,
    pub stdin_pump: Option<(SharedReader, pipe::Sender)>,
    pub output_pumps: Vec<(pipe::Receiver, SharedWriter)>,
    /// Placeholders that must stay open until `spawn` returns.
    pub reserved_fds: Vec<OwnedFd>,
}

pub(crate) fn prepare(spec: &CommandSpec, pending: &mut PendingPipes) -> Result<Prepared> {
    let mut command = process::Command::new(spec.path());
    match spec.args().split_first() {
        Some((arg0, rest)) => {
            command.arg0(arg0).args(rest);
        }
        None => {
            command.arg0(spec.path());
        }
    }

    if let Some(pairs) = spec.env_pairs()? {
        command.env_clear().envs(pairs);
    }
    if !spec.dir().as_os_str().is_empty() {
        command.current_dir(spec.dir());
    }

    let mut stdin_pump = None;
    let stdin = match spec.stdin() {
        None => Stdio::null(),
        Some(Input::Inherit) => Stdio::inherit(),
        Some(Input::File(file)) => Stdio::from(file.try_clone()?),
        Some(Input::Reader(reader)) => {
            let (child_end, sender) = child_stdin_pipe()?;
            stdin_pump = Some((reader.clone(), sender));
            Stdio::from(child_end)
        }
        Some(Input::Pipe) => Stdio::from(take_pending(&mut pending.stdin, "stdin")?),
    };
    command.stdin(stdin);

    let mut output_pumps = Vec::new();
    let shared_sink = match (spec.stdout(), spec.stderr()) {
        (Some(out @ Output::Writer(_)), Some(err)) => out.same(err),
        _ => false,
    };

    let mut stdout_child_end = None;
    let stdout = match spec.stdout() {
        Some(Output::Writer(writer)) => {
            let (receiver, child_end) = child_output_pipe()?;
            output_pumps.push((receiver, writer.clone()));
            if shared_sink {
                stdout_child_end = Some(child_end.try_clone()?);
            }
            Stdio::from(child_end)
        }
        other => output_stdio(other, &mut pending.stdout, "stdout")?,
    };
    command.stdout(stdout);

    let stderr = match (spec.stderr(), stdout_child_end) {
        (Some(Output::Writer(_)), Some(shared)) => Stdio::from(shared),
        (Some(Output::Writer(writer)), None) => {
            let (receiver, child_end) = child_output_pipe()?;
            output_pumps.push((receiver, writer.clone()));
            Stdio::from(child_end)
        }
        (other, _) => output_stdio(other, &mut pending.stderr, "stderr")?,
    };
    command.stderr(stderr);

    if let Some(attr) = spec.sys_proc_attr() {
        apply_sys_proc_attr(&mut command, attr);
    }

    let extra: Vec<RawFd> = spec.extra_files().iter().map(|f| f.as_raw_fd()).collect();
    let mut reserved_fds = Vec::new();
    if !extra.is_empty() {
        reserved_fds = reserve_fds_below(3 + extra.len() as RawFd)?;
        install_extra_files(&mut command, extra);
    }

    Ok(Prepared {
        command,
        stdin_pump,
        output_pumps,
        reserved_fds,
    })
}

fn output_stdio(
    output: Option<&Output>,
    pending: &mut Option<PipeWriter>,
    stream: &str,
) -> Result<Stdio> {
    Ok(match output {
        None => Stdio::null(),
        Some(Output::Inherit) => Stdio::inherit(),
        Some(Output::File(file)) => Stdio::from(file.try_clone()?),
        Some(Output::Pipe) => Stdio::from(take_pending(pending, stream)?),
        // Writers are routed through pumps by the caller.
        Some(Output::Writer(_)) => Stdio::null(),
    })
}

fn take_pending<T>(slot: &mut Option<T>, stream: &str) -> io::Result<T> {
    slot.take()
        .ok_or_else(|| io::Error::other(format!("{stream} pipe was already consumed")))
}

fn apply_sys_proc_attr(command: &mut process::Command, attr: &SysProcAttr) {
    if let Some(uid) = attr.uid {
        command.uid(uid);
    }
    if let Some(gid) = attr.gid {
        command.gid(gid);
    }
    if attr.setsid {
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid()
                    .map(drop)
                    .map_err(io::Error::from)
            });
        }
    } else if let Some(pgid) = attr.process_group {
        command.process_group(pgid);
    }
}

/// Occupy every free descriptor below `end`.
///
/// `spawn` reports exec failures through a close-on-exec pipe it opens at the
/// lowest free descriptors. Holding the extra-file range keeps that pipe above
/// it, so the `dup2` calls in the child cannot overwrite it.
fn reserve_fds_below(end: RawFd) -> io::Result<Vec<OwnedFd>> {
    let mut held = Vec::new();
    loop {
        let fd = OwnedFd::from(File::open("/dev/null")?);
        if fd.as_raw_fd() >= end {
            return Ok(held);
        }
        held.push(fd);
    }
}

/// Map `fds[i]` to descriptor `3 + i` in the child.
///
/// Every source is first duplicated above the target range so a source that
/// already sits at some `3 + j` cannot be clobbered before it is placed.
fn install_extra_files(command: &mut process::Command, fds: Vec<RawFd>) {
    let mut scratch: Vec<RawFd> = vec![-1; fds.len()];
    let floor = 3 + fds.len() as RawFd;
    // SAFETY: the hook only calls fcntl and dup2, both async-signal-safe, and
    // writes into a buffer allocated before fork.
    unsafe {
        command.pre_exec(move || {
            for (slot, &fd) in scratch.iter_mut().zip(&fds) {
                let dup = libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, floor);
                if dup < 0 {
                    return Err(io::Error::last_os_error());
                }
                *slot = dup;
            }
            for (i, &fd) in scratch.iter().enumerate() {
                // dup2 leaves the target without FD_CLOEXEC.
                if libc::dup2(fd, 3 + i as RawFd) < 0 {
                    return Err(io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}
