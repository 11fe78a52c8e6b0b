mod common;
use crate::common::{assert_every_setter_refused, init_tracing, sh, with_timeout};

use std::error::Error;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use procshim::{
    Capture, ExecError, Factory, Input, OsFactory, Output, ProcessState, StatusError, SysProcAttr,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn setters_round_trip_before_start() -> TestResult {
    let mut cmd = OsFactory::new().command("true", &[]);

    cmd.set_path("/bin/true");
    assert_eq!(cmd.path(), "/bin/true");

    cmd.set_args(vec!["true".into(), "-x".into()]);
    cmd.append_args(&["-y"]);
    assert_eq!(cmd.args(), ["true", "-x", "-y"]);

    cmd.set_env(Some(vec!["A=1".into()]));
    cmd.append_env(&["B=2"]);
    assert_eq!(cmd.env(), Some(&["A=1".to_string(), "B=2".to_string()][..]));

    cmd.set_dir(Path::new("/tmp"));
    assert_eq!(cmd.dir(), Path::new("/tmp"));

    let file = Arc::new(tempfile::tempfile()?);
    cmd.set_stdin(Some(Input::File(Arc::clone(&file))));
    match cmd.stdin() {
        Some(Input::File(got)) => assert!(Arc::ptr_eq(got, &file)),
        other => panic!("unexpected stdin {other:?}"),
    }

    let capture = Capture::new();
    cmd.set_stdout(Some(capture.output()));
    assert!(cmd.stdout().unwrap().same(&capture.output()));
    cmd.set_stderr(Some(Output::Inherit));
    assert!(cmd.stderr().unwrap().same(&Output::Inherit));

    cmd.set_extra_files(vec![Arc::clone(&file)]);
    cmd.append_extra_files(&[Arc::clone(&file)]);
    assert_eq!(cmd.extra_files().len(), 2);
    assert!(cmd.extra_files().iter().all(|f| Arc::ptr_eq(f, &file)));

    let attr = SysProcAttr {
        setsid: true,
        ..SysProcAttr::default()
    };
    cmd.set_sys_proc_attr(Some(attr.clone()));
    assert_eq!(cmd.sys_proc_attr(), Some(&attr));
    Ok(())
}

#[tokio::test]
async fn mutation_after_start_panics_without_mutating() -> TestResult {
    init_tracing();
    let mut cmd = sh("exit 0");
    cmd.start()?;

    assert_every_setter_refused(cmd.as_mut());

    assert!(cmd.path().ends_with("sh"));
    assert_eq!(cmd.args(), ["sh", "-c", "exit 0"]);
    assert!(cmd.env().is_none());
    assert!(cmd.dir().as_os_str().is_empty());

    with_timeout(cmd.wait()).await?;
    Ok(())
}

#[tokio::test]
async fn output_returns_stdout_only() -> TestResult {
    let mut cmd = sh("printf X; printf Y >&2");
    let out = with_timeout(cmd.output()).await?;
    assert_eq!(out, b"X");

    let state = cmd.process_state().expect("state after output");
    assert!(state.success());
    assert_eq!(state.exit_code(), 0);
    Ok(())
}

#[tokio::test]
async fn combined_output_keeps_write_order() -> TestResult {
    let mut cmd = sh("printf a; printf b >&2; printf c; printf d >&2");
    let out = with_timeout(cmd.combined_output()).await?;
    assert_eq!(out, b"abcd");
    assert!(cmd.process_state().unwrap().success());
    Ok(())
}

#[tokio::test]
async fn failed_run_is_an_exit_error_wrapping_the_status() -> TestResult {
    let mut cmd = sh("printf boom >&2; exit 3");
    let err = with_timeout(cmd.run()).await.unwrap_err();

    let exit = err.exit_error().expect("exit error");
    assert_eq!(exit.exit_code(), 3);
    assert!(!exit.success());
    assert!(exit.stderr().is_empty());
    assert_eq!(err.to_string(), "exit status 3");

    let status = err
        .source()
        .and_then(|s| s.downcast_ref::<StatusError>())
        .expect("status error underneath");
    assert_eq!(status.process_state().exit_code(), 3);
    assert_eq!(cmd.process_state().unwrap().exit_code(), 3);
    Ok(())
}

#[tokio::test]
async fn failed_output_carries_stderr_and_stdout() -> TestResult {
    let mut cmd = sh("printf partial; printf 'bad input\\n' >&2; exit 7");
    let err = with_timeout(cmd.output()).await.unwrap_err();

    let exit = match err {
        ExecError::Exit(exit) => exit,
        other => panic!("expected an exit error, got {other:?}"),
    };
    assert_eq!(exit.exit_code(), 7);
    assert_eq!(exit.stderr(), b"bad input\n");
    assert_eq!(exit.stdout(), b"partial");
    Ok(())
}

#[tokio::test]
async fn output_leaves_configured_stderr_alone() -> TestResult {
    let stderr = Capture::new();
    let mut cmd = sh("printf oops >&2; exit 1");
    cmd.set_stderr(Some(stderr.output()));

    let err = with_timeout(cmd.output()).await.unwrap_err();
    assert!(err.exit_error().unwrap().stderr().is_empty());
    assert_eq!(stderr.contents().await, b"oops");
    Ok(())
}

#[tokio::test]
async fn missing_executable_is_not_an_exit_error() {
    let mut cmd = OsFactory::new().command("procshim-no-such-program", &["arg"]);
    assert_eq!(cmd.to_string(), "procshim-no-such-program arg");

    let err = cmd.run().await.unwrap_err();
    assert!(matches!(err, ExecError::NotFound { ref name } if name == "procshim-no-such-program"));
    assert!(err.exit_error().is_none());
    assert!(cmd.process().is_none());
    assert!(cmd.process_state().is_none());

    // The lookup failure is reported again on the next attempt.
    assert!(matches!(cmd.start(), Err(ExecError::NotFound { .. })));
}

#[tokio::test]
async fn spawn_failure_is_not_an_exit_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let mut cmd = OsFactory::new().command("sh", &[]);
    cmd.set_path(dir.path().join("missing").to_str().unwrap());

    let err = cmd.start().unwrap_err();
    assert!(matches!(err, ExecError::Spawn { .. }), "got {err:?}");
    assert!(err.exit_error().is_none());
    Ok(())
}

#[tokio::test]
async fn process_handle_is_stable_after_start() -> TestResult {
    let mut cmd = sh("exit 0");
    assert!(cmd.process().is_none());

    cmd.start()?;
    let first = cmd.process().expect("process after start");
    let second = cmd.process().expect("process after start");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.pid() > 0);

    assert!(cmd.process_state().is_none());
    with_timeout(cmd.wait()).await?;

    let state = cmd.process_state().expect("state after wait");
    assert_eq!(state.pid(), first.pid());
    assert!(state.exited());
    assert!(state.sys().is_some());
    assert!(state.sys_usage().is_some());
    Ok(())
}

#[tokio::test]
async fn lifecycle_misuse_is_reported() -> TestResult {
    let mut cmd = sh("exit 0");
    assert!(matches!(cmd.wait().await, Err(ExecError::NotStarted)));

    cmd.start()?;
    assert!(matches!(cmd.start(), Err(ExecError::AlreadyStarted)));
    assert!(matches!(cmd.stdout_pipe(), Err(ExecError::AlreadyStarted)));

    with_timeout(cmd.wait()).await?;
    assert!(matches!(cmd.wait().await, Err(ExecError::WaitAlreadyCalled)));
    assert!(matches!(cmd.output().await, Err(ExecError::AlreadyStarted)));
    Ok(())
}

#[tokio::test]
async fn configured_streams_block_capture_and_pipes() {
    let mut cmd = sh("true");
    cmd.set_stdout(Some(Output::Inherit));
    assert!(matches!(cmd.output().await, Err(ExecError::StdoutAlreadySet)));
    assert!(matches!(cmd.stdout_pipe(), Err(ExecError::StdoutAlreadySet)));

    let mut cmd = sh("true");
    cmd.set_stderr(Some(Output::Inherit));
    assert!(matches!(cmd.combined_output().await, Err(ExecError::StderrAlreadySet)));
    assert!(matches!(cmd.stderr_pipe(), Err(ExecError::StderrAlreadySet)));

    let mut cmd = sh("true");
    cmd.set_stdin(Some(Input::Inherit));
    assert!(matches!(cmd.stdin_pipe(), Err(ExecError::StdinAlreadySet)));
}

#[tokio::test]
async fn pipes_stream_through_cat() -> TestResult {
    let mut cmd = OsFactory::new().command("cat", &[]);
    let mut stdin = cmd.stdin_pipe()?;
    let mut stdout = cmd.stdout_pipe()?;
    assert!(matches!(cmd.stdin(), Some(Input::Pipe)));
    cmd.start()?;

    stdin.write_all(b"hello through a pipe").await?;
    drop(stdin);

    let mut read = Vec::new();
    with_timeout(stdout.read_to_end(&mut read)).await?;
    assert_eq!(read, b"hello through a pipe");

    with_timeout(cmd.wait()).await?;
    Ok(())
}

#[tokio::test]
async fn reader_feeds_stdin() -> TestResult {
    let mut cmd = OsFactory::new().command("cat", &[]);
    cmd.set_stdin(Some(Input::reader(&b"from a reader"[..])));
    assert_eq!(with_timeout(cmd.output()).await?, b"from a reader");
    Ok(())
}

#[tokio::test]
async fn child_that_ignores_stdin_still_finishes() -> TestResult {
    let (_keep_open, reader) = tokio::io::duplex(16);
    let mut cmd = sh("printf done");
    cmd.set_stdin(Some(Input::reader(reader)));
    assert_eq!(with_timeout(cmd.output()).await?, b"done");
    Ok(())
}

#[tokio::test]
async fn env_and_dir_are_applied() -> TestResult {
    let dir = tempfile::tempdir()?;
    let mut cmd = sh(r#"printf '%s|%s|%s' "$GREETING" "$(pwd -P)" "${HOME-unset}""#);
    cmd.set_env(Some(vec!["GREETING=hi".into(), "GREETING=hello".into()]));
    cmd.set_dir(dir.path());

    let out = String::from_utf8(with_timeout(cmd.output()).await?)?;
    let expected = format!("hello|{}|unset", std::fs::canonicalize(dir.path())?.display());
    assert_eq!(out, expected);
    Ok(())
}

#[tokio::test]
async fn invalid_env_entry_fails_start() {
    let mut cmd = sh("true");
    cmd.set_env(Some(vec!["NOEQUALS".into()]));
    assert!(matches!(cmd.start(), Err(ExecError::InvalidEnv(e)) if e == "NOEQUALS"));
    assert!(cmd.process().is_none());
}

#[tokio::test]
async fn files_are_handed_to_the_child() -> TestResult {
    let mut out_file = tempfile::tempfile()?;
    let mut extra = tempfile::tempfile()?;
    extra.write_all(b"via fd 3")?;
    extra.seek(SeekFrom::Start(0))?;

    let mut cmd = sh("cat <&3; printf ' and stdout'");
    cmd.set_extra_files(vec![Arc::new(extra)]);
    cmd.set_stdout(Some(Output::File(Arc::new(out_file.try_clone()?))));
    with_timeout(cmd.run()).await?;

    let mut written = String::new();
    out_file.seek(SeekFrom::Start(0))?;
    out_file.read_to_string(&mut written)?;
    assert_eq!(written, "via fd 3 and stdout");
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn new_session_is_applied() -> TestResult {
    // Field 6 of /proc/<pid>/stat is the session id.
    let mut cmd = sh(r#"read -r _ _ _ _ _ sid _ < /proc/$$/stat; echo "$sid $$""#);
    cmd.set_sys_proc_attr(Some(SysProcAttr {
        setsid: true,
        ..SysProcAttr::default()
    }));
    let out = String::from_utf8(with_timeout(cmd.output()).await?)?;
    let mut lines = out.split_whitespace();
    let sid = lines.next().unwrap_or_default();
    let pid = lines.next().unwrap_or_default();
    assert_eq!(sid, pid, "child should lead its own session");
    Ok(())
}

#[test]
fn display_uses_resolved_path() {
    let cmd = OsFactory::new().command("sh", &["-c", "true"]);
    let line = cmd.to_string();
    assert!(line.starts_with('/'), "{line}");
    assert!(line.ends_with("sh -c true"), "{line}");
}
