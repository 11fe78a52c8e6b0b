mod common;
use crate::common::{sh, with_timeout};

use std::error::Error;
use std::time::Duration;

use procshim::{
    CancelHandle, Context, ContextError, ExecError, Factory, OsFactory, Process, ProcessState,
    Signal,
};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn interrupted_process_reports_the_signal() -> TestResult {
    let mut cmd = OsFactory::new().command("sleep", &["5"]);
    cmd.start()?;
    let process = cmd.process().unwrap();
    process.signal(Signal::SIGINT)?;

    let err = with_timeout(cmd.wait()).await.unwrap_err();
    let exit = err.exit_error().expect("signalled exit is an exit error");
    assert!(!exit.success());
    assert!(!exit.exited());
    assert_eq!(exit.exit_code(), -1);
    assert_eq!(exit.signal(), Some(Signal::SIGINT));
    assert_eq!(err.to_string(), "signal: SIGINT");
    Ok(())
}

#[tokio::test]
async fn reaped_process_refuses_signals() -> TestResult {
    let mut cmd = OsFactory::new().command("sleep", &["5"]);
    cmd.start()?;
    let process = cmd.process().unwrap();
    process.kill()?;

    let err = with_timeout(cmd.wait()).await.unwrap_err();
    assert_eq!(err.exit_error().unwrap().signal(), Some(Signal::SIGKILL));

    assert!(matches!(process.kill(), Err(ExecError::ProcessFinished)));
    assert!(matches!(process.signal(Signal::SIGTERM), Err(ExecError::ProcessFinished)));
    assert!(matches!(process.wait().await, Err(ExecError::ProcessFinished)));
    Ok(())
}

#[tokio::test]
async fn process_wait_reaps_before_command_wait() -> TestResult {
    let mut cmd = sh("exit 4");
    cmd.start()?;
    let process = cmd.process().unwrap();

    let state = with_timeout(process.wait()).await?;
    assert_eq!(state.exit_code(), 4);
    assert_eq!(state.pid(), process.pid());

    // The command's own wait finds the process already reaped.
    assert!(matches!(cmd.wait().await, Err(ExecError::ProcessFinished)));
    Ok(())
}

#[tokio::test]
async fn released_process_cannot_be_used() -> TestResult {
    let mut cmd = sh("exit 0");
    cmd.start()?;
    let process = cmd.process().unwrap();
    process.release()?;

    assert!(matches!(process.kill(), Err(ExecError::ProcessReleased)));
    assert!(matches!(cmd.wait().await, Err(ExecError::ProcessReleased)));
    Ok(())
}

#[tokio::test]
async fn cpu_times_are_reported() -> TestResult {
    let mut cmd = sh("i=0; while [ $i -lt 2000 ]; do i=$((i+1)); done");
    with_timeout(cmd.run()).await?;
    let state = cmd.process_state().unwrap();
    assert!(state.pid() > 0);
    assert!(state.user_time() + state.system_time() < Duration::from_secs(5));
    Ok(())
}

async fn expect_cancelled(ctx: &Context, cancel: Option<&CancelHandle>) -> ExecError {
    let mut cmd = OsFactory::new().command_context(ctx, "sleep", &["5"]);
    cmd.start().expect("start");
    if let Some(cancel) = cancel {
        cancel.cancel();
    }
    let err = with_timeout(cmd.wait()).await.unwrap_err();
    assert!(cmd.process_state().is_some());
    err
}

#[tokio::test]
async fn deadline_kills_the_process() {
    let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(50));
    let err = expect_cancelled(&ctx, None).await;

    match err {
        ExecError::Cancelled { reason, exit } => {
            assert_eq!(reason, ContextError::DeadlineExceeded);
            assert_eq!(exit.unwrap().signal(), Some(Signal::SIGKILL));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_kills_the_process() {
    let (ctx, cancel) = Context::background().with_cancel();
    let err = expect_cancelled(&ctx, Some(&cancel)).await;
    assert!(matches!(
        err,
        ExecError::Cancelled {
            reason: ContextError::Canceled,
            exit: Some(_)
        }
    ));
}

#[tokio::test]
async fn kill_does_not_wait_for_descendants_holding_stdout() {
    let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(200));
    // The trailing `:` keeps sh from exec'ing sleep, so the orphaned sleep
    // keeps the stdout pipe open after sh is killed.
    let mut cmd =
        OsFactory::new().command_context(&ctx, "sh", &["-c", "echo started; sleep 6; :"]);

    let began = std::time::Instant::now();
    let err = with_timeout(cmd.output()).await.unwrap_err();
    assert!(began.elapsed() < Duration::from_secs(3), "took {:?}", began.elapsed());

    match err {
        ExecError::Cancelled {
            reason: ContextError::DeadlineExceeded,
            exit: Some(exit),
        } => {
            assert_eq!(exit.signal(), Some(Signal::SIGKILL));
            assert_eq!(exit.stdout(), b"started\n");
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_context_never_spawns() {
    let (ctx, cancel) = Context::background().with_cancel();
    cancel.cancel();

    let mut cmd = OsFactory::new().command_context(&ctx, "sleep", &["5"]);
    let err = cmd.run().await.unwrap_err();
    assert!(matches!(err, ExecError::Cancelled { exit: None, .. }));
    assert!(cmd.process().is_none());
}

#[tokio::test]
async fn context_outliving_the_process_changes_nothing() -> TestResult {
    let (ctx, cancel) = Context::background().with_cancel();
    let mut cmd = OsFactory::new().command_context(&ctx, "sh", &["-c", "printf ok"]);
    let out = with_timeout(cmd.output()).await?;
    cancel.cancel();
    assert_eq!(out, b"ok");
    Ok(())
}
