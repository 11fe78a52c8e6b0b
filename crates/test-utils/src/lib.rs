pub mod fake_command;
pub mod fake_factory;
pub mod fake_process;

pub use fake_command::{FakeCommand, FakeScript, Invocation, InvocationLog};
pub use fake_factory::FakeFactory;
pub use fake_process::{FakeProcess, FakeProcessState};

use std::sync::Once;

use anyhow::Context as _;
use procshim::Command;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Run `cmd` through `output` and decode stdout as UTF-8.
pub async fn output_string(cmd: &mut dyn Command) -> anyhow::Result<String> {
    let bytes = cmd.output().await.with_context(|| format!("running {cmd}"))?;
    String::from_utf8(bytes).context("stdout is not UTF-8")
}
