// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `procshim`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procshim",
    version,
    about = "Run and inspect external processes through the procshim factory.",
    long_about = None
)]
pub struct CliArgs {
    /// Factory config file (TOML). Without it the factory uses `$PATH` and
    /// the inherited environment.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCSHIM_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Run a program and exit with its status.
    Run(RunArgs),

    /// Resolve executable names the way the factory does.
    Which {
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Kill the program after this long (e.g. `500ms`, `5s`, `2m`).
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,

    #[arg(long, value_enum, default_value_t = CaptureMode::None)]
    pub capture: CaptureMode,

    /// Working directory for the program.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Extra `KEY=value` environment entries, added on top of the inherited
    /// (or configured) environment.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// The program followed by its arguments.
    #[arg(last = true, required = true, value_name = "PROGRAM")]
    pub argv: Vec<String>,
}

/// How `run` handles the child's output.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum CaptureMode {
    /// Stream stdout and stderr straight through.
    None,
    /// Capture stdout and print it once the program finished.
    Stdout,
    /// Capture stdout and stderr interleaved, print once finished.
    Combined,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Parse `<number><unit>` with unit `ms`, `s`, `m` or `h`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let secs = |mult: u64| {
        value
            .checked_mul(mult)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };
    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => secs(1),
        "m" => secs(60),
        "h" => secs(60 * 60),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_all_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1H"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn durations_reject_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration(&format!("{}h", u64::MAX)).is_err());
    }

    #[test]
    fn run_takes_the_program_after_double_dash() {
        let args = CliArgs::try_parse_from([
            "procshim", "run", "--timeout", "2s", "--env", "A=1", "--", "echo", "-n", "hi",
        ])
        .unwrap();
        match args.command {
            CliCommand::Run(run) => {
                assert_eq!(run.timeout, Some(Duration::from_secs(2)));
                assert_eq!(run.env, ["A=1"]);
                assert_eq!(run.argv, ["echo", "-n", "hi"]);
                assert_eq!(run.capture, CaptureMode::None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn which_requires_a_name() {
        assert!(CliArgs::try_parse_from(["procshim", "which"]).is_err());
    }
}
