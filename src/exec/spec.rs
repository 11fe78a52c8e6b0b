// src/exec/spec.rs

//! Launch configuration shared by every [`Command`](super::Command)
//! implementation, including the guard that freezes it once the process
//! has started.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{ExecError, Result};
use crate::exec::stdio::{Input, Output};

/// Panic payload raised when a command is mutated after it started.
///
/// This is a caller bug, so it is never returned as an `Err`. Tests can
/// recognise it with `catch_unwind` and `downcast_ref::<&str>()`.
pub const ALREADY_STARTED: &str = "procshim: process already started";

/// Platform process attributes applied in the child before exec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SysProcAttr {
    /// Start a new session (implies a new process group).
    pub setsid: bool,
    /// Join or create this process group; `Some(0)` uses the child's pid.
    /// Ignored when `setsid` is set.
    pub process_group: Option<i32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    path: String,
    args: Vec<String>,
    env: Option<Vec<String>>,
    dir: PathBuf,
    stdin: Option<Input>,
    stdout: Option<Output>,
    stderr: Option<Output>,
    extra_files: Vec<Arc<File>>,
    sys_proc_attr: Option<SysProcAttr>,
    started: bool,
}

impl CommandSpec {
    /// `args[0]` mirrors `name`.
    pub fn new(name: &str, args: &[&str]) -> Self {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(name.to_string());
        argv.extend(args.iter().map(|a| a.to_string()));
        Self {
            path: name.to_string(),
            args: argv,
            ..Self::default()
        }
    }

    #[track_caller]
    fn ensure_not_started(&self) {
        if self.started {
            std::panic::panic_any(ALREADY_STARTED);
        }
    }

    /// Freeze the configuration. Called by implementations once the process
    /// has been spawned.
    pub fn freeze(&mut self) {
        self.started = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    #[track_caller]
    pub fn set_path(&mut self, path: &str) {
        self.ensure_not_started();
        self.path = path.to_string();
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    #[track_caller]
    pub fn set_args(&mut self, args: Vec<String>) {
        self.ensure_not_started();
        self.args = args;
    }

    #[track_caller]
    pub fn append_args(&mut self, args: &[&str]) {
        self.ensure_not_started();
        self.args.extend(args.iter().map(|a| a.to_string()));
    }

    /// `None` means the child inherits the caller's environment.
    pub fn env(&self) -> Option<&[String]> {
        self.env.as_deref()
    }

    #[track_caller]
    pub fn set_env(&mut self, env: Option<Vec<String>>) {
        self.ensure_not_started();
        self.env = env;
    }

    #[track_caller]
    pub fn append_env(&mut self, env: &[&str]) {
        self.ensure_not_started();
        self.env
            .get_or_insert_with(Vec::new)
            .extend(env.iter().map(|e| e.to_string()));
    }

    /// Empty means the child runs in the caller's working directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[track_caller]
    pub fn set_dir(&mut self, dir: &Path) {
        self.ensure_not_started();
        self.dir = dir.to_path_buf();
    }

    pub fn stdin(&self) -> Option<&Input> {
        self.stdin.as_ref()
    }

    #[track_caller]
    pub fn set_stdin(&mut self, stdin: Option<Input>) {
        self.ensure_not_started();
        self.stdin = stdin;
    }

    pub fn stdout(&self) -> Option<&Output> {
        self.stdout.as_ref()
    }

    #[track_caller]
    pub fn set_stdout(&mut self, stdout: Option<Output>) {
        self.ensure_not_started();
        self.stdout = stdout;
    }

    pub fn stderr(&self) -> Option<&Output> {
        self.stderr.as_ref()
    }

    #[track_caller]
    pub fn set_stderr(&mut self, stderr: Option<Output>) {
        self.ensure_not_started();
        self.stderr = stderr;
    }

    pub fn extra_files(&self) -> &[Arc<File>] {
        &self.extra_files
    }

    #[track_caller]
    pub fn set_extra_files(&mut self, files: Vec<Arc<File>>) {
        self.ensure_not_started();
        self.extra_files = files;
    }

    #[track_caller]
    pub fn append_extra_files(&mut self, files: &[Arc<File>]) {
        self.ensure_not_started();
        self.extra_files.extend(files.iter().cloned());
    }

    pub fn sys_proc_attr(&self) -> Option<&SysProcAttr> {
        self.sys_proc_attr.as_ref()
    }

    #[track_caller]
    pub fn set_sys_proc_attr(&mut self, attr: Option<SysProcAttr>) {
        self.ensure_not_started();
        self.sys_proc_attr = attr;
    }

    /// Human-readable command line.
    ///
    /// When the executable could not be resolved the requested argv is shown
    /// as-is; otherwise the resolved path replaces `args[0]`.
    pub fn command_line(&self, path_resolved: bool) -> String {
        if !path_resolved {
            return self.args.join(" ");
        }
        let mut line = self.path.clone();
        for arg in self.args.iter().skip(1) {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// The explicit environment as ordered `(key, value)` pairs.
    ///
    /// Later duplicates of a key replace earlier ones in place. `None` when
    /// the environment is inherited.
    pub fn env_pairs(&self) -> Result<Option<Vec<(String, String)>>> {
        let Some(env) = self.env.as_ref() else {
            return Ok(None);
        };
        let mut pairs: Vec<(String, String)> = Vec::with_capacity(env.len());
        for entry in env {
            let (key, value) = split_env_entry(entry)?;
            match pairs.iter_mut().find(|(k, _)| k == key) {
                Some(existing) => existing.1 = value.to_string(),
                None => pairs.push((key.to_string(), value.to_string())),
            }
        }
        Ok(Some(pairs))
    }
}

/// Split `KEY=value` at the first `=`.
pub fn split_env_entry(entry: &str) -> Result<(&str, &str)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(ExecError::InvalidEnv(entry.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn new_mirrors_name_into_args() {
        let spec = CommandSpec::new("echo", &["a", "b"]);
        assert_eq!(spec.path(), "echo");
        assert_eq!(spec.args(), ["echo", "a", "b"]);
        assert!(spec.env().is_none());
        assert_eq!(spec.dir(), Path::new(""));
        assert!(spec.stdin().is_none());
        assert!(spec.extra_files().is_empty());
        assert!(spec.sys_proc_attr().is_none());
    }

    #[test]
    fn frozen_spec_rejects_mutation_without_changing_it() {
        let mut spec = CommandSpec::new("sleep", &["5"]);
        spec.freeze();

        let payload = catch_unwind(AssertUnwindSafe(|| spec.set_path("other"))).unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&ALREADY_STARTED));
        assert!(catch_unwind(AssertUnwindSafe(|| spec.append_env(&["A=b"]))).is_err());

        assert_eq!(spec.path(), "sleep");
        assert!(spec.env().is_none());
    }

    #[test]
    fn command_line_uses_resolved_path() {
        let mut spec = CommandSpec::new("echo", &["hi", "there"]);
        spec.set_path("/bin/echo");
        assert_eq!(spec.command_line(true), "/bin/echo hi there");
        assert_eq!(spec.command_line(false), "echo hi there");
    }

    #[test]
    fn env_pairs_dedupe_keeps_last_value() {
        let mut spec = CommandSpec::new("env", &[]);
        spec.append_env(&["A=1", "B=2", "A=3=x"]);
        let pairs = spec.env_pairs().unwrap().unwrap();
        assert_eq!(
            pairs,
            vec![("A".to_string(), "3=x".to_string()), ("B".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn env_pairs_reject_entries_without_key() {
        let mut spec = CommandSpec::new("env", &[]);
        spec.set_env(Some(vec!["novalue".into()]));
        assert!(matches!(spec.env_pairs(), Err(ExecError::InvalidEnv(e)) if e == "novalue"));

        spec.set_env(Some(vec!["=x".into()]));
        assert!(spec.env_pairs().is_err());
    }
}
