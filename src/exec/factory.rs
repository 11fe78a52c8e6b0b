// src/exec/factory.rs

use crate::context::Context;
use crate::errors::Result;
use crate::exec::command::Command;

/// Builds commands and resolves executables.
///
/// Code that launches processes should take a `&dyn Factory` (or a generic
/// `F: Factory`) so tests can hand it a fake.
pub trait Factory: Send + Sync {
    /// An unstarted command running `name` with `args`.
    fn command(&self, name: &str, args: &[&str]) -> Box<dyn Command>;

    /// Like [`Factory::command`], but the process is killed if `ctx` ends
    /// before it exits.
    fn command_context(&self, ctx: &Context, name: &str, args: &[&str]) -> Box<dyn Command>;

    /// Resolve `file` to an executable path.
    fn look_path(&self, file: &str) -> Result<String>;
}
