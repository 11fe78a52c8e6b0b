// crates/test-utils/src/fake_factory.rs

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use procshim::{Command, Context, ExecError, Factory};

use crate::fake_command::{FakeCommand, FakeScript, Invocation, InvocationLog};

#[derive(Debug, Default)]
struct Registry {
    scripts: BTreeMap<String, FakeScript>,
    executables: BTreeMap<String, String>,
    next_pid: u32,
}

/// [`Factory`] handing out [`FakeCommand`]s.
///
/// A program is known once it has a script ([`FakeFactory::script`]) or a
/// resolved path ([`FakeFactory::register_executable`]). Unknown programs
/// fail at `start` with `NotFound`, like a missing binary. Known programs
/// without a script exit 0 silently.
#[derive(Debug, Clone, Default)]
pub struct FakeFactory {
    registry: Arc<Mutex<Registry>>,
    log: InvocationLog,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script what `name` does when started.
    pub fn script(&self, name: &str, script: FakeScript) -> &Self {
        self.registry
            .lock()
            .unwrap()
            .scripts
            .insert(name.to_string(), script);
        self
    }

    /// Make `look_path(name)` resolve to `path`.
    pub fn register_executable(&self, name: &str, path: &str) -> &Self {
        self.registry
            .lock()
            .unwrap()
            .executables
            .insert(name.to_string(), path.to_string());
        self
    }

    /// Every command started so far, in start order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.log.lock().unwrap().clone()
    }

    fn build(&self, name: &str, args: &[&str]) -> FakeCommand {
        let mut registry = self.registry.lock().unwrap();
        registry.next_pid += 1;
        let pid = 1000 + registry.next_pid;

        let resolved = registry.executables.get(name).cloned();
        let script = match registry.scripts.get(name) {
            Some(script) => script.clone(),
            None if resolved.is_some() => FakeScript::new(),
            None => FakeScript::new().not_found(),
        };
        drop(registry);

        let mut cmd = FakeCommand::new(name, args, script)
            .with_pid(pid)
            .with_log(Arc::clone(&self.log));
        if let Some(path) = resolved {
            cmd.set_path(&path);
        }
        cmd
    }
}

impl Factory for FakeFactory {
    fn command(&self, name: &str, args: &[&str]) -> Box<dyn Command> {
        Box::new(self.build(name, args))
    }

    fn command_context(&self, ctx: &Context, name: &str, args: &[&str]) -> Box<dyn Command> {
        Box::new(self.build(name, args).with_context(ctx.clone()))
    }

    fn look_path(&self, file: &str) -> procshim::Result<String> {
        let registry = self.registry.lock().unwrap();
        if let Some(path) = registry.executables.get(file) {
            return Ok(path.clone());
        }
        if file.contains('/') && registry.executables.values().any(|p| p == file) {
            return Ok(file.to_string());
        }
        Err(ExecError::NotFound {
            name: file.to_string(),
        })
    }
}
