// src/os/factory.rs

use tracing::debug;

use crate::config::FactoryConfig;
use crate::context::Context;
use crate::errors::Result;
use crate::exec::{Command, Factory};
use crate::os::command::OsCommand;
use crate::os::lookpath::look_path_in;

/// [`Factory`] that launches real processes.
#[derive(Debug, Clone, Default)]
pub struct OsFactory {
    config: FactoryConfig,
}

impl OsFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FactoryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    fn build(&self, name: &str, args: &[&str]) -> OsCommand {
        let mut cmd = OsCommand::new(name, args);

        if !name.is_empty() && !name.contains('/') {
            match self.look_path(name) {
                Ok(path) => cmd.set_path(&path),
                Err(err) => {
                    debug!(name, error = %err, "lookup failed, deferring error to start");
                    cmd.set_lookup_error(err);
                }
            }
        }
        if let Some(env) = self.config.env() {
            cmd.set_env(Some(env.to_vec()));
        }
        if let Some(dir) = self.config.dir() {
            cmd.set_dir(dir);
        }
        cmd
    }
}

impl Factory for OsFactory {
    fn command(&self, name: &str, args: &[&str]) -> Box<dyn Command> {
        Box::new(self.build(name, args))
    }

    fn command_context(&self, ctx: &Context, name: &str, args: &[&str]) -> Box<dyn Command> {
        let mut cmd = self.build(name, args);
        cmd.bind_context(ctx.clone());
        Box::new(cmd)
    }

    fn look_path(&self, file: &str) -> Result<String> {
        look_path_in(file, self.config.search_path().map(|p| p.as_os_str()))
    }
}
