// src/os/mod.rs

//! Production implementation of the execution traits on top of
//! `std::process`, `nix` and `libc`.

pub mod command;
pub mod factory;
pub mod lookpath;
mod pipes;
pub mod process;
mod spawn;
pub mod state;

pub use command::OsCommand;
pub use factory::OsFactory;
pub use lookpath::{look_path, look_path_in};
pub use process::OsProcess;
pub use state::OsProcessState;
