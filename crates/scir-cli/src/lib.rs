//! CLI arguments and configuration file for scir.

pub mod args;
pub mod config;

pub use args::{Args, Command, SshAction, SshArgs, SubmitArgs};
pub use config::{ConfigError, FileConfig};
