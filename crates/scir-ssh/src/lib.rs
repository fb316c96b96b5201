//! Persistent SSH control connections.
//!
//! An [`SshMaster`] owns one `ssh -M` process per
//! `(user, host, port, category, uniq)` key. Tunnels ride on the master and
//! one-shot remote commands reuse its control socket. The
//! [`MasterRegistry`] guarantees a single master object per key.

pub mod config;
pub mod error;
pub mod key;
pub mod master;
pub mod paths;
pub mod registry;
pub mod tunnel;

pub use config::SshConfig;
pub use error::SshError;
pub use key::{JumpHost, MasterKey, parse_destination};
pub use master::{RemoteCommandOptions, SshMaster};
pub use registry::MasterRegistry;
pub use tunnel::{TunnelDirection, TunnelEndpoint, TunnelSpec};
