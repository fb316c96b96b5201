use camino::Utf8PathBuf;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SshError {
    #[error("invalid {field} '{value}'")]
    InvalidKey { field: &'static str, value: String },

    #[error("invalid port {0}: must be between 1 and 65534")]
    InvalidPort(u32),

    #[error("invalid tunnel '{spec}': {reason}")]
    InvalidTunnel { spec: String, reason: String },

    #[error("a {direction} tunnel already accepts on {endpoint}")]
    DuplicateTunnel {
        direction: &'static str,
        endpoint: String,
    },

    #[error("an SSH master for {0} is already registered")]
    AlreadyRegistered(String),

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("control socket path {path} is not shorter than {max} bytes")]
    SocketPathTooLong { path: Utf8PathBuf, max: usize },

    #[error("failed to launch ssh: {0}")]
    Spawn(#[source] std::io::Error),
}

impl SshError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
