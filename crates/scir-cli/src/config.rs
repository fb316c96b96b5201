//! The optional JSON configuration file.

use camino::{Utf8Path, Utf8PathBuf};
use scir_client::BackendKind;
use scir_core::SchedulerConfig;
use scir_ssh::SshConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// `{ "backend": ..., "scheduler": {...}, "ssh": {...} }`, every key optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub backend: Option<BackendKind>,
    pub scheduler: SchedulerConfig,
    pub ssh: SshConfig,
}

impl FileConfig {
    pub fn from_json(path: &Utf8Path, json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `path`, or use the defaults when no file is given.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &json)
    }
}
