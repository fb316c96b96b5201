//! SSH master configuration.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where masters keep their sockets and pidfiles, and how they are supervised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// The `ssh` executable
    pub ssh_program: String,
    /// Preferred directory for control sockets
    pub socket_dir: Utf8PathBuf,
    /// Used when `socket_dir` is missing or yields a path that is too long
    pub fallback_socket_dir: Utf8PathBuf,
    /// Longest control socket path ssh accepts
    pub max_socket_path_len: usize,
    pub pid_dir: Utf8PathBuf,
    #[serde(rename = "is_alive_timeout")]
    pub is_alive_timeout_secs: u64,
    /// How long a new master has to create its control socket
    #[serde(rename = "spawn_wait")]
    pub spawn_wait_secs: u64,
    /// Delay between SIGHUP and SIGTERM when stopping a master
    #[serde(rename = "stop_grace")]
    pub stop_grace_secs: u64,
    /// `Key=Value` pairs passed with `-o` to every ssh invocation
    pub master_options: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("scir");
        let base = Utf8PathBuf::from_path_buf(base).unwrap_or_else(|_| Utf8PathBuf::from("/tmp/scir"));
        Self {
            ssh_program: "ssh".to_string(),
            socket_dir: base.join("sockets"),
            fallback_socket_dir: Utf8PathBuf::from("/tmp"),
            max_socket_path_len: 80,
            pid_dir: base.join("pids"),
            is_alive_timeout_secs: 60,
            spawn_wait_secs: 40,
            stop_grace_secs: 1,
            master_options: [
                "ConnectTimeout=10",
                "StrictHostKeyChecking=no",
                "ExitOnForwardFailure=yes",
                "IPQoS=throughput",
                "ServerAliveInterval=30",
                "ServerAliveCountMax=5",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

impl SshConfig {
    pub fn is_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.is_alive_timeout_secs)
    }

    pub fn spawn_wait(&self) -> Duration {
        Duration::from_secs(self.spawn_wait_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SshConfig::default();
        assert_eq!(config.max_socket_path_len, 80);
        assert_eq!(config.fallback_socket_dir, "/tmp");
        assert_eq!(config.is_alive_timeout(), Duration::from_secs(60));
        assert_eq!(config.spawn_wait(), Duration::from_secs(40));
        assert!(config.master_options.contains(&"ExitOnForwardFailure=yes".to_string()));
    }

    #[test]
    fn test_partial_json() {
        let config: SshConfig =
            serde_json::from_str(r#"{"socket_dir": "/var/run/scir", "is_alive_timeout": 5}"#).unwrap();
        assert_eq!(config.socket_dir, "/var/run/scir");
        assert_eq!(config.is_alive_timeout(), Duration::from_secs(5));
        assert_eq!(config.stop_grace(), Duration::from_secs(1));
        assert_eq!(config.master_options.len(), 6);
    }
}
