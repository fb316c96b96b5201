//! Shared sessions and SSH masters for one site configuration.

use crate::{Backend, BackendKind};
use scir_core::{JobTemplate, SchedulerConfig, Session};
use scir_ssh::{MasterRegistry, SshConfig};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;

/// A session callers lock for each sequence of operations.
pub type SharedSession = Arc<Mutex<Session<Backend>>>;

#[derive(Debug)]
pub struct SchedulerClient {
    config: SchedulerConfig,
    sessions: std::sync::Mutex<HashMap<BackendKind, SharedSession>>,
    masters: Mutex<MasterRegistry>,
}

impl SchedulerClient {
    pub fn new(config: SchedulerConfig, ssh: SshConfig) -> Self {
        Self {
            config,
            sessions: std::sync::Mutex::new(HashMap::new()),
            masters: Mutex::new(MasterRegistry::new(ssh)),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The session for `kind`, created on first use. Every caller asking for
    /// the same kind shares one status cache.
    pub fn session(&self, kind: BackendKind) -> SharedSession {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.entry(kind).or_insert_with(|| {
            tracing::debug!(backend = %kind, "creating session");
            Arc::new(Mutex::new(Session::new(
                Backend::new(kind, self.config.clone()),
                self.config.refresh_delay(),
            )))
        });
        Arc::clone(session)
    }

    /// A template for `script` with the site defaults applied.
    pub fn job_template(&self, script: impl Into<String>) -> JobTemplate {
        JobTemplate::new(script).with_defaults(&self.config)
    }

    /// The SSH masters of this process.
    pub fn masters(&self) -> &Mutex<MasterRegistry> {
        &self.masters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use scir_core::JobState;
    use scir_ssh::MasterKey;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn client_in(dir: &tempfile::TempDir) -> SchedulerClient {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let config = SchedulerConfig {
            bin_dir: Some(root.clone()),
            user: "alice".to_string(),
            default_queue: Some("short".to_string()),
            ..Default::default()
        };
        let ssh = SshConfig {
            socket_dir: root.join("sockets"),
            fallback_socket_dir: root.clone(),
            pid_dir: root.join("pids"),
            ..Default::default()
        };
        SchedulerClient::new(config, ssh)
    }

    #[test]
    fn test_one_session_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(&dir);
        let a = client.session(BackendKind::Slurm);
        let b = client.session(BackendKind::Slurm);
        let c = client.session(BackendKind::Pbs);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_job_template_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(&dir);
        let template = client.job_template("/w/job.sh");
        assert_eq!(template.script(), "/w/job.sh");
        assert_eq!(template.queue_name(), Some("short"));
    }

    #[tokio::test]
    async fn test_shared_cache_across_callers() {
        let dir = tempfile::tempdir().unwrap();
        let squeue = dir.path().join("squeue");
        std::fs::write(
            &squeue,
            format!(
                "#!/bin/bash\necho x >> '{}'\necho '101 R'\n",
                dir.path().join("calls.log").display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&squeue, std::fs::Permissions::from_mode(0o755)).unwrap();

        let client = client_in(&dir);
        for _ in 0..3 {
            let session = client.session(BackendKind::Slurm);
            let mut session = session.lock().await;
            assert_eq!(session.job_ps("101", None).await.unwrap(), JobState::Running);
            assert_eq!(session.refresh_delay(), Duration::from_secs(30));
        }
        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        assert_eq!(calls.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_masters() {
        let dir = tempfile::tempdir().unwrap();
        let client = client_in(&dir);
        let key = MasterKey::new("alice", "hpc.example.org", 22).unwrap();

        let mut masters = client.masters().lock().await;
        masters.find_or_create(key.clone(), true).unwrap();
        assert!(masters.create(key, true).is_err());
        assert_eq!(masters.all_keys(), vec!["alice@hpc.example.org:22"]);
    }
}
