//! Cloud backends driven through their command-line clients.
//!
//! AWS EC2 and OpenStack boot one VM per job and report VM states; Google
//! Cloud Batch runs the job script as a batch task.

pub mod aws;
pub mod gcloud;
pub mod openstack;

pub use aws::AwsBackend;
pub use gcloud::GcloudBatchBackend;
pub use openstack::OpenStackBackend;

use scir_core::SchedulerError;
use scir_parsers::run_shell;

/// Delete a VM found in an error state while polling. Failures are only
/// logged; the next refresh will try again.
pub(crate) async fn terminate_broken_vm(backend: &'static str, command: &str, id: &str) {
    tracing::warn!(backend, id, "terminating VM in error state");
    match run_shell(command).await {
        Ok(output) if output.is_blank_with_errors() => {
            tracing::warn!(backend, id, "cannot terminate VM: {}", output.stderr_lossy().trim());
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(backend, id, "cannot terminate VM: {}", e),
    }
}

pub(crate) fn listing_error(backend: &'static str, message: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::StatusUnavailable {
        backend,
        message: message.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use camino::Utf8PathBuf;
    use scir_core::SchedulerConfig;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Install an executable script named `name` in `dir`.
    pub fn fake_bin(dir: &TempDir, name: &str, body: &str) {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/bash\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// A fake CLI that logs its arguments to `calls.log`, then runs `body`.
    pub fn logging_bin(dir: &TempDir, name: &str, body: &str) {
        fake_bin(
            dir,
            name,
            &format!(
                "echo \"{} $*\" >> '{}'\n{}",
                name,
                dir.path().join("calls.log").display(),
                body
            ),
        );
    }

    pub fn config_for(dir: &TempDir) -> SchedulerConfig {
        SchedulerConfig {
            bin_dir: Some(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()),
            user: "alice".to_string(),
            ..Default::default()
        }
    }

    pub fn calls(dir: &TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}
