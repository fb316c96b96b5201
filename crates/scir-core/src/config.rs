//! Scheduler configuration.

use camino::Utf8PathBuf;
use scir_parsers::shell_escape;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Site-wide settings shared by every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long a status listing stays fresh, in seconds
    #[serde(rename = "refresh_delay")]
    pub refresh_delay_secs: u64,
    /// Queue used when a template names none
    pub default_queue: Option<String>,
    /// Site-wide arguments appended to every submission
    pub extra_submit_args: Option<String>,
    /// Account whose jobs are listed
    pub user: String,
    /// Directory holding the scheduler executables, when not on PATH
    pub bin_dir: Option<Utf8PathBuf>,
    pub gcloud: GcloudConfig,
    pub cloud: CloudConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_delay_secs: 30,
            default_queue: None,
            extra_submit_args: None,
            user: std::env::var("USER").unwrap_or_default(),
            bin_dir: None,
            gcloud: GcloudConfig::default(),
            cloud: CloudConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_secs(self.refresh_delay_secs)
    }

    /// Path of `program`, under `bin_dir` when one is configured.
    pub fn program_path(&self, program: &str) -> String {
        match &self.bin_dir {
            Some(dir) => dir.join(program).into_string(),
            None => program.to_string(),
        }
    }

    /// The shell word that invokes `program`.
    pub fn program(&self, program: &str) -> String {
        match &self.bin_dir {
            Some(_) => shell_escape(&self.program_path(program)),
            None => program.to_string(),
        }
    }

    pub fn extra_submit_args(&self) -> Option<&str> {
        self.extra_submit_args
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Google Cloud Batch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcloudConfig {
    pub location: String,
    /// GCS bucket mounted into every task
    pub bucket: String,
    pub mount_point: String,
    pub machine_type: String,
    pub provisioning_model: String,
    pub default_walltime_secs: u64,
    pub default_memory_mb: u64,
}

impl Default for GcloudConfig {
    fn default() -> Self {
        Self {
            location: "northamerica-northeast1".to_string(),
            bucket: String::new(),
            mount_point: "/mnt/scir".to_string(),
            machine_type: "n2d-standard-4".to_string(),
            provisioning_model: "SPOT".to_string(),
            default_walltime_secs: 600,
            default_memory_mb: 2000,
        }
    }
}

/// VM settings for the AWS and OpenStack backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Image (AMI or Glance ID) booted for each job
    pub image_id: String,
    /// Instance type or flavor
    pub instance_type: String,
    pub key_name: Option<String>,
    /// Region (AWS) or cloud name (OpenStack)
    pub region: Option<String>,
}
