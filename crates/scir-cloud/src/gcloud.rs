//! Google Cloud Batch through `gcloud batch jobs`.
//!
//! The job name is the job ID, so every submission gets a time suffix.
//! The task description is written to a JSON file passed with `--config`.

use crate::listing_error;
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use scir_core::{
    Attachment, ControlCommand, GcloudConfig, JobAction, JobState, JobTemplate, OutputCheck,
    SchedulerBackend, SchedulerConfig, SchedulerError, ShellCommand, StateSnapshot,
    SubmitCommand, TemplateError,
};
use scir_parsers::{run_shell, shell_escape};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

const NAME: &str = "GcloudBatch";
const MAX_NAME_LEN: usize = 50;
const DEFAULT_CPU_MILLI: u64 = 2000;

static JOB_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][\w-]*\w$").expect("valid regex"));

static CONFIG_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Deserialize)]
struct SubmittedJob {
    name: String,
}

pub fn parse_state(state: &str) -> JobState {
    let upper = state.to_ascii_uppercase();
    if upper.contains("RUNNING") {
        JobState::Running
    } else if upper.contains("SCHEDULED") || upper.contains("QUEUED") {
        JobState::QueuedActive
    } else if upper.contains("COMPLETED") || upper.contains("SUCCEEDED") {
        JobState::Done
    } else if upper.contains("FAILED") {
        JobState::Failed
    } else {
        JobState::Undetermined
    }
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Parse `gcloud batch jobs list`: `NAME LOCATION STATE` columns, where
/// NAME is a resource path whose basename is the job ID.
pub fn parse_jobs_list(output: &str) -> HashMap<String, JobState> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let path = fields.next()?;
            let _location = fields.next()?;
            let state = fields.next()?;
            (path != "NAME").then(|| (basename(path).to_string(), parse_state(state)))
        })
        .collect()
}

/// The job ID from the YAML printed by `gcloud batch jobs submit`.
pub fn parse_submit_output(output: &str) -> Option<String> {
    let job: SubmittedJob = serde_yaml_ng::from_str(output).ok()?;
    let id = basename(&job.name);
    (!id.is_empty()).then(|| id.to_string())
}

/// Validate the caller's name and make it unique per submission:
/// truncated, lower-cased, with a `-HHMMSS` suffix.
pub fn unique_job_name(name: Option<&str>, suffix: &str) -> Result<String, TemplateError> {
    let name = name.ok_or(TemplateError::MissingName)?;
    if !JOB_NAME_RE.is_match(name) {
        return Err(TemplateError::InvalidName(name.to_string()));
    }
    let truncated: String = name.chars().take(MAX_NAME_LEN).collect();
    Ok(format!("{}{}", truncated, suffix).to_lowercase())
}

/// The shell command run on the batch node.
pub fn task_script(template: &JobTemplate) -> String {
    let mut cmd = String::new();
    if let Some(wd) = template.working_dir() {
        cmd.push_str(&format!("cd {} && ", shell_escape(wd)));
    }
    cmd.push_str(&format!("bash {}", shell_escape(template.script())));
    if let Some(out) = template.stdout_path() {
        cmd.push_str(&format!(" 1> {}", shell_escape(out)));
    }
    match template.stderr_path() {
        Some(err) => cmd.push_str(&format!(" 2> {}", shell_escape(err))),
        None if template.join_stderr => cmd.push_str(" 2>&1"),
        None => {}
    }
    cmd
}

/// The Batch job description for one single-task job.
pub fn job_config(template: &JobTemplate, gcloud: &GcloudConfig) -> serde_json::Value {
    let walltime = template.walltime_seconds.unwrap_or(gcloud.default_walltime_secs);
    let memory = template.memory_mb.unwrap_or(gcloud.default_memory_mb);
    let cpu_milli = template
        .ncores
        .map_or(DEFAULT_CPU_MILLI, |n| u64::from(n) * 1000);

    json!({
        "taskGroups": [{
            "taskSpec": {
                "runnables": [{ "script": { "text": task_script(template) } }],
                "computeResource": { "cpuMilli": cpu_milli, "memoryMib": memory },
                "volumes": [{
                    "gcs": { "remotePath": gcloud.bucket },
                    "mountPath": gcloud.mount_point,
                }],
                "maxRetryCount": 1,
                "maxRunDuration": format!("{}s", walltime),
            },
            "taskCount": 1,
            "parallelism": 1,
        }],
        "allocationPolicy": {
            "instances": [{
                "policy": {
                    "machineType": gcloud.machine_type,
                    "provisioningModel": gcloud.provisioning_model,
                }
            }]
        },
        "logsPolicy": { "destination": "CLOUD_LOGGING" },
    })
}

#[derive(Debug, Clone)]
pub struct GcloudBatchBackend {
    config: SchedulerConfig,
}

impl GcloudBatchBackend {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// `gcloud batch jobs <subcommand> [target] --location <location>`
    fn jobs(&self, subcommand: &str, target: Option<&str>) -> ShellCommand {
        let mut cmd = ShellCommand::new(self.config.program("gcloud"));
        cmd.raw("batch jobs").raw(subcommand);
        if let Some(target) = target {
            cmd.arg(target);
        }
        cmd.opt("--location", &self.config.gcloud.location);
        cmd
    }
}

impl SchedulerBackend for GcloudBatchBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build_submit_command(&self, template: &JobTemplate) -> Result<SubmitCommand, SchedulerError> {
        template.validate()?;
        let suffix = Local::now().format("-%H%M%S").to_string();
        let job_name = unique_job_name(template.name(), &suffix)?;

        let config_path = std::env::temp_dir().join(format!(
            "scir-gbatch-{}-{}.json",
            std::process::id(),
            CONFIG_FILE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let contents = job_config(template, &self.config.gcloud).to_string();

        let mut cmd = self.jobs("submit", Some(&job_name));
        cmd.raw_opt(self.config.extra_submit_args())
            .raw_opt(template.extra_args())
            .opt("--config", &config_path.to_string_lossy())
            // gcloud prints a progress line on stderr
            .raw("2>/dev/null");

        Ok(SubmitCommand {
            shell: cmd.build(),
            attachments: vec![Attachment {
                path: config_path,
                contents,
            }],
        })
    }

    fn parse_job_id(&self, output: &str) -> Result<String, SchedulerError> {
        parse_submit_output(output).ok_or_else(|| SchedulerError::UnparsableJobId {
            backend: NAME,
            output: output.to_string(),
        })
    }

    async fn refresh_states(&self) -> Result<StateSnapshot, SchedulerError> {
        let command = self.jobs("list", None).build();
        let output = run_shell(&command).await?;
        let stderr = output.stderr_lossy();
        if output.is_blank_with_errors() && !stderr.contains("Listed 0 items") {
            return Err(listing_error(NAME, format!("{}: {}", command, stderr.trim())));
        }
        Ok(StateSnapshot::from_jobs(parse_jobs_list(&output.stdout_lossy())))
    }

    fn statestring_to_stateconst(&self, state: &str) -> JobState {
        parse_state(state)
    }

    fn build_control_command(&self, action: JobAction, job_id: &str) -> ControlCommand {
        match action {
            JobAction::Terminate => {
                let mut cmd = self.jobs("delete", Some(job_id));
                cmd.raw("2>&1");
                ControlCommand::Shell {
                    command: cmd.build(),
                    check: OutputCheck::Ignore,
                }
            }
            _ => ControlCommand::Unsupported,
        }
    }
}
