//! AWS EC2 through the `aws` CLI. Each job is one instance, booted with
//! the job script as its user data.

use crate::{listing_error, terminate_broken_vm};
use once_cell::sync::Lazy;
use regex::Regex;
use scir_core::{
    ControlCommand, JobAction, JobState, JobTemplate, OutputCheck, QueueLoad, SchedulerBackend,
    SchedulerConfig, SchedulerError, ShellCommand, StateSnapshot, SubmitCommand,
};
use scir_parsers::run_shell;
use serde::Deserialize;
use std::collections::HashMap;

const NAME: &str = "AWS";
const DEFAULT_VM_NAME: &str = "scir-worker";

static TERMINATING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"TerminatingInstances").expect("valid regex"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstanceStatus {
    #[serde(default)]
    instance_statuses: Vec<InstanceStatusEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceStatusEntry {
    instance_id: String,
    instance_state: NamedState,
    instance_status: Option<StatusSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NamedState {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusSummary {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstances {
    instances: Vec<LaunchedInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LaunchedInstance {
    instance_id: String,
}

/// One instance from `describe-instance-status`.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceReport {
    pub id: String,
    pub state: JobState,
    /// The instance status checks report `impaired`
    pub broken: bool,
}

pub fn parse_state(state: &str) -> JobState {
    match state {
        "running" => JobState::Running,
        "stopped" => JobState::Done,
        "pending" => JobState::QueuedActive,
        "terminated" => JobState::Failed,
        _ => JobState::Undetermined,
    }
}

/// Parse `aws ec2 describe-instance-status --output json`. Impaired
/// instances are reported as failed.
pub fn parse_instance_statuses(json: &str) -> Result<Vec<InstanceReport>, serde_json::Error> {
    let listing: DescribeInstanceStatus = serde_json::from_str(json)?;
    Ok(listing
        .instance_statuses
        .into_iter()
        .map(|entry| {
            let broken = entry
                .instance_status
                .is_some_and(|s| s.status.eq_ignore_ascii_case("impaired"));
            let state = if broken {
                JobState::Failed
            } else {
                parse_state(&entry.instance_state.name)
            };
            InstanceReport {
                id: entry.instance_id,
                state,
                broken,
            }
        })
        .collect())
}

pub fn parse_run_instances(json: &str) -> Option<String> {
    let launched: RunInstances = serde_json::from_str(json).ok()?;
    launched.instances.into_iter().next().map(|i| i.instance_id)
}

#[derive(Debug, Clone)]
pub struct AwsBackend {
    config: SchedulerConfig,
}

impl AwsBackend {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    fn ec2(&self, subcommand: &str) -> ShellCommand {
        let mut cmd = ShellCommand::new(self.config.program("aws"));
        cmd.raw("ec2").raw(subcommand);
        if let Some(region) = self.config.cloud.region.as_deref() {
            cmd.opt("--region", region);
        }
        cmd
    }

    fn terminate_command(&self, id: &str) -> String {
        let mut cmd = self.ec2("terminate-instances");
        cmd.opt("--instance-ids", id).raw("--output json 2>&1");
        cmd.build()
    }
}

impl SchedulerBackend for AwsBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build_submit_command(&self, template: &JobTemplate) -> Result<SubmitCommand, SchedulerError> {
        template.validate()?;
        let cloud = &self.config.cloud;
        let vm_name = template.name().unwrap_or(DEFAULT_VM_NAME);

        let mut cmd = self.ec2("run-instances");
        cmd.opt("--image-id", &cloud.image_id)
            .opt("--instance-type", &cloud.instance_type)
            .opt_if("--key-name", cloud.key_name.as_deref())
            .opt(
                "--tag-specifications",
                &format!("ResourceType=instance,Tags=[{{Key=Name,Value={}}}]", vm_name),
            )
            .opt("--user-data", &format!("file://{}", template.script()))
            .raw_opt(template.extra_args())
            .raw("--output json");
        Ok(SubmitCommand::shell(cmd.build()))
    }

    fn parse_job_id(&self, output: &str) -> Result<String, SchedulerError> {
        parse_run_instances(output).ok_or_else(|| SchedulerError::UnparsableJobId {
            backend: NAME,
            output: output.to_string(),
        })
    }

    async fn refresh_states(&self) -> Result<StateSnapshot, SchedulerError> {
        let mut cmd = self.ec2("describe-instance-status");
        cmd.raw("--include-all-instances --output json");
        let command = cmd.build();
        let output = run_shell(&command).await?;
        if output.is_blank_with_errors() {
            return Err(listing_error(NAME, output.stderr_lossy().trim()));
        }
        let reports = parse_instance_statuses(&output.stdout_lossy())
            .map_err(|e| listing_error(NAME, format!("{}: {}", command, e)))?;

        let mut jobs = HashMap::new();
        for report in reports {
            if report.broken {
                terminate_broken_vm(NAME, &self.terminate_command(&report.id), &report.id).await;
            }
            jobs.insert(report.id, report.state);
        }
        Ok(StateSnapshot::from_jobs(jobs))
    }

    fn statestring_to_stateconst(&self, state: &str) -> JobState {
        parse_state(state)
    }

    fn build_control_command(&self, action: JobAction, job_id: &str) -> ControlCommand {
        match action {
            JobAction::Hold | JobAction::Release => ControlCommand::NoOp,
            JobAction::Suspend | JobAction::Resume => ControlCommand::Unsupported,
            JobAction::Terminate => ControlCommand::Shell {
                command: self.terminate_command(job_id),
                check: OutputCheck::Matches(&TERMINATING_RE),
            },
        }
    }

    async fn queue_load(&self, _snapshot: Option<&StateSnapshot>) -> QueueLoad {
        scir_local::host_load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{calls, config_for, fake_bin, logging_bin};
    use scir_core::{CloudConfig, Session};
    use std::time::Duration;

    const DESCRIBE: &str = r#"{
    "InstanceStatuses": [
        {
            "AvailabilityZone": "us-east-1a",
            "InstanceId": "i-0aaa",
            "InstanceState": {"Code": 16, "Name": "running"},
            "InstanceStatus": {"Status": "ok"}
        },
        {
            "InstanceId": "i-0bbb",
            "InstanceState": {"Code": 0, "Name": "pending"},
            "InstanceStatus": {"Status": "initializing"}
        },
        {
            "InstanceId": "i-0ccc",
            "InstanceState": {"Code": 16, "Name": "running"},
            "InstanceStatus": {"Status": "impaired"}
        },
        {
            "InstanceId": "i-0ddd",
            "InstanceState": {"Code": 80, "Name": "stopped"}
        }
    ]
}"#;

    fn aws_config(dir: &tempfile::TempDir) -> SchedulerConfig {
        SchedulerConfig {
            cloud: CloudConfig {
                image_id: "ami-123".to_string(),
                instance_type: "t3.small".to_string(),
                key_name: Some("lab".to_string()),
                region: None,
            },
            ..config_for(dir)
        }
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("running"), JobState::Running);
        assert_eq!(parse_state("stopped"), JobState::Done);
        assert_eq!(parse_state("pending"), JobState::QueuedActive);
        assert_eq!(parse_state("terminated"), JobState::Failed);
        assert_eq!(parse_state("shutting-down"), JobState::Undetermined);
        assert_eq!(parse_state(""), JobState::Undetermined);
    }

    #[test]
    fn test_parse_instance_statuses() {
        let reports = parse_instance_statuses(DESCRIBE).unwrap();
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[0].state, JobState::Running);
        assert_eq!(reports[1].state, JobState::QueuedActive);
        assert!(reports[2].broken);
        assert_eq!(reports[2].state, JobState::Failed);
        assert_eq!(reports[3].state, JobState::Done);
        assert!(parse_instance_statuses("not json").is_err());
    }

    #[test]
    fn test_parse_run_instances() {
        let json = r#"{"Groups": [], "Instances": [{"InstanceId": "i-0eee", "ImageId": "ami-123"}]}"#;
        assert_eq!(parse_run_instances(json), Some("i-0eee".to_string()));
        assert_eq!(parse_run_instances(r#"{"Instances": []}"#), None);
    }

    #[test]
    fn test_run_instances_command() {
        let dir = tempfile::tempdir().unwrap();
        let backend = AwsBackend::new(SchedulerConfig {
            bin_dir: None,
            ..aws_config(&dir)
        });
        let template = JobTemplate {
            name: Some("job-1".to_string()),
            ..JobTemplate::new("/w/boot.sh")
        };
        assert_eq!(
            backend.build_submit_command(&template).unwrap().shell,
            "aws ec2 run-instances --image-id 'ami-123' --instance-type 't3.small' \
             --key-name 'lab' --tag-specifications \
             'ResourceType=instance,Tags=[{Key=Name,Value=job-1}]' \
             --user-data 'file:///w/boot.sh' --output json"
        );
    }

    #[tokio::test]
    async fn test_impaired_instances_are_terminated_while_polling() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("describe.json"), DESCRIBE).unwrap();
        logging_bin(
            &dir,
            "aws",
            &format!(
                "case \"$2\" in\n\
                 describe-instance-status) cat '{}' ;;\n\
                 terminate-instances) echo '{{\"TerminatingInstances\": []}}' ;;\n\
                 esac",
                dir.path().join("describe.json").display()
            ),
        );

        let mut session = Session::new(AwsBackend::new(aws_config(&dir)), Duration::from_secs(30));
        assert_eq!(session.job_ps("i-0ccc", None).await.unwrap(), JobState::Failed);
        assert_eq!(session.job_ps("i-0aaa", None).await.unwrap(), JobState::Running);
        assert_eq!(
            calls(&dir),
            vec![
                "aws ec2 describe-instance-status --include-all-instances --output json",
                "aws ec2 terminate-instances --instance-ids i-0ccc --output json",
            ]
        );
    }

    #[tokio::test]
    async fn test_controls() {
        let dir = tempfile::tempdir().unwrap();
        fake_bin(&dir, "aws", "echo 'An error occurred (InvalidInstanceID.NotFound)'");
        let backend = AwsBackend::new(aws_config(&dir));

        assert!(backend.control(JobAction::Hold, "i-0aaa").await.is_ok());
        assert!(backend.control(JobAction::Release, "i-0aaa").await.is_ok());
        assert!(matches!(
            backend.control(JobAction::Suspend, "i-0aaa").await,
            Err(SchedulerError::ActionNotAvailable { .. })
        ));
        assert!(matches!(
            backend.control(JobAction::Terminate, "i-0aaa").await,
            Err(SchedulerError::ControlFailed { .. })
        ));
    }
}
