//! OpenStack through the `openstack` CLI. Each job is one server.

use crate::{listing_error, terminate_broken_vm};
use scir_core::{
    ControlCommand, JobAction, JobState, JobTemplate, OutputCheck, QueueLoad, SchedulerBackend,
    SchedulerConfig, SchedulerError, ShellCommand, StateSnapshot, SubmitCommand,
};
use scir_parsers::run_shell;
use serde::Deserialize;
use std::collections::HashMap;

const NAME: &str = "OpenStack";
const DEFAULT_VM_NAME: &str = "scir-worker";

#[derive(Debug, Deserialize)]
struct ServerEntry {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Debug, Deserialize)]
struct CreatedServer {
    id: String,
}

pub fn parse_state(state: &str) -> JobState {
    match state {
        "ACTIVE" => JobState::Running,
        "BUILD" => JobState::QueuedActive,
        "ERROR" => JobState::Failed,
        _ => JobState::Undetermined,
    }
}

/// Parse `openstack server list -f json` into `(id, status)` pairs.
pub fn parse_server_list(json: &str) -> Result<Vec<(String, String)>, serde_json::Error> {
    let servers: Vec<ServerEntry> = serde_json::from_str(json)?;
    Ok(servers.into_iter().map(|s| (s.id, s.status)).collect())
}

pub fn parse_server_create(json: &str) -> Option<String> {
    serde_json::from_str::<CreatedServer>(json).ok().map(|s| s.id)
}

#[derive(Debug, Clone)]
pub struct OpenStackBackend {
    config: SchedulerConfig,
}

impl OpenStackBackend {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// `openstack server <subcommand>`, scoped to the configured cloud.
    fn server(&self, subcommand: &str) -> ShellCommand {
        let mut cmd = ShellCommand::new(self.config.program("openstack"));
        if let Some(cloud) = self.config.cloud.region.as_deref() {
            cmd.opt("--os-cloud", cloud);
        }
        cmd.raw("server").raw(subcommand);
        cmd
    }

    fn delete_command(&self, id: &str) -> String {
        let mut cmd = self.server("delete");
        cmd.arg(id).raw("2>&1");
        cmd.build()
    }
}

impl SchedulerBackend for OpenStackBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build_submit_command(&self, template: &JobTemplate) -> Result<SubmitCommand, SchedulerError> {
        template.validate()?;
        let cloud = &self.config.cloud;

        let mut cmd = self.server("create");
        cmd.opt("--image", &cloud.image_id)
            .opt("--flavor", &cloud.instance_type)
            .opt_if("--key-name", cloud.key_name.as_deref())
            .opt("--user-data", template.script())
            .raw_opt(template.extra_args())
            .raw("-f json")
            .arg(template.name().unwrap_or(DEFAULT_VM_NAME));
        Ok(SubmitCommand::shell(cmd.build()))
    }

    fn parse_job_id(&self, output: &str) -> Result<String, SchedulerError> {
        parse_server_create(output).ok_or_else(|| SchedulerError::UnparsableJobId {
            backend: NAME,
            output: output.to_string(),
        })
    }

    async fn refresh_states(&self) -> Result<StateSnapshot, SchedulerError> {
        let mut cmd = self.server("list");
        cmd.raw("-f json");
        let command = cmd.build();
        let output = run_shell(&command).await?;
        if output.is_blank_with_errors() {
            return Err(listing_error(NAME, output.stderr_lossy().trim()));
        }
        let servers = parse_server_list(&output.stdout_lossy())
            .map_err(|e| listing_error(NAME, format!("{}: {}", command, e)))?;

        let mut jobs = HashMap::new();
        for (id, status) in servers {
            let state = parse_state(&status);
            if state == JobState::Failed {
                terminate_broken_vm(NAME, &self.delete_command(&id), &id).await;
            }
            jobs.insert(id, state);
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
                command: self.delete_command(job_id),
                check: OutputCheck::EmptyOutput,
            },
        }
    }

    async fn queue_load(&self, _snapshot: Option<&StateSnapshot>) -> QueueLoad {
        scir_local::host_load().await
    }
}
