//! The Unix backend: each job is `bash -c <command>` in its own process
//! group, signalled as a group for suspend, resume and terminate.

use crate::hostload::host_load;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, getpgid};
use once_cell::sync::Lazy;
use regex::Regex;
use scir_core::{
    ControlCommand, JobAction, JobState, JobTemplate, QueueLoad, SchedulerBackend,
    SchedulerConfig, SchedulerError, StateSnapshot, SubmitCommand, TemplateError,
};
use scir_parsers::{CommandError, run_shell, shell_escape};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;

const NAME: &str = "Unix";
const PS_COMMAND: &str = "ps ax -o pid,uid,state";

static PS_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(\d+)\s+(\S+)").expect("valid regex"));

/// Map a `ps` state code. Stopped processes are suspended jobs; sleeping,
/// running, uninterruptible and zombie processes all count as running.
pub fn parse_state(state: &str) -> JobState {
    let lower = state.to_ascii_lowercase();
    if lower.contains('t') {
        JobState::UserSuspended
    } else if lower.contains(['s', 'r', 'u', 'z']) {
        JobState::Running
    } else {
        JobState::Undetermined
    }
}

pub fn parse_ps(output: &str) -> HashMap<String, JobState> {
    output
        .lines()
        .filter_map(|line| PS_LINE_RE.captures(line))
        .map(|caps| (caps[1].to_string(), parse_state(&caps[3])))
        .collect()
}

/// The command line run in the background for `template`.
///
/// Output goes to `/dev/null` unless a file is given; stderr follows
/// stdout only when joined and no error file is set.
pub fn qsub_command(template: &JobTemplate) -> Result<String, TemplateError> {
    template.validate()?;

    let stdout = template.stdout_path().unwrap_or("/dev/null");
    let stderr = match template.stderr_path() {
        Some(err) => Some(err),
        None if template.join_stderr => None,
        None => Some("/dev/null"),
    };

    let mut command = String::new();
    if let Some(wd) = template.working_dir() {
        command.push_str(&format!("cd {} || exit 20;", shell_escape(wd)));
    }
    command.push_str(&format!(
        "/bin/bash {}  > {}",
        shell_escape(template.script()),
        shell_escape(stdout)
    ));
    match stderr {
        Some(err) => command.push_str(&format!(" 2> {}", shell_escape(err))),
        None => command.push_str(" 2>&1"),
    }
    Ok(command)
}

fn signal_for(action: JobAction) -> Option<Signal> {
    match action {
        JobAction::Suspend => Some(Signal::SIGSTOP),
        JobAction::Resume => Some(Signal::SIGCONT),
        JobAction::Terminate => Some(Signal::SIGTERM),
        JobAction::Hold | JobAction::Release => None,
    }
}

/// Send `signal` to the process group of `job_id`.
fn signal_group(job_id: &str, signal: Signal) -> nix::Result<()> {
    let pid = job_id.trim().parse::<i32>().map_err(|_| nix::Error::EINVAL)?;
    let group = getpgid(Some(Pid::from_raw(pid)))?;
    killpg(group, signal)
}

#[derive(Debug, Clone)]
pub struct UnixBackend {
    config: SchedulerConfig,
}

impl UnixBackend {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

impl SchedulerBackend for UnixBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build_submit_command(&self, template: &JobTemplate) -> Result<SubmitCommand, SchedulerError> {
        Ok(SubmitCommand::shell(qsub_command(template)?))
    }

    fn parse_job_id(&self, output: &str) -> Result<String, SchedulerError> {
        let pid = output.trim();
        if !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit()) {
            Ok(pid.to_string())
        } else {
            Err(SchedulerError::UnparsableJobId {
                backend: NAME,
                output: output.to_string(),
            })
        }
    }

    /// Start the job detached in a new process group; the PID is the ID.
    async fn submit(&self, template: &JobTemplate) -> Result<String, SchedulerError> {
        let command = self.build_submit_command(template)?.shell;
        tracing::info!(backend = NAME, command = %command, "starting local job");

        let mut child = Command::new("bash")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|e| CommandError::Execution {
                command: command.clone(),
                error: e.to_string(),
            })?;
        let pid = child.id().ok_or_else(|| SchedulerError::UnparsableJobId {
            backend: NAME,
            output: "process exited before its PID was read".to_string(),
        })?;

        // Reap the child so finished jobs drop out of the ps listing.
        tokio::spawn(async move {
            if let Err(e) = child.wait().await {
                tracing::debug!(pid, "wait on local job failed: {}", e);
            }
        });

        Ok(pid.to_string())
    }

    async fn refresh_states(&self) -> Result<StateSnapshot, SchedulerError> {
        let output = run_shell(PS_COMMAND).await?;
        if output.is_blank_with_errors() {
            return Err(SchedulerError::StatusUnavailable {
                backend: NAME,
                message: format!("{}: {}", PS_COMMAND, output.stderr_lossy().trim()),
            });
        }
        Ok(StateSnapshot::from_jobs(parse_ps(&output.stdout_lossy())))
    }

    fn statestring_to_stateconst(&self, state: &str) -> JobState {
        parse_state(state)
    }

    /// Hold and release do nothing. Signal actions are delivered directly
    /// by [`control`](SchedulerBackend::control).
    fn build_control_command(&self, action: JobAction, _job_id: &str) -> ControlCommand {
        match signal_for(action) {
            Some(_) => ControlCommand::Unsupported,
            None => ControlCommand::NoOp,
        }
    }

    /// Signal the job's process group. A job that is already gone is not
    /// an error.
    async fn control(&self, action: JobAction, job_id: &str) -> Result<(), SchedulerError> {
        let Some(signal) = signal_for(action) else {
            return Ok(());
        };
        if let Err(e) = signal_group(job_id, signal) {
            tracing::debug!(job_id, %action, "cannot signal local job: {}", e);
        }
        Ok(())
    }

    async fn queue_load(&self, _snapshot: Option<&StateSnapshot>) -> QueueLoad {
        host_load().await
    }
}
