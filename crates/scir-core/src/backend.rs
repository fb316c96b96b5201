//! The interface every scheduler adapter implements.

use crate::error::SchedulerError;
use crate::load::QueueLoad;
use crate::state::JobState;
use crate::template::JobTemplate;
use regex::Regex;
use scir_parsers::run_shell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;

/// A control action on a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Hold,
    Release,
    Suspend,
    Resume,
    Terminate,
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hold => "hold",
            Self::Release => "release",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Terminate => "terminate",
        })
    }
}

/// A file that must exist while the submission command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub contents: String,
}

/// A rendered submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitCommand {
    /// Full bash command line
    pub shell: String,
    /// Written before `shell` runs, removed afterwards
    pub attachments: Vec<Attachment>,
}

impl SubmitCommand {
    pub fn shell(shell: String) -> Self {
        Self {
            shell,
            attachments: Vec::new(),
        }
    }
}

/// How to decide that a control command worked.
#[derive(Debug, Clone)]
pub enum OutputCheck {
    /// Any output at all is an error message
    EmptyOutput,
    /// The output must match
    Matches(&'static Regex),
    /// Output is ignored
    Ignore,
}

impl OutputCheck {
    pub fn accepts(&self, output: &str) -> bool {
        match self {
            Self::EmptyOutput => output.trim().is_empty(),
            Self::Matches(re) => re.is_match(output),
            Self::Ignore => true,
        }
    }
}

/// What a backend does for a [`JobAction`].
#[derive(Debug, Clone)]
pub enum ControlCommand {
    /// The backend has no such action
    Unsupported,
    /// The action always succeeds without doing anything
    NoOp,
    /// Run `command` (stdout and stderr merged) and check its output
    Shell { command: String, check: OutputCheck },
}

/// Result of one bulk status refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    pub jobs: HashMap<String, JobState>,
    /// Load figures, for backends whose status listing carries them
    pub load: Option<QueueLoad>,
}

impl StateSnapshot {
    pub fn from_jobs(jobs: HashMap<String, JobState>) -> Self {
        Self { jobs, load: None }
    }
}

/// A batch scheduler, process table or cloud API that runs jobs.
///
/// Adapters supply command construction and output parsing; the default
/// methods run those commands through `bash`.
pub trait SchedulerBackend: Send + Sync {
    /// Short backend name used in messages.
    fn name(&self) -> &'static str;

    /// Render a template into a submission command line.
    ///
    /// Must reject templates that fail [`JobTemplate::validate`].
    fn build_submit_command(&self, template: &JobTemplate)
    -> Result<SubmitCommand, SchedulerError>;

    /// Extract the new job ID from the submission output.
    fn parse_job_id(&self, output: &str) -> Result<String, SchedulerError>;

    /// Submit a job and return its ID.
    fn submit(
        &self,
        template: &JobTemplate,
    ) -> impl Future<Output = Result<String, SchedulerError>> + Send {
        async move {
            let command = self.build_submit_command(template)?;
            for attachment in &command.attachments {
                tokio::fs::write(&attachment.path, &attachment.contents).await?;
            }

            tracing::info!(backend = self.name(), command = %command.shell, "submitting job");
            let result = run_shell(&command.shell).await;

            for attachment in &command.attachments {
                if let Err(e) = tokio::fs::remove_file(&attachment.path).await {
                    tracing::warn!("Cannot remove {}: {}", attachment.path.display(), e);
                }
            }

            let output = result?;
            self.parse_job_id(&output.stdout_lossy())
        }
    }

    /// Run the bulk status command and parse every job it lists.
    fn refresh_states(&self) -> impl Future<Output = Result<StateSnapshot, SchedulerError>> + Send;

    /// Map a backend status string to a [`JobState`]. Never fails.
    fn statestring_to_stateconst(&self, state: &str) -> JobState;

    /// The command implementing `action` on `job_id`.
    fn build_control_command(&self, action: JobAction, job_id: &str) -> ControlCommand;

    /// Perform `action` on `job_id`.
    fn control(
        &self,
        action: JobAction,
        job_id: &str,
    ) -> impl Future<Output = Result<(), SchedulerError>> + Send {
        async move {
            match self.build_control_command(action, job_id) {
                ControlCommand::Unsupported => Err(SchedulerError::ActionNotAvailable {
                    backend: self.name(),
                    action,
                }),
                ControlCommand::NoOp => Ok(()),
                ControlCommand::Shell { command, check } => {
                    tracing::debug!(backend = self.name(), %action, job_id, "running control command");
                    let output = run_shell(&command).await?;
                    let mut text = output.stdout_lossy();
                    text.push_str(&output.stderr_lossy());
                    if check.accepts(&text) {
                        Ok(())
                    } else {
                        Err(SchedulerError::ControlFailed {
                            backend: self.name(),
                            action,
                            job_id: job_id.to_string(),
                            output: text.trim().to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Whether [`queue_load`](Self::queue_load) reads figures captured by
    /// the status refresh.
    fn load_from_status(&self) -> bool {
        false
    }

    /// Best-effort load introspection. Never fails.
    fn queue_load(
        &self,
        snapshot: Option<&StateSnapshot>,
    ) -> impl Future<Output = QueueLoad> + Send {
        let load = snapshot.and_then(|s| s.load).unwrap_or(QueueLoad::Unknown);
        async move { load }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    static CANCELLED: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)job '\S+' cancelled").unwrap());

    #[test]
    fn test_output_checks() {
        assert!(OutputCheck::EmptyOutput.accepts(""));
        assert!(OutputCheck::EmptyOutput.accepts("\n  \n"));
        assert!(!OutputCheck::EmptyOutput.accepts("qdel: Unknown Job Id"));
        assert!(OutputCheck::Matches(&CANCELLED).accepts("job '42' cancelled\n"));
        assert!(!OutputCheck::Matches(&CANCELLED).accepts("ERROR: invalid job"));
        assert!(OutputCheck::Ignore.accepts("anything"));
    }

    #[test]
    fn test_action_display() {
        assert_eq!(JobAction::Terminate.to_string(), "terminate");
        assert_eq!(JobAction::Hold.to_string(), "hold");
    }
}
