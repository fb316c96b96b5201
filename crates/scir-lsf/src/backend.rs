//! LSF as a [`SchedulerBackend`].

use crate::{bjobs, bsub};
use once_cell::sync::Lazy;
use regex::Regex;
use scir_core::{
    ControlCommand, JobAction, JobState, JobTemplate, OutputCheck, SchedulerBackend,
    SchedulerConfig, SchedulerError, StateSnapshot, SubmitCommand,
};
use scir_parsers::shell_escape;

const NAME: &str = "LSF";

static IS_BEING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Job <\S+> is being").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct LsfBackend {
    config: SchedulerConfig,
}

impl LsfBackend {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }
}

impl SchedulerBackend for LsfBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build_submit_command(&self, template: &JobTemplate) -> Result<SubmitCommand, SchedulerError> {
        Ok(SubmitCommand::shell(bsub::bsub_command(&self.config, template)?))
    }

    fn parse_job_id(&self, output: &str) -> Result<String, SchedulerError> {
        bsub::parse_bsub_output(output).ok_or_else(|| SchedulerError::UnparsableJobId {
            backend: NAME,
            output: output.to_string(),
        })
    }

    async fn refresh_states(&self) -> Result<StateSnapshot, SchedulerError> {
        Ok(StateSnapshot::from_jobs(bjobs::query_bjobs(&self.config).await?))
    }

    fn statestring_to_stateconst(&self, state: &str) -> JobState {
        bjobs::parse_state(state)
    }

    /// Holding a pending job and suspending a running one are both bstop.
    fn build_control_command(&self, action: JobAction, job_id: &str) -> ControlCommand {
        let program = match action {
            JobAction::Hold | JobAction::Suspend => "bstop",
            JobAction::Release | JobAction::Resume => "bresume",
            JobAction::Terminate => "bkill",
        };
        ControlCommand::Shell {
            command: format!("{} {} 2>&1", self.config.program(program), shell_escape(job_id)),
            check: OutputCheck::Matches(&IS_BEING_RE),
        }
    }
}
