//! SLURM as a [`SchedulerBackend`].

use crate::sacct::{self, SacctError, SlurmResourceUsage};
use crate::{sbatch, sinfo, squeue};
use scir_core::{
    ControlCommand, JobAction, JobState, JobTemplate, OutputCheck, QueueLoad, SchedulerBackend,
    SchedulerConfig, SchedulerError, StateSnapshot, SubmitCommand,
};
use scir_parsers::shell_escape;

const NAME: &str = "SLURM";

/// SLURM clusters. Hold, release, suspend and resume are not offered.
#[derive(Debug, Clone)]
pub struct SlurmBackend {
    config: SchedulerConfig,
}

impl SlurmBackend {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// CPU seconds used by a job, from sacct.
    pub async fn cpu_seconds(&self, job_id: &str) -> Result<Option<f64>, SacctError> {
        sacct::cpu_seconds(&self.config, job_id).await
    }

    pub async fn resource_usage(
        &self,
        job_id: &str,
    ) -> Result<Option<SlurmResourceUsage>, SacctError> {
        sacct::resource_usage(&self.config, job_id).await
    }
}

impl SchedulerBackend for SlurmBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build_submit_command(&self, template: &JobTemplate) -> Result<SubmitCommand, SchedulerError> {
        Ok(SubmitCommand::shell(sbatch::sbatch_command(&self.config, template)?))
    }

    fn parse_job_id(&self, output: &str) -> Result<String, SchedulerError> {
        sbatch::parse_sbatch_output(output).ok_or_else(|| SchedulerError::UnparsableJobId {
            backend: NAME,
            output: output.to_string(),
        })
    }

    async fn refresh_states(&self) -> Result<StateSnapshot, SchedulerError> {
        Ok(StateSnapshot::from_jobs(squeue::query_squeue(&self.config).await?))
    }

    fn statestring_to_stateconst(&self, state: &str) -> JobState {
        squeue::parse_state(state)
    }

    fn build_control_command(&self, action: JobAction, job_id: &str) -> ControlCommand {
        match action {
            JobAction::Terminate => ControlCommand::Shell {
                command: format!("{} {} 2>&1", self.config.program("scancel"), shell_escape(job_id)),
                check: OutputCheck::EmptyOutput,
            },
            _ => ControlCommand::Unsupported,
        }
    }

    async fn queue_load(&self, _snapshot: Option<&StateSnapshot>) -> QueueLoad {
        sinfo::query_load(&self.config).await
    }
}
