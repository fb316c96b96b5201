//! Query active SLURM jobs via squeue.

use scir_core::{JobState, SchedulerConfig, SchedulerError};
use scir_parsers::{run_shell, shell_escape};
use std::collections::HashMap;

/// squeue output format: job ID and compact state code.
const SQUEUE_FORMAT: &str = "%A %t";

/// Parse a compact squeue state code (`%t`).
pub fn parse_state(code: &str) -> JobState {
    match code {
        "R" | "CG" => JobState::Running,
        "PD" | "CF" => JobState::QueuedActive,
        "ST" | "S" => JobState::UserSuspended,
        _ => JobState::Undetermined,
    }
}

pub fn squeue_command(config: &SchedulerConfig) -> String {
    format!(
        "{} --format='{}' --noheader --user={}",
        config.program("squeue"),
        SQUEUE_FORMAT,
        shell_escape(&config.user)
    )
}

/// Parse `squeue --format='%A %t'` output ("12345 R" per line).
pub fn parse_squeue(output: &str) -> HashMap<String, JobState> {
    let mut jobs = HashMap::new();
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let (Some(job_id), Some(code)) = (fields.next(), fields.next()) else {
            continue;
        };
        jobs.insert(job_id.to_string(), parse_state(code));
    }
    jobs
}

/// Query the current user's jobs with squeue.
pub async fn query_squeue(config: &SchedulerConfig) -> Result<HashMap<String, JobState>, SchedulerError> {
    let output = run_shell(&squeue_command(config)).await?;
    let stderr = output.stderr_lossy();
    if !stderr.trim().is_empty() {
        return Err(SchedulerError::StatusUnavailable {
            backend: "SLURM",
            message: stderr.trim().to_string(),
        });
    }
    Ok(parse_squeue(&output.stdout_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("R"), JobState::Running);
        assert_eq!(parse_state("CG"), JobState::Running);
        assert_eq!(parse_state("PD"), JobState::QueuedActive);
        assert_eq!(parse_state("CF"), JobState::QueuedActive);
        assert_eq!(parse_state("S"), JobState::UserSuspended);
        assert_eq!(parse_state("ST"), JobState::UserSuspended);
        assert_eq!(parse_state("CD"), JobState::Undetermined);
        assert_eq!(parse_state(""), JobState::Undetermined);
        assert_eq!(parse_state("\u{1}garbage"), JobState::Undetermined);
    }

    #[test]
    fn test_parse_squeue() {
        let jobs = parse_squeue("12345 R\n12346 PD\n\nbroken\n12347 CG\n");
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs["12345"], JobState::Running);
        assert_eq!(jobs["12346"], JobState::QueuedActive);
        assert_eq!(jobs["12347"], JobState::Running);
    }

    #[test]
    fn test_squeue_command() {
        let config = SchedulerConfig {
            user: "bob".to_string(),
            ..Default::default()
        };
        assert_eq!(
            squeue_command(&config),
            "squeue --format='%A %t' --noheader --user='bob'"
        );
    }
}
