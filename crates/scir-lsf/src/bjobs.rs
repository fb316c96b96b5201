//! Query LSF jobs via bjobs.

use scir_core::{JobState, SchedulerConfig, SchedulerError};
use scir_parsers::{run_shell, shell_escape};
use std::collections::HashMap;

/// Parse LSF state string.
///
/// `DONE` has no mapping of its own: finished jobs are left out of the
/// listing so callers see them disappear.
pub fn parse_state(s: &str) -> JobState {
    match s.to_uppercase().as_str() {
        "PEND" => JobState::QueuedActive,
        "PSUSP" => JobState::UserOnHold,
        "RUN" => JobState::Running,
        "USUSP" => JobState::UserSuspended,
        "SSUSP" => JobState::SystemSuspended,
        "EXIT" => JobState::Failed,
        _ => JobState::Undetermined,
    }
}

pub fn bjobs_command(config: &SchedulerConfig) -> String {
    format!(
        "{} -a -noheader -u {}",
        config.program("bjobs"),
        shell_escape(&config.user)
    )
}

/// Parse default-format `bjobs -noheader` lines
/// (JOBID USER STAT QUEUE FROM_HOST EXEC_HOST JOB_NAME SUBMIT_TIME).
pub fn parse_bjobs(output: &str) -> HashMap<String, JobState> {
    let mut jobs = HashMap::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("No ") {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || !fields[0].bytes().all(|b| b.is_ascii_digit()) {
            tracing::warn!("Skipping unexpected bjobs line: {}", line);
            continue;
        }
        if fields[2].eq_ignore_ascii_case("DONE") {
            continue;
        }
        jobs.insert(fields[0].to_string(), parse_state(fields[2]));
    }
    jobs
}

/// Query the current user's jobs with bjobs.
///
/// bjobs exits non-zero and writes to stderr when there are no jobs, so
/// only a blank stdout combined with an unexpected message is an error.
pub async fn query_bjobs(config: &SchedulerConfig) -> Result<HashMap<String, JobState>, SchedulerError> {
    let output = run_shell(&bjobs_command(config)).await?;
    let stderr = output.stderr_lossy();
    if output.is_blank_with_errors() && !stderr.contains("No ") {
        return Err(SchedulerError::StatusUnavailable {
            backend: "LSF",
            message: stderr.trim().to_string(),
        });
    }
    Ok(parse_bjobs(&output.stdout_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("PEND"), JobState::QueuedActive);
        assert_eq!(parse_state("RUN"), JobState::Running);
        assert_eq!(parse_state("PSUSP"), JobState::UserOnHold);
        assert_eq!(parse_state("USUSP"), JobState::UserSuspended);
        assert_eq!(parse_state("SSUSP"), JobState::SystemSuspended);
        assert_eq!(parse_state("EXIT"), JobState::Failed);
        assert_eq!(parse_state("ZOMBI"), JobState::Undetermined);
        assert_eq!(parse_state(""), JobState::Undetermined);
    }

    #[test]
    fn test_parse_bjobs_drops_done() {
        let output = "\
101     alice   RUN   normal     login1      node07      job_a      Dec 18 10:30
102     alice   PEND  normal     login1                  job_b      Dec 18 10:31
103     alice   DONE  normal     login1      node02      job_c      Dec 18 09:00
104     alice   EXIT  normal     login1      node03      job_d      Dec 18 09:10
";
        let jobs = parse_bjobs(output);
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs["101"], JobState::Running);
        assert_eq!(jobs["102"], JobState::QueuedActive);
        assert_eq!(jobs["104"], JobState::Failed);
        assert!(!jobs.contains_key("103"));
    }

    #[test]
    fn test_parse_bjobs_no_jobs() {
        assert!(parse_bjobs("No unfinished job found\n").is_empty());
    }
}
