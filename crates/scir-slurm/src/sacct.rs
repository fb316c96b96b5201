//! Query SLURM job accounting via sacct.

use scir_core::SchedulerConfig;
use scir_parsers::{
    MemoryFormat, non_empty_string, parse_memory_mb, run_command, slurm_time, split_delimited,
};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum SacctError {
    #[error("Failed to execute sacct: {0}")]
    ExecutionError(String),
    #[error("Failed to parse sacct output: {0}")]
    ParseError(String),
}

/// sacct usage format (--parsable2 uses | delimiter)
const USAGE_FORMAT: &str = "JobIDRaw,MaxRSS,Elapsed,TotalCPU";

/// Resource usage data from sacct.
#[derive(Debug, Clone, PartialEq)]
pub struct SlurmResourceUsage {
    pub job_id: String,
    pub max_rss_mb: Option<u64>,
    pub elapsed_seconds: Option<f64>,
    pub cpu_time_seconds: Option<f64>,
}

fn sacct(config: &SchedulerConfig, job_id: &str, format: &str) -> Command {
    let mut cmd = Command::new(config.program_path("sacct"));
    cmd.args([
        "-j",
        job_id,
        "-X",
        "--noheader",
        "--parsable2",
        &format!("--format={}", format),
    ]);
    cmd
}

/// First non-blank line of sacct output.
fn first_line(stdout: &str) -> Option<&str> {
    stdout.lines().find(|l| !l.trim().is_empty())
}

/// Total CPU time consumed by a job, in seconds.
pub async fn cpu_seconds(config: &SchedulerConfig, job_id: &str) -> Result<Option<f64>, SacctError> {
    let stdout = run_command(&mut sacct(config, job_id, "TotalCPU"), "sacct")
        .await
        .map_err(|e| SacctError::ExecutionError(e.to_string()))?;

    Ok(first_line(&stdout).and_then(|l| slurm_time(l.trim())))
}

/// Parse one `JobIDRaw|MaxRSS|Elapsed|TotalCPU` line.
fn parse_usage_line(line: &str) -> Result<SlurmResourceUsage, SacctError> {
    let fields = split_delimited(line, 4).map_err(SacctError::ParseError)?;
    Ok(SlurmResourceUsage {
        job_id: fields[0].to_string(),
        max_rss_mb: non_empty_string(fields[1])
            .and_then(|m| parse_memory_mb(&m, MemoryFormat::SlurmSacct)),
        elapsed_seconds: slurm_time(fields[2]),
        cpu_time_seconds: slurm_time(fields[3]),
    })
}

/// Query resource usage for a specific job.
pub async fn resource_usage(
    config: &SchedulerConfig,
    job_id: &str,
) -> Result<Option<SlurmResourceUsage>, SacctError> {
    let stdout = run_command(&mut sacct(config, job_id, USAGE_FORMAT), "sacct")
        .await
        .map_err(|e| SacctError::ExecutionError(e.to_string()))?;

    match first_line(&stdout) {
        Some(line) => parse_usage_line(line).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{config_for, fake_bin};

    #[test]
    fn test_parse_usage_line() {
        let usage = parse_usage_line("4242|2048K|01:00:00|1-02:03:04.5").unwrap();
        assert_eq!(usage.job_id, "4242");
        assert_eq!(usage.max_rss_mb, Some(2));
        assert_eq!(usage.elapsed_seconds, Some(3600.0));
        assert_eq!(usage.cpu_time_seconds, Some(93784.5));
    }

    #[test]
    fn test_parse_usage_line_blank_fields() {
        let usage = parse_usage_line("4242||00:00:10|").unwrap();
        assert_eq!(usage.max_rss_mb, None);
        assert_eq!(usage.elapsed_seconds, Some(10.0));
        assert_eq!(usage.cpu_time_seconds, None);
        assert!(parse_usage_line("4242|1G").is_err());
    }

    #[tokio::test]
    async fn test_cpu_seconds() {
        let dir = tempfile::tempdir().unwrap();
        fake_bin(&dir, "sacct", r#"echo "$@" > "$(dirname "$0")/args"; echo '1-02:03:04.5'"#);
        let config = config_for(&dir);

        let secs = cpu_seconds(&config, "99").await.unwrap();
        assert_eq!(secs, Some(93784.5));

        let args = std::fs::read_to_string(dir.path().join("args")).unwrap();
        assert_eq!(args.trim(), "-j 99 -X --noheader --parsable2 --format=TotalCPU");
    }

    #[tokio::test]
    async fn test_resource_usage_empty() {
        let dir = tempfile::tempdir().unwrap();
        fake_bin(&dir, "sacct", "true");
        let usage = resource_usage(&config_for(&dir), "99").await.unwrap();
        assert!(usage.is_none());
    }
}
