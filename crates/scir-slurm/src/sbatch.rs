//! Build sbatch submissions and read back the job ID.

use once_cell::sync::Lazy;
use regex::Regex;
use scir_core::{JobTemplate, SchedulerConfig, ShellCommand, TemplateError};

static SUBMITTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Submitted.*job\s+(\d+)").expect("valid regex"));

/// Render `template` as an sbatch command line.
///
/// The walltime is rounded up to whole minutes, with one minute of slack.
pub fn sbatch_command(
    config: &SchedulerConfig,
    template: &JobTemplate,
) -> Result<String, TemplateError> {
    template.validate()?;

    let mut cmd = ShellCommand::new(config.program("sbatch"));
    cmd.opt_if("-p", template.queue_name())
        .raw("--no-requeue")
        .long_if("--chdir", template.working_dir())
        .long_if("--job-name", template.name())
        .long_if("--output", template.stdout_path());
    if !template.join_stderr {
        cmd.long_if("--error", template.stderr_path());
    }
    if let Some(mem) = template.memory_mb {
        cmd.raw(format!("--mem={}M", mem));
    }
    if let Some(cores) = template.ncores {
        cmd.raw(format!("--cpus-per-task={}", cores));
    }
    cmd.raw_opt(config.extra_submit_args())
        .raw_opt(template.extra_args());
    if let Some(walltime) = template.walltime_seconds {
        cmd.raw(format!("--time={}", (walltime + 60) / 60));
    }
    cmd.arg(template.script()).raw("2>&1");
    Ok(cmd.build())
}

/// Extract the job ID from "Submitted batch job 12345".
pub fn parse_sbatch_output(output: &str) -> Option<String> {
    SUBMITTED_RE
        .captures(output)
        .map(|c| c[1].to_string())
}
