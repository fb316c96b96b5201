//! Build bsub submissions and read back the job ID.

use once_cell::sync::Lazy;
use regex::Regex;
use scir_core::{JobTemplate, SchedulerConfig, ShellCommand, TemplateError, template::BASH};

static JOB_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Job <(\d+)>").expect("valid regex"));

/// Render `template` as a bsub command line.
///
/// Without `-e`, LSF sends stderr to the `-o` file, which is how a joined
/// template is expressed.
pub fn bsub_command(
    config: &SchedulerConfig,
    template: &JobTemplate,
) -> Result<String, TemplateError> {
    template.validate()?;

    let mut cmd = ShellCommand::new(config.program("bsub"));
    cmd.opt_if("-J", template.name())
        .opt_if("-o", template.stdout_path());
    if !template.join_stderr {
        cmd.opt_if("-e", template.stderr_path());
    }
    cmd.opt_if("-q", template.queue_name())
        .opt_if("-cwd", template.working_dir());
    if let Some(walltime) = template.walltime_seconds {
        cmd.raw(format!("-W {}", walltime.div_ceil(60)));
    }
    if let Some(mem) = template.memory_mb {
        cmd.raw(format!("-M {}MB", mem));
    }
    if let Some(cores) = template.ncores {
        cmd.raw(format!("-n {}", cores));
    }
    cmd.raw_opt(config.extra_submit_args())
        .raw_opt(template.extra_args())
        .raw(BASH)
        .arg(template.script())
        .raw("2>&1");
    Ok(cmd.build())
}

/// Extract the job ID from "Job <123> is submitted to queue <normal>."
pub fn parse_bsub_output(output: &str) -> Option<String> {
    JOB_ID_RE.captures(output).map(|c| c[1].to_string())
}
