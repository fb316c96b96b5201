//! MOAB: `msub`, `showq --xml`, `mjobctl` and `canceljob`.
//!
//! The showq XML dump carries a `<cluster>` element with processor totals,
//! which is kept alongside the job states as the cluster load.

use crate::check_listing;
use once_cell::sync::Lazy;
use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use scir_core::{
    ControlCommand, JobAction, JobState, JobTemplate, OutputCheck, QueueLoad, SchedulerBackend,
    SchedulerConfig, SchedulerError, ShellCommand, StateSnapshot, SubmitCommand, TemplateError,
};
use scir_parsers::{run_shell, shell_escape};
use std::collections::HashMap;

const NAME: &str = "MOAB";

static DATA_OPEN_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r"(?im-u)^\s*<Data>").expect("valid regex"));
static DATA_CLOSE_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r"(?im-u)</Data>\s*$").expect("valid regex"));
static CLUSTER_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r"(?-u)<cluster.*?</cluster>").expect("valid regex"));
static JOB_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r"(?i-u)<job\s[\S\s]*?</job>").expect("valid regex"));
static JOB_ID_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r#"(?i-u)\bJobID="(\S+?)""#).expect("valid regex"));
static JOB_STATE_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r#"(?i-u)\bState="(\S+?)""#).expect("valid regex"));
static ALLOC_PROCS_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r#"LocalAllocProcs="(\d+)""#).expect("valid regex"));
static UP_PROCS_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r#"LocalUpProcs="(\d+)""#).expect("valid regex"));

static RUNNING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Run|Starting").expect("valid regex"));
static QUEUED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Idle|Queue|Defer|Staged").expect("valid regex"));
static HOLD_STATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)H[oe]ld").expect("valid regex"));
static SUSPENDED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Suspend").expect("valid regex"));

static HOLDS_MODIFIED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)holds modified for job").expect("valid regex"));
static CANCELLED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)job '\S+' cancelled").expect("valid regex"));

/// Map a MOAB job state such as `Running`, `Idle` or `BatchHold`.
pub fn parse_state(state: &str) -> JobState {
    if RUNNING_RE.is_match(state) {
        JobState::Running
    } else if QUEUED_RE.is_match(state) {
        JobState::QueuedActive
    } else if HOLD_STATE_RE.is_match(state) {
        JobState::UserOnHold
    } else if SUSPENDED_RE.is_match(state) {
        JobState::UserSuspended
    } else {
        JobState::Undetermined
    }
}

fn captured_number(re: &BytesRegex, haystack: &[u8]) -> Option<u64> {
    let caps = re.captures(haystack)?;
    std::str::from_utf8(&caps[1]).ok()?.parse().ok()
}

/// Parse a `showq --xml` dump into job states and cluster load.
///
/// A job without a `State` attribute is taken to be running.
pub fn parse_showq_xml(output: &[u8]) -> Result<StateSnapshot, SchedulerError> {
    if !DATA_OPEN_RE.is_match(output) || !DATA_CLOSE_RE.is_match(output) {
        return Err(SchedulerError::StatusUnavailable {
            backend: NAME,
            message: format!(
                "showq did not return an XML document: {}",
                String::from_utf8_lossy(output).trim()
            ),
        });
    }

    let load = CLUSTER_RE.find(output).map(|cluster| {
        let cluster = cluster.as_bytes();
        match (
            captured_number(&ALLOC_PROCS_RE, cluster),
            captured_number(&UP_PROCS_RE, cluster),
        ) {
            (Some(used), Some(total)) => QueueLoad::Known {
                used: used as f64,
                total: total as f64,
            },
            _ => QueueLoad::Unknown,
        }
    });

    let mut jobs = HashMap::new();
    for job in JOB_RE.find_iter(output) {
        let job = job.as_bytes();
        let Some(id) = JOB_ID_RE.captures(job) else {
            continue;
        };
        let state = JOB_STATE_RE
            .captures(job)
            .map(|c| parse_state(&String::from_utf8_lossy(&c[1])))
            .unwrap_or(JobState::Running);
        jobs.insert(String::from_utf8_lossy(&id[1]).into_owned(), state);
    }

    Ok(StateSnapshot { jobs, load })
}

pub fn msub_command(config: &SchedulerConfig, template: &JobTemplate) -> Result<String, TemplateError> {
    template.validate()?;

    let mut cmd = ShellCommand::new(config.program("msub"));
    cmd.opt_if("-q", template.queue_name())
        .raw("-S /bin/bash")
        .raw("-r n")
        .opt_if("-d", template.working_dir())
        .opt_if("-N", template.name())
        .opt_if("-o", template.stdout_spec())
        .opt_if("-e", template.stderr_spec());
    if template.join_stderr {
        cmd.raw("-j oe");
    }
    if let Some(mem) = template.memory_mb {
        cmd.raw(format!("-l mem={}mb", mem));
    }
    if let Some(cores) = template.ncores {
        cmd.raw(format!("-l nodes=1:ppn={}", cores));
    }
    cmd.raw_opt(config.extra_submit_args())
        .raw_opt(template.extra_args());
    if let Some(walltime) = template.walltime_seconds {
        cmd.raw(format!("-l walltime={}", walltime));
    }
    cmd.arg(template.script()).raw("2>&1");
    Ok(cmd.build())
}

/// The job ID is the first word msub prints, unless it is an error.
pub fn parse_msub_output(output: &str) -> Option<String> {
    let first = output.split_whitespace().next()?;
    (!first.to_ascii_lowercase().contains("error")).then(|| first.to_string())
}

#[derive(Debug, Clone)]
pub struct MoabBackend {
    config: SchedulerConfig,
}

impl MoabBackend {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }
}

impl SchedulerBackend for MoabBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build_submit_command(&self, template: &JobTemplate) -> Result<SubmitCommand, SchedulerError> {
        Ok(SubmitCommand::shell(msub_command(&self.config, template)?))
    }

    fn parse_job_id(&self, output: &str) -> Result<String, SchedulerError> {
        parse_msub_output(output).ok_or_else(|| SchedulerError::UnparsableJobId {
            backend: NAME,
            output: output.to_string(),
        })
    }

    async fn refresh_states(&self) -> Result<StateSnapshot, SchedulerError> {
        let command = format!("{} --xml", self.config.program("showq"));
        let output = run_shell(&command).await?;
        check_listing(NAME, &command, &output)?;
        parse_showq_xml(&output.stdout)
    }

    fn statestring_to_stateconst(&self, state: &str) -> JobState {
        parse_state(state)
    }

    fn build_control_command(&self, action: JobAction, job_id: &str) -> ControlCommand {
        let (command, check) = match action {
            JobAction::Hold => (
                format!("{} -h user", self.config.program("mjobctl")),
                &HOLDS_MODIFIED_RE,
            ),
            JobAction::Release => (
                format!("{} -u user", self.config.program("mjobctl")),
                &HOLDS_MODIFIED_RE,
            ),
            JobAction::Terminate => (self.config.program("canceljob"), &CANCELLED_RE),
            JobAction::Suspend | JobAction::Resume => return ControlCommand::Unsupported,
        };
        ControlCommand::Shell {
            command: format!("{} {} 2>&1", command, shell_escape(job_id)),
            check: OutputCheck::Matches(check),
        }
    }

    fn load_from_status(&self) -> bool {
        true
    }
}
