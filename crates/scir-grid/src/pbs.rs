//! PBS/Torque: `qsub`, `qstat -f`, `qhold`/`qrls`/`qdel`.

use crate::check_listing;
use once_cell::sync::Lazy;
use regex::bytes::Regex as BytesRegex;
use scir_core::{
    ControlCommand, JobAction, JobState, JobTemplate, OutputCheck, QueueLoad, SchedulerBackend,
    SchedulerConfig, SchedulerError, ShellCommand, StateSnapshot, SubmitCommand, TemplateError,
};
use scir_parsers::{run_shell, shell_escape};
use std::collections::HashMap;

const NAME: &str = "PBS";

// qstat can emit junk bytes, so listings are matched as raw bytes.
static JOB_ID_LINE_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r"(?i-u)^Job\s+id\s*:\s*(\S+)").expect("valid regex"));
static JOB_STATE_LINE_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r"(?i-u)^\s*job_state\s*=\s*(\S+)").expect("valid regex"));
static LEADING_DIGITS_RE: Lazy<BytesRegex> =
    Lazy::new(|| BytesRegex::new(r"^\d+").expect("valid regex"));
static SUBMIT_ID_RE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?m)^(\d+)").expect("valid regex"));

/// Map a PBS `job_state` letter. Matching is by containment, in the
/// order R, Q, H, S.
pub fn parse_state(state: &str) -> JobState {
    let upper = state.to_ascii_uppercase();
    if upper.contains('R') {
        JobState::Running
    } else if upper.contains('Q') {
        JobState::QueuedActive
    } else if upper.contains('H') {
        JobState::UserOnHold
    } else if upper.contains('S') {
        JobState::UserSuspended
    } else {
        JobState::Undetermined
    }
}

/// Parse `qstat -f`: a `Job Id:` line opens each record and its
/// `job_state =` line gives the state.
pub fn parse_qstat_full(output: &[u8]) -> HashMap<String, JobState> {
    let mut jobs = HashMap::new();
    let mut current: Option<String> = None;

    for line in output.split(|b| *b == b'\n') {
        let line = line.trim_ascii();
        if let Some(caps) = JOB_ID_LINE_RE.captures(line) {
            let full = caps.get(1).map_or(&b""[..], |m| m.as_bytes());
            let id = LEADING_DIGITS_RE.find(full).map_or(full, |m| m.as_bytes());
            current = Some(String::from_utf8_lossy(id).into_owned());
            continue;
        }
        let Some(caps) = JOB_STATE_LINE_RE.captures(line) else {
            continue;
        };
        if let Some(id) = &current {
            let state = String::from_utf8_lossy(&caps[1]);
            jobs.insert(id.clone(), parse_state(&state));
        }
    }
    jobs
}

/// Parse the last line of `qstat -Q <queue>` (Queue, Max, Tot, ...).
pub fn parse_queue_line(line: &str) -> Option<QueueLoad> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let max: f64 = fields.get(1)?.parse().ok()?;
    let tot: f64 = fields.get(2)?.parse().ok()?;
    Some(QueueLoad::Known {
        used: tot,
        total: max,
    })
}

pub fn qsub_command(config: &SchedulerConfig, template: &JobTemplate) -> Result<String, TemplateError> {
    template.validate()?;

    let mut cmd = ShellCommand::new(config.program("qsub"));
    cmd.raw("-S /bin/bash")
        .raw("-r n")
        .opt_if("-d", template.working_dir())
        .opt_if("-N", template.name())
        .opt_if("-o", template.stdout_spec())
        .opt_if("-e", template.stderr_spec());
    if template.join_stderr {
        cmd.raw("-j oe");
    }
    cmd.opt_if("-q", template.queue_name());
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

#[derive(Debug, Clone)]
pub struct PbsBackend {
    config: SchedulerConfig,
}

impl PbsBackend {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }
}

impl SchedulerBackend for PbsBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build_submit_command(&self, template: &JobTemplate) -> Result<SubmitCommand, SchedulerError> {
        Ok(SubmitCommand::shell(qsub_command(&self.config, template)?))
    }

    fn parse_job_id(&self, output: &str) -> Result<String, SchedulerError> {
        SUBMIT_ID_RE
            .captures(output)
            .map(|c| c[1].to_string())
            .ok_or_else(|| SchedulerError::UnparsableJobId {
                backend: NAME,
                output: output.to_string(),
            })
    }

    async fn refresh_states(&self) -> Result<StateSnapshot, SchedulerError> {
        let command = format!("{} -f", self.config.program("qstat"));
        let output = run_shell(&command).await?;
        check_listing(NAME, &command, &output)?;
        Ok(StateSnapshot::from_jobs(parse_qstat_full(&output.stdout)))
    }

    fn statestring_to_stateconst(&self, state: &str) -> JobState {
        parse_state(state)
    }

    fn build_control_command(&self, action: JobAction, job_id: &str) -> ControlCommand {
        let program = match action {
            JobAction::Hold => "qhold",
            JobAction::Release => "qrls",
            JobAction::Terminate => "qdel",
            JobAction::Suspend | JobAction::Resume => return ControlCommand::Unsupported,
        };
        ControlCommand::Shell {
            command: format!("{} {} 2>&1", self.config.program(program), shell_escape(job_id)),
            check: OutputCheck::EmptyOutput,
        }
    }

    async fn queue_load(&self, _snapshot: Option<&StateSnapshot>) -> QueueLoad {
        let queue = self
            .config
            .default_queue
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or("default");
        let command = format!(
            "{} -Q {} | tail -1",
            self.config.program("qstat"),
            shell_escape(queue)
        );
        match run_shell(&command).await {
            Ok(output) => parse_queue_line(&output.stdout_lossy()).unwrap_or(QueueLoad::Failed),
            Err(e) => {
                tracing::warn!("Cannot query PBS queue load: {}", e);
                QueueLoad::Failed
            }
        }
    }
}
