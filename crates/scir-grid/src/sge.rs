//! Sun/Univa Grid Engine: `qsub`, `qstat -xml`, `qhold`/`qrls`/`qdel`.

use crate::check_listing;
use once_cell::sync::Lazy;
use regex::Regex;
use scir_core::{
    ControlCommand, JobAction, JobState, JobTemplate, OutputCheck, QueueLoad, SchedulerBackend,
    SchedulerConfig, SchedulerError, ShellCommand, StateSnapshot, SubmitCommand, TemplateError,
};
use scir_parsers::{run_shell, shell_escape};
use std::collections::HashMap;

const NAME: &str = "SGE";

static JOB_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<JB_job_number>([^<]+)").expect("valid regex"));
static STATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<state>(\w+)").expect("valid regex"));
static SUBMIT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Your job (\d+)").expect("valid regex"));
static HOLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)modified hold of").expect("valid regex"));
static DELETED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)has deleted job|has registered").expect("valid regex"));
// Slot columns (resv/used/tot) followed by a load average; dates such as
// 25/12/2010 are not followed by a decimal number.
static SLOTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)/(\d+)/(\d+)\s+\d+\.").expect("valid regex"));

/// Map an SGE state code such as `r`, `qw`, `hqw` or `s`.
pub fn parse_state(state: &str) -> JobState {
    let lower = state.to_ascii_lowercase();
    if lower.contains('r') {
        JobState::Running
    } else if lower.contains('s') {
        JobState::UserSuspended
    } else if lower.contains('h') {
        JobState::UserOnHold
    } else if lower.contains('q') {
        JobState::QueuedActive
    } else {
        JobState::Undetermined
    }
}

/// Parse `qstat -xml` by cutting it at each `<job_list` element.
pub fn parse_qstat_xml(output: &str) -> HashMap<String, JobState> {
    let mut jobs = HashMap::new();
    for chunk in output.split("<job_list").skip(1) {
        let body = chunk.split("</job_list").next().unwrap_or(chunk);
        let Some(id) = JOB_NUMBER_RE.captures(body) else {
            continue;
        };
        let Some(state) = STATE_RE.captures(body) else {
            continue;
        };
        jobs.insert(id[1].trim().to_string(), parse_state(&state[1]));
    }
    jobs
}

/// Sum used and total slots over every queue instance in `qstat -f`.
pub fn parse_slots(output: &str) -> Option<QueueLoad> {
    let mut found = false;
    let (mut used, mut total) = (0u64, 0u64);
    for line in output.lines() {
        let Some(caps) = SLOTS_RE.captures(line) else {
            continue;
        };
        found = true;
        used += caps[2].parse::<u64>().unwrap_or(0);
        total += caps[3].parse::<u64>().unwrap_or(0);
    }
    found.then(|| QueueLoad::Known {
        used: used as f64,
        total: total as f64,
    })
}

/// SGE resolves relative paths against the submission directory, so the
/// command changes into the working directory first and passes `-cwd`.
pub fn qsub_command(config: &SchedulerConfig, template: &JobTemplate) -> Result<String, TemplateError> {
    template.validate()?;

    let program = match template.working_dir() {
        Some(wd) => format!("cd {};{}", shell_escape(wd), config.program("qsub")),
        None => config.program("qsub"),
    };
    let mut cmd = ShellCommand::new(program);
    cmd.raw("-S /bin/bash").raw("-r no");
    if template.working_dir().is_some() {
        cmd.raw("-cwd");
    }
    cmd.opt_if("-N", template.name())
        .opt_if("-o", template.stdout_spec())
        .opt_if("-e", template.stderr_spec());
    if template.join_stderr {
        cmd.raw("-j y");
    }
    cmd.opt_if("-q", template.queue_name());
    if let Some(mem) = template.memory_mb {
        cmd.raw(format!("-l h_vmem={}M", mem));
    }
    cmd.raw_opt(config.extra_submit_args())
        .raw_opt(template.extra_args());
    if let Some(walltime) = template.walltime_seconds {
        cmd.raw(format!("-l h_rt={}", walltime));
    }
    cmd.arg(template.script()).raw("2>&1");
    Ok(cmd.build())
}

#[derive(Debug, Clone)]
pub struct SgeBackend {
    config: SchedulerConfig,
}

impl SgeBackend {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }
}

impl SchedulerBackend for SgeBackend {
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
        let command = format!("{} -xml", self.config.program("qstat"));
        let output = run_shell(&command).await?;
        check_listing(NAME, &command, &output)?;
        Ok(StateSnapshot::from_jobs(parse_qstat_xml(&output.stdout_lossy())))
    }

    fn statestring_to_stateconst(&self, state: &str) -> JobState {
        parse_state(state)
    }

    fn build_control_command(&self, action: JobAction, job_id: &str) -> ControlCommand {
        let (program, check) = match action {
            JobAction::Hold => ("qhold", &HOLD_RE),
            JobAction::Release => ("qrls", &HOLD_RE),
            JobAction::Terminate => ("qdel", &DELETED_RE),
            JobAction::Suspend | JobAction::Resume => return ControlCommand::Unsupported,
        };
        ControlCommand::Shell {
            command: format!("{} {} 2>&1", self.config.program(program), shell_escape(job_id)),
            check: OutputCheck::Matches(check),
        }
    }

    async fn queue_load(&self, _snapshot: Option<&StateSnapshot>) -> QueueLoad {
        let mut command = self.config.program("qstat");
        if let Some(queue) = self
            .config
            .default_queue
            .as_deref()
            .filter(|q| !q.trim().is_empty())
        {
            command.push_str(&format!(" -q {}", shell_escape(queue)));
        }
        command.push_str(" -f 2>&1");
        match run_shell(&command).await {
            Ok(output) => parse_slots(&output.stdout_lossy()).unwrap_or(QueueLoad::Unknown),
            Err(e) => {
                tracing::warn!("Cannot query SGE slots: {}", e);
                QueueLoad::Failed
            }
        }
    }
}
