//! Sharcnet's `sq*` wrappers: `sqsub`, `sqjobs`, `sqkill`.
//!
//! `sqjobs -n` prints a cluster summary line in the same stream as the
//! per-job lines, so the status refresh also captures the cluster load.

use crate::check_listing;
use crate::pbs::parse_state;
use once_cell::sync::Lazy;
use regex::Regex;
use scir_core::{
    ControlCommand, JobAction, JobState, JobTemplate, OutputCheck, QueueLoad, SchedulerBackend,
    SchedulerConfig, SchedulerError, ShellCommand, StateSnapshot, SubmitCommand, TemplateError,
};
use scir_parsers::{run_shell, shell_escape};
use std::collections::HashMap;

const NAME: &str = "Sharcnet";

static LOAD_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s+CPUs.*\D(\d+)\s+jobs running").expect("valid regex"));
static JOB_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w\S+)\s+\S+\s+(\S+)").expect("valid regex"));
static SUBMIT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"as jobid\s+(\S+)").expect("valid regex"));
static TERMINATED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"is being terminated").expect("valid regex"));

/// Parse the combined `sqjobs -u <user>; sqjobs -n` output.
///
/// The summary line (`2460 CPUs total, ... 1251 jobs running; ...`) gives
/// the load as running jobs against CPUs.
pub fn parse_sqjobs(output: &str) -> StateSnapshot {
    let mut jobs = HashMap::new();
    let mut load = None;

    for line in output.lines() {
        if let Some(caps) = LOAD_LINE_RE.captures(line) {
            if let (Ok(cpus), Ok(running)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
                load = Some(QueueLoad::known(running, cpus));
            }
            continue;
        }
        let Some(caps) = JOB_LINE_RE.captures(line) else {
            continue;
        };
        if &caps[1] == "jobid" {
            continue;
        }
        jobs.insert(caps[1].to_string(), parse_state(&caps[2]));
    }

    StateSnapshot { jobs, load }
}

/// sqsub takes its runtime in minutes and mixes stdout with stderr unless
/// a distinct error file is given.
pub fn sqsub_command(config: &SchedulerConfig, template: &JobTemplate) -> Result<String, TemplateError> {
    template.validate()?;

    let program = match template.working_dir() {
        Some(wd) => format!("cd {}; {}", shell_escape(wd), config.program("sqsub")),
        None => config.program("sqsub"),
    };
    let mut cmd = ShellCommand::new(program);
    cmd.opt_if("-j", template.name())
        .opt_if("-o", template.stdout_path());
    if let Some(err) = template.stderr_path() {
        if !template.join_stderr && template.stdout_path() != Some(err) {
            cmd.opt("-e", err);
        }
    }
    cmd.opt_if("-q", template.queue_name());
    if let Some(walltime) = template.walltime_seconds {
        cmd.raw(format!("-r {}m", walltime / 60 + 1));
    }
    if let Some(mem) = template.memory_mb {
        cmd.raw(format!("--mpp={}M", mem));
    }
    if let Some(cores) = template.ncores {
        cmd.raw(format!("-n {}", cores));
    }
    cmd.raw_opt(config.extra_submit_args())
        .raw_opt(template.extra_args())
        .raw("/bin/bash")
        .arg(template.script())
        .raw("2>&1");
    Ok(cmd.build())
}

#[derive(Debug, Clone)]
pub struct SharcnetBackend {
    config: SchedulerConfig,
}

impl SharcnetBackend {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }
}

impl SchedulerBackend for SharcnetBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn build_submit_command(&self, template: &JobTemplate) -> Result<SubmitCommand, SchedulerError> {
        Ok(SubmitCommand::shell(sqsub_command(&self.config, template)?))
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
        let sqjobs = self.config.program("sqjobs");
        let command = format!(
            "{} -u {} 2>/dev/null;{} -n",
            sqjobs,
            shell_escape(&self.config.user),
            sqjobs
        );
        let output = run_shell(&command).await?;
        check_listing(NAME, &command, &output)?;
        Ok(parse_sqjobs(&output.stdout_lossy()))
    }

    fn statestring_to_stateconst(&self, state: &str) -> JobState {
        parse_state(state)
    }

    fn build_control_command(&self, action: JobAction, job_id: &str) -> ControlCommand {
        match action {
            JobAction::Terminate => ControlCommand::Shell {
                command: format!("{} {} 2>&1", self.config.program("sqkill"), shell_escape(job_id)),
                check: OutputCheck::Matches(&TERMINATED_RE),
            },
            _ => ControlCommand::Unsupported,
        }
    }

    fn load_from_status(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{calls, config_for, fake_bin};
    use scir_core::Session;
    use std::time::Duration;

    const SQJOBS: &str = "\
  jobid  queue state ncpus   prio    nodes time command
------- ------ ----- ----- ------ -------- ---- ------------
 169799  nrap1     R     1        wha309 615s ~alice/x.sh
";

    const SQJOBS_LEFT: &str = "\
jobid queue state ncpus prio  nodes time command
------ ----- ----- ----- ---- ------ ---- ------------
169799 nrap1     R     1      wha309 615s ~alice/x.sh
169800 nrap1     Q     1             0s ~alice/y.sh
2460 CPUs total, 837 idle, 1623 busy; 1251 jobs running; 0 suspended, 11515 queued.
0 reserved cpus
";

    #[test]
    fn test_parse_sqjobs() {
        let snapshot = parse_sqjobs(SQJOBS_LEFT);
        assert_eq!(snapshot.jobs.len(), 2);
        assert_eq!(snapshot.jobs["169799"], JobState::Running);
        assert_eq!(snapshot.jobs["169800"], JobState::QueuedActive);
        assert_eq!(snapshot.load, Some(QueueLoad::known(1251u32, 2460u32)));
    }

    #[test]
    fn test_indented_lines_are_not_jobs() {
        let snapshot = parse_sqjobs(SQJOBS);
        assert!(snapshot.jobs.is_empty());
        assert_eq!(snapshot.load, None);
    }

    #[test]
    fn test_unknown_states_are_undetermined() {
        let backend = SharcnetBackend::new(SchedulerConfig::default());
        for state in ["", " ", "?", "-", "zz", "\u{1}"] {
            assert_eq!(backend.statestring_to_stateconst(state), JobState::Undetermined, "{:?}", state);
        }
    }

    #[test]
    fn test_sqsub_resource_flags() {
        let template = JobTemplate {
            walltime_seconds: Some(59),
            memory_mb: Some(2000),
            ncores: Some(4),
            ..JobTemplate::new("s.sh")
        };
        assert_eq!(
            sqsub_command(&SchedulerConfig::default(), &template).unwrap(),
            "sqsub -r 1m --mpp=2000M -n 4 /bin/bash 's.sh' 2>&1"
        );

        let template = JobTemplate {
            walltime_seconds: Some(3600),
            ..JobTemplate::new("s.sh")
        };
        assert!(
            sqsub_command(&SchedulerConfig::default(), &template)
                .unwrap()
                .contains(" -r 61m ")
        );
    }

    #[test]
    fn test_sqsub_command() {
        let template = JobTemplate {
            name: Some("t".to_string()),
            working_dir: Some("/w".to_string()),
            stdout: Some("/w/out".to_string()),
            stderr: Some("/w/out".to_string()),
            walltime_seconds: Some(600),
            ..JobTemplate::new("s.sh")
        };
        assert_eq!(
            sqsub_command(&SchedulerConfig::default(), &template).unwrap(),
            "cd '/w'; sqsub -j 't' -o '/w/out' -r 11m /bin/bash 's.sh' 2>&1"
        );

        let template = JobTemplate {
            stderr: Some("/w/err".to_string()),
            ..template
        };
        assert!(
            sqsub_command(&SchedulerConfig::default(), &template)
                .unwrap()
                .contains("-e '/w/err'")
        );
    }

    #[tokio::test]
    async fn test_submit_poll_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        std::fs::write(dir.path().join("sqjobs.out"), SQJOBS_LEFT).unwrap();
        // -u prints the header and job lines, -n the cluster summary
        fake_bin(
            &dir,
            "sqjobs",
            &format!(
                "echo \"sqjobs $*\" >> '{}'\n\
                 if [ \"$1\" = -u ]; then head -4 '{}'; else tail -2 '{}'; fi",
                log.display(),
                dir.path().join("sqjobs.out").display(),
                dir.path().join("sqjobs.out").display()
            ),
        );
        fake_bin(&dir, "sqsub", "echo 'submitted as jobid 169800'");

        let mut session =
            Session::new(SharcnetBackend::new(config_for(&dir)), Duration::from_secs(30));
        let job_id = session.run(&JobTemplate::new("y.sh")).await.unwrap();
        assert_eq!(job_id, "169800");
        assert_eq!(session.job_ps(&job_id, None).await.unwrap(), JobState::QueuedActive);
        assert_eq!(
            session.queue_tasks_tot_max().await,
            QueueLoad::known(1251u32, 2460u32)
        );
        assert_eq!(calls(&dir), vec!["sqjobs -u alice", "sqjobs -n"]);
    }

    #[tokio::test]
    async fn test_only_terminate_is_available() {
        let dir = tempfile::tempdir().unwrap();
        fake_bin(&dir, "sqkill", r#"echo "Job $1 is being terminated""#);
        let backend = SharcnetBackend::new(config_for(&dir));

        assert!(backend.control(JobAction::Terminate, "169799").await.is_ok());
        for action in [JobAction::Hold, JobAction::Release, JobAction::Suspend, JobAction::Resume] {
            assert!(matches!(
                backend.control(action, "169799").await,
                Err(SchedulerError::ActionNotAvailable { .. })
            ));
        }
    }
}
