//! Backend-neutral job templates.

use crate::config::SchedulerConfig;
use scir_parsers::strip_drmaa_prefix;
use thiserror::Error;

/// The only interpreter a template may launch.
pub const BASH: &str = "/bin/bash";

/// A template that cannot be turned into a submission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Only '/bin/bash' is supported as the job command, got '{0}'")]
    UnsupportedCommand(String),
    #[error("Exactly one script argument is required, got {0}")]
    ScriptArgumentCount(usize),
    #[error("Stdin redirection is not supported for queued jobs")]
    StdinNotSupported,
    #[error("A job name is required")]
    MissingName,
    #[error("Invalid job name '{0}': must start with a letter and contain only letters, digits, '_' and '-'")]
    InvalidName(String),
}

/// Description of a job to run, independent of any backend.
///
/// The job is always a single bash script; backends render the rest of the
/// fields into their own submission flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplate {
    pub name: Option<String>,
    /// Interpreter; must be `/bin/bash`
    pub command: String,
    /// Exactly one element: the script path
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    /// Never supported; present so that callers get a clear error
    pub stdin: Option<String>,
    /// Output file, possibly with a DRMAA `:` prefix
    pub stdout: Option<String>,
    /// Error file, possibly with a DRMAA `:` prefix
    pub stderr: Option<String>,
    /// Send stderr to the stdout file
    pub join_stderr: bool,
    pub queue: Option<String>,
    pub walltime_seconds: Option<u64>,
    pub memory_mb: Option<u64>,
    pub ncores: Option<u32>,
    /// Extra submission arguments, inserted verbatim
    pub extra_args: Option<String>,
}

impl Default for JobTemplate {
    fn default() -> Self {
        Self {
            name: None,
            command: BASH.to_string(),
            args: Vec::new(),
            working_dir: None,
            stdin: None,
            stdout: None,
            stderr: None,
            join_stderr: false,
            queue: None,
            walltime_seconds: None,
            memory_mb: None,
            ncores: None,
            extra_args: None,
        }
    }
}

impl JobTemplate {
    /// A template running `script` with bash.
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            args: vec![script.into()],
            ..Default::default()
        }
    }

    /// Fill in site defaults the caller left unset.
    pub fn with_defaults(mut self, config: &SchedulerConfig) -> Self {
        if self.queue_name().is_none() {
            self.queue = config
                .default_queue
                .as_deref()
                .filter(|q| !q.trim().is_empty())
                .map(str::to_string);
        }
        self
    }

    /// Check the single-script contract shared by every backend.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.command != BASH {
            return Err(TemplateError::UnsupportedCommand(self.command.clone()));
        }
        if self.args.len() != 1 {
            return Err(TemplateError::ScriptArgumentCount(self.args.len()));
        }
        if self.stdin.is_some() {
            return Err(TemplateError::StdinNotSupported);
        }
        Ok(())
    }

    /// The script path. Call [`validate`](Self::validate) first.
    pub fn script(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    pub fn stdout_path(&self) -> Option<&str> {
        non_blank(self.stdout.as_deref()).map(strip_drmaa_prefix)
    }

    pub fn stderr_path(&self) -> Option<&str> {
        non_blank(self.stderr.as_deref()).map(strip_drmaa_prefix)
    }

    /// Output file as given, for qsub-style `[host]:path` arguments.
    pub fn stdout_spec(&self) -> Option<&str> {
        non_blank(self.stdout.as_deref())
    }

    pub fn stderr_spec(&self) -> Option<&str> {
        non_blank(self.stderr.as_deref())
    }

    pub fn working_dir(&self) -> Option<&str> {
        non_blank(self.working_dir.as_deref())
    }

    pub fn name(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    pub fn queue_name(&self) -> Option<&str> {
        non_blank(self.queue.as_deref())
    }

    pub fn extra_args(&self) -> Option<&str> {
        non_blank(self.extra_args.as_deref())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_valid() {
        let t = JobTemplate::new("/scratch/job.sh");
        assert!(t.validate().is_ok());
        assert_eq!(t.script(), "/scratch/job.sh");
    }

    #[test]
    fn test_rejects_other_interpreter() {
        let t = JobTemplate {
            command: "/bin/sh".to_string(),
            ..JobTemplate::new("a.sh")
        };
        assert_eq!(
            t.validate(),
            Err(TemplateError::UnsupportedCommand("/bin/sh".to_string()))
        );
    }

    #[test]
    fn test_rejects_wrong_argument_count() {
        let none = JobTemplate::default();
        assert_eq!(none.validate(), Err(TemplateError::ScriptArgumentCount(0)));

        let two = JobTemplate {
            args: vec!["a.sh".into(), "b.sh".into()],
            ..Default::default()
        };
        assert_eq!(two.validate(), Err(TemplateError::ScriptArgumentCount(2)));
    }

    #[test]
    fn test_rejects_stdin() {
        let t = JobTemplate {
            stdin: Some("/dev/null".to_string()),
            ..JobTemplate::new("a.sh")
        };
        assert_eq!(t.validate(), Err(TemplateError::StdinNotSupported));
    }

    #[test]
    fn test_drmaa_prefix_is_stripped() {
        let t = JobTemplate {
            stdout: Some(":/data/out.log".to_string()),
            stderr: Some("/data/err.log".to_string()),
            ..JobTemplate::new("a.sh")
        };
        assert_eq!(t.stdout_path(), Some("/data/out.log"));
        assert_eq!(t.stderr_path(), Some("/data/err.log"));
        assert_eq!(t.stdout_spec(), Some(":/data/out.log"));
        assert_eq!(t.stderr_spec(), Some("/data/err.log"));
    }

    #[test]
    fn test_default_queue_applies_only_when_blank() {
        let config = SchedulerConfig {
            default_queue: Some("long".to_string()),
            ..Default::default()
        };
        let t = JobTemplate::new("a.sh").with_defaults(&config);
        assert_eq!(t.queue_name(), Some("long"));

        let t = JobTemplate {
            queue: Some("short".to_string()),
            ..JobTemplate::new("a.sh")
        }
        .with_defaults(&config);
        assert_eq!(t.queue_name(), Some("short"));

        let t = JobTemplate {
            queue: Some("  ".to_string()),
            ..JobTemplate::new("a.sh")
        }
        .with_defaults(&config);
        assert_eq!(t.queue_name(), Some("long"));
    }
}
