//! The closed set of backends, behind one [`SchedulerBackend`] impl.

use scir_cloud::{AwsBackend, GcloudBatchBackend, OpenStackBackend};
use scir_core::{
    ControlCommand, JobAction, JobState, JobTemplate, QueueLoad, SchedulerBackend, SchedulerConfig,
    SchedulerError, StateSnapshot, SubmitCommand,
};
use scir_grid::{MoabBackend, PbsBackend, SgeBackend, SharcnetBackend};
use scir_local::UnixBackend;
use scir_lsf::LsfBackend;
use scir_slurm::SlurmBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which scheduler, process table or cloud API runs the jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "unix")]
    Unix,
    #[serde(rename = "pbs")]
    Pbs,
    #[serde(rename = "sge")]
    Sge,
    #[serde(rename = "lsf")]
    Lsf,
    #[serde(rename = "moab")]
    Moab,
    #[serde(rename = "slurm")]
    Slurm,
    #[serde(rename = "sharcnet")]
    Sharcnet,
    #[serde(rename = "aws")]
    Aws,
    #[serde(rename = "openstack")]
    OpenStack,
    #[serde(rename = "gcloud-batch")]
    GcloudBatch,
}

impl BackendKind {
    pub const ALL: [BackendKind; 10] = [
        Self::Unix,
        Self::Pbs,
        Self::Sge,
        Self::Lsf,
        Self::Moab,
        Self::Slurm,
        Self::Sharcnet,
        Self::Aws,
        Self::OpenStack,
        Self::GcloudBatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unix => "unix",
            Self::Pbs => "pbs",
            Self::Sge => "sge",
            Self::Lsf => "lsf",
            Self::Moab => "moab",
            Self::Slurm => "slurm",
            Self::Sharcnet => "sharcnet",
            Self::Aws => "aws",
            Self::OpenStack => "openstack",
            Self::GcloudBatch => "gcloud-batch",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backend '{0}' (expected one of: unix, pbs, sge, lsf, moab, slurm, sharcnet, aws, openstack, gcloud-batch)")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| UnknownBackend(s.to_string()))
    }
}

/// Any of the adapters.
#[derive(Debug, Clone)]
pub enum Backend {
    Unix(UnixBackend),
    Pbs(PbsBackend),
    Sge(SgeBackend),
    Lsf(LsfBackend),
    Moab(MoabBackend),
    Slurm(SlurmBackend),
    Sharcnet(SharcnetBackend),
    Aws(AwsBackend),
    OpenStack(OpenStackBackend),
    GcloudBatch(GcloudBatchBackend),
}

macro_rules! dispatch {
    ($backend:expr, $inner:ident => $body:expr) => {
        match $backend {
            Backend::Unix($inner) => $body,
            Backend::Pbs($inner) => $body,
            Backend::Sge($inner) => $body,
            Backend::Lsf($inner) => $body,
            Backend::Moab($inner) => $body,
            Backend::Slurm($inner) => $body,
            Backend::Sharcnet($inner) => $body,
            Backend::Aws($inner) => $body,
            Backend::OpenStack($inner) => $body,
            Backend::GcloudBatch($inner) => $body,
        }
    };
}

impl Backend {
    pub fn new(kind: BackendKind, config: SchedulerConfig) -> Self {
        match kind {
            BackendKind::Unix => Self::Unix(UnixBackend::new(config)),
            BackendKind::Pbs => Self::Pbs(PbsBackend::new(config)),
            BackendKind::Sge => Self::Sge(SgeBackend::new(config)),
            BackendKind::Lsf => Self::Lsf(LsfBackend::new(config)),
            BackendKind::Moab => Self::Moab(MoabBackend::new(config)),
            BackendKind::Slurm => Self::Slurm(SlurmBackend::new(config)),
            BackendKind::Sharcnet => Self::Sharcnet(SharcnetBackend::new(config)),
            BackendKind::Aws => Self::Aws(AwsBackend::new(config)),
            BackendKind::OpenStack => Self::OpenStack(OpenStackBackend::new(config)),
            BackendKind::GcloudBatch => Self::GcloudBatch(GcloudBatchBackend::new(config)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Unix(_) => BackendKind::Unix,
            Self::Pbs(_) => BackendKind::Pbs,
            Self::Sge(_) => BackendKind::Sge,
            Self::Lsf(_) => BackendKind::Lsf,
            Self::Moab(_) => BackendKind::Moab,
            Self::Slurm(_) => BackendKind::Slurm,
            Self::Sharcnet(_) => BackendKind::Sharcnet,
            Self::Aws(_) => BackendKind::Aws,
            Self::OpenStack(_) => BackendKind::OpenStack,
            Self::GcloudBatch(_) => BackendKind::GcloudBatch,
        }
    }

    /// The SLURM adapter, for its accounting queries.
    pub fn as_slurm(&self) -> Option<&SlurmBackend> {
        match self {
            Self::Slurm(slurm) => Some(slurm),
            _ => None,
        }
    }
}

impl SchedulerBackend for Backend {
    fn name(&self) -> &'static str {
        dispatch!(self, b => b.name())
    }

    fn build_submit_command(&self, template: &JobTemplate) -> Result<SubmitCommand, SchedulerError> {
        dispatch!(self, b => b.build_submit_command(template))
    }

    fn parse_job_id(&self, output: &str) -> Result<String, SchedulerError> {
        dispatch!(self, b => b.parse_job_id(output))
    }

    async fn submit(&self, template: &JobTemplate) -> Result<String, SchedulerError> {
        dispatch!(self, b => b.submit(template).await)
    }

    async fn refresh_states(&self) -> Result<StateSnapshot, SchedulerError> {
        dispatch!(self, b => b.refresh_states().await)
    }

    fn statestring_to_stateconst(&self, state: &str) -> JobState {
        dispatch!(self, b => b.statestring_to_stateconst(state))
    }

    fn build_control_command(&self, action: JobAction, job_id: &str) -> ControlCommand {
        dispatch!(self, b => b.build_control_command(action, job_id))
    }

    async fn control(&self, action: JobAction, job_id: &str) -> Result<(), SchedulerError> {
        dispatch!(self, b => b.control(action, job_id).await)
    }

    fn load_from_status(&self) -> bool {
        dispatch!(self, b => b.load_from_status())
    }

    async fn queue_load(&self, snapshot: Option<&StateSnapshot>) -> QueueLoad {
        dispatch!(self, b => b.queue_load(snapshot).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scir_core::TemplateError;

    #[test]
    fn test_kind_names() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
        assert_eq!("SLURM".parse::<BackendKind>().unwrap(), BackendKind::Slurm);
        assert_eq!(
            "condor".parse::<BackendKind>(),
            Err(UnknownBackend("condor".to_string()))
        );
    }

    #[test]
    fn test_backend_for_each_kind() {
        for kind in BackendKind::ALL {
            let backend = Backend::new(kind, SchedulerConfig::default());
            assert_eq!(backend.kind(), kind);
            assert!(!backend.name().is_empty());
        }
        let slurm = Backend::new(BackendKind::Slurm, SchedulerConfig::default());
        assert!(slurm.as_slurm().is_some());
        assert!(!slurm.load_from_status());
    }

    #[test]
    fn test_dispatch_reaches_the_adapter() {
        let pbs = Backend::new(BackendKind::Pbs, SchedulerConfig::default());
        assert_eq!(pbs.statestring_to_stateconst("R"), JobState::Running);

        let moab = Backend::new(BackendKind::Moab, SchedulerConfig::default());
        assert!(moab.load_from_status());

        let aws = Backend::new(BackendKind::Aws, SchedulerConfig::default());
        assert!(matches!(
            aws.build_control_command(JobAction::Suspend, "i-1"),
            ControlCommand::Unsupported
        ));
        assert!(
            aws.build_submit_command(&JobTemplate {
                command: "/bin/sh".to_string(),
                ..JobTemplate::new("/w/job.sh")
            })
            .is_err()
        );
    }

    #[test]
    fn test_every_backend_rejects_malformed_templates() {
        let valid = JobTemplate {
            name: Some("job".to_string()),
            ..JobTemplate::new("/w/job.sh")
        };
        let malformed = [
            (
                JobTemplate {
                    command: "/bin/sh".to_string(),
                    ..valid.clone()
                },
                TemplateError::UnsupportedCommand("/bin/sh".to_string()),
            ),
            (
                JobTemplate {
                    args: Vec::new(),
                    ..valid.clone()
                },
                TemplateError::ScriptArgumentCount(0),
            ),
            (
                JobTemplate {
                    args: vec!["/w/a.sh".to_string(), "/w/b.sh".to_string()],
                    ..valid.clone()
                },
                TemplateError::ScriptArgumentCount(2),
            ),
            (
                JobTemplate {
                    stdin: Some("/w/in".to_string()),
                    ..valid.clone()
                },
                TemplateError::StdinNotSupported,
            ),
        ];

        for kind in BackendKind::ALL {
            let backend = Backend::new(kind, SchedulerConfig::default());
            for (template, expected) in &malformed {
                match backend.build_submit_command(template) {
                    Err(SchedulerError::Template(e)) => assert_eq!(&e, expected, "{}", kind),
                    other => panic!("{}: expected {:?}, got {:?}", kind, expected, other),
                }
            }
        }
    }
}
