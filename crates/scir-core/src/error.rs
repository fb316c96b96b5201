//! Scheduler operation errors.

use crate::backend::JobAction;
use crate::template::TemplateError;
use scir_parsers::CommandError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("There is no '{action}' action available for {backend}")]
    ActionNotAvailable {
        backend: &'static str,
        action: JobAction,
    },

    #[error("Cannot find job ID in {backend} submission output: {output}")]
    UnparsableJobId {
        backend: &'static str,
        output: String,
    },

    #[error("Cannot get {backend} status listing: {message}")]
    StatusUnavailable {
        backend: &'static str,
        message: String,
    },

    #[error("Error during {action} of {backend} job {job_id}: {output}")]
    ControlFailed {
        backend: &'static str,
        action: JobAction,
        job_id: String,
        output: String,
    },

    #[error("Failed to write submission file: {0}")]
    Io(#[from] std::io::Error),
}
