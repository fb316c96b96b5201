//! Core types for scir.
//!
//! Backend-neutral job states, job templates, the [`SchedulerBackend`]
//! trait implemented by every scheduler adapter, and the [`Session`] that
//! caches bulk status listings.

pub mod backend;
pub mod command;
pub mod config;
pub mod error;
pub mod load;
pub mod session;
pub mod state;
pub mod template;

pub use backend::{
    Attachment, ControlCommand, JobAction, OutputCheck, SchedulerBackend, StateSnapshot,
    SubmitCommand,
};
pub use command::ShellCommand;
pub use config::{CloudConfig, GcloudConfig, SchedulerConfig};
pub use error::SchedulerError;
pub use load::QueueLoad;
pub use session::Session;
pub use state::JobState;
pub use template::{JobTemplate, TemplateError};
