//! Composition root for scir.
//!
//! Maps a [`BackendKind`] to a concrete adapter, keeps one cached
//! [`Session`](scir_core::Session) per backend, and owns the registry of
//! SSH masters.

pub mod backend;
pub mod client;

pub use backend::{Backend, BackendKind, UnknownBackend};
pub use client::{SchedulerClient, SharedSession};
