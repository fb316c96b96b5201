//! LSF integration for scir.
//!
//! Submit with bsub, poll with bjobs, and control jobs with
//! bstop, bresume and bkill.

pub mod backend;
pub mod bjobs;
pub mod bsub;

pub use backend::LsfBackend;
