//! SLURM integration for scir.
//!
//! Submit with sbatch, poll with squeue, cancel with scancel, and read
//! load and accounting figures from sinfo and sacct.

pub mod backend;
pub mod sacct;
pub mod sbatch;
pub mod sinfo;
pub mod squeue;

pub use backend::SlurmBackend;
pub use sacct::{SacctError, SlurmResourceUsage};
