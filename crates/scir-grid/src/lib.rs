//! Adapters for the qsub family of batch schedulers.
//!
//! PBS/Torque, Sun Grid Engine, MOAB and the Sharcnet `sq*` tools share a
//! submission model (one bash script, `-o`/`-e` files, a walltime) but
//! each has its own status listing and control vocabulary.

pub mod moab;
pub mod pbs;
pub mod sge;
pub mod sharcnet;

pub use moab::MoabBackend;
pub use pbs::PbsBackend;
pub use sge::SgeBackend;
pub use sharcnet::SharcnetBackend;

use scir_core::SchedulerError;
use scir_parsers::ShellOutput;

/// Reject a status listing that produced only error messages.
pub(crate) fn check_listing(
    backend: &'static str,
    command: &str,
    output: &ShellOutput,
) -> Result<(), SchedulerError> {
    if output.is_blank_with_errors() {
        return Err(SchedulerError::StatusUnavailable {
            backend,
            message: format!("{}: {}", command, output.stderr_lossy().trim()),
        });
    }
    Ok(())
}
