//! Jobs run as detached Unix process groups on the local host.
//!
//! The job ID is the PID of the process group leader. States come from
//! `ps`, and the load figures from `uptime` and the processor count.

pub mod backend;
pub mod hostload;

pub use backend::UnixBackend;
pub use hostload::host_load;
