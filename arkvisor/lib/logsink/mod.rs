//! `arkvisor::logsink` allocates per-request log directories and per-component log files.

mod manager;
mod policy;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use manager::*;
pub use policy::*;
