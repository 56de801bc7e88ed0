//! `arkvisor::config` holds the daemon configuration, VM request types and their defaults.

mod arkvisor;
mod defaults;
mod tuning;
mod vm;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use arkvisor::*;
pub use defaults::*;
pub use tuning::*;
pub use vm::*;
