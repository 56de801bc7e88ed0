//! `arkvisor::helpers` knows the command-line grammar of the external helper programs and
//! how their pid files are kept.

mod command;
mod pidfile;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use command::*;
pub use pidfile::*;
