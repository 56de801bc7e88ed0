//! `arkutils::runtime` is a module containing process supervision utilities.

mod command;
mod monitor;
mod supervisor;
mod table;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use command::*;
pub use monitor::*;
pub use supervisor::*;
pub use table::*;
