//! Utility functions and types.

mod duration;
mod file;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use duration::*;
pub use file::*;
