//! `arkutils` is a library containing process and logging utilities for the arkvisor project.
//!
//! It knows nothing about virtual machines. It launches and watches external processes,
//! scans the process table, and keeps size-capped log files.

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod error;
pub mod log;
pub mod path;
pub mod runtime;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use error::*;
pub use log::*;
pub use path::*;
pub use runtime::*;
