//! VM lifecycle operations.
//!
//! Every operation is a method on [`Orchestrator`], split across files by operation.

mod create;
mod log;
mod migrate;
mod orchestrator;
mod start;
mod status;
mod stop;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use migrate::remote_peer_addr;
pub use orchestrator::*;
pub use stop::tag_pattern;
