//! `arkutils::path` is a module containing path and binary lookup utilities.

use std::path::PathBuf;

use crate::{ArkutilsError, ArkutilsResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The suffix for log files
pub const LOG_SUFFIX: &str = "log";

/// The suffix for rotated log files
pub const ROTATED_LOG_SUFFIX: &str = "old";

/// The default maximum size of a rotating log file before it is rotated (10 MiB).
pub const DEFAULT_LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Resolves a program name against `PATH`.
///
/// Absolute and relative paths are returned as-is if they exist.
pub fn resolve_program(program: &str) -> ArkutilsResult<PathBuf> {
    which::which(program)
        .map_err(|e| ArkutilsError::BinaryNotFound(program.to_string(), e.to_string()))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
