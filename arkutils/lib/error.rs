//! `arkutils::error` is a module containing error utilities for the arkvisor project.

use std::{
    error::Error,
    fmt::{self, Display},
};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an arkutils-related operation.
pub type ArkutilsResult<T> = Result<T, ArkutilsError>;

/// An error that occurred while launching, probing or signalling a process.
#[derive(pretty_error_debug::Debug, Error)]
pub enum ArkutilsError {
    /// An error that occurred when resolving a binary
    #[error("binary not found: {0}\nSource: {1}")]
    BinaryNotFound(String, String),

    /// An error that occurred when performing an IO operation
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// A command ran to completion but exited unsuccessfully
    #[error("command `{command}` failed with {status}: {output}")]
    CommandFailed {
        /// The command line that was run.
        command: String,

        /// The exit status as reported by the OS.
        status: String,

        /// Combined stdout and stderr of the command.
        output: String,
    },

    /// A spawned child did not report a process ID
    #[error("process id not available for `{0}`")]
    ProcessIdNotFound(String),

    /// Sending a signal to a process failed
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        /// The process that was targeted.
        pid: u32,

        /// The underlying errno.
        #[source]
        source: nix::errno::Errno,
    },

    /// Custom error.
    #[error("Custom error: {0}")]
    Custom(#[from] AnyError),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ArkutilsError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> ArkutilsError {
        ArkutilsError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Returns true if the error is a signal delivery refused for lack of privileges.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            ArkutilsError::Signal {
                source: nix::errno::Errno::EPERM,
                ..
            }
        )
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `ArkutilsResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> ArkutilsResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}
