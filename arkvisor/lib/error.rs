use std::{
    error::Error,
    fmt::{self, Display},
    path::PathBuf,
};
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an arkvisor-related operation.
pub type ArkvisorResult<T> = Result<T, ArkvisorError>;

/// An error that occurred during a VM lifecycle operation.
#[derive(Debug, Error)]
pub enum ArkvisorError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error from the process and log utilities.
    #[error(transparent)]
    Utils(#[from] arkutils::ArkutilsError),

    /// An error that occurred while encoding or decoding JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred while parsing a TOML configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred during an HTTP middleware operation.
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// The VM name cannot be used to derive paths or process tags.
    #[error("invalid vm name `{0}`: {1}")]
    InvalidVmName(String, String),

    /// A request was well-formed JSON but carried unusable values.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The configuration is inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The VM has not been packaged, so there is nothing to start.
    #[error("vm `{name}` is not packaged: missing {}", .missing.display())]
    NotPackaged {
        /// The VM name.
        name: String,

        /// The first package file found missing.
        missing: PathBuf,
    },

    /// An artifact download did not produce usable content.
    #[error("download of {url} failed: {reason}")]
    DownloadFailed {
        /// The URL that was fetched.
        url: String,

        /// What went wrong.
        reason: String,
    },

    /// The packager failed to extract an artifact.
    #[error("extraction of {} failed with {status}: {output}", .archive.display())]
    ExtractionFailed {
        /// The archive being extracted.
        archive: PathBuf,

        /// The exit status of the packager.
        status: String,

        /// Everything the packager printed.
        output: String,
    },

    /// An extracted file is missing or empty.
    #[error("extracted file {} is missing or empty", .0.display())]
    MissingArtifact(PathBuf),

    /// A helper process could not be launched.
    #[error("failed to launch {component}: {source}")]
    HelperLaunch {
        /// The component being launched.
        component: String,

        /// The underlying failure.
        #[source]
        source: arkutils::ArkutilsError,
    },

    /// A host preparation step failed.
    #[error("host preparation step `{step}` failed: {source}")]
    HostPreparation {
        /// The step that failed.
        step: String,

        /// The underlying failure.
        #[source]
        source: arkutils::ArkutilsError,
    },

    /// No log exists for the requested VM or component.
    #[error("no logs found for {0}")]
    LogsNotFound(String),
}

/// The broad cause of an [`ArkvisorError`], for callers that need to branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request itself was unusable. Nothing was changed.
    Validation,

    /// The host could not be prepared (directories, ownership, kernel modules).
    Environment,

    /// An artifact could not be downloaded, extracted or verified.
    Artifact,

    /// A helper process could not be spawned.
    HelperLaunch,

    /// The VM is not in a state that allows the operation.
    Precondition,

    /// Anything else.
    Internal,
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ArkvisorError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> ArkvisorError {
        ArkvisorError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArkvisorError::InvalidVmName(..)
            | ArkvisorError::InvalidRequest(_)
            | ArkvisorError::InvalidConfig(_) => ErrorKind::Validation,
            ArkvisorError::Io(_) | ArkvisorError::HostPreparation { .. } => ErrorKind::Environment,
            ArkvisorError::HttpRequest(_)
            | ArkvisorError::HttpMiddleware(_)
            | ArkvisorError::DownloadFailed { .. }
            | ArkvisorError::ExtractionFailed { .. }
            | ArkvisorError::MissingArtifact(_) => ErrorKind::Artifact,
            ArkvisorError::HelperLaunch { .. } => ErrorKind::HelperLaunch,
            ArkvisorError::NotPackaged { .. } | ArkvisorError::LogsNotFound(_) => {
                ErrorKind::Precondition
            }
            ArkvisorError::Custom(_)
            | ArkvisorError::Utils(_)
            | ArkvisorError::Json(_)
            | ArkvisorError::ConfigParse(_) => ErrorKind::Internal,
        }
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

/// Creates an `Ok` `ArkvisorResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> ArkvisorResult<T> {
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

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
