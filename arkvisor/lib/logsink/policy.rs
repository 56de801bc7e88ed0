use std::{path::Path, time::Duration};

use chrono::{Local, NaiveDateTime};
use tokio::fs;

use crate::{
    config::{DEFAULT_LOG_MAX_AGE, LOG_DIR_TIME_FORMAT},
    ArkvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Configuration for pruning old per-request log directories.
///
/// This configuration controls:
/// - How long a request's logs are kept before being eligible for deletion
/// - Whether cleanup happens automatically whenever a new request allocates its logs
#[derive(Debug, Clone)]
pub struct LogRetentionPolicy {
    /// Maximum age of a request log directory, judged by the timestamp in its name.
    pub(super) max_age: Duration,

    /// Whether allocating a new request log directory prunes the old ones of the same VM.
    pub(super) auto_cleanup: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LogRetentionPolicy {
    /// Creates a new log retention policy with custom settings.
    pub fn new(max_age: Duration, auto_cleanup: bool) -> Self {
        Self {
            max_age,
            auto_cleanup,
        }
    }

    /// Creates a new policy that retains logs for the specified number of hours.
    pub fn with_max_age_hours(hours: u64) -> Self {
        Self::new(Duration::from_secs(hours * 60 * 60), true)
    }

    /// Creates a new policy that retains logs for the specified number of days.
    pub fn with_max_age_days(days: u64) -> Self {
        Self::new(Duration::from_secs(days * 24 * 60 * 60), true)
    }

    /// A policy that never deletes anything.
    pub fn keep_all() -> Self {
        Self::new(DEFAULT_LOG_MAX_AGE, false)
    }

    /// The maximum age of a request log directory.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Whether cleanup runs automatically.
    pub fn auto_cleanup(&self) -> bool {
        self.auto_cleanup
    }

    /// Removes request log directories under `vm_log_dir` that are older than the max age.
    ///
    /// Entries whose name is not a request timestamp are left alone. Returns the number of
    /// directories removed.
    pub async fn cleanup(&self, vm_log_dir: &Path) -> ArkvisorResult<usize> {
        if !fs::try_exists(vm_log_dir).await? {
            return Ok(0);
        }

        let now = Local::now().naive_local();
        let max_age = chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::MAX);
        let mut removed = 0;

        let mut entries = fs::read_dir(vm_log_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let name = entry.file_name();
            let Some(created) = name
                .to_str()
                .and_then(|n| NaiveDateTime::parse_from_str(n, LOG_DIR_TIME_FORMAT).ok())
            else {
                continue;
            };

            if now.signed_duration_since(created) > max_age {
                match fs::remove_dir_all(entry.path()).await {
                    Ok(()) => {
                        tracing::debug!("removed old log directory {}", entry.path().display());
                        removed += 1;
                    }
                    Err(e) => tracing::warn!(
                        "failed to remove old log directory {}: {}",
                        entry.path().display(),
                        e
                    ),
                }
            }
        }

        Ok(removed)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for LogRetentionPolicy {
    /// Keeps logs for 7 days and prunes automatically.
    fn default() -> Self {
        Self::new(DEFAULT_LOG_MAX_AGE, true)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
