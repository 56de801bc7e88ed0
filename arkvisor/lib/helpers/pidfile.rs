use std::path::{Path, PathBuf};

use arkutils::ProcessEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::ArkvisorResult;

use super::{program_name, Component};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Extension of pid files.
pub const PID_FILE_SUFFIX: &str = "json";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A record of a launched helper, kept at `<run>/<vm>/<component>.json`.
///
/// Host-wide helpers such as NAT are kept directly under `<run>/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidFile {
    /// The component name.
    pub component: String,

    /// The pid of the spawned process (the privilege wrapper, when there is one).
    pub pid: u32,

    /// The instance tag, for tagged helpers.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tag: Option<String>,

    /// The helper program.
    pub program: String,

    /// When the helper was launched.
    pub started_at: DateTime<Utc>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PidFile {
    /// Creates a record for a helper that was just launched.
    pub fn new(component: Component, pid: u32, tag: Option<&str>, program: &str) -> Self {
        Self {
            component: component.to_string(),
            pid,
            tag: tag.map(str::to_string),
            program: program.to_string(),
            started_at: Utc::now(),
        }
    }

    /// Where the pid file of `component` lives. `vm` is `None` for host-wide helpers.
    pub fn path(run_dir: &Path, vm: Option<&str>, component: Component) -> PathBuf {
        let dir = match vm {
            Some(vm) => run_dir.join(vm),
            None => run_dir.to_path_buf(),
        };
        dir.join(format!("{}.{}", component, PID_FILE_SUFFIX))
    }

    /// Writes the record, creating its directory.
    pub async fn write(&self, path: &Path) -> ArkvisorResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(path, serde_json::to_vec_pretty(self)?).await?;
        Ok(())
    }

    /// Reads a record. A missing file is `None`; an unreadable one is logged and `None`.
    pub async fn read(path: &Path) -> ArkvisorResult<Option<Self>> {
        if !fs::try_exists(path).await? {
            return Ok(None);
        }

        let content = fs::read(path).await?;
        match serde_json::from_slice(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!("ignoring malformed pid file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Reads every record in `dir`, with the path each was read from.
    pub async fn read_all(dir: &Path) -> ArkvisorResult<Vec<(PathBuf, Self)>> {
        let mut records = Vec::new();
        if !fs::try_exists(dir).await? {
            return Ok(records);
        }

        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PID_FILE_SUFFIX) {
                continue;
            }

            if let Some(record) = Self::read(&path).await? {
                records.push((path, record));
            }
        }

        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    /// Returns true if `processes` holds this pid running this helper.
    ///
    /// Matching on the program name as well as the pid guards against a recycled pid.
    pub fn is_alive_in(&self, processes: &[ProcessEntry]) -> bool {
        let name = program_name(&self.program);
        processes
            .iter()
            .any(|entry| entry.pid == self.pid && entry.cmdline.contains(name))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
