use std::{
    collections::HashMap,
    fmt::Display,
    fs::{File, OpenOptions},
    io::Write,
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
};

use chrono::Local;
use tokio::fs;

use crate::{config::LOG_DIR_TIME_FORMAT, ArkvisorResult};

use super::LogRetentionPolicy;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The log directory of one lifecycle request.
///
/// Each request gets `<log_root>/<vm>/<YYYY-MM-DD_HH-MM-SS>/`, and each component gets one
/// append-only `<component>.log` inside it. The manager owns every handle it opened; they
/// are all closed together when it is dropped, whichever way the request ends.
#[derive(Debug)]
pub struct LogManager {
    /// The VM the request is for.
    vm: String,

    /// The request's log directory.
    base_dir: PathBuf,

    /// Opened component logs.
    files: HashMap<String, ComponentLog>,
}

/// An append-only log file of one component.
#[derive(Debug)]
pub struct ComponentLog {
    /// The component name, used as the line prefix.
    component: String,

    /// The log file path.
    path: PathBuf,

    /// The open handle.
    file: File,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LogManager {
    /// Creates the request log directory for `vm` under `log_root`.
    ///
    /// If the policy asks for it, expired request directories of the same VM are pruned
    /// first. Pruning failures are logged and otherwise ignored.
    pub async fn new(
        log_root: impl AsRef<Path>,
        vm: &str,
        policy: &LogRetentionPolicy,
    ) -> ArkvisorResult<Self> {
        let vm_dir = log_root.as_ref().join(vm);

        if policy.auto_cleanup() {
            match policy.cleanup(&vm_dir).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(vm, "pruned {} expired log directories", n),
                Err(e) => tracing::warn!(vm, "failed to prune log directories: {}", e),
            }
        }

        let base_dir = vm_dir.join(Local::now().format(LOG_DIR_TIME_FORMAT).to_string());
        fs::create_dir_all(&base_dir).await?;
        tracing::debug!(vm, "request logs at {}", base_dir.display());

        Ok(Self {
            vm: vm.to_string(),
            base_dir,
            files: HashMap::new(),
        })
    }

    /// The request's log directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The VM the request is for.
    pub fn vm(&self) -> &str {
        &self.vm
    }

    /// Opens `<component>.log`, or returns the handle opened earlier.
    pub fn open(&mut self, component: &str) -> ArkvisorResult<&ComponentLog> {
        if !self.files.contains_key(component) {
            let log = ComponentLog::open(component, &self.base_dir)?;
            self.files.insert(component.to_string(), log);
        }

        Ok(&self.files[component])
    }

    /// Closes every handle.
    pub fn close(mut self) {
        for (_, log) in self.files.drain() {
            if let Err(e) = log.file.sync_all() {
                tracing::debug!("failed to sync {}: {}", log.path.display(), e);
            }
        }
    }
}

impl ComponentLog {
    fn open(component: &str, dir: &Path) -> ArkvisorResult<Self> {
        let path = dir.join(format!("{component}.{}", arkutils::LOG_SUFFIX));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o644)
            .open(&path)?;

        Ok(Self {
            component: component.to_string(),
            path,
            file,
        })
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The component name.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Appends `YYYY/MM/DD HH:MM:SS [component] message` to the log.
    ///
    /// Write failures are reported through `tracing` only.
    pub fn log(&self, message: impl Display) {
        let line = format!(
            "{} [{}] {}\n",
            Local::now().format("%Y/%m/%d %H:%M:%S"),
            self.component,
            message
        );

        if let Err(e) = (&self.file).write_all(line.as_bytes()) {
            tracing::warn!("failed to write to {}: {}", self.path.display(), e);
        }
    }

    /// A second handle to the same file, for binding a child's output streams.
    pub fn try_clone_file(&self) -> ArkvisorResult<File> {
        Ok(self.file.try_clone()?)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the newest request log directory of `vm`, if any.
///
/// Directory names are timestamps that sort chronologically.
pub async fn latest_request_dir(
    log_root: impl AsRef<Path>,
    vm: &str,
) -> ArkvisorResult<Option<PathBuf>> {
    let vm_dir = log_root.as_ref().join(vm);
    if !fs::try_exists(&vm_dir).await? {
        return Ok(None);
    }

    let mut latest: Option<PathBuf> = None;
    let mut entries = fs::read_dir(&vm_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }

        let path = entry.path();
        if latest.as_ref().map_or(true, |l| path.file_name() > l.file_name()) {
            latest = Some(path);
        }
    }

    Ok(latest)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
