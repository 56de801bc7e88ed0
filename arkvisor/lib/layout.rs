//! On-disk layout of a VM.
//!
//! ```text
//! <base>/
//! ├── <archive>.tar.zst        downloaded bundles
//! ├── blueprint/               extracted images, read-only after create
//! ├── package/                 snapshot outputs, one file per device
//! └── instance-<N>/
//!     ├── overlay/             copy-on-write layer per device
//!     └── state/               dirty-tracking state per device
//! ```

use std::path::{Path, PathBuf};

use getset::Getters;
use tokio::fs;

use crate::{
    config::{ArkvisorConfig, ArtifactSpec, LayoutMode},
    devices::DeviceName,
    ArkvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Directory of extracted images.
pub const BLUEPRINT_SUBDIR: &str = "blueprint";

/// Directory of snapshot outputs.
pub const PACKAGE_SUBDIR: &str = "package";

/// Copy-on-write layer inside an instance directory.
pub const OVERLAY_SUBDIR: &str = "overlay";

/// Dirty-tracking state inside an instance directory.
pub const STATE_SUBDIR: &str = "state";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Resolved paths of one VM.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct VmLayout {
    /// The VM name.
    name: String,

    /// Root of everything the VM owns.
    base: PathBuf,

    /// Extracted images.
    blueprint: PathBuf,

    /// Snapshot outputs.
    package: PathBuf,

    /// The `instance-<N>` directory.
    instance: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VmLayout {
    /// Resolves the layout of `vm` under the configured output dir.
    pub fn new(config: &ArkvisorConfig, vm: &str) -> Self {
        let base = match config.get_layout() {
            LayoutMode::PerVm => config.get_output_dir().join(vm),
            LayoutMode::Shared => config.get_output_dir().clone(),
        };

        Self {
            name: vm.to_string(),
            blueprint: base.join(BLUEPRINT_SUBDIR),
            package: base.join(PACKAGE_SUBDIR),
            instance: base.join(format!("instance-{}", config.get_instance_index())),
            base,
        }
    }

    /// The instance's overlay directory.
    pub fn overlay_dir(&self) -> PathBuf {
        self.instance.join(OVERLAY_SUBDIR)
    }

    /// The instance's state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.instance.join(STATE_SUBDIR)
    }

    /// Where `artifact` is downloaded to.
    pub fn archive_path(&self, artifact: &ArtifactSpec) -> PathBuf {
        self.base.join(artifact.get_archive())
    }

    /// The four directories a created VM has.
    pub fn all_dirs(&self) -> [PathBuf; 4] {
        [
            self.blueprint.clone(),
            self.package.clone(),
            self.overlay_dir(),
            self.state_dir(),
        ]
    }

    /// The package file of every device, in manifest order.
    pub fn package_files(&self) -> Vec<PathBuf> {
        DeviceName::ALL
            .iter()
            .map(|d| self.package.join(d.package_file()))
            .collect()
    }

    /// Removes everything under the base directory and recreates the empty tree.
    ///
    /// A failed removal is logged and tolerated; a failed creation is not.
    pub async fn reset(&self) -> ArkvisorResult<()> {
        if fs::try_exists(&self.base).await.unwrap_or(false) {
            tracing::info!(vm = %self.name, "removing {}", self.base.display());
            if let Err(e) = fs::remove_dir_all(&self.base).await {
                tracing::warn!(vm = %self.name, "failed to remove {}: {}", self.base.display(), e);
            }
        }

        for dir in self.all_dirs() {
            create_dir(&dir).await?;
        }

        Ok(())
    }

    /// Creates the instance directories if they are missing. Nothing is removed.
    pub async fn ensure_instance(&self) -> ArkvisorResult<()> {
        create_dir(&self.overlay_dir()).await?;
        create_dir(&self.state_dir()).await
    }

    /// Returns the first package file that does not exist, if any.
    pub async fn missing_package_file(&self) -> Option<PathBuf> {
        for path in self.package_files() {
            if !fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }

        None
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn create_dir(dir: &Path) -> ArkvisorResult<()> {
    fs::create_dir_all(dir).await?;
    tracing::debug!("created directory {}", dir.display());
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
