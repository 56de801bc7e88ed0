use std::{
    collections::HashSet,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use getset::Getters;
use serde::{Deserialize, Serialize};
use tokio::fs;
use typed_builder::TypedBuilder;

use crate::{
    config::{
        MigrationTuning, DAEMON_LOG_FILENAME, DEFAULT_APP_ARCHIVE, DEFAULT_APP_ARTIFACT_URL,
        DEFAULT_CPU_TEMPLATE, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_FORWARD_INTERNAL_PORT,
        DEFAULT_FORWARD_PROTOCOL, DEFAULT_HOST_INTERFACE, DEFAULT_LOG_MAX_AGE,
        DEFAULT_MIGRATE_EXTERNAL_ADDR, DEFAULT_NBD_MAX_DEVICES, DEFAULT_NETNS, DEFAULT_OS_ARCHIVE,
        DEFAULT_OS_ARTIFACT_URL, DEFAULT_OUTPUT_DIR, DEFAULT_OWNER, DEFAULT_PEER_LISTEN_ADDR,
        DEFAULT_PEER_PORT, DEFAULT_SETTLE_INTERVAL, DEFAULT_START_EXTERNAL_ADDR, DEFAULT_STATE_DIR,
        DEFAULT_TAG_PREFIX, LOG_SUBDIR, OUTPUT_DIR_ENV_VAR, RUN_SUBDIR, STATE_DIR_ENV_VAR,
    },
    devices::DeviceName,
    utils::{duration_millis, duration_secs},
    ArkvisorError, ArkvisorResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The arkvisor configuration.
///
/// Every field has a default, so an empty TOML file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters)]
#[serde(default)]
#[getset(get = "pub with_prefix")]
pub struct ArkvisorConfig {
    /// Root of all VM artifacts.
    #[builder(default = DEFAULT_OUTPUT_DIR.clone(), setter(into))]
    pub(super) output_dir: PathBuf,

    /// Root of request logs and helper pid files.
    #[builder(default = DEFAULT_STATE_DIR.clone(), setter(into))]
    pub(super) state_dir: PathBuf,

    /// Whether VMs get their own tree under the output dir or share it.
    #[builder(default)]
    pub(super) layout: LayoutMode,

    /// The `instance-<N>` directory used for overlays and states.
    #[builder(default = 0)]
    pub(super) instance_index: u32,

    /// The bundles downloaded and extracted on create.
    #[builder(default = default_artifacts())]
    pub(super) artifacts: Vec<ArtifactSpec>,

    /// Host interface NAT is set up on.
    #[builder(default = DEFAULT_HOST_INTERFACE.to_string(), setter(into))]
    pub(super) host_interface: String,

    /// Network namespace the guest runs in.
    #[builder(default = DEFAULT_NETNS.to_string(), setter(into))]
    pub(super) netns: String,

    /// CPU template passed to the snapshotter.
    #[builder(default = DEFAULT_CPU_TEMPLATE.to_string(), setter(into))]
    pub(super) cpu_template: String,

    /// The helper programs.
    #[builder(default)]
    pub(super) binaries: HelperBinaries,

    /// Whether helpers and host preparation run through `sudo`.
    #[builder(default = true)]
    pub(super) privileged: bool,

    /// `user:group` applied to a freshly created VM tree; skipped when unset.
    #[builder(default = Some(DEFAULT_OWNER.to_string()))]
    pub(super) owner: Option<String>,

    /// Whether the `nbd` kernel module is loaded before extraction.
    #[builder(default = true)]
    pub(super) load_nbd_module: bool,

    /// `nbds_max` for the `nbd` module.
    #[builder(default = DEFAULT_NBD_MAX_DEVICES)]
    pub(super) nbd_max_devices: u32,

    /// Pause between dependent helper launches.
    #[serde(rename = "settle_interval_ms", with = "duration_millis")]
    #[builder(default = DEFAULT_SETTLE_INTERVAL)]
    pub(super) settle_interval: Duration,

    /// Upper bound on a single artifact download.
    #[serde(rename = "download_timeout_secs", with = "duration_secs")]
    #[builder(default = DEFAULT_DOWNLOAD_TIMEOUT)]
    pub(super) download_timeout: Duration,

    /// Retries on transient download failures.
    #[builder(default = 0)]
    pub(super) download_retries: u32,

    /// Port the peer listens on in the source role, dialled in the destination role.
    #[builder(default = DEFAULT_PEER_PORT)]
    pub(super) peer_port: u16,

    /// Listen address of the peer in the source role.
    #[builder(default = DEFAULT_PEER_LISTEN_ADDR.to_string(), setter(into))]
    pub(super) peer_listen_addr: String,

    /// Guest port exposed by the forwarder.
    #[builder(default = DEFAULT_FORWARD_INTERNAL_PORT.to_string(), setter(into))]
    pub(super) forward_internal_port: String,

    /// Protocol of the forwarded port.
    #[builder(default = DEFAULT_FORWARD_PROTOCOL.to_string(), setter(into))]
    pub(super) forward_protocol: String,

    /// Host address the forwarder exposes after a start.
    #[builder(default = DEFAULT_START_EXTERNAL_ADDR.to_string(), setter(into))]
    pub(super) start_external_addr: String,

    /// Host address the forwarder exposes after a migration.
    #[builder(default = DEFAULT_MIGRATE_EXTERNAL_ADDR.to_string(), setter(into))]
    pub(super) migrate_external_addr: String,

    /// Prefix of the instance tag, `<prefix>-<vm>`.
    #[builder(default = DEFAULT_TAG_PREFIX.to_string(), setter(into))]
    pub(super) tag_prefix: String,

    /// Request log directories older than this are pruned.
    #[serde(rename = "log_max_age_secs", with = "duration_secs")]
    #[builder(default = DEFAULT_LOG_MAX_AGE)]
    pub(super) log_max_age: Duration,

    /// Migration tuning applied to every device.
    #[builder(default)]
    pub(super) tuning: MigrationTuning,
}

/// Where a VM's artifacts live under the output dir.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Each VM has its own `<output>/<vm>` tree. Creating one VM never touches another.
    #[default]
    PerVm,

    /// All VMs share `<output>` directly. Creating any VM wipes the whole tree.
    Shared,
}

/// A downloadable bundle and the devices extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ArtifactSpec {
    /// Where the bundle is fetched from.
    #[builder(setter(into))]
    pub(super) url: String,

    /// File name the bundle is saved under in the VM's base directory.
    #[builder(setter(into))]
    pub(super) archive: String,

    /// Devices the packager extracts into `blueprint/`.
    pub(super) devices: Vec<DeviceName>,
}

/// Names or paths of the external helper programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[serde(default)]
#[getset(get = "pub with_prefix")]
pub struct HelperBinaries {
    /// Archive extractor.
    #[builder(default = "drafter-packager".to_string(), setter(into))]
    pub(super) packager: String,

    /// NAT service.
    #[builder(default = "drafter-nat".to_string(), setter(into))]
    pub(super) nat: String,

    /// Snapshot packager.
    #[builder(default = "drafter-snapshotter".to_string(), setter(into))]
    pub(super) snapshotter: String,

    /// Migration transport.
    #[builder(default = "drafter-peer".to_string(), setter(into))]
    pub(super) peer: String,

    /// Port forwarder.
    #[builder(default = "drafter-forwarder".to_string(), setter(into))]
    pub(super) forwarder: String,

    /// Privilege wrapper.
    #[builder(default = "sudo".to_string(), setter(into))]
    pub(super) sudo: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ArkvisorConfig {
    /// Loads the configuration.
    ///
    /// Starts from the defaults, replaces them with `path` if given, applies the
    /// `ARKVISOR_OUTPUT_DIR` and `ARKVISOR_STATE_DIR` overrides and validates the result.
    pub async fn load(path: Option<&Path>) -> ArkvisorResult<Self> {
        let mut config = match path {
            Some(path) => {
                tracing::debug!("loading config from {}", path.display());
                let content = fs::read_to_string(path).await?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing fields keep their defaults.
    pub fn from_toml(content: &str) -> ArkvisorResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies directory overrides looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(OUTPUT_DIR_ENV_VAR).filter(|v| !v.is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup(STATE_DIR_ENV_VAR).filter(|v| !v.is_empty()) {
            self.state_dir = PathBuf::from(dir);
        }
    }

    /// Checks the configuration for values the helpers cannot work with.
    pub fn validate(&self) -> ArkvisorResult<()> {
        self.tuning.validate()?;

        if self.netns.trim().is_empty() {
            return Err(ArkvisorError::InvalidConfig("netns must not be empty".to_string()));
        }

        if self.tag_prefix.is_empty() || self.tag_prefix.contains(char::is_whitespace) {
            return Err(ArkvisorError::InvalidConfig(format!(
                "tag_prefix `{}` must be non-empty and contain no whitespace",
                self.tag_prefix
            )));
        }

        if self.peer_listen_addr.is_empty() {
            return Err(ArkvisorError::InvalidConfig(
                "peer_listen_addr must not be empty".to_string(),
            ));
        }

        for (field, addr) in [
            ("start_external_addr", &self.start_external_addr),
            ("migrate_external_addr", &self.migrate_external_addr),
        ] {
            addr.parse::<SocketAddr>().map_err(|e| {
                ArkvisorError::InvalidConfig(format!("{field} `{addr}` is not a socket address: {e}"))
            })?;
        }

        let mut provided = HashSet::new();
        for artifact in &self.artifacts {
            for device in &artifact.devices {
                if device.blueprint_file().is_none() {
                    return Err(ArkvisorError::InvalidConfig(format!(
                        "device `{device}` cannot be extracted from an artifact"
                    )));
                }

                if !provided.insert(*device) {
                    return Err(ArkvisorError::InvalidConfig(format!(
                        "device `{device}` is provided by more than one artifact"
                    )));
                }
            }
        }

        if let Some(missing) = DeviceName::ALL
            .iter()
            .filter(|d| d.blueprint_file().is_some())
            .find(|d| !provided.contains(*d))
        {
            return Err(ArkvisorError::InvalidConfig(format!(
                "no artifact provides device `{missing}`"
            )));
        }

        Ok(())
    }

    /// The tag every helper of `vm` carries on its command line.
    pub fn instance_tag(&self, vm: &str) -> String {
        format!("{}-{}", self.tag_prefix, vm)
    }

    /// Directory holding the per-VM request log directories.
    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join(LOG_SUBDIR)
    }

    /// Directory holding the per-VM pid file directories.
    pub fn run_dir(&self) -> PathBuf {
        self.state_dir.join(RUN_SUBDIR)
    }

    /// The daemon's own log file.
    pub fn daemon_log_path(&self) -> PathBuf {
        self.log_dir().join(DAEMON_LOG_FILENAME)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn default_artifacts() -> Vec<ArtifactSpec> {
    vec![
        ArtifactSpec::builder()
            .url(DEFAULT_OS_ARTIFACT_URL)
            .archive(DEFAULT_OS_ARCHIVE)
            .devices(vec![DeviceName::Kernel, DeviceName::Disk])
            .build(),
        ArtifactSpec::builder()
            .url(DEFAULT_APP_ARTIFACT_URL)
            .archive(DEFAULT_APP_ARCHIVE)
            .devices(vec![DeviceName::Oci])
            .build(),
    ]
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ArkvisorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for HelperBinaries {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
