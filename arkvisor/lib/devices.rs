//! The fixed device manifest of a VM and the JSON device lists handed to the helpers.
//!
//! A VM is fully described by six block devices. Each device has a file in `package/` that
//! serves as its read-only base, and every running instance pairs it with an overlay file
//! and a dirty-tracking state file of the same name.

use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{config::MigrationTuning, utils::duration_nanos, ArkvisorError, ArkvisorResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One of the six devices that make up a VM, in manifest order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceName {
    /// Snapshot of the VM's device state.
    State,

    /// Snapshot of guest memory.
    Memory,

    /// The guest kernel.
    Kernel,

    /// The guest root filesystem.
    Disk,

    /// The VM configuration.
    Config,

    /// The application filesystem.
    Oci,
}

/// Base, overlay and state paths of one device plus its migration tuning.
///
/// Serializes to the peer's `--devices` grammar. Durations are expressed in nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// The device.
    pub name: DeviceName,

    /// The package file the device is based on.
    pub base: PathBuf,

    /// The instance's copy-on-write layer.
    pub overlay: PathBuf,

    /// The instance's dirty-tracking state.
    pub state: PathBuf,

    /// Block size in bytes.
    pub block_size: u32,

    /// Dirty block expiry.
    #[serde(with = "duration_nanos")]
    pub expiry: Duration,

    /// Dirty blocks that trigger an early transfer.
    pub max_dirty_blocks: u32,

    /// Minimum pre-copy cycles.
    pub min_cycles: u32,

    /// Maximum pre-copy cycles.
    pub max_cycles: u32,

    /// Pause between cycles.
    #[serde(with = "duration_nanos")]
    pub cycle_throttle: Duration,

    /// Whether the device may be migrated.
    pub make_migratable: bool,

    /// Whether the device is shared between instances.
    pub shared: bool,
}

/// One entry of the snapshotter's `--devices` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingDevice {
    /// The device.
    pub name: DeviceName,

    /// The blueprint file the device is built from, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input: Option<PathBuf>,

    /// Where the packaged device is written.
    pub output: PathBuf,
}

/// One entry of the packager's `--devices` list in extract mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionDevice {
    /// The device to pull out of the archive.
    pub name: DeviceName,

    /// Where it is written.
    pub path: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DeviceName {
    /// Every device, in manifest order.
    pub const ALL: [DeviceName; 6] = [
        DeviceName::State,
        DeviceName::Memory,
        DeviceName::Kernel,
        DeviceName::Disk,
        DeviceName::Config,
        DeviceName::Oci,
    ];

    /// The name used on the helper command lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceName::State => "state",
            DeviceName::Memory => "memory",
            DeviceName::Kernel => "kernel",
            DeviceName::Disk => "disk",
            DeviceName::Config => "config",
            DeviceName::Oci => "oci",
        }
    }

    /// File name of the device in `package/` and in the instance directories.
    pub fn package_file(&self) -> &'static str {
        match self {
            DeviceName::State => "state.bin",
            DeviceName::Memory => "memory.bin",
            DeviceName::Kernel => "vmlinux",
            DeviceName::Disk => "rootfs.ext4",
            DeviceName::Config => "config.json",
            DeviceName::Oci => "oci.ext4",
        }
    }

    /// File name of the device in `blueprint/`, for devices extracted from an artifact.
    pub fn blueprint_file(&self) -> Option<&'static str> {
        match self {
            DeviceName::Kernel => Some("vmlinux"),
            DeviceName::Disk => Some("rootfs.ext4"),
            DeviceName::Oci => Some("oci.ext4"),
            _ => None,
        }
    }
}

impl DeviceDescriptor {
    fn new(name: DeviceName, package_dir: &Path, instance_dir: &Path, tuning: &MigrationTuning) -> Self {
        let file = name.package_file();
        Self {
            name,
            base: package_dir.join(file),
            overlay: instance_dir.join("overlay").join(file),
            state: instance_dir.join("state").join(file),
            block_size: tuning.get_block_size(),
            expiry: tuning.get_expiry(),
            max_dirty_blocks: tuning.get_max_dirty_blocks(),
            min_cycles: tuning.get_min_cycles(),
            max_cycles: tuning.get_max_cycles(),
            cycle_throttle: tuning.get_cycle_throttle(),
            make_migratable: tuning.get_migratable(),
            shared: tuning.get_shared(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds the six device descriptors of an instance, in manifest order.
///
/// `instance_dir` is the `instance-<N>` directory; overlays and states are placed in its
/// `overlay/` and `state/` sub-directories under the device's package file name.
pub fn build_descriptors(
    package_dir: &Path,
    instance_dir: &Path,
    tuning: &MigrationTuning,
) -> Vec<DeviceDescriptor> {
    DeviceName::ALL
        .iter()
        .map(|name| DeviceDescriptor::new(*name, package_dir, instance_dir, tuning))
        .collect()
}

/// Builds the snapshotter's device list. Blueprint-backed devices get an input.
pub fn packaging_devices(blueprint_dir: &Path, package_dir: &Path) -> Vec<PackagingDevice> {
    DeviceName::ALL
        .iter()
        .map(|name| PackagingDevice {
            name: *name,
            input: name.blueprint_file().map(|file| blueprint_dir.join(file)),
            output: package_dir.join(name.package_file()),
        })
        .collect()
}

/// Builds the packager's extract list for the devices one artifact provides.
///
/// Devices that have no blueprint file are skipped.
pub fn extraction_devices(devices: &[DeviceName], blueprint_dir: &Path) -> Vec<ExtractionDevice> {
    devices
        .iter()
        .filter_map(|name| {
            name.blueprint_file().map(|file| ExtractionDevice {
                name: *name,
                path: blueprint_dir.join(file),
            })
        })
        .collect()
}

/// Renders a device list as the compact JSON the helpers take on their command line.
pub fn devices_json<T: Serialize>(devices: &[T]) -> ArkvisorResult<String> {
    Ok(serde_json::to_string(devices)?)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeviceName {
    type Err = ArkvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ArkvisorError::InvalidConfig(format!("unknown device `{s}`")))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_descriptors_manifest_order_and_paths() {
        let package = Path::new("/home/ec2-user/out/package");
        let instance = Path::new("/home/ec2-user/out/instance-0");
        let descriptors = build_descriptors(package, instance, &MigrationTuning::default());

        let names: Vec<_> = descriptors.iter().map(|d| d.name).collect();
        assert_eq!(names, DeviceName::ALL);

        for descriptor in &descriptors {
            let file = descriptor.name.package_file();
            assert_eq!(descriptor.base, package.join(file));
            assert_eq!(descriptor.overlay, instance.join("overlay").join(file));
            assert_eq!(descriptor.state, instance.join("state").join(file));
            assert!(descriptor.make_migratable);
            assert!(!descriptor.shared);
        }
    }

    #[test]
    fn test_descriptor_json_uses_peer_field_names() {
        let descriptors = build_descriptors(
            Path::new("/out/package"),
            Path::new("/out/instance-0"),
            &MigrationTuning::default(),
        );
        let value = serde_json::to_value(&descriptors[1]).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "name": "memory",
                "base": "/out/package/memory.bin",
                "overlay": "/out/instance-0/overlay/memory.bin",
                "state": "/out/instance-0/state/memory.bin",
                "blockSize": 65536,
                "expiry": 1_000_000_000u64,
                "maxDirtyBlocks": 200,
                "minCycles": 5,
                "maxCycles": 20,
                "cycleThrottle": 500_000_000u64,
                "makeMigratable": true,
                "shared": false
            })
        );
    }

    #[test]
    fn test_tuning_flows_into_every_descriptor() {
        let tuning = MigrationTuning::builder()
            .block_size(4096)
            .max_cycles(50)
            .shared(true)
            .build();
        let descriptors = build_descriptors(Path::new("/p"), Path::new("/i"), &tuning);
        assert!(descriptors
            .iter()
            .all(|d| d.block_size == 4096 && d.max_cycles == 50 && d.shared));
    }

    #[test]
    fn test_packaging_devices_inputs() {
        let devices = packaging_devices(Path::new("/out/blueprint"), Path::new("/out/package"));
        assert_eq!(devices.len(), 6);

        let with_input: Vec<_> = devices
            .iter()
            .filter(|d| d.input.is_some())
            .map(|d| d.name)
            .collect();
        assert_eq!(
            with_input,
            [DeviceName::Kernel, DeviceName::Disk, DeviceName::Oci]
        );

        let json = devices_json(&devices).unwrap();
        assert!(json.starts_with(r#"[{"name":"state","output":"/out/package/state.bin"}"#));
        assert!(json.contains(
            r#"{"name":"disk","input":"/out/blueprint/rootfs.ext4","output":"/out/package/rootfs.ext4"}"#
        ));
    }

    #[test]
    fn test_extraction_devices_json() {
        let devices = extraction_devices(
            &[DeviceName::Kernel, DeviceName::Disk, DeviceName::Memory],
            Path::new("/out/blueprint"),
        );
        assert_eq!(
            devices_json(&devices).unwrap(),
            r#"[{"name":"kernel","path":"/out/blueprint/vmlinux"},{"name":"disk","path":"/out/blueprint/rootfs.ext4"}]"#
        );
    }

    #[test]
    fn test_device_name_round_trip_from_str() {
        assert_eq!("oci".parse::<DeviceName>().unwrap(), DeviceName::Oci);
        assert!("swap".parse::<DeviceName>().is_err());
    }
}
