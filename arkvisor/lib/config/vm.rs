use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{config::DEFAULT_CPUS, ArkvisorError, ArkvisorResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Longest VM name accepted.
pub const MAX_VM_NAME_LEN: usize = 64;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The parameters of a create request.
///
/// The name keys every path and process tag derived for the VM. Arkvisor does not check
/// that it is unique; creating a VM under an existing name replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct VmConfig {
    /// The VM name.
    #[builder(setter(into))]
    pub(super) name: String,

    /// Guest memory in MiB, passed to the snapshotter as-is.
    #[builder(setter(into))]
    pub(super) memory: String,

    /// Number of guest CPUs.
    #[serde(default = "default_cpus")]
    #[builder(default = DEFAULT_CPUS)]
    pub(super) cpus: u32,

    /// Requested disk size. Recorded, not enforced.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default)]
    pub(super) disk_size: Option<String>,

    /// Requested image. Recorded, not enforced; the image comes from the configured artifacts.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[builder(default)]
    pub(super) image_path: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VmConfig {
    /// Checks the request before anything on disk is touched.
    pub fn validate(&self) -> ArkvisorResult<()> {
        validate_vm_name(&self.name)?;

        match self.memory.trim().parse::<u64>() {
            Ok(mib) if mib > 0 => {}
            _ => {
                return Err(ArkvisorError::InvalidRequest(format!(
                    "memory must be a positive number of MiB, got `{}`",
                    self.memory
                )))
            }
        }

        if self.cpus == 0 {
            return Err(ArkvisorError::InvalidRequest(
                "cpus must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Checks that `name` is safe to use as a path component and inside a process tag.
pub fn validate_vm_name(name: &str) -> ArkvisorResult<()> {
    let invalid = |reason: &str| ArkvisorError::InvalidVmName(name.to_string(), reason.to_string());

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }

    if name.len() > MAX_VM_NAME_LEN {
        return Err(invalid("name is longer than 64 characters"));
    }

    if name.starts_with(['.', '-']) {
        return Err(invalid("name must not start with '.' or '-'"));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("character {c:?} is not allowed")));
    }

    Ok(())
}

fn default_cpus() -> u32 {
    DEFAULT_CPUS
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_config_from_request_json() {
        let config: VmConfig =
            serde_json::from_str(r#"{"name":"demo","memory":"1024","disk_size":"10G"}"#).unwrap();
        assert_eq!(config.get_name(), "demo");
        assert_eq!(config.get_memory(), "1024");
        assert_eq!(*config.get_cpus(), DEFAULT_CPUS);
        assert_eq!(config.get_disk_size().as_deref(), Some("10G"));
        assert!(config.get_image_path().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_vm_config_rejects_bad_memory() {
        let config = VmConfig::builder().name("demo").memory("lots").build();
        assert!(matches!(
            config.validate(),
            Err(ArkvisorError::InvalidRequest(_))
        ));

        let config = VmConfig::builder().name("demo").memory("0").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_vm_name() {
        for name in ["demo", "vm-1", "vm_2", "a.b", "X9"] {
            assert!(validate_vm_name(name).is_ok(), "{name} should be valid");
        }

        for name in ["", "../etc", "a/b", "-x", ".hidden", "has space", "ünï", "a".repeat(65).as_str()] {
            assert!(
                matches!(validate_vm_name(name), Err(ArkvisorError::InvalidVmName(..))),
                "{name} should be invalid"
            );
        }
    }
}
