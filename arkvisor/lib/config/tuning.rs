use std::time::Duration;

use getset::CopyGetters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{utils::duration_millis, ArkvisorError, ArkvisorResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Knobs for the peer's dirty-block tracking.
///
/// These are handed to the migration engine verbatim with every device. They shape how
/// often dirty blocks are collected and how many rounds a live migration may take; none of
/// them is interpreted by arkvisor itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, CopyGetters)]
#[serde(default)]
#[getset(get_copy = "pub with_prefix")]
pub struct MigrationTuning {
    /// Block size in bytes used for dirty tracking.
    #[builder(default = 65536)]
    pub(super) block_size: u32,

    /// How long a block may stay dirty before it is shipped.
    #[serde(rename = "expiry_ms", with = "duration_millis")]
    #[builder(default = Duration::from_secs(1))]
    pub(super) expiry: Duration,

    /// Dirty blocks that trigger an early transfer.
    #[builder(default = 200)]
    pub(super) max_dirty_blocks: u32,

    /// Minimum number of pre-copy cycles.
    #[builder(default = 5)]
    pub(super) min_cycles: u32,

    /// Maximum number of pre-copy cycles.
    #[builder(default = 20)]
    pub(super) max_cycles: u32,

    /// Pause between cycles.
    #[serde(rename = "cycle_throttle_ms", with = "duration_millis")]
    #[builder(default = Duration::from_millis(500))]
    pub(super) cycle_throttle: Duration,

    /// Whether devices may be migrated at all.
    #[builder(default = true)]
    pub(super) migratable: bool,

    /// Whether devices are shared between instances.
    #[builder(default = false)]
    pub(super) shared: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MigrationTuning {
    /// Checks that the values are usable by the migration engine.
    pub fn validate(&self) -> ArkvisorResult<()> {
        if self.block_size == 0 {
            return Err(ArkvisorError::InvalidConfig(
                "migration block_size must be greater than zero".to_string(),
            ));
        }

        if self.min_cycles > self.max_cycles {
            return Err(ArkvisorError::InvalidConfig(format!(
                "migration min_cycles ({}) is greater than max_cycles ({})",
                self.min_cycles, self.max_cycles
            )));
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for MigrationTuning {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
