//! Collaborator interfaces consumed by the execution runtime
//!
//! Actions never touch hardware directly. Everything that mutates a real
//! disk goes through [`StorageBackend`]; waiting for and querying the kernel's
//! view of block devices goes through [`DeviceEvents`]. A [`StoragePlatform`]
//! bundles one of each for [`Executor`](crate::engine::executor::Executor).
//!
//! # Contract
//!
//! - Every mutating call either succeeds or returns a [`BackendError`], which
//!   actions propagate verbatim.
//! - Calls receive snapshots of the model (`&Device`, `&Format`); the action
//!   updates the model itself once the call succeeded.

pub mod fake;

use crate::devices::{Device, Format};
use crate::error::BackendError;
use crate::types::PartitionFlag;
use std::path::Path;

pub use fake::{BackendCall, FakeBackend, FakeEvents, FakePlatform};

/// Low-level descriptor returned by the device-event layer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub uuid: Option<String>,
    /// Alias paths (e.g. `/dev/disk/by-uuid/...`)
    pub links: Vec<String>,
}

/// Device and format mutations
pub trait StorageBackend {
    fn create_device(&mut self, device: &Device) -> Result<(), BackendError>;

    fn destroy_device(&mut self, device: &Device) -> Result<(), BackendError>;

    /// Resize to `device.target_size`
    fn resize_device(&mut self, device: &Device) -> Result<(), BackendError>;

    /// Activate the device. `original` asks for the device's pre-existing setup
    /// (e.g. the on-disk LUKS mapping rather than a planned one).
    fn setup_device(&mut self, device: &Device, original: bool) -> Result<(), BackendError>;

    fn teardown_device(&mut self, device: &Device) -> Result<(), BackendError>;

    /// Whether the device is currently active
    fn device_status(&mut self, device: &Device) -> bool;

    /// Drop any cached low-level descriptor so a future device with the same
    /// name is not confused with this one
    fn invalidate_descriptor(&mut self, device: &Device) -> Result<(), BackendError>;

    fn create_format(
        &mut self,
        device: &Device,
        format: &Format,
        path: &Path,
        options: &[String],
    ) -> Result<(), BackendError>;

    /// Wipe the format's on-disk signature
    fn destroy_format(&mut self, device: &Device, format: &Format) -> Result<(), BackendError>;

    /// Resize to `format.target_size`
    fn resize_format(&mut self, device: &Device, format: &Format) -> Result<(), BackendError>;

    fn set_partition_flag(&mut self, partition: &Device, flag: PartitionFlag)
        -> Result<(), BackendError>;

    fn unset_partition_flag(
        &mut self,
        partition: &Device,
        flag: PartitionFlag,
    ) -> Result<(), BackendError>;

    /// Set the partition-type code
    fn set_partition_system(&mut self, partition: &Device, system: u8)
        -> Result<(), BackendError>;

    /// Write the disk's pending partition-table changes
    fn commit_disk(&mut self, disk: &Device) -> Result<(), BackendError>;
}

/// Device-event layer
pub trait DeviceEvents {
    /// Block until pending device events are flushed
    fn settle(&mut self);

    /// Look up the descriptor for a device node
    fn resolve(&mut self, path: &Path) -> Option<DeviceInfo>;
}

/// Everything the runtime needs from the host system
pub trait StoragePlatform {
    fn backend(&mut self) -> &mut dyn StorageBackend;

    fn events(&mut self) -> &mut dyn DeviceEvents;
}
