//! Fake platform implementation for testing
//!
//! Records every backend call in order and answers descriptor lookups from a
//! pre-programmed table. Failures are injected per call, so tests can stop a
//! plan at an exact step without any real I/O.

use super::{DeviceEvents, DeviceInfo, StorageBackend, StoragePlatform};
use crate::devices::{Device, Format};
use crate::error::BackendError;
use crate::size::Size;
use crate::types::{FormatKind, PartitionFlag};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One recorded backend call. Devices are identified by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreateDevice(String),
    DestroyDevice(String),
    ResizeDevice(String, Size),
    Setup { device: String, original: bool },
    Teardown(String),
    InvalidateDescriptor(String),
    CreateFormat {
        device: String,
        format: FormatKind,
        options: Vec<String>,
    },
    DestroyFormat { device: String, format: FormatKind },
    ResizeFormat(String, Size),
    SetFlag(String, PartitionFlag),
    UnsetFlag(String, PartitionFlag),
    SetSystem(String, u8),
    CommitDisk(String),
}

/// Recording storage backend
#[derive(Debug, Default)]
pub struct FakeBackend {
    calls: Vec<BackendCall>,
    failures: Vec<BackendCall>,
    active: BTreeSet<String>,
    fail_invalidation: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, in order
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Make the given call fail when it is next made
    pub fn fail_on(&mut self, call: BackendCall) {
        self.failures.push(call);
    }

    /// Make descriptor invalidation fail for every device
    pub fn fail_invalidation(&mut self, fail: bool) {
        self.fail_invalidation = fail;
    }

    /// Whether the device is currently set up
    pub fn is_active(&self, device: &str) -> bool {
        self.active.contains(device)
    }

    /// Mark a device as already active before the plan runs
    pub fn activate(&mut self, device: impl Into<String>) {
        self.active.insert(device.into());
    }

    fn record(&mut self, call: BackendCall) -> Result<(), BackendError> {
        let failed = self.failures.iter().position(|f| f == &call);
        self.calls.push(call);
        match failed {
            Some(index) => {
                let call = self.failures.remove(index);
                Err(BackendError::device(
                    call_device(&call),
                    format!("injected failure: {:?}", call),
                ))
            }
            None => Ok(()),
        }
    }
}

fn call_device(call: &BackendCall) -> &str {
    match call {
        BackendCall::CreateDevice(d)
        | BackendCall::DestroyDevice(d)
        | BackendCall::ResizeDevice(d, _)
        | BackendCall::Teardown(d)
        | BackendCall::InvalidateDescriptor(d)
        | BackendCall::ResizeFormat(d, _)
        | BackendCall::SetFlag(d, _)
        | BackendCall::UnsetFlag(d, _)
        | BackendCall::SetSystem(d, _)
        | BackendCall::CommitDisk(d) => d,
        BackendCall::Setup { device, .. }
        | BackendCall::CreateFormat { device, .. }
        | BackendCall::DestroyFormat { device, .. } => device,
    }
}

impl StorageBackend for FakeBackend {
    fn create_device(&mut self, device: &Device) -> Result<(), BackendError> {
        self.record(BackendCall::CreateDevice(device.name.clone()))
    }

    fn destroy_device(&mut self, device: &Device) -> Result<(), BackendError> {
        self.record(BackendCall::DestroyDevice(device.name.clone()))?;
        self.active.remove(&device.name);
        Ok(())
    }

    fn resize_device(&mut self, device: &Device) -> Result<(), BackendError> {
        self.record(BackendCall::ResizeDevice(
            device.name.clone(),
            device.target_size,
        ))
    }

    fn setup_device(&mut self, device: &Device, original: bool) -> Result<(), BackendError> {
        self.record(BackendCall::Setup {
            device: device.name.clone(),
            original,
        })?;
        self.active.insert(device.name.clone());
        Ok(())
    }

    fn teardown_device(&mut self, device: &Device) -> Result<(), BackendError> {
        self.record(BackendCall::Teardown(device.name.clone()))?;
        self.active.remove(&device.name);
        Ok(())
    }

    fn device_status(&mut self, device: &Device) -> bool {
        self.active.contains(&device.name)
    }

    fn invalidate_descriptor(&mut self, device: &Device) -> Result<(), BackendError> {
        self.record(BackendCall::InvalidateDescriptor(device.name.clone()))?;
        if self.fail_invalidation {
            return Err(BackendError::device(
                device.name.clone(),
                "descriptor cache busy",
            ));
        }
        Ok(())
    }

    fn create_format(
        &mut self,
        device: &Device,
        format: &Format,
        _path: &Path,
        options: &[String],
    ) -> Result<(), BackendError> {
        self.record(BackendCall::CreateFormat {
            device: device.name.clone(),
            format: format.kind,
            options: options.to_vec(),
        })
    }

    fn destroy_format(&mut self, device: &Device, format: &Format) -> Result<(), BackendError> {
        self.record(BackendCall::DestroyFormat {
            device: device.name.clone(),
            format: format.kind,
        })
    }

    fn resize_format(&mut self, device: &Device, format: &Format) -> Result<(), BackendError> {
        self.record(BackendCall::ResizeFormat(
            device.name.clone(),
            format.target_size,
        ))
    }

    fn set_partition_flag(
        &mut self,
        partition: &Device,
        flag: PartitionFlag,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::SetFlag(partition.name.clone(), flag))
    }

    fn unset_partition_flag(
        &mut self,
        partition: &Device,
        flag: PartitionFlag,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::UnsetFlag(partition.name.clone(), flag))
    }

    fn set_partition_system(&mut self, partition: &Device, system: u8) -> Result<(), BackendError> {
        self.record(BackendCall::SetSystem(partition.name.clone(), system))
    }

    fn commit_disk(&mut self, disk: &Device) -> Result<(), BackendError> {
        self.record(BackendCall::CommitDisk(disk.name.clone()))
    }
}

/// Device-event layer answering from a fixed table
#[derive(Debug, Default)]
pub struct FakeEvents {
    descriptors: BTreeMap<PathBuf, DeviceInfo>,
    settled: usize,
}

impl FakeEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the descriptor returned for `path`
    pub fn insert(&mut self, path: impl Into<PathBuf>, info: DeviceInfo) {
        self.descriptors.insert(path.into(), info);
    }

    /// Number of times `settle` was called
    pub fn settle_count(&self) -> usize {
        self.settled
    }
}

impl DeviceEvents for FakeEvents {
    fn settle(&mut self) {
        self.settled += 1;
    }

    fn resolve(&mut self, path: &Path) -> Option<DeviceInfo> {
        self.descriptors.get(path).cloned()
    }
}

/// Fake platform bundling a [`FakeBackend`] and [`FakeEvents`]
#[derive(Debug, Default)]
pub struct FakePlatform {
    pub backend: FakeBackend,
    pub events: FakeEvents,
}

impl FakePlatform {
    /// Creates a new fake platform with empty state
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePlatform for FakePlatform {
    fn backend(&mut self) -> &mut dyn StorageBackend {
        &mut self.backend
    }

    fn events(&mut self) -> &mut dyn DeviceEvents {
        &mut self.events
    }
}
