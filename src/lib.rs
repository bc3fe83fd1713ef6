//! diskplan Library
//!
//! Plans and applies changes to a storage stack (disks, partitions, LVM,
//! RAID, encryption and the formats on them) as a queue of typed actions.
//! Registration collapses redundant requests, the scheduler orders what is
//! left by device dependencies, and the executor carries the plan out through
//! a pluggable backend.

pub mod backend;
pub mod config;
pub mod devices;
pub mod engine;
pub mod error;
pub mod logging;
pub mod size;
pub mod types;

// Re-export main types for convenience
pub use backend::{DeviceEvents, DeviceInfo, StorageBackend, StoragePlatform};
pub use config::RuntimeConfig;
pub use devices::{Device, DeviceBuilder, DeviceId, DeviceKind, DeviceTree, Format, FormatId};
pub use error::{
    ActionError, ApplyError, BackendError, DiskPlanError, ExecutionError, ExecutionWarning,
    ModelError, PlanError, Result,
};
pub use size::Size;
pub use types::{ActionKind, ActionObject, ActionType, FormatKind, PartitionFlag, ResizeDirection};

// Planning engine
pub use engine::action::{Action, ActionId, Operation};
pub use engine::executor::{ApplyReport, Executor};
pub use engine::queue::{ActionFilter, ActionQueue, Registration};
pub use engine::scheduler::{Plan, order};
