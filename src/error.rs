//! Error handling for storage action planning
//!
//! Errors are split by the phase that raises them:
//!
//! - [`ActionError`]: a request was invalid and never reached the queue
//! - [`PlanError`]: the pending actions cannot be put in a safe order
//! - [`BackendError`]: a device or format backend failed (external)
//! - [`ExecutionError`] / [`ApplyError`]: a step of the plan failed at apply time
//! - [`ExecutionWarning`]: best-effort cleanup failed; reported, never fatal
//!
//! [`DiskPlanError`] unifies them for callers that just want `?`.

use crate::devices::{DeviceId, FormatId};
use crate::engine::action::ActionId;
use crate::size::Size;
use crate::types::FormatKind;
use thiserror::Error;

/// Lookups into the device model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("no device with id {0}")]
    UnknownDevice(DeviceId),

    #[error("no format with id {0}")]
    UnknownFormat(FormatId),
}

/// Construction and registration failures; the queue is never touched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("device {0} already exists")]
    DeviceExists(String),

    #[error("device {0} is not resizable")]
    DeviceNotResizable(String),

    #[error("format on {0} is not resizable")]
    FormatNotResizable(String),

    #[error("new size same as old size ({0})")]
    SizeUnchanged(Size),

    #[error("new size {requested} is too small (minimum {minimum})")]
    SizeTooSmall { requested: Size, minimum: Size },

    #[error("new size {requested} is too large (maximum {maximum})")]
    SizeTooLarge { requested: Size, maximum: Size },

    #[error("action {0} is not queued")]
    NotQueued(ActionId),

    #[error("unrecognized action label '{0}'")]
    UnknownLabel(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Failures turning the pending queue into an execution order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("dependency cycle among actions {}", format_ids(.remaining))]
    Cycle { remaining: Vec<ActionId> },
}

/// Failures reported by a device/format backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device error on {device}: {message}")]
    Device { device: String, message: String },

    #[error("format error on {device}: {message}")]
    Format { device: String, message: String },

    #[error("command `{command}` exited with status {status}")]
    Command { command: String, status: i32 },
}

impl BackendError {
    /// Create a device error
    pub fn device(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Device {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a format error
    pub fn format(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Format {
            device: device.into(),
            message: message.into(),
        }
    }
}

/// Failure of a single action's `execute`
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{operation} of {} is non-sense", .format.name())]
    Unsupported {
        format: FormatKind,
        operation: &'static str,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A plan that stopped part-way. Executed steps are not rolled back.
#[derive(Error, Debug)]
#[error("action {failed} failed after {} completed action(s)", .completed.len())]
pub struct ApplyError {
    pub failed: ActionId,
    pub completed: Vec<ActionId>,
    pub pending: Vec<ActionId>,
    #[source]
    pub source: ExecutionError,
}

/// Non-fatal problems recorded while applying a plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionWarning {
    #[error("failed to invalidate cached descriptor for {device}: {reason}")]
    DescriptorInvalidation {
        action: ActionId,
        device: String,
        reason: String,
    },

    #[error("device lookup failed for {device} after creating {format}")]
    DescriptorLookup {
        action: ActionId,
        device: String,
        format: FormatKind,
    },
}

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum DiskPlanError {
    #[error("Invalid action: {0}")]
    Action(#[from] ActionError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("Execution error: {0}")]
    Apply(#[from] ApplyError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for planning operations
pub type Result<T> = std::result::Result<T, DiskPlanError>;

impl DiskPlanError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

fn format_ids(ids: &[ActionId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ActionError::SizeTooSmall {
            requested: Size::mib(1),
            minimum: Size::mib(16),
        };
        assert_eq!(
            err.to_string(),
            "new size 1 MiB is too small (minimum 16 MiB)"
        );

        let err = ExecutionError::Unsupported {
            format: FormatKind::DmRaidMember,
            operation: "creation",
        };
        assert_eq!(
            err.to_string(),
            "creation of dm-raid member device is non-sense"
        );
    }

    #[test]
    fn test_backend_error_is_transparent() {
        let err: ExecutionError = BackendError::device("sda1", "busy").into();
        assert_eq!(err.to_string(), "device error on sda1: busy");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DiskPlanError = io_err.into();
        assert!(matches!(err, DiskPlanError::Io(_)));
    }

    #[test]
    fn test_cycle_lists_actions() {
        let err = PlanError::Cycle {
            remaining: vec![ActionId::from_raw(3), ActionId::from_raw(7)],
        };
        assert_eq!(err.to_string(), "dependency cycle among actions 3, 7");
    }
}
