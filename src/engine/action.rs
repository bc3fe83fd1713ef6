//! Storage Actions
//!
//! An [`Action`] is a queued request to create, destroy or resize a device or
//! the format on it. Construction validates the request against the current
//! model and immediately records the *intent* in the [`DeviceTree`] (a new
//! target size, a swapped format reference). Nothing touches hardware until
//! [`Action::execute`]; [`Action::cancel`] restores exactly what construction
//! changed.
//!
//! # Ordering and obsoletion
//!
//! | Kind          | `requires(other)` when                                                            |
//! |---------------|-----------------------------------------------------------------------------------|
//! | CreateDevice  | device depends on other's device; lower-numbered partition create on same disk;   |
//! |               | single-PV LV create in the same VG while this LV is not single-PV                 |
//! | DestroyDevice | other destroys a device depending on ours; higher-numbered partition destroy on   |
//! |               | same disk; other destroys our own format                                          |
//! | ResizeDevice  | format shrink of same device when we shrink; other grows a device we depend on;   |
//! |               | other shrinks a device depending on ours                                          |
//! | CreateFormat  | device depends on other's device (unless other destroys a device); other creates  |
//! |               | or resizes our device                                                             |
//! | DestroyFormat | other destroys a device depending on ours                                         |
//! | ResizeFormat  | device grow of same device when we grow; other shrinks a device depending on ours;|
//! |               | other grows a device we depend on                                                 |
//!
//! Shrinks propagate leaf-to-root, grows root-to-leaf. `obsoletes` only ever
//! holds between two actions on the same device.

use crate::backend::StoragePlatform;
use crate::devices::{DeviceId, DeviceKind, DeviceTree, Format, FormatId};
use crate::error::{ActionError, ExecutionError, ExecutionWarning, ModelError};
use crate::size::Size;
use crate::types::{ActionKind, ActionObject, ActionType, FormatKind, PartitionFlag, ResizeDirection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use strum::IntoEnumIterator;
use tracing::{debug, error, info, warn};

/// Process-wide action id sequence
static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(0);

/// Globally unique action id. Higher ids were constructed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(u64);

impl ActionId {
    /// Issue the next id. This is the only allocator for action ids.
    pub fn allocate() -> Self {
        Self(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The variant-specific part of an action, with the snapshot `cancel` restores
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateDevice,
    DestroyDevice,
    ResizeDevice {
        direction: ResizeDirection,
        new_size: Size,
        orig_size: Size,
    },
    CreateFormat {
        format: FormatId,
        orig_format: FormatId,
    },
    DestroyFormat {
        orig_format: FormatId,
    },
    ResizeFormat {
        format: FormatId,
        direction: ResizeDirection,
        new_size: Size,
        orig_size: Size,
    },
}

impl Operation {
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::CreateDevice => ActionKind::CreateDevice,
            Self::DestroyDevice => ActionKind::DestroyDevice,
            Self::ResizeDevice { .. } => ActionKind::ResizeDevice,
            Self::CreateFormat { .. } => ActionKind::CreateFormat,
            Self::DestroyFormat { .. } => ActionKind::DestroyFormat,
            Self::ResizeFormat { .. } => ActionKind::ResizeFormat,
        }
    }
}

/// A pending storage mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    id: ActionId,
    device: DeviceId,
    op: Operation,
    device_name: String,
    device_type: &'static str,
    format_desc: Option<String>,
}

// ============================================================================
// Construction
// ============================================================================

impl Action {
    fn new(tree: &DeviceTree, device: DeviceId, op: Operation) -> Result<Self, ModelError> {
        let dev = tree.device(device)?;
        let format_desc = match &op {
            Operation::CreateFormat { format, .. } | Operation::ResizeFormat { format, .. } => {
                Some(tree.format(*format)?.desc())
            }
            Operation::DestroyFormat { orig_format } => Some(tree.format(*orig_format)?.desc()),
            _ => None,
        };
        Ok(Self {
            id: ActionId::allocate(),
            device,
            device_name: dev.name.clone(),
            device_type: dev.type_name(),
            format_desc,
            op,
        })
    }

    /// Plan the creation of a device that does not exist yet.
    ///
    /// # Errors
    ///
    /// `DeviceExists` if the device is already present on disk.
    pub fn create_device(tree: &DeviceTree, device: DeviceId) -> Result<Self, ActionError> {
        let dev = tree.device(device)?;
        if dev.exists {
            return Err(ActionError::DeviceExists(dev.name.clone()));
        }
        Ok(Self::new(tree, device, Operation::CreateDevice)?)
    }

    /// Plan the destruction of a device
    pub fn destroy_device(tree: &DeviceTree, device: DeviceId) -> Result<Self, ActionError> {
        Ok(Self::new(tree, device, Operation::DestroyDevice)?)
    }

    /// Plan a device resize and set the device's target size.
    ///
    /// # Errors
    ///
    /// Rejects non-resizable devices, a size equal to the current size, and
    /// sizes outside `[min_size, max_size]`.
    pub fn resize_device(
        tree: &mut DeviceTree,
        device: DeviceId,
        new_size: Size,
    ) -> Result<Self, ActionError> {
        let dev = tree.device(device)?;
        if !dev.resizable {
            return Err(ActionError::DeviceNotResizable(dev.name.clone()));
        }
        check_new_size(new_size, dev.current_size, dev.min_size, dev.max_size)?;

        let direction = direction_of(new_size, dev.current_size);
        let orig_size = dev.target_size;
        let action = Self::new(
            tree,
            device,
            Operation::ResizeDevice {
                direction,
                new_size,
                orig_size,
            },
        )?;
        tree.device_mut(device)?.target_size = new_size;
        Ok(action)
    }

    /// Plan the creation of `format` on a device and attach it as the
    /// device's current format
    pub fn create_format(
        tree: &mut DeviceTree,
        device: DeviceId,
        format: Format,
    ) -> Result<Self, ActionError> {
        let orig_format = tree.device(device)?.format;
        let format = tree.insert_format(format);
        let action = Self::new(
            tree,
            device,
            Operation::CreateFormat {
                format,
                orig_format,
            },
        )?;
        tree.device_mut(device)?.format = format;
        Ok(action)
    }

    /// Plan the removal of the device's current format, leaving the device
    /// with no format
    pub fn destroy_format(tree: &mut DeviceTree, device: DeviceId) -> Result<Self, ActionError> {
        let orig_format = tree.device(device)?.format;
        let action = Self::new(tree, device, Operation::DestroyFormat { orig_format })?;
        let placeholder = tree.insert_format(Format::none());
        tree.device_mut(device)?.format = placeholder;
        Ok(action)
    }

    /// Plan a resize of the device's current format and set its target size.
    ///
    /// # Errors
    ///
    /// Same rules as [`Action::resize_device`], applied to the format.
    pub fn resize_format(
        tree: &mut DeviceTree,
        device: DeviceId,
        new_size: Size,
    ) -> Result<Self, ActionError> {
        let dev = tree.device(device)?;
        let format_id = dev.format;
        let format = tree.format(format_id)?;
        if !format.resizable {
            return Err(ActionError::FormatNotResizable(dev.name.clone()));
        }
        check_new_size(new_size, format.current_size, format.min_size, format.max_size)?;

        let direction = direction_of(new_size, format.current_size);
        let orig_size = format.target_size;
        let action = Self::new(
            tree,
            device,
            Operation::ResizeFormat {
                format: format_id,
                direction,
                new_size,
                orig_size,
            },
        )?;
        tree.format_mut(format_id)?.target_size = new_size;
        Ok(action)
    }
}

fn check_new_size(new: Size, current: Size, min: Size, max: Size) -> Result<(), ActionError> {
    if new == current {
        return Err(ActionError::SizeUnchanged(new));
    }
    if new < min {
        return Err(ActionError::SizeTooSmall {
            requested: new,
            minimum: min,
        });
    }
    if new > max {
        return Err(ActionError::SizeTooLarge {
            requested: new,
            maximum: max,
        });
    }
    Ok(())
}

fn direction_of(new: Size, current: Size) -> ResizeDirection {
    if new > current {
        ResizeDirection::Grow
    } else {
        ResizeDirection::Shrink
    }
}

// ============================================================================
// Accessors and labels
// ============================================================================

impl Action {
    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn operation(&self) -> &Operation {
        &self.op
    }

    pub fn kind(&self) -> ActionKind {
        self.op.kind()
    }

    pub fn action_type(&self) -> ActionType {
        self.kind().action_type()
    }

    pub fn object(&self) -> ActionObject {
        self.kind().object()
    }

    /// Resize direction, for resize actions
    pub fn direction(&self) -> Option<ResizeDirection> {
        match self.op {
            Operation::ResizeDevice { direction, .. } | Operation::ResizeFormat { direction, .. } => {
                Some(direction)
            }
            _ => None,
        }
    }

    pub fn is_create(&self) -> bool {
        self.action_type() == ActionType::Create
    }

    pub fn is_destroy(&self) -> bool {
        self.action_type() == ActionType::Destroy
    }

    pub fn is_resize(&self) -> bool {
        self.action_type() == ActionType::Resize
    }

    pub fn is_device(&self) -> bool {
        self.object() == ActionObject::Device
    }

    pub fn is_format(&self) -> bool {
        self.object() == ActionObject::Format
    }

    pub fn is_grow(&self) -> bool {
        self.direction() == Some(ResizeDirection::Grow)
    }

    pub fn is_shrink(&self) -> bool {
        self.direction() == Some(ResizeDirection::Shrink)
    }

    /// "Create", "Destroy" or "Resize"
    pub fn type_string(&self) -> String {
        self.action_type().to_string()
    }

    /// "Device" or "Format"
    pub fn object_string(&self) -> String {
        self.object().to_string()
    }

    /// "Grow"/"Shrink" for resizes, empty otherwise
    pub fn resize_string(&self) -> String {
        self.direction().map(|d| d.to_string()).unwrap_or_default()
    }

    /// Format name for format actions, device type for device actions
    pub fn object_type_string(&self) -> String {
        match &self.format_desc {
            Some(desc) if self.is_format() => desc.clone(),
            _ => self.device_type.to_string(),
        }
    }

    /// e.g. "create format"
    pub fn type_desc(&self) -> &'static str {
        self.kind().description()
    }

    /// The format this action operates on, as seen by the predicates.
    ///
    /// A format destroy refers to the format it removes; everything else
    /// looks at the device's current format.
    fn operand_format(&self, tree: &DeviceTree) -> Option<FormatId> {
        match self.op {
            Operation::DestroyFormat { orig_format } => Some(orig_format),
            _ => tree.device(self.device).ok().map(|d| d.format),
        }
    }

    fn operand_format_exists(&self, tree: &DeviceTree) -> bool {
        self.operand_format(tree)
            .and_then(|id| tree.format(id).ok())
            .is_some_and(|f| f.exists)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.id, self.type_string(), self.object_string())?;
        if let Some(direction) = self.direction() {
            write!(f, " ({})", direction)?;
        }
        if self.is_format() {
            if let Some(desc) = &self.format_desc {
                write!(f, " {} on", desc)?;
            }
        }
        write!(
            f,
            " {} {} (id {})",
            self.device_type, self.device_name, self.device
        )
    }
}

// ============================================================================
// Ordering predicates
// ============================================================================

impl Action {
    /// True if `self` must run after `other`
    pub fn requires(&self, other: &Action, tree: &DeviceTree) -> bool {
        match self.op {
            Operation::CreateDevice => self.create_device_requires(other, tree),
            Operation::DestroyDevice => self.destroy_device_requires(other, tree),
            Operation::ResizeDevice { .. } => self.resize_device_requires(other, tree),
            Operation::CreateFormat { .. } => {
                (tree.depends_on(self.device, other.device)
                    && !(other.is_destroy() && other.is_device()))
                    || (other.is_device()
                        && (other.is_create() || other.is_resize())
                        && self.device == other.device)
            }
            Operation::DestroyFormat { .. } => {
                other.is_destroy() && tree.depends_on(other.device, self.device)
            }
            Operation::ResizeFormat { .. } => self.resize_format_requires(other, tree),
        }
    }

    fn create_device_requires(&self, other: &Action, tree: &DeviceTree) -> bool {
        if tree.depends_on(self.device, other.device) {
            return true;
        }
        if !(other.is_create() && other.is_device()) {
            return false;
        }
        let (Ok(mine), Ok(theirs)) = (tree.device(self.device), tree.device(other.device)) else {
            return false;
        };
        match (mine.kind, theirs.kind) {
            // create partitions in ascending numerical order
            (DeviceKind::Partition { number: a }, DeviceKind::Partition { number: b })
                if same_parent(tree.partition_disk(self.device), tree.partition_disk(other.device)) =>
            {
                a > b
            }
            // single-PV logical volumes are allocated first
            (
                DeviceKind::LvmLogicalVolume { single_pv: pinned },
                DeviceKind::LvmLogicalVolume { single_pv: other_pinned },
            ) if same_parent(tree.volume_group(self.device), tree.volume_group(other.device)) => {
                other_pinned && !pinned
            }
            _ => false,
        }
    }

    fn destroy_device_requires(&self, other: &Action, tree: &DeviceTree) -> bool {
        if other.is_destroy() && tree.depends_on(other.device, self.device) {
            return true;
        }
        if other.is_destroy() && other.is_device() {
            let (Ok(mine), Ok(theirs)) = (tree.device(self.device), tree.device(other.device))
            else {
                return false;
            };
            if let (Some(a), Some(b)) = (mine.partition_number(), theirs.partition_number()) {
                if same_parent(tree.partition_disk(self.device), tree.partition_disk(other.device)) {
                    // remove partitions in descending numerical order
                    return a < b;
                }
            }
            return false;
        }
        // the device goes after its own format
        other.is_destroy() && other.is_format() && other.device == self.device
    }

    fn resize_device_requires(&self, other: &Action, tree: &DeviceTree) -> bool {
        if !other.is_resize() {
            return false;
        }
        (self.device == other.device
            && self.direction() == other.direction()
            && other.is_format()
            && self.is_shrink())
            || (other.is_grow() && tree.depends_on(self.device, other.device))
            || (other.is_shrink() && tree.depends_on(other.device, self.device))
    }

    fn resize_format_requires(&self, other: &Action, tree: &DeviceTree) -> bool {
        if !other.is_resize() {
            return false;
        }
        (self.device == other.device
            && self.direction() == other.direction()
            && other.is_device()
            && self.is_grow())
            || (other.is_shrink() && tree.depends_on(other.device, self.device))
            || (other.is_grow() && tree.depends_on(self.device, other.device))
    }

    /// True if registering `self` makes `other` unnecessary.
    ///
    /// Only compares actions on the same device. An action may obsolete
    /// itself, which means it is a no-op and must not be queued.
    pub fn obsoletes(&self, other: &Action, tree: &DeviceTree) -> bool {
        if self.device != other.device {
            return false;
        }
        match self.op {
            Operation::DestroyDevice => {
                let exists = tree.device(self.device).is_ok_and(|d| d.exists);
                if exists {
                    // the format still has to be wiped before the device goes
                    self.id > other.id && !(other.is_destroy() && other.is_format())
                } else {
                    self.id >= other.id
                }
            }
            Operation::CreateFormat { .. } => {
                other.is_format()
                    && !(other.is_destroy() && other.operand_format_exists(tree))
                    && self.id > other.id
            }
            Operation::DestroyFormat { .. } => {
                let mine_exists = self.operand_format_exists(tree);
                other.is_format()
                    && (self.id > other.id || (self.id == other.id && !mine_exists))
                    && !(other.operand_format_exists(tree) && !mine_exists)
            }
            Operation::CreateDevice | Operation::ResizeDevice { .. } | Operation::ResizeFormat { .. } => {
                self.kind() == other.kind() && self.id > other.id
            }
        }
    }

    /// Take over the snapshot of an obsoleted action that changed the same
    /// model attribute, so cancelling `self` restores the state from before
    /// `older` was constructed. Returns false if the attributes differ.
    pub(crate) fn inherit_snapshot(&mut self, older: &Action) -> bool {
        if self.device != older.device {
            return false;
        }
        match (&mut self.op, &older.op) {
            (
                Operation::CreateFormat { orig_format, .. } | Operation::DestroyFormat { orig_format },
                Operation::CreateFormat {
                    orig_format: older_orig,
                    ..
                }
                | Operation::DestroyFormat {
                    orig_format: older_orig,
                },
            ) => {
                *orig_format = *older_orig;
                true
            }
            (
                Operation::ResizeDevice { orig_size, .. },
                Operation::ResizeDevice {
                    orig_size: older_orig,
                    ..
                },
            ) => {
                *orig_size = *older_orig;
                true
            }
            (
                Operation::ResizeFormat {
                    format, orig_size, ..
                },
                Operation::ResizeFormat {
                    format: older_format,
                    orig_size: older_orig,
                    ..
                },
            ) if *format == *older_format => {
                *orig_size = *older_orig;
                true
            }
            _ => false,
        }
    }
}

fn same_parent(a: Option<DeviceId>, b: Option<DeviceId>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

// ============================================================================
// Cancel / execute
// ============================================================================

impl Action {
    /// Undo the in-memory intent recorded at construction.
    ///
    /// Only meaningful before `execute`; it never reverts real changes.
    pub fn cancel(&self, tree: &mut DeviceTree) -> Result<(), ModelError> {
        match self.op {
            Operation::CreateDevice | Operation::DestroyDevice => {}
            Operation::ResizeDevice { orig_size, .. } => {
                tree.device_mut(self.device)?.target_size = orig_size;
            }
            Operation::CreateFormat { orig_format, .. } | Operation::DestroyFormat { orig_format } => {
                tree.format(orig_format)?;
                tree.device_mut(self.device)?.format = orig_format;
            }
            Operation::ResizeFormat {
                format, orig_size, ..
            } => {
                tree.format_mut(format)?.target_size = orig_size;
            }
        }
        debug!("Cancelled action {}", self);
        Ok(())
    }

    /// Carry the action out through the platform and record the result in the
    /// model. Returns warnings for best-effort steps that failed.
    pub fn execute(
        &self,
        tree: &mut DeviceTree,
        platform: &mut dyn StoragePlatform,
    ) -> Result<Vec<ExecutionWarning>, ExecutionError> {
        info!("Executing action: {}", self);
        let mut warnings = Vec::new();

        match self.op {
            Operation::CreateDevice => {
                let device = tree.device(self.device)?.clone();
                platform.backend().create_device(&device)?;
                let device = tree.device_mut(self.device)?;
                device.exists = true;
                device.current_size = device.target_size;
            }
            Operation::DestroyDevice => {
                let device = tree.device(self.device)?.clone();
                platform.backend().destroy_device(&device)?;
                tree.device_mut(self.device)?.exists = false;

                if device.has_descriptor {
                    if let Err(e) = platform.backend().invalidate_descriptor(&device) {
                        // best-effort; the device itself is already gone
                        warn!(
                            "Ignoring failure to invalidate descriptor for {}: {}",
                            device.name, e
                        );
                        warnings.push(ExecutionWarning::DescriptorInvalidation {
                            action: self.id,
                            device: device.name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Operation::ResizeDevice { .. } => {
                let device = tree.device(self.device)?.clone();
                platform.backend().resize_device(&device)?;
                let device = tree.device_mut(self.device)?;
                device.current_size = device.target_size;
            }
            Operation::CreateFormat { format, .. } => {
                if let Some(warning) = self.execute_create_format(format, tree, platform)? {
                    warnings.push(warning);
                }
            }
            Operation::DestroyFormat { orig_format } => {
                let device = tree.device(self.device)?.clone();
                let fmt = tree.format(orig_format)?.clone();
                if !fmt.kind.is_formattable() && fmt.kind != FormatKind::None {
                    return Err(ExecutionError::Unsupported {
                        format: fmt.kind,
                        operation: "destruction",
                    });
                }

                let was_active = platform.backend().device_status(&device);
                platform.backend().setup_device(&device, true)?;
                platform.backend().destroy_format(&device, &fmt)?;
                tree.format_mut(orig_format)?.exists = false;
                platform.events().settle();
                if !was_active {
                    platform.backend().teardown_device(&device)?;
                }
            }
            Operation::ResizeFormat { format, .. } => {
                let device = tree.device(self.device)?.clone();
                let fmt = tree.format(format)?.clone();
                platform.backend().setup_device(&device, true)?;
                platform.backend().resize_format(&device, &fmt)?;
                let fmt = tree.format_mut(format)?;
                fmt.current_size = fmt.target_size;
            }
        }

        Ok(warnings)
    }

    fn execute_create_format(
        &self,
        format_id: FormatId,
        tree: &mut DeviceTree,
        platform: &mut dyn StoragePlatform,
    ) -> Result<Option<ExecutionWarning>, ExecutionError> {
        let device = tree.device(self.device)?.clone();
        let fmt = tree.format(format_id)?.clone();
        if !fmt.kind.is_formattable() {
            return Err(ExecutionError::Unsupported {
                format: fmt.kind,
                operation: "creation",
            });
        }

        platform.backend().setup_device(&device, false)?;

        if device.is_partition() {
            let required = fmt.kind.partition_flag();
            for flag in PartitionFlag::iter() {
                // keep the LBA flag on pre-existing partitions
                if flag == PartitionFlag::Lba || Some(flag) == required {
                    continue;
                }
                platform.backend().unset_partition_flag(&device, flag)?;
            }
            if let Some(flag) = required {
                platform.backend().set_partition_flag(&device, flag)?;
            }
            if let Some(system) = fmt.kind.partition_system() {
                platform.backend().set_partition_system(&device, system)?;
            }
            if let Some(disk_id) = tree.partition_disk(self.device) {
                let disk = tree.device(disk_id)?.clone();
                platform.backend().commit_disk(&disk)?;
            }
        }

        platform
            .backend()
            .create_format(&device, &fmt, &device.path, &device.format_args)?;
        tree.format_mut(format_id)?.exists = true;

        platform.events().settle();
        match platform.events().resolve(&device.path) {
            Some(info) => {
                if fmt.kind.takes_device_uuid() {
                    tree.format_mut(format_id)?.uuid = info.uuid;
                }
                tree.device_mut(self.device)?.device_links = info.links;
                Ok(None)
            }
            None if fmt.kind.is_ephemeral() => Ok(None),
            None => {
                error!("Device lookup failed for device: {}", device.name);
                Ok(Some(ExecutionWarning::DescriptorLookup {
                    action: self.id,
                    device: device.name,
                    format: fmt.kind,
                }))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
