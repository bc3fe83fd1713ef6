//! In-memory storage device model
//!
//! A [`DeviceTree`] owns every [`Device`] and [`Format`] an action can refer to.
//! Devices reference their parents and their current format by id, which keeps
//! the "who depends on whom" relation explicit and lets actions snapshot and
//! restore format references without aliasing.
//!
//! # Identity
//!
//! Device and format ids are issued by the tree, strictly increasing, and
//! never reused. Devices are never removed from the tree: a destroyed device
//! keeps its id and simply stops existing.

use crate::error::ModelError;
use crate::size::Size;
use crate::types::FormatKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Stable identity of a device within a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(u32);

/// Stable identity of a format within a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormatId(u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The structural role of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Disk,
    /// Partition on its single parent disk
    Partition { number: u32 },
    /// Volume group; parents are its physical volumes
    LvmVolumeGroup,
    /// Logical volume; parent is its volume group
    LvmLogicalVolume {
        /// Must be allocated on a single physical volume
        single_pv: bool,
    },
    /// Software RAID array; parents are its members
    MdRaidArray,
    /// dm-crypt mapping; parent is the encrypted backing device
    Luks,
    Other,
}

impl DeviceKind {
    /// Device type string used in reports
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Partition { .. } => "partition",
            Self::LvmVolumeGroup => "lvmvg",
            Self::LvmLogicalVolume { .. } => "lvmlv",
            Self::MdRaidArray => "mdarray",
            Self::Luks => "luks/dm-crypt",
            Self::Other => "other",
        }
    }
}

/// Content living on a device (filesystem, PV signature, swap, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub kind: FormatKind,
    pub exists: bool,
    pub resizable: bool,
    pub current_size: Size,
    pub target_size: Size,
    pub min_size: Size,
    pub max_size: Size,
    pub uuid: Option<String>,
    pub label: Option<String>,
}

impl Format {
    /// A format that will be created by a plan
    pub fn new(kind: FormatKind) -> Self {
        Self {
            kind,
            exists: false,
            resizable: kind.is_resizable(),
            current_size: Size::ZERO,
            target_size: Size::ZERO,
            min_size: Size::ZERO,
            max_size: Size::ZERO,
            uuid: None,
            label: None,
        }
    }

    /// A format already present on disk
    pub fn existing(kind: FormatKind, size: Size) -> Self {
        Self {
            exists: true,
            current_size: size,
            target_size: size,
            max_size: size,
            ..Self::new(kind)
        }
    }

    /// The "no format" placeholder
    pub fn none() -> Self {
        Self::new(FormatKind::None)
    }

    pub fn with_bounds(mut self, min_size: Size, max_size: Size) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Short description for action listings
    pub fn desc(&self) -> String {
        self.kind.name().to_string()
    }
}

/// A storage device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    pub parents: Vec<DeviceId>,
    pub exists: bool,
    pub resizable: bool,
    pub current_size: Size,
    pub target_size: Size,
    pub min_size: Size,
    pub max_size: Size,
    pub format: FormatId,
    pub path: PathBuf,
    /// Options passed to format creation (e.g. mkfs arguments)
    pub format_args: Vec<String>,
    /// Alias paths discovered after the device was formatted
    pub device_links: Vec<String>,
    /// Whether a cached low-level descriptor exists that must be invalidated
    /// when the device is destroyed
    pub has_descriptor: bool,
}

impl Device {
    /// Start describing a device to add to a tree
    pub fn builder(name: impl Into<String>, kind: DeviceKind) -> DeviceBuilder {
        DeviceBuilder::new(name.into(), kind)
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Partition number, for partitions
    pub fn partition_number(&self) -> Option<u32> {
        match self.kind {
            DeviceKind::Partition { number } => Some(number),
            _ => None,
        }
    }

    pub fn is_partition(&self) -> bool {
        matches!(self.kind, DeviceKind::Partition { .. })
    }
}

/// Builder for devices; ids and formats are assigned by [`DeviceTree::add`]
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    name: String,
    kind: DeviceKind,
    parents: Vec<DeviceId>,
    exists: bool,
    resizable: bool,
    size: Size,
    bounds: Option<(Size, Size)>,
    format: Format,
    path: Option<PathBuf>,
    format_args: Vec<String>,
    has_descriptor: bool,
}

impl DeviceBuilder {
    fn new(name: String, kind: DeviceKind) -> Self {
        Self {
            name,
            kind,
            parents: Vec::new(),
            exists: false,
            resizable: false,
            size: Size::ZERO,
            bounds: None,
            format: Format::none(),
            path: None,
            format_args: Vec::new(),
            has_descriptor: true,
        }
    }

    pub fn parent(mut self, parent: DeviceId) -> Self {
        self.parents.push(parent);
        self
    }

    pub fn exists(mut self, exists: bool) -> Self {
        self.exists = exists;
        self
    }

    pub fn resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Current (and initial target) size
    pub fn size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    /// Resize bounds; defaults to exactly the current size
    pub fn bounds(mut self, min_size: Size, max_size: Size) -> Self {
        self.bounds = Some((min_size, max_size));
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Device node path; defaults to `/dev/<name>`
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn format_arg(mut self, arg: impl Into<String>) -> Self {
        self.format_args.push(arg.into());
        self
    }

    pub fn has_descriptor(mut self, has_descriptor: bool) -> Self {
        self.has_descriptor = has_descriptor;
        self
    }
}

/// Owner of all devices and formats in a storage configuration
#[derive(Debug, Clone, Default)]
pub struct DeviceTree {
    devices: BTreeMap<DeviceId, Device>,
    formats: BTreeMap<FormatId, Format>,
    next_device: u32,
    next_format: u32,
}

impl DeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device and its initial format, returning the new device id.
    ///
    /// # Errors
    ///
    /// `UnknownDevice` if a declared parent is not in the tree.
    pub fn add(&mut self, builder: DeviceBuilder) -> Result<DeviceId, ModelError> {
        if let Some(missing) = builder.parents.iter().find(|p| !self.devices.contains_key(*p)) {
            return Err(ModelError::UnknownDevice(*missing));
        }

        let id = DeviceId(self.next_device);
        self.next_device += 1;
        let format = self.insert_format(builder.format);
        let (min_size, max_size) = builder.bounds.unwrap_or((builder.size, builder.size));
        let path = builder
            .path
            .unwrap_or_else(|| PathBuf::from(format!("/dev/{}", builder.name)));

        self.devices.insert(
            id,
            Device {
                id,
                name: builder.name,
                kind: builder.kind,
                parents: builder.parents,
                exists: builder.exists,
                resizable: builder.resizable,
                current_size: builder.size,
                target_size: builder.size,
                min_size,
                max_size,
                format,
                path,
                format_args: builder.format_args,
                device_links: Vec::new(),
                has_descriptor: builder.has_descriptor,
            },
        );
        Ok(id)
    }

    /// Store a format, returning its id. The format is not attached to any device.
    pub fn insert_format(&mut self, format: Format) -> FormatId {
        let id = FormatId(self.next_format);
        self.next_format += 1;
        self.formats.insert(id, format);
        id
    }

    pub fn device(&self, id: DeviceId) -> Result<&Device, ModelError> {
        self.devices.get(&id).ok_or(ModelError::UnknownDevice(id))
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Result<&mut Device, ModelError> {
        self.devices.get_mut(&id).ok_or(ModelError::UnknownDevice(id))
    }

    pub fn format(&self, id: FormatId) -> Result<&Format, ModelError> {
        self.formats.get(&id).ok_or(ModelError::UnknownFormat(id))
    }

    pub fn format_mut(&mut self, id: FormatId) -> Result<&mut Format, ModelError> {
        self.formats.get_mut(&id).ok_or(ModelError::UnknownFormat(id))
    }

    /// The format currently attached to a device
    pub fn format_of(&self, device: DeviceId) -> Result<&Format, ModelError> {
        self.format(self.device(device)?.format)
    }

    /// Look a device up by name
    pub fn find(&self, name: &str) -> Option<&Device> {
        self.devices.values().find(|d| d.name == name)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// True if `device` sits (transitively) on top of `other`.
    ///
    /// Not reflexive: a device does not depend on itself.
    pub fn depends_on(&self, device: DeviceId, other: DeviceId) -> bool {
        let mut stack: Vec<DeviceId> = match self.devices.get(&device) {
            Some(d) => d.parents.clone(),
            None => return false,
        };
        let mut seen = Vec::new();
        while let Some(parent) = stack.pop() {
            if parent == other {
                return true;
            }
            if seen.contains(&parent) {
                continue;
            }
            seen.push(parent);
            if let Some(d) = self.devices.get(&parent) {
                stack.extend(d.parents.iter().copied());
            }
        }
        false
    }

    /// The disk a partition lives on
    pub fn partition_disk(&self, id: DeviceId) -> Option<DeviceId> {
        let device = self.devices.get(&id)?;
        match device.kind {
            DeviceKind::Partition { .. } => device.parents.first().copied(),
            _ => None,
        }
    }

    /// The volume group a logical volume belongs to
    pub fn volume_group(&self, id: DeviceId) -> Option<DeviceId> {
        let device = self.devices.get(&id)?;
        match device.kind {
            DeviceKind::LvmLogicalVolume { .. } => device.parents.first().copied(),
            _ => None,
        }
    }
}
