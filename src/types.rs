//! Type-safe labels for storage actions
//!
//! The two axes of an action (what it does, what it does it to), resize
//! direction, format kinds and partition flags are closed enums. They render
//! and parse through strum so reporting code never compares raw strings.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// What an action does to its operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ActionType {
    Create,
    Destroy,
    Resize,
}

/// Whether an action operates on the device itself or on its format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ActionObject {
    Device,
    Format,
}

/// Orientation of a resize, fixed when the action is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ResizeDirection {
    Grow,
    Shrink,
}

/// The six concrete action kinds (type × object)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter)]
pub enum ActionKind {
    CreateDevice,
    DestroyDevice,
    ResizeDevice,
    CreateFormat,
    DestroyFormat,
    ResizeFormat,
}

impl ActionKind {
    /// Combine the two axes into a kind
    pub const fn new(action_type: ActionType, object: ActionObject) -> Self {
        match (action_type, object) {
            (ActionType::Create, ActionObject::Device) => Self::CreateDevice,
            (ActionType::Destroy, ActionObject::Device) => Self::DestroyDevice,
            (ActionType::Resize, ActionObject::Device) => Self::ResizeDevice,
            (ActionType::Create, ActionObject::Format) => Self::CreateFormat,
            (ActionType::Destroy, ActionObject::Format) => Self::DestroyFormat,
            (ActionType::Resize, ActionObject::Format) => Self::ResizeFormat,
        }
    }

    pub const fn action_type(self) -> ActionType {
        match self {
            Self::CreateDevice | Self::CreateFormat => ActionType::Create,
            Self::DestroyDevice | Self::DestroyFormat => ActionType::Destroy,
            Self::ResizeDevice | Self::ResizeFormat => ActionType::Resize,
        }
    }

    pub const fn object(self) -> ActionObject {
        match self {
            Self::CreateDevice | Self::DestroyDevice | Self::ResizeDevice => ActionObject::Device,
            Self::CreateFormat | Self::DestroyFormat | Self::ResizeFormat => ActionObject::Format,
        }
    }

    /// Short lowercase description used in progress messages
    pub const fn description(self) -> &'static str {
        match self {
            Self::CreateDevice => "create device",
            Self::DestroyDevice => "destroy device",
            Self::ResizeDevice => "resize device",
            Self::CreateFormat => "create format",
            Self::DestroyFormat => "destroy format",
            Self::ResizeFormat => "resize format",
        }
    }
}

/// Partition flags understood by the partitioning backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PartitionFlag {
    Boot,
    Root,
    Swap,
    Hidden,
    Raid,
    Lvm,
    Lba,
    HpService,
    Palo,
    Prep,
    MsftReserved,
    BiosGrub,
    AppleTvRecovery,
    Diag,
    LegacyBoot,
    MsftData,
    Irst,
    Esp,
}

/// Content that can live on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum FormatKind {
    /// Placeholder for "no format"
    #[default]
    None,
    Ext4,
    Xfs,
    Btrfs,
    Vfat,
    /// EFI System Partition filesystem
    Efi,
    Swap,
    Tmpfs,
    #[strum(serialize = "lvmpv")]
    LvmPv,
    #[strum(serialize = "mdmember")]
    MdMember,
    Luks,
    #[strum(serialize = "biosboot")]
    BiosBoot,
    #[strum(serialize = "dmraidmember")]
    DmRaidMember,
    #[strum(serialize = "multipath_member")]
    MultipathMember,
}

impl FormatKind {
    /// Human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "Unknown",
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
            Self::Vfat => "vfat",
            Self::Efi => "EFI System Partition",
            Self::Swap => "swap",
            Self::Tmpfs => "tmpfs",
            Self::LvmPv => "physical volume (LVM)",
            Self::MdMember => "software RAID",
            Self::Luks => "encrypted",
            Self::BiosBoot => "BIOS Boot",
            Self::DmRaidMember => "dm-raid member device",
            Self::MultipathMember => "multipath member device",
        }
    }

    /// Partition flag a partition holding this format must carry
    pub const fn partition_flag(self) -> Option<PartitionFlag> {
        match self {
            Self::Swap => Some(PartitionFlag::Swap),
            Self::LvmPv => Some(PartitionFlag::Lvm),
            Self::MdMember => Some(PartitionFlag::Raid),
            Self::Efi => Some(PartitionFlag::Boot),
            Self::BiosBoot => Some(PartitionFlag::BiosGrub),
            _ => None,
        }
    }

    /// MBR partition-type code for this format, if it needs a specific one
    pub const fn partition_system(self) -> Option<u8> {
        match self {
            Self::Swap => Some(0x82),
            Self::LvmPv => Some(0x8e),
            Self::MdMember => Some(0xfd),
            Self::Efi => Some(0xef),
            _ => None,
        }
    }

    /// Formats with no backing block device of their own
    pub const fn is_ephemeral(self) -> bool {
        matches!(self, Self::Tmpfs)
    }

    /// Whether the UUID reported by the device-event layer belongs to this format.
    ///
    /// Btrfs reports the volume UUID, which is tracked on the volume instead.
    pub const fn takes_device_uuid(self) -> bool {
        !matches!(self, Self::Btrfs)
    }

    /// Member signatures written by other tools can never be created or wiped here
    pub const fn is_formattable(self) -> bool {
        !matches!(self, Self::None | Self::DmRaidMember | Self::MultipathMember)
    }

    /// Default resize capability for a fresh format of this kind
    pub const fn is_resizable(self) -> bool {
        matches!(self, Self::Ext4 | Self::Btrfs | Self::LvmPv | Self::Luks)
    }
}
