//! Emulated device classes, slot layout and per-slot status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A kind of emulated device that has an activity LED.
///
/// The declaration order is the order in which a `status` report lists the
/// classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceClass {
    Floppy,
    Cdrom,
    HardDisk,
    RemovableDisk,
    MagnetoOptical,
    Network,
}

impl DeviceClass {
    /// Every class, in report order.
    pub const ALL: [DeviceClass; 6] = [
        DeviceClass::Floppy,
        DeviceClass::Cdrom,
        DeviceClass::HardDisk,
        DeviceClass::RemovableDisk,
        DeviceClass::MagnetoOptical,
        DeviceClass::Network,
    ];

    /// The short name used on the wire (`fdd`, `cdrom`, ...).
    pub fn wire_name(self) -> &'static str {
        match self {
            DeviceClass::Floppy => "fdd",
            DeviceClass::Cdrom => "cdrom",
            DeviceClass::HardDisk => "hdd",
            DeviceClass::RemovableDisk => "rdisk",
            DeviceClass::MagnetoOptical => "mo",
            DeviceClass::Network => "net",
        }
    }

    /// `true` for classes whose slots can hold removable media and therefore
    /// report `!media` lines. Hard disks and network cards never do.
    pub fn has_media(self) -> bool {
        !matches!(self, DeviceClass::HardDisk | DeviceClass::Network)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A kind of drive that accepts `*load` / `*eject` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaClass {
    Floppy,
    Cdrom,
    RemovableDisk,
    MagnetoOptical,
    Cartridge,
}

impl MediaClass {
    /// The name used in command replies (`OK fdd 0 loaded`).
    pub fn wire_name(self) -> &'static str {
        match self {
            MediaClass::Floppy => "fdd",
            MediaClass::Cdrom => "cdrom",
            MediaClass::RemovableDisk => "rdisk",
            MediaClass::MagnetoOptical => "mo",
            MediaClass::Cartridge => "cartridge",
        }
    }

    /// The LED-carrying device class backing this media class, if any.
    /// Cartridge slots have no status LED.
    pub fn device_class(self) -> Option<DeviceClass> {
        match self {
            MediaClass::Floppy => Some(DeviceClass::Floppy),
            MediaClass::Cdrom => Some(DeviceClass::Cdrom),
            MediaClass::RemovableDisk => Some(DeviceClass::RemovableDisk),
            MediaClass::MagnetoOptical => Some(DeviceClass::MagnetoOptical),
            MediaClass::Cartridge => None,
        }
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// The three states an activity LED can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedState {
    Idle,
    Read,
    Write,
}

impl LedState {
    /// Write activity wins over read activity.
    pub fn from_activity(active: bool, write_active: bool) -> Self {
        if write_active {
            LedState::Write
        } else if active {
            LedState::Read
        } else {
            LedState::Idle
        }
    }
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LedState::Idle => "idle",
            LedState::Read => "read",
            LedState::Write => "write",
        })
    }
}

/// Live status of one device slot as reported by the host.
///
/// `empty` is meaningful only for classes where [`DeviceClass::has_media`]
/// is `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    pub active: bool,
    pub write_active: bool,
    pub empty: bool,
}

impl DeviceStatus {
    pub fn led(&self) -> LedState {
        LedState::from_activity(self.active, self.write_active)
    }

    /// `true` when a medium is present.
    pub fn inserted(&self) -> bool {
        !self.empty
    }
}

/// Read access to the host's device status table.
///
/// Implementations must be cheap to call: the poller reads every slot of
/// every class on each tick.
pub trait DeviceStateSource {
    /// Status of `slot` within `class`. Slots beyond what the host emulates
    /// report idle and empty.
    fn device_status(&self, class: DeviceClass, slot: usize) -> DeviceStatus;
}

// ── Layout ────────────────────────────────────────────────────────────────────

/// Number of slots the host exposes for each device class.
///
/// Loaded from the `[devices]` section of the configuration file; any field
/// left out falls back to the emulator's compile-time maximum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLayout {
    #[serde(default = "default_floppy")]
    pub floppy: usize,
    #[serde(default = "default_cdrom")]
    pub cdrom: usize,
    #[serde(default = "default_hard_disk")]
    pub hard_disk: usize,
    #[serde(default = "default_removable_disk")]
    pub removable_disk: usize,
    #[serde(default = "default_magneto_optical")]
    pub magneto_optical: usize,
    #[serde(default = "default_network")]
    pub network: usize,
    #[serde(default = "default_cartridge")]
    pub cartridge: usize,
}

fn default_floppy() -> usize {
    4
}
fn default_cdrom() -> usize {
    8
}
fn default_hard_disk() -> usize {
    8
}
fn default_removable_disk() -> usize {
    4
}
fn default_magneto_optical() -> usize {
    4
}
fn default_network() -> usize {
    4
}
fn default_cartridge() -> usize {
    2
}

impl Default for DeviceLayout {
    fn default() -> Self {
        Self {
            floppy: default_floppy(),
            cdrom: default_cdrom(),
            hard_disk: default_hard_disk(),
            removable_disk: default_removable_disk(),
            magneto_optical: default_magneto_optical(),
            network: default_network(),
            cartridge: default_cartridge(),
        }
    }
}

impl DeviceLayout {
    /// Slot count for an LED-carrying class.
    pub fn slots(&self, class: DeviceClass) -> usize {
        match class {
            DeviceClass::Floppy => self.floppy,
            DeviceClass::Cdrom => self.cdrom,
            DeviceClass::HardDisk => self.hard_disk,
            DeviceClass::RemovableDisk => self.removable_disk,
            DeviceClass::MagnetoOptical => self.magneto_optical,
            DeviceClass::Network => self.network,
        }
    }

    /// Slot count for a class that accepts load/eject commands.
    pub fn media_slots(&self, class: MediaClass) -> usize {
        match class.device_class() {
            Some(device) => self.slots(device),
            None => self.cartridge,
        }
    }

    /// Every `(class, slot)` pair in report order.
    pub fn all_slots(&self) -> impl Iterator<Item = (DeviceClass, usize)> + '_ {
        DeviceClass::ALL
            .into_iter()
            .flat_map(move |class| (0..self.slots(class)).map(move |slot| (class, slot)))
    }
}
