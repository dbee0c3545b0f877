//! The cross-platform storage device model.

use std::fmt;

use serde::Serialize;

/// One storage device discovered during a single enumeration pass.
///
/// A descriptor is pure data: it is created fresh per enumeration call,
/// is never updated afterwards, and holds no live OS resources, so it is
/// safe to retain or serialize long after the listing returned. The
/// `device`/`device_path` identifiers are only guaranteed unique within
/// the pass that produced them, not across passes or reboots.
///
/// Serialization uses the historical field names (`IsUSB`, `IsUAS`,
/// PascalCase for the rest) so machine consumers see a stable report
/// format.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceDescriptor {
    /// The interface type of this device, best-effort. Possibly: USB.
    pub interface_type: String,
    /// The bus type of this device, best-effort.
    pub bus_type: String,
    /// The bus version of this device, best-effort.
    pub bus_version: String,
    /// The device id, addressable for subsequent open operations.
    pub device: String,
    /// The path to the device.
    pub device_path: String,
    /// The raw bus-enumerator class name, e.g. "SCSI" or "USBSTOR".
    /// This is the primary classification key.
    pub enumerator: String,
    /// Human-readable label for this device.
    pub description: String,
    /// The platform-native addressable path, e.g. `\\.\PhysicalDrive2`
    /// or `/dev/sdb`.
    pub raw: String,
    /// Any error when accessing the device. Empty means no error; a
    /// non-empty value marks the device "unusable for this session" but
    /// it is still listed.
    pub error: String,
    /// The size of the device in bytes.
    pub size: u64,
    /// Sector geometry; 512 when the platform does not report it.
    pub block_size: u32,
    pub logical_block_size: u32,
    /// Active filesystem mount points, if any.
    pub mountpoints: Vec<String>,

    pub is_read_only: bool,
    pub is_system: bool,
    pub is_virtual: bool,
    pub is_removable: bool,
    /// Device is an SD card.
    pub is_card: bool,
    pub is_scsi: bool,
    #[serde(rename = "IsUSB")]
    pub is_usb: bool,
    /// USB-Attached SCSI: a removable SCSI-class device on a USB
    /// transport. Always derived, never set independently.
    #[serde(rename = "IsUAS")]
    pub is_uas: bool,
}

impl DeviceDescriptor {
    /// A short classification tag for human-readable listings.
    pub fn kind(&self) -> &'static str {
        if !self.error.is_empty() {
            "error"
        } else if self.is_card {
            "sd-card"
        } else if self.is_virtual {
            "virtual"
        } else if self.is_system {
            "system"
        } else if self.is_uas {
            "uas"
        } else if self.is_usb {
            "usb"
        } else if self.is_scsi {
            "scsi"
        } else {
            "disk"
        }
    }

    /// Size in gigabytes, for display only.
    pub fn size_gb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mount_info = if !self.mountpoints.is_empty() {
            format!("[Mounted at {}]", self.mountpoints.join(", "))
        } else {
            "[Not mounted]".to_string()
        };

        write!(
            f,
            "{:<22} {:<30} {:>6.1} GB {:<8} {}",
            self.raw,
            self.description,
            self.size_gb(),
            self.kind(),
            mount_info
        )
    }
}
