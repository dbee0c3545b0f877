//! The device enumeration engine and its backend contract.
//!
//! A [`PropertyProvider`] is an explicitly constructed binding to one
//! platform enumeration backend (the Windows SetupAPI, a test fake, ...).
//! [`list_devices`] drives the provider's iteration protocol, classifies
//! each device with [`crate::classify`], and collects descriptors. The
//! provider is passed in rather than resolved from process-wide state so
//! that the whole engine can be exercised against a fake backend.

use std::io;

use tracing::warn;

use crate::classify::{ClassifierPolicy, RawDeviceProps};
use crate::device::DeviceDescriptor;
use crate::error::{Error, Result};

/// The fallback sector size when the platform does not report geometry.
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Detail fields that require opening or querying the device itself, as
/// opposed to the registry-style properties in [`RawDeviceProps`].
#[derive(Clone, Debug, Default)]
pub struct DriveDetail {
    /// The device interface path used for subsequent opens.
    pub device_path: String,
    /// The platform-native addressable path, e.g. `\\.\PhysicalDrive2`.
    pub raw_path: String,
    /// Capacity in bytes; 0 when unknown.
    pub size: u64,
    /// Physical/logical sector sizes; 0 means "use the default".
    pub block_size: u32,
    pub logical_block_size: u32,
    pub interface_type: String,
    pub bus_type: String,
    pub bus_version: String,
    pub is_read_only: bool,
    pub mountpoints: Vec<String>,
}

/// One platform enumeration backend.
///
/// Devices are addressed by a zero-based index in the platform's native
/// device-tree order; `device_at` returns `None` past the last device.
/// The opaque `Device` value stays valid only while the provider lives.
pub trait PropertyProvider {
    type Device;

    /// The device at `index`, or `None` when iteration is exhausted.
    /// An error here aborts the whole listing, unlike the per-device
    /// lookups below.
    fn device_at(&mut self, index: u32) -> io::Result<Option<Self::Device>>;

    /// The registry-style classification properties for a device.
    fn properties(&mut self, device: &Self::Device) -> io::Result<RawDeviceProps>;

    /// The detail fields that require touching the device itself.
    fn drive_detail(&mut self, device: &Self::Device) -> io::Result<DriveDetail>;
}

/// Enumerates every storage device the provider can see.
///
/// One bad device never fails the whole call: a failing detail lookup
/// produces a descriptor with `error` set and best-effort fields at their
/// defaults, and enumeration moves on ("degraded but listed"). A failing
/// property lookup is treated as insufficient data, classifying to
/// all-false flags. Devices for which the backend reports no enumerator
/// name at all are skipped. Zero devices yields an empty vec, not an
/// error. No ordering beyond the platform's native one is imposed.
pub fn list_devices<P: PropertyProvider>(provider: &mut P) -> Result<Vec<DeviceDescriptor>> {
    let policy = ClassifierPolicy::default();
    let mut descriptors = Vec::new();

    let mut index = 0u32;
    while let Some(device) = provider.device_at(index).map_err(Error::Enumerate)? {
        index += 1;

        let props = match provider.properties(&device) {
            Ok(props) => props,
            Err(err) => {
                warn!(index, %err, "device property lookup failed");
                RawDeviceProps::default()
            }
        };
        if props.enumerator.is_empty() {
            continue;
        }

        let flags = policy.classify(&props);
        let mut desc = DeviceDescriptor {
            enumerator: props.enumerator.clone(),
            description: props.friendly_name.clone(),
            block_size: DEFAULT_BLOCK_SIZE,
            logical_block_size: DEFAULT_BLOCK_SIZE,
            is_removable: flags.is_removable,
            is_virtual: flags.is_virtual,
            is_scsi: flags.is_scsi,
            is_usb: flags.is_usb,
            is_card: flags.is_card,
            is_system: flags.is_system,
            is_uas: flags.is_uas,
            ..Default::default()
        };

        match provider.drive_detail(&device) {
            Ok(detail) => {
                desc.device_path = detail.device_path;
                desc.raw = detail.raw_path;
                desc.device = desc.raw.clone();
                desc.size = detail.size;
                if detail.block_size != 0 {
                    desc.block_size = detail.block_size;
                }
                if detail.logical_block_size != 0 {
                    desc.logical_block_size = detail.logical_block_size;
                }
                desc.interface_type = detail.interface_type;
                desc.bus_type = detail.bus_type;
                desc.bus_version = detail.bus_version;
                desc.is_read_only = detail.is_read_only;
                desc.mountpoints = detail.mountpoints;
            }
            Err(err) => {
                warn!(index, %err, "drive detail lookup failed, listing device as errored");
                desc.error = err.to_string();
            }
        }

        descriptors.push(desc);
    }

    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A scripted backend: one entry per device, each with properties and
    /// an optional detail error.
    #[derive(Default)]
    struct FakeProvider {
        devices: Vec<FakeDevice>,
    }

    #[derive(Clone)]
    struct FakeDevice {
        props: RawDeviceProps,
        detail: std::result::Result<DriveDetail, io::ErrorKind>,
    }

    fn device(enumerator: &str, removal_policy: u8, raw_path: &str) -> FakeDevice {
        FakeDevice {
            props: RawDeviceProps {
                enumerator: enumerator.to_string(),
                friendly_name: format!("{enumerator} Disk Device"),
                removal_policy,
                ..Default::default()
            },
            detail: Ok(DriveDetail {
                device_path: format!(r"\\?\{}", raw_path.trim_start_matches(r"\\.\")),
                raw_path: raw_path.to_string(),
                size: 16 * 1024 * 1024 * 1024,
                ..Default::default()
            }),
        }
    }

    impl PropertyProvider for FakeProvider {
        type Device = FakeDevice;

        fn device_at(&mut self, index: u32) -> io::Result<Option<FakeDevice>> {
            Ok(self.devices.get(index as usize).cloned())
        }

        fn properties(&mut self, device: &FakeDevice) -> io::Result<RawDeviceProps> {
            Ok(device.props.clone())
        }

        fn drive_detail(&mut self, device: &FakeDevice) -> io::Result<DriveDetail> {
            device
                .detail
                .clone()
                .map_err(|kind| io::Error::new(kind, "cannot open handle to device"))
        }
    }

    #[test]
    fn empty_backend_yields_empty_list() {
        let mut provider = FakeProvider::default();
        let devices = list_devices(&mut provider).unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn order_follows_the_backend() {
        let mut provider = FakeProvider {
            devices: vec![
                device("SCSI", 1, r"\\.\PhysicalDrive0"),
                device("USBSTOR", 3, r"\\.\PhysicalDrive1"),
                device("SD", 3, r"\\.\PhysicalDrive2"),
            ],
        };
        let devices = list_devices(&mut provider).unwrap();
        let raws: Vec<&str> = devices.iter().map(|d| d.raw.as_str()).collect();
        assert_eq!(
            raws,
            [
                r"\\.\PhysicalDrive0",
                r"\\.\PhysicalDrive1",
                r"\\.\PhysicalDrive2"
            ]
        );
        assert!(devices[0].is_system);
        assert!(devices[1].is_usb && devices[1].is_removable);
        assert!(devices[2].is_card);
    }

    #[test]
    fn failing_detail_still_lists_the_device() {
        let mut bad = device("USBSTOR", 3, r"\\.\PhysicalDrive1");
        bad.detail = Err(io::ErrorKind::PermissionDenied);
        let mut provider = FakeProvider {
            devices: vec![bad, device("SCSI", 1, r"\\.\PhysicalDrive0")],
        };

        let devices = list_devices(&mut provider).unwrap();
        assert_eq!(devices.len(), 2);
        assert!(!devices[0].error.is_empty());
        // Best-effort fields stay at defaults on the errored device.
        assert!(devices[0].raw.is_empty());
        assert_eq!(devices[0].size, 0);
        // Classification still ran from the registry properties.
        assert!(devices[0].is_usb);
        assert!(devices[1].error.is_empty());
    }

    #[test]
    fn devices_without_enumerator_are_skipped() {
        let mut provider = FakeProvider {
            devices: vec![
                device("", 0, r"\\.\PhysicalDrive0"),
                device("USBSTOR", 3, r"\\.\PhysicalDrive1"),
            ],
        };
        let devices = list_devices(&mut provider).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].enumerator, "USBSTOR");
    }

    #[test]
    fn block_sizes_default_to_512() {
        let mut provider = FakeProvider {
            devices: vec![device("USBSTOR", 3, r"\\.\PhysicalDrive1")],
        };
        let devices = list_devices(&mut provider).unwrap();
        assert_eq!(devices[0].block_size, 512);
        assert_eq!(devices[0].logical_block_size, 512);
    }

    #[test]
    fn descriptor_invariants_hold_for_every_listing() {
        let mut provider = FakeProvider {
            devices: vec![
                device("SCSI", 1, r"\\.\PhysicalDrive0"),
                device("SCSI", 2, r"\\.\PhysicalDrive1"),
                device("SD", 3, r"\\.\PhysicalDrive2"),
                device("IDE", 0, r"\\.\PhysicalDrive3"),
            ],
        };
        for d in list_devices(&mut provider).unwrap() {
            assert!(!(d.is_system && d.is_removable));
            assert_eq!(
                d.is_uas,
                d.is_scsi && d.is_removable && !d.is_virtual && !d.is_card
            );
        }
    }
}
