//! Linux backend: `/sys/block` enumeration and raw block-device access.
//!
//! Discovery walks `/sys/block` and feeds the shared enumeration engine
//! through a [`PropertyProvider`]: each disk's transport is resolved from
//! its sysfs device link and mapped onto the enumerator names the
//! classifier understands (`USBSTOR` for USB transports, `SD` for MMC,
//! `SCSI` for everything internal), so the same classification policy and
//! descriptor invariants apply on every platform. Transport details are
//! best-effort; the real subsystem is preserved in `bus_type`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::classify::RawDeviceProps;
use crate::device::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::provider::{self, DriveDetail, PropertyProvider};
use crate::write::CHUNK_SIZE;

// BLKRRPART: ask the kernel to re-read the partition table.
nix::ioctl_none!(blkrrpart, 0x12, 95);

/// Helper to read a specific file from the /sys/block filesystem.
fn read_sys_file(device_name: &str, file: &str) -> io::Result<String> {
    let path = PathBuf::from("/sys/block").join(device_name).join(file);
    fs::read_to_string(path).map(|s| s.trim().to_string())
}

/// Helper to find the parent device of a partition (e.g., /dev/sda1 -> /dev/sda).
/// This is used to identify the system drive for the safety checks.
fn get_parent_device_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str.starts_with("/dev/sd") {
        if let Some(index) = path_str.rfind(|c: char| c.is_alphabetic()) {
            return PathBuf::from(&path_str[..=index]);
        }
    } else if path_str.starts_with("/dev/mmcblk") || path_str.starts_with("/dev/nvme") {
        if let Some(index) = path_str.find('p') {
            return PathBuf::from(&path_str[..index]);
        }
    }

    path.to_path_buf()
}

/// The disk holding the root filesystem, e.g. /dev/nvme0n1.
fn system_disk_parent(disks: &sysinfo::Disks) -> Option<PathBuf> {
    for disk in disks.iter() {
        if disk.mount_point() == Path::new("/") {
            let name = disk.name().to_string_lossy().to_string();
            let path = if name.starts_with("/dev/") {
                PathBuf::from(name)
            } else {
                PathBuf::from("/dev/").join(name)
            };
            return Some(get_parent_device_path(&path));
        }
    }
    None
}

/// The transport a block device hangs off, resolved from its sysfs link.
fn transport_of(device_name: &str, sys_path: &Path) -> &'static str {
    let link = sys_path.to_string_lossy();
    if device_name.starts_with("mmcblk") {
        "mmc"
    } else if link.contains("/usb") {
        "usb"
    } else if device_name.starts_with("nvme") {
        "nvme"
    } else if link.contains("/virtual/") {
        "virtual"
    } else {
        "scsi"
    }
}

/// Synthesizes a SetupAPI-style hardware id from the device's SCSI
/// INQUIRY fields: vendor padded to 8 characters, model to 16, spaces
/// replaced by underscores. Virtual adapters produce exactly the ids in
/// the classifier's table (e.g. `VMware__VMware_Virtual_S`).
fn synth_hardware_id(vendor: &str, model: &str) -> String {
    if vendor.is_empty() && model.is_empty() {
        return String::new();
    }
    let mut id = format!("{vendor:_<8}{model:_<16}");
    id = id.replace(' ', "_");
    id.truncate(24);
    id
}

/// One `/sys/block` entry.
struct SysBlockDevice {
    name: String,
    sys_path: PathBuf,
}

/// The `/sys/block`-backed [`PropertyProvider`].
pub struct SysBlockProvider {
    devices: Vec<SysBlockDevice>,
    disks: sysinfo::Disks,
}

impl SysBlockProvider {
    pub fn new() -> io::Result<Self> {
        let mut devices = Vec::new();
        for entry in fs::read_dir("/sys/block")?.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            // Pseudo-devices are not storage devices.
            if ["loop", "ram", "zram", "dm-", "md", "sr"]
                .iter()
                .any(|p| name.starts_with(p))
            {
                continue;
            }
            let sys_path = fs::canonicalize(entry.path()).unwrap_or_else(|_| entry.path());
            devices.push(SysBlockDevice { name, sys_path });
        }
        devices.sort_by(|a, b| a.name.cmp(&b.name));

        let disks = sysinfo::Disks::new_with_refreshed_list();
        Ok(SysBlockProvider { devices, disks })
    }

    fn mountpoints_of(&self, device_name: &str) -> Vec<String> {
        let mut mountpoints = Vec::new();
        for disk in self.disks.iter() {
            let name = disk.name().to_string_lossy();
            let name = name.strip_prefix("/dev/").unwrap_or(&name);
            if name.starts_with(device_name) {
                let mp = disk.mount_point().to_string_lossy().to_string();
                if !mp.is_empty() {
                    mountpoints.push(mp);
                }
            }
        }
        mountpoints
    }
}

impl PropertyProvider for SysBlockProvider {
    type Device = usize;

    fn device_at(&mut self, index: u32) -> io::Result<Option<usize>> {
        let index = index as usize;
        Ok((index < self.devices.len()).then_some(index))
    }

    fn properties(&mut self, device: &usize) -> io::Result<RawDeviceProps> {
        let dev = &self.devices[*device];
        let removable = read_sys_file(&dev.name, "removable")
            .map(|s| s == "1")
            .unwrap_or(false);

        let vendor = read_sys_file(&dev.name, "device/vendor").unwrap_or_default();
        let model = read_sys_file(&dev.name, "device/model").unwrap_or_default();
        let friendly_name = format!("{} {}", vendor.trim(), model.trim())
            .trim()
            .to_string();

        let enumerator = match transport_of(&dev.name, &dev.sys_path) {
            "usb" => "USBSTOR",
            "mmc" => "SD",
            // Internal disks (SATA, NVMe, virtio) all classify through
            // the generic storage table; non-removable ones come out as
            // system disks.
            _ => "SCSI",
        };

        Ok(RawDeviceProps {
            enumerator: enumerator.to_string(),
            friendly_name,
            hardware_id: synth_hardware_id(vendor.trim(), model.trim()),
            removal_policy: if removable { 3 } else { 1 },
        })
    }

    fn drive_detail(&mut self, device: &usize) -> io::Result<DriveDetail> {
        let dev = &self.devices[*device];
        let dev_path = format!("/dev/{}", dev.name);

        let size_sectors = read_sys_file(&dev.name, "size")?
            .parse::<u64>()
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidData))?;
        let logical_block_size = read_sys_file(&dev.name, "queue/logical_block_size")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        let block_size = read_sys_file(&dev.name, "queue/physical_block_size")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        let is_read_only = read_sys_file(&dev.name, "ro")
            .map(|s| s == "1")
            .unwrap_or(false);

        let transport = transport_of(&dev.name, &dev.sys_path);
        Ok(DriveDetail {
            device_path: dev_path.clone(),
            raw_path: dev_path,
            size: size_sectors * 512,
            block_size,
            logical_block_size,
            interface_type: if transport == "usb" {
                "USB".to_string()
            } else {
                String::new()
            },
            bus_type: transport.to_uppercase(),
            bus_version: String::new(),
            is_read_only,
            mountpoints: self.mountpoints_of(&dev.name),
        })
    }
}

/// Lists every attached block storage device.
pub fn list_storage_devices() -> Result<Vec<DeviceDescriptor>> {
    let mut backend = SysBlockProvider::new().map_err(Error::Enumerate)?;
    provider::list_devices(&mut backend)
}

/// An exclusively opened raw block device. The kernel drops the
/// exclusive claim when the handle does, on every exit path.
pub struct RawDiskHandle {
    file: File,
}

impl Write for RawDiskHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

impl Seek for RawDiskHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// Opens a block device for exclusive read/write.
///
/// `O_EXCL` on a block device makes the kernel refuse the open while any
/// filesystem holds the device, which covers both the dismount and the
/// lock step of the open contract.
pub fn open_disk_raw(disk_path: &str) -> Result<RawDiskHandle> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_EXCL)
        .open(disk_path)
        .map_err(Error::Open)?;
    Ok(RawDiskHandle { file })
}

/// Clears the device's partition table so the platform stops considering
/// the old layout valid, then asks the kernel to re-read it.
///
/// Refuses the disk holding the root filesystem unconditionally.
pub fn prepare_disk(disk_path: &str) -> Result<()> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let system_parent = system_disk_parent(&disks)
        .ok_or_else(|| Error::Clean(io::Error::other("could not determine the system drive")))?;
    if Path::new(disk_path) == system_parent {
        return Err(Error::SystemDisk);
    }

    debug!(disk_path, "clearing partition table");
    let mut file = OpenOptions::new()
        .write(true)
        .open(disk_path)
        .map_err(Error::Clean)?;
    file.write_all(&vec![0u8; CHUNK_SIZE]).map_err(Error::Clean)?;
    file.sync_all().map_err(Error::Clean)?;
    unsafe { blkrrpart(file.as_raw_fd()) }
        .map_err(|errno| Error::Clean(io::Error::from(errno)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_device_of_partitions() {
        assert_eq!(
            get_parent_device_path(Path::new("/dev/sda1")),
            PathBuf::from("/dev/sda")
        );
        assert_eq!(
            get_parent_device_path(Path::new("/dev/nvme0n1p2")),
            PathBuf::from("/dev/nvme0n1")
        );
        assert_eq!(
            get_parent_device_path(Path::new("/dev/mmcblk0p1")),
            PathBuf::from("/dev/mmcblk0")
        );
    }

    #[test]
    fn hardware_id_synthesis_matches_inquiry_padding() {
        assert_eq!(
            synth_hardware_id("VMware", "VMware Virtual S"),
            "VMware__VMware_Virtual_S"
        );
        assert_eq!(synth_hardware_id("", ""), "");
    }

    #[test]
    fn usb_transport_maps_to_usbstor() {
        let sys = PathBuf::from("/sys/devices/pci0000:00/0000:00:14.0/usb2/2-1/host6/target6:0:0/6:0:0:0/block/sdb");
        assert_eq!(transport_of("sdb", &sys), "usb");
        assert_eq!(transport_of("mmcblk0", Path::new("/sys/devices/mmc0")), "mmc");
        assert_eq!(
            transport_of("nvme0n1", Path::new("/sys/devices/pci0000:00/nvme/nvme0n1")),
            "nvme"
        );
    }
}
