//! Windows backend: SetupAPI enumeration, diskpart cleaning, and raw
//! physical-drive access.
//!
//! All variable-length SetupAPI results are fetched with owned,
//! bounds-checked byte buffers using the ask-size-then-fetch pattern;
//! no pointer arithmetic over foreign memory.

use std::ffi::c_void;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};
use std::path::Path;
use std::process::Command;
use std::ptr;

use tracing::{debug, warn};
use windows_sys::Win32::Devices::DeviceAndDriverInstallation::{
    DIGCF_DEVICEINTERFACE, DIGCF_PRESENT, SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInfo,
    SetupDiEnumDeviceInterfaces, SetupDiGetClassDevsW, SetupDiGetDeviceInterfaceDetailW,
    SetupDiGetDeviceRegistryPropertyW, SP_DEVICE_INTERFACE_DATA, SP_DEVICE_INTERFACE_DETAIL_DATA_W,
    SP_DEVINFO_DATA, SPDRP_ENUMERATOR_NAME, SPDRP_FRIENDLYNAME, SPDRP_HARDWAREID,
    SPDRP_REMOVAL_POLICY,
};
use windows_sys::Win32::Foundation::{
    ERROR_INSUFFICIENT_BUFFER, ERROR_NO_MORE_ITEMS, GENERIC_READ, GENERIC_WRITE, GetLastError,
    INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::IO::DeviceIoControl;
use windows_sys::Win32::System::Ioctl::{
    FSCTL_DISMOUNT_VOLUME, FSCTL_LOCK_VOLUME, GET_LENGTH_INFORMATION, GUID_DEVINTERFACE_DISK,
    IOCTL_DISK_GET_LENGTH_INFO, IOCTL_STORAGE_GET_DEVICE_NUMBER, STORAGE_DEVICE_NUMBER,
};

use crate::classify::RawDeviceProps;
use crate::clean::{self, CleanRunner};
use crate::device::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::provider::{self, DriveDetail, PropertyProvider};

/// Encodes a path as a NUL-terminated UTF-16 buffer for the wide APIs.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Decodes a NUL-terminated UTF-16 buffer.
fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// The SetupAPI-backed [`PropertyProvider`], bound to one device
/// information set over the disk device interface class.
pub struct SetupApiProvider {
    devinfo: isize,
}

impl SetupApiProvider {
    pub fn new() -> io::Result<Self> {
        let devinfo = unsafe {
            SetupDiGetClassDevsW(
                &GUID_DEVINTERFACE_DISK,
                ptr::null(),
                0,
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
            )
        };
        if devinfo == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }
        Ok(SetupApiProvider { devinfo })
    }

    /// A device registry property as raw bytes, fetched with an owned
    /// buffer sized by a first ask-size call.
    fn registry_property(&self, did: &SP_DEVINFO_DATA, property: u32) -> io::Result<Vec<u8>> {
        let mut required: u32 = 0;
        let ok = unsafe {
            SetupDiGetDeviceRegistryPropertyW(
                self.devinfo,
                did,
                property,
                ptr::null_mut(),
                ptr::null_mut(),
                0,
                &mut required,
            )
        };
        if ok == 0 {
            match unsafe { GetLastError() } {
                ERROR_INSUFFICIENT_BUFFER => {}
                _ => return Err(io::Error::last_os_error()),
            }
        }
        if required == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; required as usize];
        let ok = unsafe {
            SetupDiGetDeviceRegistryPropertyW(
                self.devinfo,
                did,
                property,
                ptr::null_mut(),
                buf.as_mut_ptr(),
                buf.len() as u32,
                &mut required,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        buf.truncate(required as usize);
        Ok(buf)
    }

    /// A REG_SZ / REG_MULTI_SZ property decoded to its first string.
    /// A missing property is an empty string, not an error.
    fn string_property(&self, did: &SP_DEVINFO_DATA, property: u32) -> String {
        match self.registry_property(did, property) {
            Ok(bytes) => {
                let wide: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                from_wide(&wide)
            }
            Err(_) => String::new(),
        }
    }

    /// A REG_DWORD property narrowed to its low byte, 0 when missing.
    fn byte_property(&self, did: &SP_DEVINFO_DATA, property: u32) -> u8 {
        match self.registry_property(did, property) {
            Ok(bytes) => bytes.first().copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// The device interface path (`\\?\...`) for the disk interface.
    fn interface_path(&self, did: &SP_DEVINFO_DATA) -> io::Result<String> {
        let mut interface = SP_DEVICE_INTERFACE_DATA {
            cbSize: std::mem::size_of::<SP_DEVICE_INTERFACE_DATA>() as u32,
            InterfaceClassGuid: unsafe { std::mem::zeroed() },
            Flags: 0,
            Reserved: 0,
        };
        let ok = unsafe {
            SetupDiEnumDeviceInterfaces(
                self.devinfo,
                did,
                &GUID_DEVINTERFACE_DISK,
                0,
                &mut interface,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        let mut required: u32 = 0;
        let ok = unsafe {
            SetupDiGetDeviceInterfaceDetailW(
                self.devinfo,
                &interface,
                ptr::null_mut(),
                0,
                &mut required,
                ptr::null_mut(),
            )
        };
        if ok == 0 && unsafe { GetLastError() } != ERROR_INSUFFICIENT_BUFFER {
            return Err(io::Error::last_os_error());
        }

        // The detail struct is a u32 size header followed by the
        // variable-length UTF-16 path.
        let mut buf = vec![0u8; required as usize];
        let detail = buf.as_mut_ptr() as *mut SP_DEVICE_INTERFACE_DETAIL_DATA_W;
        unsafe {
            (*detail).cbSize = std::mem::size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as u32;
        }
        let ok = unsafe {
            SetupDiGetDeviceInterfaceDetailW(
                self.devinfo,
                &interface,
                detail,
                required,
                &mut required,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        let path_bytes = &buf[std::mem::size_of::<u32>()..];
        let wide: Vec<u16> = path_bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Ok(from_wide(&wide))
    }
}

impl Drop for SetupApiProvider {
    fn drop(&mut self) {
        unsafe {
            SetupDiDestroyDeviceInfoList(self.devinfo);
        }
    }
}

impl PropertyProvider for SetupApiProvider {
    type Device = SP_DEVINFO_DATA;

    fn device_at(&mut self, index: u32) -> io::Result<Option<SP_DEVINFO_DATA>> {
        let mut did = SP_DEVINFO_DATA {
            cbSize: std::mem::size_of::<SP_DEVINFO_DATA>() as u32,
            ClassGuid: unsafe { std::mem::zeroed() },
            DevInst: 0,
            Reserved: 0,
        };
        let ok = unsafe { SetupDiEnumDeviceInfo(self.devinfo, index, &mut did) };
        if ok == 0 {
            return match unsafe { GetLastError() } {
                ERROR_NO_MORE_ITEMS => Ok(None),
                _ => Err(io::Error::last_os_error()),
            };
        }
        Ok(Some(did))
    }

    fn properties(&mut self, did: &SP_DEVINFO_DATA) -> io::Result<RawDeviceProps> {
        Ok(RawDeviceProps {
            enumerator: self.string_property(did, SPDRP_ENUMERATOR_NAME),
            friendly_name: self.string_property(did, SPDRP_FRIENDLYNAME),
            hardware_id: self.string_property(did, SPDRP_HARDWAREID),
            removal_policy: self.byte_property(did, SPDRP_REMOVAL_POLICY),
        })
    }

    fn drive_detail(&mut self, did: &SP_DEVINFO_DATA) -> io::Result<DriveDetail> {
        let device_path = self.interface_path(did)?;

        // A metadata-only handle: zero access, shared, enough for the
        // device-number and length ioctls.
        let handle = open_device(&device_path, 0, FILE_SHARE_READ | FILE_SHARE_WRITE)?;

        let device_number = storage_device_number(&handle)?;
        let size = disk_length(&handle).unwrap_or(0);

        Ok(DriveDetail {
            raw_path: format!(r"\\.\PhysicalDrive{device_number}"),
            device_path,
            size,
            ..Default::default()
        })
    }
}

fn open_device(path: &str, access: u32, share: u32) -> io::Result<OwnedHandle> {
    let wide = to_wide(path);
    let handle = unsafe {
        CreateFileW(
            wide.as_ptr(),
            access,
            share,
            ptr::null(),
            OPEN_EXISTING,
            FILE_ATTRIBUTE_NORMAL,
            0,
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedHandle::from_raw_handle(handle as _) })
}

/// A parameterless device ioctl with an output struct.
fn device_io_control<T>(handle: &OwnedHandle, code: u32, out: &mut T) -> io::Result<()> {
    let mut returned: u32 = 0;
    let ok = unsafe {
        DeviceIoControl(
            handle.as_raw_handle() as isize,
            code,
            ptr::null(),
            0,
            out as *mut T as *mut c_void,
            std::mem::size_of::<T>() as u32,
            &mut returned,
            ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn storage_device_number(handle: &OwnedHandle) -> io::Result<u32> {
    let mut sdn: STORAGE_DEVICE_NUMBER = unsafe { std::mem::zeroed() };
    device_io_control(handle, IOCTL_STORAGE_GET_DEVICE_NUMBER, &mut sdn)?;
    Ok(sdn.DeviceNumber)
}

fn disk_length(handle: &OwnedHandle) -> io::Result<u64> {
    let mut info: GET_LENGTH_INFORMATION = unsafe { std::mem::zeroed() };
    device_io_control(handle, IOCTL_DISK_GET_LENGTH_INFO, &mut info)?;
    Ok(info.Length as u64)
}

/// Lists every attached disk device via the SetupAPI.
pub fn list_storage_devices() -> Result<Vec<DeviceDescriptor>> {
    let mut backend = SetupApiProvider::new().map_err(Error::Enumerate)?;
    provider::list_devices(&mut backend)
}

/// An exclusively opened, dismounted, locked physical drive. The handle
/// is closed by drop on every exit path, which also releases the lock.
pub struct RawDiskHandle {
    file: File,
}

impl Write for RawDiskHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for RawDiskHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// Opens a physical-drive path for exclusive read/write, then dismounts
/// any mounted filesystem and takes the volume lock.
///
/// The open itself failing is fatal; the dismount and lock ioctls are
/// best-effort, matching the platform's tolerance for devices that were
/// never mounted.
pub fn open_disk_raw(disk_path: &str) -> Result<RawDiskHandle> {
    let handle =
        open_device(disk_path, GENERIC_READ | GENERIC_WRITE, 0).map_err(Error::Open)?;

    let mut status: u32 = 0;
    if let Err(err) = device_io_control(&handle, FSCTL_DISMOUNT_VOLUME, &mut status) {
        warn!(%err, "dismount request failed, continuing");
    }
    if let Err(err) = device_io_control(&handle, FSCTL_LOCK_VOLUME, &mut status) {
        warn!(%err, "volume lock failed, continuing");
    }

    Ok(RawDiskHandle {
        file: File::from(handle),
    })
}

/// Runs a clean script through `diskpart /s`. Requires elevation.
struct DiskpartRunner;

impl CleanRunner for DiskpartRunner {
    fn run_clean_script(&mut self, script_path: &Path) -> io::Result<()> {
        let status = Command::new("diskpart").arg("/s").arg(script_path).status()?;
        if !status.success() {
            return Err(io::Error::other(format!(
                "diskpart exited with status {status}"
            )));
        }
        Ok(())
    }
}

/// Cleans the disk behind a `\\.\PhysicalDriveN` path with diskpart.
/// Drive 0 is rejected before diskpart is ever invoked.
pub fn prepare_disk(disk_path: &str) -> Result<()> {
    let disk_number = clean::disk_number_from_path(disk_path)?;
    debug!(disk_number, "cleaning disk via diskpart");
    clean::clean_disk(&mut DiskpartRunner, disk_number)
}
