//! Stub backend for platforms without an implementation. Every operation
//! fails with the same fixed error.

use std::io::{self, Seek, SeekFrom, Write};

use crate::device::DeviceDescriptor;
use crate::error::{Error, Result};

pub struct RawDiskHandle {
    _private: (),
}

impl Write for RawDiskHandle {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other(Error::unsupported()))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for RawDiskHandle {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::other(Error::unsupported()))
    }
}

pub fn list_storage_devices() -> Result<Vec<DeviceDescriptor>> {
    Err(Error::unsupported())
}

pub fn open_disk_raw(_disk_path: &str) -> Result<RawDiskHandle> {
    Err(Error::unsupported())
}

pub fn prepare_disk(_disk_path: &str) -> Result<()> {
    Err(Error::unsupported())
}
