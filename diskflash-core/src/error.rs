//! The error type shared by every stage of enumeration and flashing.
//!
//! Each fatal variant names the stage that produced it, so a caller or a
//! log line can localize the failing phase without a stack trace. Per-device
//! enumeration problems are *not* reported through this type; they land in
//! [`crate::device::DeviceDescriptor::error`] and the listing continues.

use std::io;

use thiserror::Error;

/// Result alias used throughout the core library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Enumeration or flashing was requested on a platform without an
    /// implemented backend. Distinct from any runtime I/O failure.
    #[error("unsupported on platform: {os}/{arch}")]
    Unsupported {
        os: &'static str,
        arch: &'static str,
    },

    /// The supplied device path is not a canonical physical-drive path.
    #[error("not a physical drive path: {0}")]
    NotPhysicalDrivePath(String),

    /// The target resolves to the primary system disk (disk index 0 on
    /// Windows, the root filesystem's disk on Linux); cleaning it is
    /// treated as an operator error and never attempted.
    #[error("refusing to clean the system disk")]
    SystemDisk,

    /// The image source yielded no bytes at all.
    #[error("image is empty")]
    EmptyImage,

    /// The image ended before one full chunk even though its declared
    /// size promised at least one.
    #[error("reading first chunk: {0}")]
    ReadFirstChunk(#[source] io::Error),

    /// The device accepted fewer bytes than one full chunk.
    #[error("short write to device: wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("listing storage devices: {0}")]
    Enumerate(#[source] io::Error),

    #[error("cleaning disk: {0}")]
    Clean(#[source] io::Error),

    #[error("opening disk: {0}")]
    Open(#[source] io::Error),

    #[error("copying image to disk: {0}")]
    Copy(#[source] io::Error),

    #[error("writing header chunk to disk: {0}")]
    CommitFirstChunk(#[source] io::Error),
}

impl Error {
    /// The unsupported-platform error for the current build target.
    pub fn unsupported() -> Self {
        Error::Unsupported {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }
}
