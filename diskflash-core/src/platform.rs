//! Platform backend selection.
//!
//! Each submodule exposes the same surface, so the rest of the library
//! and any front-end can call it without worrying about the underlying
//! platform:
//!
//! - `list_storage_devices()` — enumerate every attached storage device.
//! - `open_disk_raw(path)` — exclusive, dismounted, locked raw handle.
//! - `prepare_disk(path)` — the destructive pre-write clean.
//!
//! Platforms without an implemented backend fall back to the
//! `unsupported` module, whose operations fail with a fixed
//! unsupported-platform error that is clearly distinguishable from any
//! runtime I/O failure.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use self::linux::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::*;

#[cfg(not(any(target_os = "linux", windows)))]
mod unsupported;
#[cfg(not(any(target_os = "linux", windows)))]
pub use self::unsupported::*;
