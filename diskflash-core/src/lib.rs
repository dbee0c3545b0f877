//! The core, UI-agnostic library for the `diskflash` disk imaging
//! utility.
//!
//! `diskflash-core` is designed to be used as a library by any front-end,
//! whether it's a command-line interface (like `diskflash`) or a
//! graphical user interface. It turns the platform's raw device
//! enumeration into a normalized, queryable device model with
//! safety-relevant flags (removable, system, virtual, SD card, USB, UAS),
//! and writes raw images to a selected device with a crash-safe deferred
//! first-chunk commit.
//!
//! The library is structured into several key modules:
//! - [`device`]: The cross-platform [`device::DeviceDescriptor`] model.
//! - [`classify`]: Pure, table-driven derivation of the safety flags.
//! - [`provider`]: The enumeration engine and its injectable backend
//!   contract.
//! - [`clean`]: The destructive pre-write disk clean.
//! - [`mod@write`]: The deferred-commit image-write state machine.
//! - [`flash`]: The end-to-end clean/open/stream flow.
//! - [`platform`]: One backend per supported platform, plus a stub that
//!   fails with an unsupported-platform error everywhere else.
//!
//! Everything is synchronous and single-threaded: progress callbacks are
//! invoked inline and must return quickly, and cancellation is a caller
//! concern (terminate the process).
//!
//! ## Example: listing devices and flashing one
//!
//! ```rust,no_run
//! use std::fs::File;
//!
//! fn main() -> diskflash_core::Result<()> {
//!     let devices = diskflash_core::platform::list_storage_devices()?;
//!     let target = devices
//!         .iter()
//!         .find(|d| d.is_removable && !d.is_system && d.error.is_empty())
//!         .expect("no safe removable device found");
//!
//!     let mut image = File::open("path/to/image.img").expect("image");
//!     let image_size = image.metadata().map(|m| m.len()).unwrap_or(0);
//!
//!     diskflash_core::flash::flash_to_disk(
//!         &mut image,
//!         image_size,
//!         &target.raw,
//!         &mut |percent, status| println!("{percent:>3}% {status}"),
//!     )
//! }
//! ```

pub mod classify;
pub mod clean;
pub mod device;
mod error;
pub mod flash;
pub mod platform;
pub mod provider;
pub mod write;

pub use device::DeviceDescriptor;
pub use error::{Error, Result};
