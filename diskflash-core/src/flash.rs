//! The end-to-end flash flow: clean, wait, open, stream, commit.
//!
//! Milestones reported through the progress callback: 5% cleaning start,
//! 10..20% one tick per rescan-wait interval, 23% opening, 25% transfer
//! initialization, periodic updates below 100 while streaming, and
//! exactly 100 on success. The callback runs inline on the caller's
//! thread and is never invoked after the point of failure; abnormal
//! termination is signalled only by the returned error.

use std::io::Read;

use tracing::debug;

use crate::clean;
use crate::error::Result;
use crate::platform;
use crate::write;

/// Cleans the target disk and flashes an image onto it.
///
/// `disk_path` must already be the platform-native addressable path of a
/// physical device (e.g. `\\.\PhysicalDrive2`, `/dev/sdb`); mount-based
/// paths are not resolved here. `image_size` in bytes drives percentage
/// reporting; zero disables it. The image's first chunk is read before
/// anything touches the disk, so an unreadable image fails without
/// destroying data, and it is committed to the device last, after the
/// whole body is written.
///
/// There is no cancellation mechanism and no partial success: an error
/// means the device is in an indeterminate state.
pub fn flash_to_disk<R, F>(
    image: &mut R,
    image_size: u64,
    disk_path: &str,
    progress: &mut F,
) -> Result<()>
where
    R: Read,
    F: FnMut(u8, &str),
{
    let first_chunk = write::read_first_chunk(image, image_size)?;

    progress(5, "Cleaning disk...");
    platform::prepare_disk(disk_path)?;
    // The device table takes a moment to reflect the cleaned disk.
    clean::rescan_wait(progress);

    progress(23, "Opening and locking disk...");
    let mut handle = platform::open_disk_raw(disk_path)?;
    debug!(disk_path, image_size, "starting transfer");

    write::stream_and_commit(&mut handle, image, &first_chunk, image_size, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Cursor;

    // The platform pieces need real devices; what can be checked here is
    // that a bad image never reaches the destructive stages.
    #[test]
    fn empty_image_fails_before_any_clean_milestone() {
        let mut reports: Vec<u8> = Vec::new();
        let result = flash_to_disk(
            &mut Cursor::new(Vec::new()),
            0,
            "/dev/null-disk",
            &mut |p, _| reports.push(p),
        );
        assert!(matches!(result, Err(Error::EmptyImage)));
        assert!(reports.is_empty());
    }
}
