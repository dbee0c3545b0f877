//! Disk preparation: the privileged "clean" of a target disk before any
//! image bytes are written.
//!
//! The destructive part is delegated to the platform's disk-management
//! utility (diskpart on Windows) through a three-command script:
//! `select disk <n>` / `clean` / `rescan`. The utility invocation is
//! behind the [`CleanRunner`] trait so the rejection and script-building
//! logic can be tested with a recording fake. A failed clean is always
//! fatal to the flash: a disk whose old partition table may still be
//! considered valid must not be written to.

use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use lazy_regex::regex_captures;
use tempfile::{NamedTempFile, TempPath};
use tracing::debug;

use crate::error::{Error, Result};

/// Number of post-clean wait ticks and their length. The platform's
/// device table takes observable time to reflect a just-cleaned disk;
/// this is a heuristic wait, not an event-driven confirmation.
pub const RESCAN_TICKS: u32 = 10;
pub const RESCAN_TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Runs a prepared clean script through the privileged disk-management
/// utility. Implemented per platform; tests substitute a recording fake.
pub trait CleanRunner {
    fn run_clean_script(&mut self, script_path: &Path) -> io::Result<()>;
}

/// Extracts the numeric disk index from a canonical physical-drive path
/// such as `\\.\PhysicalDrive2`. Anything else is a path-mismatch error.
pub fn disk_number_from_path(disk_path: &str) -> Result<u32> {
    let (_, digits) = regex_captures!(r"\\\\\.\\PHYSICALDRIVE(\d+)"i, disk_path)
        .ok_or_else(|| Error::NotPhysicalDrivePath(disk_path.to_string()))?;
    digits
        .parse::<u32>()
        .map_err(|_| Error::NotPhysicalDrivePath(disk_path.to_string()))
}

/// The exact line-oriented script submitted to the utility.
pub fn diskpart_script(disk_index: u32) -> String {
    format!("select disk {disk_index}\nclean\nrescan\n")
}

/// Writes the clean script for `disk_index` to a temporary file and hands
/// back its path. The file is removed when the returned path is dropped.
pub fn write_script_file(disk_index: u32) -> io::Result<TempPath> {
    let mut file = NamedTempFile::with_suffix(".txt")?;
    file.write_all(diskpart_script(disk_index).as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

/// Cleans the disk with the given numeric index.
///
/// Index 0 conventionally denotes the primary system disk and is rejected
/// unconditionally, before the utility is ever invoked. Any launch
/// failure or non-zero exit of the utility is fatal.
pub fn clean_disk<R: CleanRunner>(runner: &mut R, disk_index: u32) -> Result<()> {
    if disk_index == 0 {
        return Err(Error::SystemDisk);
    }

    debug!(disk_index, "running clean script");
    let script = write_script_file(disk_index).map_err(Error::Clean)?;
    runner.run_clean_script(&script).map_err(Error::Clean)
}

/// Waits out the bounded post-clean rescan delay, reporting one progress
/// tick per interval in the 10..20 percent band.
pub fn rescan_wait<F>(progress: &mut F)
where
    F: FnMut(u8, &str),
{
    for i in 0..RESCAN_TICKS {
        progress((10 + i) as u8, "Rescanning disk...");
        thread::sleep(RESCAN_TICK_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingRunner {
        scripts: Vec<String>,
        fail: bool,
    }

    impl CleanRunner for RecordingRunner {
        fn run_clean_script(&mut self, script_path: &Path) -> io::Result<()> {
            self.scripts.push(std::fs::read_to_string(script_path)?);
            if self.fail {
                return Err(io::Error::other("diskpart exited with code 1"));
            }
            Ok(())
        }
    }

    #[test]
    fn parses_disk_number() {
        assert_eq!(disk_number_from_path(r"\\.\PHYSICALDRIVE1").unwrap(), 1);
        assert_eq!(disk_number_from_path(r"\\.\PhysicalDrive12").unwrap(), 12);
    }

    #[test]
    fn rejects_malformed_paths() {
        for path in ["/dev/sda", r"\\.\PhysicalDrive", "PHYSICALDRIVE1", ""] {
            match disk_number_from_path(path) {
                Err(Error::NotPhysicalDrivePath(p)) => assert_eq!(p, path),
                other => panic!("expected path mismatch for {path:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn script_is_three_commands() {
        assert_eq!(diskpart_script(3), "select disk 3\nclean\nrescan\n");
    }

    #[test]
    fn script_file_round_trips() {
        let path = write_script_file(7).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "select disk 7\nclean\nrescan\n"
        );
    }

    #[test]
    fn disk_zero_is_rejected_before_the_runner_is_invoked() {
        let mut runner = RecordingRunner::default();
        match clean_disk(&mut runner, 0) {
            Err(Error::SystemDisk) => {}
            other => panic!("expected system disk rejection, got {other:?}"),
        }
        assert!(runner.scripts.is_empty());
    }

    #[test]
    fn clean_runs_the_script_for_nonzero_disks() {
        let mut runner = RecordingRunner::default();
        clean_disk(&mut runner, 2).unwrap();
        assert_eq!(runner.scripts, vec!["select disk 2\nclean\nrescan\n"]);
    }

    #[test]
    fn runner_failure_is_a_clean_stage_error() {
        let mut runner = RecordingRunner {
            fail: true,
            ..Default::default()
        };
        match clean_disk(&mut runner, 2) {
            Err(Error::Clean(_)) => {}
            other => panic!("expected clean stage error, got {other:?}"),
        }
    }
}
