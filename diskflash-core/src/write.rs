//! The image-write state machine: deferred first-chunk commit.
//!
//! The image is streamed to the device in fixed 64 KiB chunks, but the
//! first chunk is held in memory and written *last*, after every other
//! chunk has landed. Until that final commit, the device's first block
//! still contains whatever the clean left there, so a crash or power loss
//! mid-stream never produces a device whose boot sector claims a layout
//! that does not match its (incompletely written) body.
//!
//! The writer is platform-independent: the target only needs
//! [`io::Write`] + [`io::Seek`], so tests drive it against an in-memory
//! cursor and the platform layer hands it a raw device handle.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::error::{Error, Result};

/// Fixed transfer unit between image source and device. Every device
/// write is exactly this long; the final short read is zero-padded.
pub const CHUNK_SIZE: usize = 65536;

/// Recompute progress every this many chunks rather than on every chunk,
/// to bound callback overhead on fast devices. Tunable, not load-bearing.
const PROGRESS_EVERY_CHUNKS: u32 = 15;

/// Reads until `buf` is full or the source is exhausted. Unlike a single
/// `read` call this never returns a partial count mid-stream, so padding
/// zeros can only ever land at the very end of the image.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Reads the image's first chunk into a held buffer, before anything has
/// touched the target device.
///
/// An image with no bytes at all is an error. An image that ends before
/// one full chunk is an error when its declared size promised at least a
/// chunk; otherwise the buffer tail stays zeroed and the image is
/// accepted (the sub-chunk boundary case).
pub fn read_first_chunk<R: Read>(image: &mut R, image_size: u64) -> Result<Vec<u8>> {
    let mut first_chunk = vec![0u8; CHUNK_SIZE];
    let n = read_full(image, &mut first_chunk).map_err(Error::ReadFirstChunk)?;
    if n == 0 {
        return Err(Error::EmptyImage);
    }
    if n < CHUNK_SIZE && image_size >= CHUNK_SIZE as u64 {
        return Err(Error::ReadFirstChunk(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("image ended after {n} bytes, declared size {image_size}"),
        )));
    }
    Ok(first_chunk)
}

/// Streams the image body to the target, then commits the held first
/// chunk at offset 0.
///
/// The write pointer starts at `CHUNK_SIZE`, skipping past where the
/// first chunk will eventually go. The body loop writes whole chunks
/// only, zero-filling the tail of the final short read. A device
/// accepting fewer bytes than a chunk is [`Error::ShortWrite`], distinct
/// from any read error. Progress is recomputed every few chunks as
/// `25 + written/total * 75`, and suppressed entirely when `image_size`
/// is zero. On any failure the callback is never invoked again; on
/// success it fires exactly once with 100.
pub fn stream_and_commit<R, T, F>(
    target: &mut T,
    image: &mut R,
    first_chunk: &[u8],
    image_size: u64,
    progress: &mut F,
) -> Result<()>
where
    R: Read,
    T: Write + Seek,
    F: FnMut(u8, &str),
{
    debug_assert_eq!(first_chunk.len(), CHUNK_SIZE);

    progress(25, "Initializing transfer...");

    target
        .seek(SeekFrom::Start(CHUNK_SIZE as u64))
        .map_err(Error::Copy)?;

    let mut chunk_buf = vec![0u8; CHUNK_SIZE];
    let mut write_offset = CHUNK_SIZE as u64;
    let mut chunks_since_update = 0u32;

    loop {
        let nr = read_full(image, &mut chunk_buf).map_err(Error::Copy)?;
        if nr == 0 {
            break;
        }
        if nr < CHUNK_SIZE {
            chunk_buf[nr..].fill(0);
        }

        let nw = target.write(&chunk_buf).map_err(Error::Copy)?;
        if nw != CHUNK_SIZE {
            return Err(Error::ShortWrite {
                written: nw,
                expected: CHUNK_SIZE,
            });
        }

        write_offset += CHUNK_SIZE as u64;
        if image_size != 0 {
            chunks_since_update += 1;
            if chunks_since_update == PROGRESS_EVERY_CHUNKS {
                chunks_since_update = 0;
                let percent = 25.0 + (write_offset as f64 / image_size as f64) * 75.0;
                progress(percent.min(99.0) as u8, "Flashing image to disk...");
            }
        }
    }

    debug!(write_offset, "image body written, committing first chunk");

    target.seek(SeekFrom::Start(0)).map_err(Error::CommitFirstChunk)?;
    let nw = target.write(first_chunk).map_err(Error::CommitFirstChunk)?;
    if nw != CHUNK_SIZE {
        return Err(Error::ShortWrite {
            written: nw,
            expected: CHUNK_SIZE,
        });
    }
    target.flush().map_err(Error::CommitFirstChunk)?;

    progress(100, "Done flashing.");
    Ok(())
}

/// Writes a whole image to an already-opened target: reads the first
/// chunk, then streams and commits. Callers that must validate the image
/// before destroying the target (the flash flow) call the two halves
/// separately.
pub fn write_image<R, T, F>(
    image: &mut R,
    image_size: u64,
    target: &mut T,
    progress: &mut F,
) -> Result<()>
where
    R: Read,
    T: Write + Seek,
    F: FnMut(u8, &str),
{
    let first_chunk = read_first_chunk(image, image_size)?;
    stream_and_commit(target, image, &first_chunk, image_size, progress)
}
