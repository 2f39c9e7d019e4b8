use std::fs::File;
use std::io::{self, IoSliceMut, Read, Seek, SeekFrom};

use anyhow::{Context, Error, Result};
use nix::sys::uio::{RemoteIoVec, process_vm_readv};
use nix::unistd::Pid;
use tracing::warn;

use crate::maps::MemoryRegion;

/// Transfer unit of the chunked strategy. A read failure is contained to one
/// chunk of this size.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// One region's bytes, always exactly the region's nominal length.
/// Sub-ranges that could not be read are zero-filled, never cut out, so a
/// consumer can rely on `data.len() == region.len()`.
#[derive(Debug)]
pub struct CapturedRegion {
    pub data: Vec<u8>,
    /// Bytes actually recovered from the target (`<= data.len()`).
    pub bytes_read: u64,
    /// Chunks the chunked strategy had to zero-fill wholesale.
    pub failed_chunks: u32,
}

/// Outcome of one region read. A failure is scoped to its region and never
/// aborts the rest of the capture set.
#[derive(Debug)]
pub enum RegionCapture {
    Captured(CapturedRegion),
    Failed(Error),
}

/// A strategy for pulling one region's bytes out of the target.
pub trait RegionReader {
    fn read_region(&mut self, region: &MemoryRegion) -> RegionCapture;
}

/// Sequential reader over the target's `/proc/<pid>/mem`. One logical read
/// per region; any seek or read error drops that region as a whole.
pub struct ProcMemReader {
    mem: File,
}

impl ProcMemReader {
    /// Opens the mem file once; the handle is reused for every region.
    pub fn open(pid: Pid) -> Result<ProcMemReader> {
        let path = format!("/proc/{pid}/mem");
        let mem = File::open(&path).with_context(|| format!("cannot open {path}"))?;
        Ok(ProcMemReader { mem })
    }
}

impl RegionReader for ProcMemReader {
    fn read_region(&mut self, region: &MemoryRegion) -> RegionCapture {
        match read_seekable(&mut self.mem, region) {
            Ok(captured) => RegionCapture::Captured(captured),
            Err(e) => RegionCapture::Failed(e.into()),
        }
    }
}

/// Seek to the region and read until the nominal length is reached or the
/// source runs dry. A short read leaves the tail zero-filled.
fn read_seekable(
    source: &mut (impl Read + Seek),
    region: &MemoryRegion,
) -> io::Result<CapturedRegion> {
    source.seek(SeekFrom::Start(region.start))?;
    let mut data = vec![0u8; region.len() as usize];
    let mut filled = 0usize;
    while filled < data.len() {
        match source.read(&mut data[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(CapturedRegion {
        data,
        bytes_read: filled as u64,
        failed_chunks: 0,
    })
}

/// Chunked cross-process copy via `process_vm_readv`. A failed chunk becomes
/// zeroes and the walk keeps going; the region itself always survives at its
/// full length. The strategy of choice when the mem file is unavailable or
/// when very large regions need failure granularity finer than whole-region.
pub struct VmReadReader {
    pid: Pid,
}

impl VmReadReader {
    pub fn new(pid: Pid) -> VmReadReader {
        VmReadReader { pid }
    }
}

impl RegionReader for VmReadReader {
    fn read_region(&mut self, region: &MemoryRegion) -> RegionCapture {
        let pid = self.pid;
        RegionCapture::Captured(capture_chunked(region, |offset, buf| {
            let len = buf.len();
            let mut local = [IoSliceMut::new(buf)];
            let remote = [RemoteIoVec {
                base: (region.start + offset) as usize,
                len,
            }];
            process_vm_readv(pid, &mut local, &remote)
                .map_err(|e| io::Error::from_raw_os_error(e as i32))
        }))
    }
}

/// Drive `read_chunk` across the region one chunk at a time. `read_chunk`
/// fills the head of its buffer and reports how many bytes it wrote; an
/// error zero-fills that chunk, and the walk continues at the next chunk
/// boundary either way.
fn capture_chunked(
    region: &MemoryRegion,
    mut read_chunk: impl FnMut(u64, &mut [u8]) -> io::Result<usize>,
) -> CapturedRegion {
    let len = region.len() as usize;
    let mut data = vec![0u8; len];
    let mut bytes_read = 0u64;
    let mut failed_chunks = 0u32;

    let mut offset = 0usize;
    while offset < len {
        let size = CHUNK_SIZE.min(len - offset);
        let chunk = &mut data[offset..offset + size];
        match read_chunk(offset as u64, chunk) {
            // A short transfer leaves the remainder of the chunk at its
            // zero-initialized state; the next chunk starts on the boundary.
            Ok(n) => bytes_read += n.min(size) as u64,
            Err(e) => {
                chunk.fill(0);
                failed_chunks += 1;
                warn!(
                    "... {:016X}:{:016X} (failed: {})",
                    region.start + offset as u64,
                    region.start + (offset + size) as u64,
                    e
                );
            }
        }
        offset += size;
    }

    CapturedRegion {
        data,
        bytes_read,
        failed_chunks,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn seekable_read_returns_exact_region_bytes() {
        let source = pattern(0x4000);
        let mut cursor = Cursor::new(source.clone());
        let region = MemoryRegion {
            start: 0x1000,
            end: 0x3000,
        };

        let captured = read_seekable(&mut cursor, &region).unwrap();
        assert_eq!(captured.data.len() as u64, region.len());
        assert_eq!(captured.bytes_read, region.len());
        assert!(captured.data[..] == source[0x1000..0x3000]);
    }

    #[test]
    fn seekable_read_zero_fills_past_end_of_source() {
        let mut cursor = Cursor::new(pattern(0x1800));
        let region = MemoryRegion {
            start: 0x1000,
            end: 0x2000,
        };

        let captured = read_seekable(&mut cursor, &region).unwrap();
        assert_eq!(captured.data.len(), 0x1000);
        assert_eq!(captured.bytes_read, 0x800);
        assert!(captured.data[..0x800] == pattern(0x1800)[0x1000..]);
        assert!(captured.data[0x800..].iter().all(|&b| b == 0));
    }

    #[test]
    fn chunked_read_zero_fills_only_the_failing_chunk() {
        let region = MemoryRegion {
            start: 0x10_0000,
            end: 0x10_0000 + 3 * CHUNK_SIZE as u64,
        };

        let captured = capture_chunked(&region, |offset, buf| {
            if offset == CHUNK_SIZE as u64 {
                return Err(io::Error::other("injected chunk fault"));
            }
            for (i, b) in buf.iter_mut().enumerate() {
                *b = ((offset as usize + i) % 251) as u8;
            }
            Ok(buf.len())
        });

        assert_eq!(captured.data.len(), 3 * CHUNK_SIZE);
        assert_eq!(captured.failed_chunks, 1);
        assert_eq!(captured.bytes_read, 2 * CHUNK_SIZE as u64);
        assert!(captured.data[..CHUNK_SIZE] == pattern(CHUNK_SIZE)[..]);
        assert!(
            captured.data[CHUNK_SIZE..2 * CHUNK_SIZE]
                .iter()
                .all(|&b| b == 0)
        );
        for (i, &b) in captured.data[2 * CHUNK_SIZE..].iter().enumerate() {
            assert_eq!(b, ((2 * CHUNK_SIZE + i) % 251) as u8);
        }
    }

    #[test]
    fn chunked_read_zero_fills_short_transfers() {
        let region = MemoryRegion {
            start: 0,
            end: CHUNK_SIZE as u64,
        };

        let captured = capture_chunked(&region, |_, buf| {
            let half = buf.len() / 2;
            buf[..half].fill(0xAB);
            Ok(half)
        });

        assert_eq!(captured.data.len(), CHUNK_SIZE);
        assert_eq!(captured.bytes_read, CHUNK_SIZE as u64 / 2);
        assert_eq!(captured.failed_chunks, 0);
        assert!(captured.data[..CHUNK_SIZE / 2].iter().all(|&b| b == 0xAB));
        assert!(captured.data[CHUNK_SIZE / 2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn chunked_read_handles_a_trailing_partial_chunk() {
        let region = MemoryRegion {
            start: 0,
            end: CHUNK_SIZE as u64 * 5 / 2,
        };
        let mut sizes = Vec::new();

        let captured = capture_chunked(&region, |_, buf| {
            sizes.push(buf.len());
            buf.fill(0x42);
            Ok(buf.len())
        });

        assert_eq!(sizes, vec![CHUNK_SIZE, CHUNK_SIZE, CHUNK_SIZE / 2]);
        assert_eq!(captured.bytes_read, region.len());
        assert!(captured.data.iter().all(|&b| b == 0x42));
    }
}
