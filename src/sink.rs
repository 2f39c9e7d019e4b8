use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::maps::MemoryRegion;
use crate::reader::CapturedRegion;

/// Destination for captured regions. Write errors here are fatal to the
/// whole capture, unlike read errors, which stay scoped to one region.
pub trait SnapshotSink {
    fn write_region(&mut self, region: &MemoryRegion, captured: &CapturedRegion) -> Result<()>;

    /// Flush anything buffered once the capture set is exhausted.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// File name of one region under the directory encoding.
pub fn region_file_name(start: u64, end: u64) -> String {
    format!("mem.{start:016X}.{end:016X}.bin")
}

/// One raw file per captured region, named by its address range. A region
/// that failed to read produces no file at all.
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    /// Creates the directory (and parents) up front, so a capture never gets
    /// half-way in before discovering the destination is unusable.
    pub fn create(dir: impl Into<PathBuf>) -> Result<DirSink> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create snapshot directory {}", dir.display()))?;
        Ok(DirSink { dir })
    }
}

impl SnapshotSink for DirSink {
    fn write_region(&mut self, region: &MemoryRegion, captured: &CapturedRegion) -> Result<()> {
        let path = self.dir.join(region_file_name(region.start, region.end));
        fs::write(&path, &captured.data).with_context(|| format!("cannot write {}", path.display()))
    }
}

/// Frames regions onto one continuous byte stream: a 16-byte header of two
/// little-endian u64 words, `start` and `start + payload length`, then the
/// raw payload. No delimiters and no trailer; a consumer reads frames
/// back-to-back until the stream closes.
pub struct StreamSink<W: Write> {
    out: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(out: W) -> StreamSink<W> {
        StreamSink { out }
    }

    fn write_frame(&mut self, start: u64, end: u64, payload: &[u8]) -> io::Result<()> {
        self.out.write_all(&start.to_le_bytes())?;
        self.out.write_all(&end.to_le_bytes())?;
        self.out.write_all(payload)
    }
}

impl<W: Write> SnapshotSink for StreamSink<W> {
    fn write_region(&mut self, region: &MemoryRegion, captured: &CapturedRegion) -> Result<()> {
        let end = region.start + captured.data.len() as u64;
        self.write_frame(region.start, end, &captured.data)
            .context("cannot write snapshot stream")
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().context("cannot flush snapshot stream")
    }
}

/// Rebuild the directory encoding from a saved stream: read `(header,
/// payload)` frames until end-of-stream and write one file per frame.
/// Returns the number of regions restored.
pub fn split_stream(input: &mut impl Read, dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir)
        .with_context(|| format!("cannot create snapshot directory {}", dir.display()))?;

    let mut count = 0usize;
    while let Some((start, end)) = read_frame_header(input)? {
        if end < start {
            bail!("corrupt frame header {start:016X}:{end:016X}");
        }
        let len = end - start;
        let path = dir.join(region_file_name(start, end));
        let mut out =
            File::create(&path).with_context(|| format!("cannot write {}", path.display()))?;
        let copied = io::copy(&mut input.by_ref().take(len), &mut out)
            .with_context(|| format!("cannot write {}", path.display()))?;
        if copied != len {
            bail!("stream truncated inside frame {start:016X}:{end:016X}");
        }
        info!("... {start:016X}:{end:016X}");
        count += 1;
    }
    Ok(count)
}

/// Next frame header, or `None` at a clean end of stream. A header cut off
/// mid-way means the stream was truncated in transit.
fn read_frame_header(input: &mut impl Read) -> Result<Option<(u64, u64)>> {
    let mut header = [0u8; 16];
    let mut filled = 0usize;
    while filled < header.len() {
        let n = input
            .read(&mut header[filled..])
            .context("cannot read stream")?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            bail!("stream truncated inside a frame header");
        }
        filled += n;
    }

    let mut word = [0u8; 8];
    word.copy_from_slice(&header[..8]);
    let start = u64::from_le_bytes(word);
    word.copy_from_slice(&header[8..]);
    let end = u64::from_le_bytes(word);
    Ok(Some((start, end)))
}
