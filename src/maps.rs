use std::fs;

use anyhow::{Context, Result, anyhow};
use nix::unistd::Pid;

/// A half-open `[start, end)` slice of the target's virtual address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: u64,
    pub end: u64,
}

impl MemoryRegion {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Permission flags of one maps entry. Only consulted while filtering; the
/// capture set keeps the bare address ranges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionPermissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub shared: bool,
}

impl RegionPermissions {
    /// Readable and not a shared mapping. Shared mappings (file-backed
    /// library segments, shm) won't hold the target's private runtime state,
    /// and skipping them cuts most of the snapshot's bulk.
    fn capture_worthy(&self) -> bool {
        self.read && !self.shared
    }
}

/// Read the target's memory map and keep the capture-worthy regions, in the
/// order the kernel reports them. Any failure here is fatal to the capture.
pub fn capture_set(pid: Pid) -> Result<Vec<MemoryRegion>> {
    let maps_path = format!("/proc/{pid}/maps");
    let text = fs::read_to_string(&maps_path)
        .with_context(|| format!("cannot open {maps_path}"))?;
    parse_capture_set(&text).with_context(|| format!("cannot parse {maps_path}"))
}

fn parse_capture_set(text: &str) -> Result<Vec<MemoryRegion>> {
    let mut regions = Vec::new();
    for line in text.lines() {
        if let Some((region, permissions)) = parse_maps_line(line)?
            && permissions.capture_worthy()
        {
            regions.push(region);
        }
    }
    Ok(regions)
}

/// Parse one maps line, e.g.
/// `55d0f2a41000-55d0f2a62000 rw-p 00000000 00:00 0     [heap]`.
/// The trailing columns (offset, device, inode, pathname) don't matter here.
fn parse_maps_line(line: &str) -> Result<Option<(MemoryRegion, RegionPermissions)>> {
    let mut tokens = line.split_ascii_whitespace();
    let (Some(range), Some(flags)) = (tokens.next(), tokens.next()) else {
        return Ok(None);
    };

    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| anyhow!("malformed address range {range:?}"))?;
    let start = u64::from_str_radix(start, 16)
        .with_context(|| format!("malformed start address in {range:?}"))?;
    let end = u64::from_str_radix(end, 16)
        .with_context(|| format!("malformed end address in {range:?}"))?;
    if end <= start {
        return Err(anyhow!("empty or inverted address range {range:?}"));
    }

    let mut flags = flags.chars();
    let permissions = RegionPermissions {
        read: flags.next() == Some('r'),
        write: flags.next() == Some('w'),
        execute: flags.next() == Some('x'),
        shared: flags.next() == Some('s'),
    };

    Ok(Some((MemoryRegion { start, end }, permissions)))
}
