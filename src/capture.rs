use anyhow::Result;
use nix::unistd::Pid;
use tracing::{info, warn};

use crate::freeze::FreezeGuard;
use crate::maps::{self, MemoryRegion};
use crate::reader::{RegionCapture, RegionReader};
use crate::sink::SnapshotSink;

/// Totals reported after a capture. `total_bytes` counts the nominal size of
/// every enumerated region, whether or not its read succeeded.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureSummary {
    pub ranges: usize,
    pub total_bytes: u64,
    pub captured: usize,
    pub dropped: usize,
    pub bytes_written: u64,
}

/// Run one capture: stop the target, walk its capture-worthy regions through
/// `reader` into `sink`, and let the target run again. Each region is
/// attempted exactly once; reads that fail are logged and skipped, and only
/// fatal conditions (bad target, unreadable map, sink I/O) abort the run.
pub fn capture(
    pid: Pid,
    reader: &mut dyn RegionReader,
    sink: &mut dyn SnapshotSink,
) -> Result<CaptureSummary> {
    // The target is frozen before its map is read. A region enumerated while
    // the target still runs could be unmapped again by the time it is read.
    let _frozen = FreezeGuard::suspend(pid)?;

    let regions = maps::capture_set(pid)?;
    let mut summary = CaptureSummary {
        ranges: regions.len(),
        total_bytes: regions.iter().map(MemoryRegion::len).sum(),
        ..Default::default()
    };

    for region in &regions {
        match reader.read_region(region) {
            RegionCapture::Captured(captured) => {
                sink.write_region(region, &captured)?;
                summary.captured += 1;
                summary.bytes_written += captured.data.len() as u64;
                if captured.failed_chunks > 0 {
                    // kept, but with holes; distinct from a dropped region
                    warn!(
                        "... {:016X}:{:016X} ({} bytes, {} chunks zero-filled)",
                        region.start, region.end, captured.bytes_read, captured.failed_chunks
                    );
                } else {
                    info!("... {:016X}:{:016X}", region.start, region.end);
                }
            }
            RegionCapture::Failed(reason) => {
                summary.dropped += 1;
                warn!(
                    "... {:016X}:{:016X} (failed: {})",
                    region.start, region.end, reason
                );
            }
        }
    }
    sink.finish()?;

    let total_gb = summary.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    info!(
        "{:X} bytes ({:.2} GB) in {} ranges",
        summary.total_bytes, total_gb, summary.ranges
    );

    Ok(summary)
}
