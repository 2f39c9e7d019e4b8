use anyhow::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{trace, warn};

/// Scoped suspension of the target process.
///
/// The target must never stay stopped because the capture path bailed out
/// somewhere, so the continue signal lives in `Drop`: a guard only exists
/// after SIGSTOP was delivered, and dropping it delivers SIGCONT no matter
/// which way the capture exits.
#[derive(Debug)]
pub struct FreezeGuard {
    pid: Pid,
}

impl FreezeGuard {
    /// Stop the target's scheduling for the duration of the guard. The
    /// target is usually not our child, so there is no wait here; SIGSTOP
    /// takes effect before any subsequent read observes the address space.
    pub fn suspend(pid: Pid) -> Result<FreezeGuard> {
        kill(pid, Some(Signal::SIGSTOP))
            .with_context(|| format!("cannot stop process {pid}"))?;
        trace!("delivered SIGSTOP to {pid}");
        Ok(FreezeGuard { pid })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }
}

impl Drop for FreezeGuard {
    fn drop(&mut self) {
        match kill(self.pid, Some(Signal::SIGCONT)) {
            Ok(()) => trace!("delivered SIGCONT to {}", self.pid),
            // nothing else we can do once the capture is unwinding
            Err(e) => warn!("failed to resume process {}: {}", self.pid, e),
        }
    }
}
