//! Periodic resident-memory report.
//!
//! Runs as its own task and shares nothing with request handling.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawns a task logging resident memory every `interval`.
///
/// Returns `None` when `interval` is zero. The task stops by itself on
/// platforms where resident memory cannot be read.
pub fn spawn_memory_report(interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match resident_memory_bytes() {
                Some(rss) => info!(rss_bytes = rss, "memory usage {:.2} MiB", rss as f64 / (1024.0 * 1024.0)),
                None => {
                    debug!("resident memory not available on this platform, stopping report");
                    return;
                }
            }
        }
    }))
}

/// Resident set size of this process in bytes.
pub fn resident_memory_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Extracts `VmRSS` (reported in kB) from a `/proc/<pid>/status` dump.
fn parse_vm_rss(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}
