//! Background worker that runs monitor cycles until asked to stop.
//!
//! One OS thread owns the [`Monitor`]; every HTTP call it makes is blocking.
//! A stop request sets a shared flag and unparks the worker, which notices it
//! at the next cycle boundary. An in-flight cycle is never interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::monitor::Monitor;

/// Handle to a running watchdog thread.
pub struct WatchdogHandle {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<Monitor>,
}

impl WatchdogHandle {
    /// Ask the worker to exit after its current cycle.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.thread.thread().unpark();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stop the worker and wait for it, returning the monitor with its state.
    pub fn shutdown(self) -> anyhow::Result<Monitor> {
        self.stop();
        self.thread
            .join()
            .map_err(|_| anyhow::anyhow!("monitor thread panicked"))
    }
}

/// Start the monitor loop on a dedicated thread, idling `interval` between cycles.
pub fn spawn(monitor: Monitor, interval: Duration) -> std::io::Result<WatchdogHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let thread = thread::Builder::new()
        .name("stallwatch-monitor".to_string())
        .spawn(move || run_loop(monitor, interval, &flag))?;
    Ok(WatchdogHandle { stop, thread })
}

fn run_loop(mut monitor: Monitor, interval: Duration, stop: &AtomicBool) -> Monitor {
    tracing::info!(interval = ?interval, "monitor started");
    while !stop.load(Ordering::Relaxed) {
        tracing::debug!("monitor iteration start");
        let report = monitor.run_cycle(Instant::now());
        if !report.remediations.is_empty() || !report.pruned.is_empty() {
            tracing::debug!(
                remediated = report.remediations.len(),
                pruned = report.pruned.len(),
                tracked = monitor.tracked_count(),
                "monitor iteration done"
            );
        }
        idle(interval, stop);
    }
    tracing::info!("monitor stopped");
    monitor
}

/// Sleep up to `interval`, returning early once `stop` is set.
/// Parking can wake spuriously, so the deadline is rechecked.
/// An interval too long to represent as a deadline idles until stopped.
fn idle(interval: Duration, stop: &AtomicBool) {
    let deadline = Instant::now().checked_add(interval);
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let Some(deadline) = deadline else {
            thread::park();
            continue;
        };
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::park_timeout(deadline - now);
    }
}
