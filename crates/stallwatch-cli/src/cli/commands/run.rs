//! `stallwatch run` – start the watchdog.

use anyhow::{bail, Result};
use stallwatch_core::config::StallwatchConfig;
use stallwatch_core::monitor::{CycleReport, Monitor, MonitorSettings};
use stallwatch_core::queue_owner::owners_from_config;
use stallwatch_core::watchdog::{self, WatchdogHandle};
use std::future::Future;
use std::time::{Duration, Instant};

/// How often the supervisor checks that the monitor thread is still alive.
const WORKER_POLL: Duration = Duration::from_millis(250);

use super::connect_client;

pub async fn run_watchdog(cfg: StallwatchConfig, once: bool) -> Result<()> {
    let client = connect_client(&cfg.client).await?;
    let owners = owners_from_config(&cfg.owners)?;
    if owners.is_empty() {
        tracing::warn!("no Radarr/Sonarr owners configured; no transfer can be remediated");
    }
    for owner in &owners {
        tracing::info!(kind = %owner.kind(), owner = owner.name(), "watching queue");
    }
    let monitor = Monitor::new(
        Box::new(client),
        owners,
        MonitorSettings::from(&cfg.monitor),
    );

    if once {
        let report = tokio::task::spawn_blocking(move || {
            let mut monitor = monitor;
            monitor.run_cycle(Instant::now())
        })
        .await?;
        print_report(&report);
        return Ok(());
    }

    let handle = watchdog::spawn(monitor, cfg.monitor.check_interval())?;
    let monitor = supervise(handle, shutdown_signal()).await?;
    tracing::info!(tracked = monitor.tracked_count(), "watchdog stopped");
    Ok(())
}

/// Wait for `signal` or for the monitor thread to die, then join it.
/// A worker that ends on its own is an error.
async fn supervise<S>(handle: WatchdogHandle, signal: S) -> Result<Monitor>
where
    S: Future<Output = Result<()>>,
{
    let died = tokio::select! {
        res = signal => {
            res?;
            tracing::info!("shutdown requested; waiting for current cycle");
            false
        }
        _ = worker_exited(&handle) => {
            tracing::error!("monitor thread exited unexpectedly");
            true
        }
    };
    let monitor = tokio::task::spawn_blocking(move || handle.shutdown()).await??;
    if died {
        bail!("monitor thread stopped without a shutdown request");
    }
    Ok(monitor)
}

async fn worker_exited(handle: &WatchdogHandle) {
    let mut tick = tokio::time::interval(WORKER_POLL);
    while !handle.is_finished() {
        tick.tick().await;
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix (container stop).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}

fn print_report(report: &CycleReport) {
    match &report.summary {
        Some(s) => println!(
            "{} downloading, total {:.1} KiB/s, avg {:.1} KiB/s, threshold {:.1} KiB/s",
            s.count, s.total_kib, s.avg_kib, s.threshold_kib
        ),
        None => println!("Download client did not return its transfer list."),
    }
    for hash in &report.newly_mapped {
        println!("mapped   {}", hash.short());
    }
    for r in &report.remediations {
        for o in &r.outcomes {
            let status = o.error.as_deref().unwrap_or("ok");
            println!(
                "retried  {}  {} {} {:?}: {}",
                r.hash.short(),
                o.kind,
                o.owner,
                o.queue_ids,
                status
            );
        }
    }
    for hash in &report.pruned {
        println!("dropped  {}", hash.short());
    }
}
