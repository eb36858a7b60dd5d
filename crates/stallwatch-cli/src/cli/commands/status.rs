//! `stallwatch status` – one-shot view of downloading transfers.

use anyhow::{Context, Result};
use stallwatch_core::config::StallwatchConfig;
use stallwatch_core::monitor::SpeedSummary;
use stallwatch_core::transfer_client::TransferClient;

use super::connect_client;

pub async fn run_status(cfg: &StallwatchConfig) -> Result<()> {
    let mut client = connect_client(&cfg.client).await?;
    let active = tokio::task::spawn_blocking(move || client.list_active())
        .await?
        .context("listing downloading transfers")?;
    if active.is_empty() {
        println!("No transfers downloading.");
        return Ok(());
    }

    let summary = SpeedSummary::compute(
        active.iter().map(|t| t.speed_kib),
        cfg.monitor.bandwidth_kib,
        cfg.monitor.min_speed_kib,
    );
    println!(
        "{} downloading, total {:.1} KiB/s, threshold {:.1} KiB/s ({})",
        summary.count,
        summary.total_kib,
        summary.threshold_kib,
        if summary.saturated { "saturated" } else { "fair share" }
    );
    println!("{:<10} {:>12} {:>9} {}", "HASH", "KIB/S", "PROGRESS", "");
    for t in &active {
        let flag = if t.progress >= cfg.monitor.safe_progress {
            "safe"
        } else if summary.is_below(t.speed_kib) {
            "slow"
        } else {
            ""
        };
        println!(
            "{:<10} {:>12.1} {:>8.1}% {}",
            t.hash.short(),
            t.speed_kib,
            t.progress * 100.0,
            flag
        );
    }
    Ok(())
}
