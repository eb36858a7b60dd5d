//! Health monitor: finds stalled transfers and has their owners replace them.
//!
//! Each cycle:
//! 1. newly seen downloading hashes are mapped to owner queue entries,
//! 2. the adaptive threshold is computed and every mapped transfer is run
//!    through grace, cooldown, safe-progress hold, and the slow-episode clock,
//! 3. state for hashes the download client no longer knows is dropped.
//!
//! All state lives in [`Monitor`] and is touched only by the thread that runs
//! [`Monitor::run_cycle`], so nothing here is locked.

mod remediation;
mod resolver;
mod state;
mod threshold;

#[cfg(test)]
pub(crate) mod tests;

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::config::MonitorConfig;
use crate::queue_owner::QueueOwner;
use crate::transfer_client::{TransferClient, TransferHash, TransferSnapshot};

pub use remediation::{RemediationOutcome, RemediationReport};
pub use resolver::{CycleQueues, MappingTarget};
pub use state::{TransferState, Verdict};
pub use threshold::SpeedSummary;

/// Monitor tuning with durations resolved. Built from [`MonitorConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub retry_delay: Duration,
    pub safe_progress: f64,
    pub grace_period: Duration,
    pub retry_cooldown: Duration,
    pub min_speed_kib: f64,
    pub bandwidth_kib: f64,
    pub safe_hold: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(cfg: &MonitorConfig) -> Self {
        Self {
            retry_delay: Duration::from_secs(cfg.retry_delay_secs),
            safe_progress: cfg.safe_progress,
            grace_period: Duration::from_secs(cfg.grace_period_secs),
            retry_cooldown: Duration::from_secs(cfg.retry_cooldown_secs),
            min_speed_kib: cfg.min_speed_kib,
            bandwidth_kib: cfg.bandwidth_kib,
            safe_hold: Duration::from_secs(cfg.safe_hold_secs),
        }
    }
}

/// Owner queue entries for one hash, and when they were captured.
/// Never re-resolved while the hash stays tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub targets: Vec<MappingTarget>,
    pub mapped_at: Instant,
}

/// What happened during one [`Monitor::run_cycle`].
#[derive(Debug, Default)]
pub struct CycleReport {
    /// None when the active list could not be fetched.
    pub summary: Option<SpeedSummary>,
    pub newly_mapped: Vec<TransferHash>,
    pub remediations: Vec<RemediationReport>,
    pub pruned: Vec<TransferHash>,
}

pub struct Monitor {
    client: Box<dyn TransferClient>,
    owners: Vec<Box<dyn QueueOwner>>,
    settings: MonitorSettings,
    mappings: HashMap<TransferHash, Mapping>,
    states: HashMap<TransferHash, TransferState>,
    /// Survives pruning; keyed by hash so a re-added release still cools down.
    last_retry: HashMap<TransferHash, Instant>,
}

impl Monitor {
    pub fn new(
        client: Box<dyn TransferClient>,
        owners: Vec<Box<dyn QueueOwner>>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            client,
            owners,
            settings,
            mappings: HashMap::new(),
            states: HashMap::new(),
            last_retry: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn owners(&self) -> &[Box<dyn QueueOwner>] {
        &self.owners
    }

    pub fn mapping(&self, hash: &TransferHash) -> Option<&Mapping> {
        self.mappings.get(hash)
    }

    pub fn state(&self, hash: &TransferHash) -> Option<&TransferState> {
        self.states.get(hash)
    }

    pub fn last_retry(&self, hash: &TransferHash) -> Option<Instant> {
        self.last_retry.get(hash).copied()
    }

    /// Number of hashes with a mapping or a state record.
    pub fn tracked_count(&self) -> usize {
        self.mappings
            .keys()
            .chain(self.states.keys())
            .collect::<HashSet<_>>()
            .len()
    }

    /// One full cycle: map new transfers, check speeds, prune finished ones.
    /// Upstream failures are logged and skip only the step that needed them.
    pub fn run_cycle(&mut self, now: Instant) -> CycleReport {
        let mut report = CycleReport::default();

        match self.client.list_active() {
            Ok(active) => {
                report.newly_mapped = self.update_mappings(&active, now);
                let (summary, remediations) = self.check_speeds(&active, now);
                report.summary = Some(summary);
                report.remediations = remediations;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not list downloading transfers; skipping checks this cycle");
            }
        }

        match self.client.list_all_known() {
            Ok(known) => {
                let known: HashSet<TransferHash> = known.into_iter().collect();
                report.pruned = self.prune(&known);
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not list known transfers; skipping cleanup this cycle");
            }
        }

        report
    }

    /// Resolve owners for every active hash that has no mapping yet.
    /// Hashes nothing owns stay unmapped and are tried again next cycle.
    pub fn update_mappings(&mut self, active: &[TransferSnapshot], now: Instant) -> Vec<TransferHash> {
        let mut newly_mapped = Vec::new();
        let mut queues = CycleQueues::new(&self.owners);
        for snap in active {
            if self.mappings.contains_key(&snap.hash) {
                continue;
            }
            let targets = queues.resolve(&snap.hash);
            if targets.is_empty() {
                tracing::debug!(hash = snap.hash.short(), "no queue entry owns this transfer yet");
                continue;
            }
            for t in &targets {
                let owner = &self.owners[t.owner];
                tracing::info!(
                    hash = snap.hash.short(),
                    kind = %owner.kind(),
                    owner = owner.name(),
                    queue_ids = ?t.queue_ids,
                    "mapped transfer to queue entries"
                );
            }
            self.mappings.insert(
                snap.hash.clone(),
                Mapping {
                    targets,
                    mapped_at: now,
                },
            );
            newly_mapped.push(snap.hash.clone());
        }
        newly_mapped
    }

    /// Compute the threshold and advance every active transfer's state,
    /// remediating those slow for longer than the retry delay.
    pub fn check_speeds(
        &mut self,
        active: &[TransferSnapshot],
        now: Instant,
    ) -> (SpeedSummary, Vec<RemediationReport>) {
        let summary = SpeedSummary::compute(
            active.iter().map(|t| t.speed_kib),
            self.settings.bandwidth_kib,
            self.settings.min_speed_kib,
        );
        tracing::info!(
            count = summary.count,
            total_kib = summary.total_kib,
            avg_kib = summary.avg_kib,
            threshold_kib = summary.threshold_kib,
            "speed check"
        );

        let mut remediations = Vec::new();
        for snap in active {
            let hash = &snap.hash;
            let Some(mapping) = self.mappings.get(hash) else {
                tracing::debug!(hash = hash.short(), "unmapped; not monitored");
                continue;
            };
            let age = now.saturating_duration_since(mapping.mapped_at);
            if age < self.settings.grace_period {
                tracing::debug!(hash = hash.short(), age = ?age, "in grace period");
                continue;
            }
            if let Some(last) = self.last_retry.get(hash) {
                let since = now.saturating_duration_since(*last);
                if since < self.settings.retry_cooldown {
                    tracing::debug!(hash = hash.short(), since = ?since, "cooling down after retry");
                    continue;
                }
            }

            tracing::debug!(
                hash = hash.short(),
                progress = snap.progress,
                speed_kib = snap.speed_kib,
                "checking transfer"
            );
            let verdict = self.states.entry(hash.clone()).or_default().observe(
                now,
                snap.speed_kib,
                snap.progress,
                summary.threshold_kib,
                &self.settings,
            );
            match verdict {
                Verdict::SafeHoldArmed { .. } => {
                    tracing::info!(
                        hash = hash.short(),
                        progress = snap.progress,
                        hold = ?self.settings.safe_hold,
                        "near completion; monitoring suspended"
                    );
                }
                Verdict::InSafeWindow { remaining } => {
                    tracing::debug!(hash = hash.short(), remaining = ?remaining, "in safe completion window");
                }
                Verdict::Remediate { slow_for } => {
                    tracing::info!(
                        hash = hash.short(),
                        speed_kib = snap.speed_kib,
                        threshold_kib = summary.threshold_kib,
                        slow_for = ?slow_for,
                        "transfer stalled; requesting replacement"
                    );
                    remediations.push(self.remediate(hash, now));
                }
                Verdict::SafeHold
                | Verdict::SlowClockStarted
                | Verdict::SlowPending { .. }
                | Verdict::AlreadyHandled
                | Verdict::Healthy => {}
            }
        }
        (summary, remediations)
    }

    /// Drop every per-transfer record whose hash is not in `known`.
    /// Retry timestamps are kept.
    pub fn prune(&mut self, known: &HashSet<TransferHash>) -> Vec<TransferHash> {
        let stale: Vec<TransferHash> = self
            .mappings
            .keys()
            .chain(self.states.keys())
            .filter(|h| !known.contains(*h))
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        for hash in &stale {
            self.states.remove(hash);
            self.mappings.remove(hash);
            tracing::debug!(hash = hash.short(), "transfer gone; state dropped");
        }
        stale
    }
}
