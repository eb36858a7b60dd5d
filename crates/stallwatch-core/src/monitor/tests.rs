//! Monitor cycle tests against scripted clients and owners.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::*;
use crate::queue_owner::{OwnerKind, QueueEntry, QueueOwner};
use crate::retry::RequestError;
use crate::transfer_client::{TransferClient, TransferHash, TransferSnapshot};

fn boom() -> RequestError {
    RequestError::Http {
        status: 500,
        body: "boom".to_string(),
    }
}

/// Owner whose queue and failure modes are scripted; records removal calls.
pub(crate) struct FakeOwner {
    kind: OwnerKind,
    name: String,
    queue: Arc<Mutex<Vec<QueueEntry>>>,
    fail_queue: bool,
    fail_remove: bool,
    fetches: Arc<AtomicUsize>,
    removals: Arc<Mutex<Vec<Vec<i64>>>>,
}

impl FakeOwner {
    pub(crate) fn new(kind: OwnerKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            queue: Arc::new(Mutex::new(Vec::new())),
            fail_queue: false,
            fail_remove: false,
            fetches: Arc::new(AtomicUsize::new(0)),
            removals: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn with_queue(self, entries: &[(i64, &str)]) -> Self {
        *self.queue.lock().unwrap() = entries
            .iter()
            .map(|(id, d)| QueueEntry {
                id: Some(*id),
                download_id: Some(d.to_string()),
            })
            .collect();
        self
    }

    pub(crate) fn failing_queue(mut self) -> Self {
        self.fail_queue = true;
        self
    }

    pub(crate) fn failing_removal(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    pub(crate) fn fetch_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetches)
    }

    pub(crate) fn removals(&self) -> Arc<Mutex<Vec<Vec<i64>>>> {
        Arc::clone(&self.removals)
    }

    pub(crate) fn queue_handle(&self) -> Arc<Mutex<Vec<QueueEntry>>> {
        Arc::clone(&self.queue)
    }
}

impl QueueOwner for FakeOwner {
    fn kind(&self) -> OwnerKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_queue(&self) -> Result<Vec<QueueEntry>, RequestError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_queue {
            return Err(boom());
        }
        Ok(self.queue.lock().unwrap().clone())
    }

    fn remove_and_redownload(&self, queue_ids: &[i64]) -> Result<(), RequestError> {
        self.removals.lock().unwrap().push(queue_ids.to_vec());
        if self.fail_remove {
            return Err(boom());
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct ClientScript {
    pub active: Vec<TransferSnapshot>,
    /// Known to the client but not downloading (seeding, paused, ...).
    pub idle: Vec<TransferHash>,
    pub fail_active: bool,
    pub fail_known: bool,
}

/// Download client reading from a shared script the test can edit between cycles.
#[derive(Clone, Default)]
pub(crate) struct FakeClient {
    pub script: Arc<Mutex<ClientScript>>,
}

impl FakeClient {
    pub(crate) fn set_active(&self, active: Vec<TransferSnapshot>) {
        self.script.lock().unwrap().active = active;
    }
}

impl TransferClient for FakeClient {
    fn list_active(&mut self) -> Result<Vec<TransferSnapshot>, RequestError> {
        let s = self.script.lock().unwrap();
        if s.fail_active {
            return Err(boom());
        }
        Ok(s.active.clone())
    }

    fn list_all_known(&mut self) -> Result<Vec<TransferHash>, RequestError> {
        let s = self.script.lock().unwrap();
        if s.fail_known {
            return Err(boom());
        }
        Ok(s
            .active
            .iter()
            .map(|t| t.hash.clone())
            .chain(s.idle.iter().cloned())
            .collect())
    }
}

pub(crate) fn snap(hash: &str, speed_kib: f64, progress: f64) -> TransferSnapshot {
    TransferSnapshot {
        hash: TransferHash::new(hash),
        speed_kib,
        progress,
    }
}

fn settings() -> MonitorSettings {
    MonitorSettings {
        retry_delay: Duration::from_secs(30),
        safe_progress: 0.9,
        grace_period: Duration::from_secs(30),
        retry_cooldown: Duration::from_secs(30),
        min_speed_kib: 1000.0,
        bandwidth_kib: 20000.0,
        safe_hold: Duration::from_secs(240),
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

fn monitor_with(client: &FakeClient, owners: Vec<FakeOwner>, settings: MonitorSettings) -> Monitor {
    let owners: Vec<Box<dyn QueueOwner>> = owners
        .into_iter()
        .map(|o| Box::new(o) as Box<dyn QueueOwner>)
        .collect();
    Monitor::new(Box::new(client.clone()), owners, settings)
}

/// Run cycles every `step` seconds from `from` to `to` inclusive; returns
/// the total number of remediations.
fn run_span(m: &mut Monitor, t0: Instant, from: u64, to: u64, step: u64) -> usize {
    (from..=to)
        .step_by(step as usize)
        .map(|n| m.run_cycle(t0 + secs(n)).remediations.len())
        .sum()
}

#[test]
fn two_slow_transfers_on_idle_link_are_below_threshold() {
    let client = FakeClient::default();
    client.set_active(vec![snap("aaaa", 100.0, 0.1), snap("bbbb", 100.0, 0.1)]);
    let mut m = monitor_with(&client, vec![], settings());
    let report = m.run_cycle(Instant::now());
    let s = report.summary.unwrap();
    assert!((s.threshold_kib - 20000.0 / 2.0 / 3.0).abs() < 1e-6);
    assert!(s.is_below(100.0));
}

#[test]
fn grace_period_blocks_remediation() {
    let client = FakeClient::default();
    client.set_active(vec![snap("ABCD1234", 1.0, 0.1)]);
    let radarr = FakeOwner::new(OwnerKind::Radarr, "1080p-en").with_queue(&[(7, "abcd1234")]);
    let removals = radarr.removals();
    let mut m = monitor_with(&client, vec![radarr], settings());
    let t0 = Instant::now();

    let first = m.run_cycle(t0);
    assert_eq!(first.newly_mapped, vec![TransferHash::new("abcd1234")]);
    assert_eq!(run_span(&mut m, t0, 5, 29, 5), 0);
    // Grace ended but nothing checked yet, so no slow clock existed.
    assert!(m.state(&TransferHash::new("abcd1234")).is_none());
    assert!(removals.lock().unwrap().is_empty());
}

#[test]
fn slow_transfer_remediated_once_per_episode() {
    let client = FakeClient::default();
    client.set_active(vec![snap("abcd1234", 1.0, 0.1)]);
    let radarr = FakeOwner::new(OwnerKind::Radarr, "1080p-en").with_queue(&[(7, "ABCD1234")]);
    let removals = radarr.removals();
    let mut m = monitor_with(&client, vec![radarr], settings());
    let t0 = Instant::now();

    m.run_cycle(t0);
    // Clock starts at 30 (end of grace); delay of 30 must be exceeded.
    assert_eq!(run_span(&mut m, t0, 30, 60, 5), 0);
    let fired = m.run_cycle(t0 + secs(61));
    assert_eq!(fired.remediations.len(), 1);
    assert_eq!(*removals.lock().unwrap(), vec![vec![7]]);

    // Still slow long after the cooldown: same episode, no second call.
    assert_eq!(run_span(&mut m, t0, 65, 400, 5), 0);
    assert_eq!(removals.lock().unwrap().len(), 1);

    // Recovery then a new slow episode remediates again.
    client.set_active(vec![snap("abcd1234", 9000.0, 0.2)]);
    m.run_cycle(t0 + secs(405));
    let h = TransferHash::new("abcd1234");
    assert_eq!(m.state(&h).unwrap().first_below, None);
    assert!(!m.state(&h).unwrap().handled);
    client.set_active(vec![snap("abcd1234", 1.0, 0.2)]);
    assert_eq!(run_span(&mut m, t0, 410, 440, 5), 0);
    assert_eq!(m.run_cycle(t0 + secs(445)).remediations.len(), 1);
    assert_eq!(removals.lock().unwrap().len(), 2);
}

#[test]
fn cooldown_suspends_evaluation() {
    let client = FakeClient::default();
    client.set_active(vec![snap("aaaa", 1.0, 0.1)]);
    let radarr = FakeOwner::new(OwnerKind::Radarr, "r").with_queue(&[(1, "aaaa")]);
    let removals = radarr.removals();
    let mut s = settings();
    s.grace_period = Duration::ZERO;
    s.retry_delay = secs(5);
    s.retry_cooldown = secs(60);
    let mut m = monitor_with(&client, vec![radarr], s);
    let t0 = Instant::now();
    let h = TransferHash::new("aaaa");

    m.run_cycle(t0);
    m.remediate(&h, t0);
    assert_eq!(m.last_retry(&h), Some(t0));
    m.states.clear();

    assert_eq!(run_span(&mut m, t0, 1, 59, 1), 0);
    assert!(m.state(&h).is_none(), "cooldown skips before state is touched");
    assert_eq!(removals.lock().unwrap().len(), 1);

    m.run_cycle(t0 + secs(60));
    assert!(m.state(&h).unwrap().first_below.is_some());
}

#[test]
fn safe_progress_hold_blocks_remediation() {
    let client = FakeClient::default();
    client.set_active(vec![snap("aaaa", 0.0, 0.95)]);
    let radarr = FakeOwner::new(OwnerKind::Radarr, "r").with_queue(&[(1, "aaaa")]);
    let removals = radarr.removals();
    let mut m = monitor_with(&client, vec![radarr], settings());
    let t0 = Instant::now();

    m.run_cycle(t0);
    assert_eq!(run_span(&mut m, t0, 30, 30 + 240, 5), 0);
    assert!(removals.lock().unwrap().is_empty());
    let st = m.state(&TransferHash::new("aaaa")).unwrap();
    assert_eq!(st.safe_skip_until, Some(t0 + secs(30 + 240)));
}

#[test]
fn oversized_safe_hold_from_config_does_not_panic() {
    let mut cfg = MonitorConfig::default();
    cfg.safe_hold_secs = u64::MAX;
    cfg.grace_period_secs = 0;
    let client = FakeClient::default();
    client.set_active(vec![snap("aaaa", 0.0, 0.95)]);
    let radarr = FakeOwner::new(OwnerKind::Radarr, "r").with_queue(&[(1, "aaaa")]);
    let removals = radarr.removals();
    let mut m = monitor_with(&client, vec![radarr], MonitorSettings::from(&cfg));
    let t0 = Instant::now();

    m.run_cycle(t0);
    assert!(m.state(&TransferHash::new("aaaa")).unwrap().safe_skip_until.is_some());
    client.set_active(vec![snap("aaaa", 0.0, 0.5)]);
    assert_eq!(run_span(&mut m, t0, 5, 600, 5), 0);
    assert!(removals.lock().unwrap().is_empty());
}

#[test]
fn failure_on_one_owner_does_not_suppress_the_other() {
    let client = FakeClient::default();
    client.set_active(vec![snap("ABCD1234", 1.0, 0.1)]);
    let radarr = FakeOwner::new(OwnerKind::Radarr, "1080p-en")
        .with_queue(&[(3, "abcd1234")])
        .failing_removal();
    let sonarr = FakeOwner::new(OwnerKind::Sonarr, "1080p-en").with_queue(&[(9, "ABCD1234")]);
    let radarr_calls = radarr.removals();
    let sonarr_calls = sonarr.removals();
    let mut m = monitor_with(&client, vec![radarr, sonarr], settings());
    let t0 = Instant::now();
    let h = TransferHash::new("abcd1234");

    m.run_cycle(t0);
    assert_eq!(m.mapping(&h).unwrap().targets.len(), 2);
    let report = m.remediate(&h, t0 + secs(100));

    assert_eq!(*radarr_calls.lock().unwrap(), vec![vec![3]]);
    assert_eq!(*sonarr_calls.lock().unwrap(), vec![vec![9]]);
    assert_eq!(report.outcomes.len(), 2);
    assert!(!report.outcomes[0].succeeded());
    assert_eq!(report.outcomes[0].kind, OwnerKind::Radarr);
    assert!(report.outcomes[1].succeeded());
    assert!(!report.all_succeeded());
    assert_eq!(m.last_retry(&h), Some(t0 + secs(100)));
}

#[test]
fn unmapped_transfer_is_retried_until_an_owner_claims_it() {
    let client = FakeClient::default();
    client.set_active(vec![snap("aaaa", 1.0, 0.1)]);
    let radarr = FakeOwner::new(OwnerKind::Radarr, "r");
    let queue = radarr.queue_handle();
    let fetches = radarr.fetch_counter();
    let mut m = monitor_with(&client, vec![radarr], settings());
    let t0 = Instant::now();
    let h = TransferHash::new("aaaa");

    assert_eq!(run_span(&mut m, t0, 0, 100, 5), 0);
    assert!(m.mapping(&h).is_none());
    assert!(m.state(&h).is_none());
    assert_eq!(fetches.load(Ordering::SeqCst), 21);

    queue.lock().unwrap().push(QueueEntry {
        id: Some(12),
        download_id: Some("AAAA".to_string()),
    });
    let report = m.run_cycle(t0 + secs(105));
    assert_eq!(report.newly_mapped, vec![h.clone()]);
    assert_eq!(m.mapping(&h).unwrap().mapped_at, t0 + secs(105));

    // Mapped once: later queue changes are not picked up and no more fetches happen.
    queue.lock().unwrap().clear();
    m.run_cycle(t0 + secs(110));
    assert_eq!(fetches.load(Ordering::SeqCst), 22);
    assert_eq!(m.mapping(&h).unwrap().targets[0].queue_ids, vec![12]);
}

#[test]
fn pruned_transfer_starts_fresh_on_reappearance() {
    let client = FakeClient::default();
    client.set_active(vec![snap("aaaa", 1.0, 0.1)]);
    let radarr = FakeOwner::new(OwnerKind::Radarr, "r").with_queue(&[(1, "aaaa")]);
    let mut m = monitor_with(&client, vec![radarr], settings());
    let t0 = Instant::now();
    let h = TransferHash::new("aaaa");

    m.run_cycle(t0);
    assert_eq!(run_span(&mut m, t0, 30, 65, 5), 1);
    assert!(m.state(&h).unwrap().handled);

    client.set_active(vec![]);
    let report = m.run_cycle(t0 + secs(70));
    assert_eq!(report.pruned, vec![h.clone()]);
    assert!(m.state(&h).is_none());
    assert!(m.mapping(&h).is_none());
    assert_eq!(m.tracked_count(), 0);
    assert!(m.last_retry(&h).is_some(), "retry timestamps survive pruning");

    client.set_active(vec![snap("aaaa", 1.0, 0.1)]);
    let back = m.run_cycle(t0 + secs(200));
    assert_eq!(back.newly_mapped, vec![h.clone()]);
    assert_eq!(m.mapping(&h).unwrap().mapped_at, t0 + secs(200));
    // Fresh grace period: nothing evaluated yet.
    assert!(m.state(&h).is_none());
}

#[test]
fn seeding_transfers_are_not_pruned() {
    let client = FakeClient::default();
    client.set_active(vec![snap("aaaa", 1.0, 0.1)]);
    let radarr = FakeOwner::new(OwnerKind::Radarr, "r").with_queue(&[(1, "aaaa")]);
    let mut m = monitor_with(&client, vec![radarr], settings());
    let t0 = Instant::now();
    m.run_cycle(t0);

    {
        let mut s = client.script.lock().unwrap();
        s.active.clear();
        s.idle.push(TransferHash::new("AAAA"));
    }
    let report = m.run_cycle(t0 + secs(5));
    assert!(report.pruned.is_empty());
    assert!(m.mapping(&TransferHash::new("aaaa")).is_some());
}

#[test]
fn upstream_failures_skip_only_their_step() {
    let client = FakeClient::default();
    client.set_active(vec![snap("aaaa", 1.0, 0.1)]);
    let radarr = FakeOwner::new(OwnerKind::Radarr, "r").with_queue(&[(1, "aaaa")]);
    let mut m = monitor_with(&client, vec![radarr], settings());
    let t0 = Instant::now();
    m.run_cycle(t0);

    // Known list unavailable: nothing is pruned even though "aaaa" vanished.
    {
        let mut s = client.script.lock().unwrap();
        s.active.clear();
        s.fail_known = true;
    }
    let report = m.run_cycle(t0 + secs(5));
    assert!(report.pruned.is_empty());
    assert!(m.mapping(&TransferHash::new("aaaa")).is_some());

    // Active list unavailable: no summary, but cleanup still runs.
    {
        let mut s = client.script.lock().unwrap();
        s.fail_known = false;
        s.fail_active = true;
    }
    let report = m.run_cycle(t0 + secs(10));
    assert!(report.summary.is_none());
    assert_eq!(report.pruned, vec![TransferHash::new("aaaa")]);
}

#[test]
fn prune_covers_mappings_without_state() {
    let client = FakeClient::default();
    let mut m = monitor_with(&client, vec![], settings());
    let h = TransferHash::new("aaaa");
    m.mappings.insert(
        h.clone(),
        Mapping {
            targets: vec![],
            mapped_at: Instant::now(),
        },
    );
    let pruned = m.prune(&HashSet::new());
    assert_eq!(pruned, vec![h]);
    assert_eq!(m.tracked_count(), 0);
}
