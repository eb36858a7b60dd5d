//! Per-transfer timing state machine.

use std::time::{Duration, Instant};

use super::MonitorSettings;

/// Bookkeeping for one transfer hash.
///
/// `first_below` and `handled` describe the current slow episode and are
/// always cleared together. `safe_skip_until` is armed once, the first time
/// the transfer reaches safe progress, and is never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferState {
    pub first_below: Option<Instant>,
    pub handled: bool,
    pub safe_skip_until: Option<Instant>,
}

/// Outcome of feeding one observation into [`TransferState::observe`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Safe progress reached for the first time; monitoring held until `until`.
    SafeHoldArmed { until: Instant },
    /// At or above safe progress; skipped.
    SafeHold,
    /// Progress regressed below safe but the hold window is still open.
    InSafeWindow { remaining: Duration },
    /// First slow observation of an episode; the clock starts now.
    SlowClockStarted,
    /// Slow, but not for longer than the retry delay yet.
    SlowPending { elapsed: Duration },
    /// Slow for longer than the retry delay: remediate now. `handled` is set.
    Remediate { slow_for: Duration },
    /// Still slow; this episode was already remediated.
    AlreadyHandled,
    /// At or above the threshold; episode bookkeeping cleared.
    Healthy,
}

impl TransferState {
    /// Advance the state with one observation taken at `now`.
    ///
    /// Grace and cooldown are checked by the caller before this runs; this
    /// covers the safe-progress hold and the slow-episode clock.
    pub fn observe(
        &mut self,
        now: Instant,
        speed_kib: f64,
        progress: f64,
        threshold_kib: f64,
        settings: &MonitorSettings,
    ) -> Verdict {
        if progress >= settings.safe_progress {
            if self.safe_skip_until.is_none() {
                let until = saturating_add(now, settings.safe_hold);
                self.safe_skip_until = Some(until);
                return Verdict::SafeHoldArmed { until };
            }
            return Verdict::SafeHold;
        }
        if let Some(until) = self.safe_skip_until {
            if now < until {
                return Verdict::InSafeWindow {
                    remaining: until - now,
                };
            }
        }

        if speed_kib >= threshold_kib {
            self.first_below = None;
            self.handled = false;
            return Verdict::Healthy;
        }

        let Some(since) = self.first_below else {
            self.first_below = Some(now);
            return Verdict::SlowClockStarted;
        };
        if self.handled {
            return Verdict::AlreadyHandled;
        }
        let elapsed = now.saturating_duration_since(since);
        if elapsed > settings.retry_delay {
            self.handled = true;
            Verdict::Remediate { slow_for: elapsed }
        } else {
            Verdict::SlowPending { elapsed }
        }
    }
}

/// `now + d`, clamped to the latest instant the platform can represent.
fn saturating_add(now: Instant, d: Duration) -> Instant {
    let mut d = d;
    loop {
        if let Some(t) = now.checked_add(d) {
            return t;
        }
        d /= 2;
    }
}
