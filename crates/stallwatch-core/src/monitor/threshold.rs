//! Adaptive slow-speed threshold.

/// Below this share of the bandwidth budget the link is considered idle enough
/// that an even split is a meaningful expectation.
const SATURATION_FRACTION: f64 = 0.7;
/// A transfer is slow when it gets less than 1/3 of its fair share.
const FAIR_SHARE_DIVISOR: f64 = 3.0;
/// On a saturated link, slow means under a quarter of the average speed.
const SATURATED_AVG_FRACTION: f64 = 0.25;

/// Aggregate speed figures for one cycle and the threshold derived from them.
/// All speeds are KiB/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSummary {
    pub count: usize,
    pub total_kib: f64,
    pub avg_kib: f64,
    pub threshold_kib: f64,
    /// True when total speed reached the saturation share of the budget.
    pub saturated: bool,
}

impl SpeedSummary {
    /// Compute the threshold for the given per-transfer speeds.
    ///
    /// With spare capacity: `capacity / count / 3`. Near saturation the
    /// client's own scheduler is already balancing, so use
    /// `max(min_kib, avg / 4)` instead. `count == 0` divides by one.
    pub fn compute<I>(speeds: I, capacity_kib: f64, min_kib: f64) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let (count, total_kib) = speeds
            .into_iter()
            .fold((0usize, 0.0f64), |(n, sum), s| (n + 1, sum + s));
        let avg_kib = if count > 0 { total_kib / count as f64 } else { 0.0 };
        let saturated = total_kib >= capacity_kib * SATURATION_FRACTION;
        let threshold_kib = if saturated {
            min_kib.max(avg_kib * SATURATED_AVG_FRACTION)
        } else {
            capacity_kib / count.max(1) as f64 / FAIR_SHARE_DIVISOR
        };
        Self {
            count,
            total_kib,
            avg_kib,
            threshold_kib,
            saturated,
        }
    }

    pub fn is_below(&self, speed_kib: f64) -> bool {
        speed_kib < self.threshold_kib
    }
}
