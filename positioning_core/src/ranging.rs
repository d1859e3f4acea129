//! Per (device, anchor) ranging history and recency-weighted aggregation.
//!
//! # Aggregation
//! Only samples with `now − tᵢ ≤ retention` take part. Each surviving sample
//! gets a raw weight interpolated linearly over the window's time span:
//!
//!   wᵢ = 0.1 + 0.9 · (tᵢ − t_min) / (t_max − t_min)
//!
//! so the oldest sample weighs 0.1 and the newest 1.0. When all samples share
//! one instant the weights are equal. Weights are normalised to sum to 1 and
//! the aggregate is Σ wᵢ·dᵢ.

use crate::types::Timestamp;
use std::collections::VecDeque;

/// Default number of samples kept per (device, anchor).
pub const DEFAULT_RANGE_HISTORY_LEN: usize = 7;

/// Default retention window for aggregation (seconds).
pub const DEFAULT_RETENTION_WINDOW_S: f64 = 10.0;

const WEIGHT_OLDEST: f64 = 0.1;
const WEIGHT_NEWEST: f64 = 1.0;

/// One raw distance reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangingSample {
    pub distance: f64,
    pub observed_at: Timestamp,
}

/// Bounded, newest-first window of samples for one (device, anchor) pair.
#[derive(Clone, Debug)]
pub struct RangingHistory {
    samples: VecDeque<RangingSample>,
    capacity: usize,
    retention: f64,
}

impl Default for RangingHistory {
    fn default() -> Self {
        Self::new(DEFAULT_RANGE_HISTORY_LEN, DEFAULT_RETENTION_WINDOW_S)
    }
}

impl RangingHistory {
    pub fn new(capacity: usize, retention: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
            retention,
        }
    }

    /// Insert a sample in timestamp order, evicting the oldest beyond
    /// capacity. A late sample older than everything in a full buffer is
    /// dropped. Returns false when the sample was dropped.
    pub fn record(&mut self, distance: f64, at: Timestamp) -> bool {
        let idx = self
            .samples
            .iter()
            .position(|s| s.observed_at <= at)
            .unwrap_or(self.samples.len());
        if idx >= self.capacity {
            return false;
        }
        self.samples.insert(
            idx,
            RangingSample {
                distance,
                observed_at: at,
            },
        );
        self.samples.truncate(self.capacity);
        true
    }

    /// Recency-weighted distance over the retention window, `None` when no
    /// sample is recent enough.
    pub fn aggregate(&self, now: Timestamp) -> Option<f64> {
        let recent: Vec<&RangingSample> = self
            .samples
            .iter()
            .filter(|s| now - s.observed_at <= self.retention)
            .collect();
        if recent.is_empty() {
            return None;
        }

        let (t_min, t_max) = recent
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                (lo.min(s.observed_at), hi.max(s.observed_at))
            });
        let span = t_max - t_min;

        let mut weight_sum = 0.0;
        let mut weighted = 0.0;
        for s in &recent {
            let w = if span > 0.0 {
                WEIGHT_OLDEST + (WEIGHT_NEWEST - WEIGHT_OLDEST) * (s.observed_at - t_min) / span
            } else {
                WEIGHT_OLDEST
            };
            weight_sum += w;
            weighted += w * s.distance;
        }
        Some(weighted / weight_sum)
    }

    /// Newest sample, if any.
    pub fn latest(&self) -> Option<&RangingSample> {
        self.samples.front()
    }

    /// Samples newest-first.
    pub fn samples(&self) -> impl Iterator<Item = &RangingSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
