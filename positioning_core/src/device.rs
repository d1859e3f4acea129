//! Device: per-anchor ranging histories, position history, lifecycle state.

use crate::{
    ranging::RangingHistory,
    types::{AnchorId, DeviceId, Position, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Default number of past positions kept per device.
pub const DEFAULT_POSITION_HISTORY_LEN: usize = 5;

/// Lifecycle state of a tracked device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// No anchor data yet
    #[default]
    Unseen,
    /// Some anchors report it, too few for a fix
    Tracking,
    /// Has a position from enough anchors
    Located,
    /// Silent for longer than the liveness timeout
    Stale,
}

/// A solved position and when it was solved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionFix {
    pub position: Position,
    pub at: Timestamp,
    /// Number of anchors that contributed
    pub fixes: usize,
}

/// A configured device being tracked.
#[derive(Clone, Debug)]
pub struct Device {
    pub id: DeviceId,
    /// Friendly name for outbound messages
    pub name: String,
    pub state: DeviceState,
    /// Ranging history per anchor that has ever reported this device
    pub anchor_histories: HashMap<AnchorId, RangingHistory>,
    /// Solved positions, most recent first
    pub position_history: VecDeque<PositionFix>,
    /// Total accepted observations
    pub measurement_count: u64,
    /// Time of the last accepted observation
    pub last_seen: Option<Timestamp>,
    /// Room of the latest fix
    pub room: Option<String>,
    range_capacity: usize,
    retention: f64,
    position_capacity: usize,
}

impl Device {
    pub fn new(
        id: DeviceId,
        name: impl Into<String>,
        range_capacity: usize,
        retention: f64,
        position_capacity: usize,
    ) -> Self {
        let position_capacity = position_capacity.max(1);
        Self {
            id,
            name: name.into(),
            state: DeviceState::Unseen,
            anchor_histories: HashMap::new(),
            position_history: VecDeque::with_capacity(position_capacity + 1),
            measurement_count: 0,
            last_seen: None,
            room: None,
            range_capacity,
            retention,
            position_capacity,
        }
    }

    /// Append a range sample for `anchor` and bump counters.
    pub fn record_range(&mut self, anchor: &AnchorId, distance: f64, at: Timestamp) {
        let (capacity, retention) = (self.range_capacity, self.retention);
        self.anchor_histories
            .entry(anchor.clone())
            .or_insert_with(|| RangingHistory::new(capacity, retention))
            .record(distance, at);
        self.measurement_count += 1;
        self.last_seen = Some(match self.last_seen {
            Some(prev) => prev.max(at),
            None => at,
        });
    }

    /// Every anchor with a usable aggregate at `now`, sorted by anchor id so
    /// solves are deterministic.
    pub fn current_ranges(&self, now: Timestamp) -> Vec<(&AnchorId, f64)> {
        let mut ranges: Vec<(&AnchorId, f64)> = self
            .anchor_histories
            .iter()
            .filter_map(|(a, h)| h.aggregate(now).map(|d| (a, d)))
            .collect();
        ranges.sort_by(|a, b| a.0.cmp(b.0));
        ranges
    }

    /// Push a new fix to the front of the position history.
    pub fn push_fix(&mut self, fix: PositionFix) {
        self.position_history.push_front(fix);
        while self.position_history.len() > self.position_capacity {
            self.position_history.pop_back();
        }
    }

    /// Latest fix, if any.
    pub fn last_fix(&self) -> Option<&PositionFix> {
        self.position_history.front()
    }

    /// True if nothing was heard for longer than `timeout` at `now`.
    pub fn is_silent(&self, now: Timestamp, timeout: f64) -> bool {
        self.last_seen.is_some_and(|t| now - t > timeout)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
