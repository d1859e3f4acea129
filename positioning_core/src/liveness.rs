//! Liveness: devices silent for longer than the timeout become Stale.
//!
//! # Policy
//! - A device with `now − last_seen > timeout` transitions to
//!   [`DeviceState::Stale`] and one not-present report is emitted.
//! - Repeated scans while it stays silent emit nothing further.
//! - The next accepted observation moves it back to Tracking / Located.
//! - Devices never seen are not reported.

use crate::{
    device::{Device, DeviceState},
    types::{DeviceId, Timestamp},
};
use rayon::prelude::*;
use tracing::info;

/// Emitted once when a device goes silent.
#[derive(Clone, Debug, PartialEq)]
pub struct NotPresentReport {
    pub device_id: DeviceId,
    pub name: String,
    /// Scan time that detected the silence
    pub at: Timestamp,
    pub last_seen: Timestamp,
}

#[derive(Clone, Debug)]
pub struct LivenessMonitor {
    /// Maximum silence in seconds
    pub timeout: f64,
}

impl LivenessMonitor {
    pub fn new(timeout: f64) -> Self {
        Self { timeout }
    }

    /// Check one device; returns a report on the transition into Stale.
    pub fn check(&self, device: &mut Device, now: Timestamp) -> Option<NotPresentReport> {
        if device.state == DeviceState::Stale || !device.is_silent(now, self.timeout) {
            return None;
        }
        let last_seen = device.last_seen?;
        device.state = DeviceState::Stale;
        info!(
            device = %device.id,
            silent_s = now - last_seen,
            "device went stale"
        );
        Some(NotPresentReport {
            device_id: device.id.clone(),
            name: device.name.clone(),
            at: now,
            last_seen,
        })
    }

    /// Scan all devices in parallel.
    pub fn scan(&self, devices: &mut [Device], now: Timestamp) -> Vec<NotPresentReport> {
        devices
            .par_iter_mut()
            .filter_map(|d| self.check(d, now))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnchorId;

    fn seen_at(id: &str, t: Timestamp) -> Device {
        let mut d = Device::new(DeviceId::new(id), id.to_uppercase(), 7, 10.0, 5);
        d.record_range(&AnchorId::new("a"), 1.0, t);
        d.state = DeviceState::Tracking;
        d
    }

    #[test]
    fn silent_device_reported_once() {
        let monitor = LivenessMonitor::new(5.0);
        let now = 1000.0;
        let mut devices = vec![seen_at("old", now - 6.0), seen_at("fresh", now - 1.0)];

        let reports = monitor.scan(&mut devices, now);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].device_id.as_str(), "old");
        assert_eq!(devices[0].state, DeviceState::Stale);
        assert_eq!(devices[1].state, DeviceState::Tracking);

        // Still silent on the next tick: no repeat
        assert!(monitor.scan(&mut devices, now + 1.0).is_empty());
    }

    #[test]
    fn unseen_device_is_never_reported() {
        let monitor = LivenessMonitor::new(5.0);
        let mut devices = vec![Device::new(DeviceId::new("x"), "X", 7, 10.0, 5)];
        assert!(monitor.scan(&mut devices, 1e6).is_empty());
        assert_eq!(devices[0].state, DeviceState::Unseen);
    }

    #[test]
    fn exactly_at_timeout_is_still_present() {
        let monitor = LivenessMonitor::new(5.0);
        let mut d = seen_at("edge", 10.0);
        assert!(monitor.check(&mut d, 15.0).is_none());
        assert!(monitor.check(&mut d, 15.001).is_some());
    }
}
