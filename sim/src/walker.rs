//! Simulated device motion.
//!
//! Each walker follows a closed loop of waypoints at constant speed, pausing
//! at each waypoint for `dwell` seconds. The simulator steps it forward in
//! time and reads back the true position.

use positioning_core::Position;
use serde::{Deserialize, Serialize};

/// A simulated device carried around the floor plan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Walker {
    /// Device id reported by the anchors
    pub device_id: String,
    pub name: String,
    /// True position [x, y, z]
    pub position: [f64; 3],
    /// Loop of waypoints [x, y, z]
    pub waypoints: Vec<[f64; 3]>,
    /// Walking speed (m/s)
    pub speed: f64,
    /// Pause at each waypoint (s)
    pub dwell: f64,
    /// Optional: device leaves (no more readings) at this time
    pub leave_at: Option<f64>,
    /// Optional: device comes back at this time
    pub return_at: Option<f64>,
    next_waypoint: usize,
    dwell_left: f64,
}

impl Walker {
    pub fn new(
        device_id: impl Into<String>,
        name: impl Into<String>,
        waypoints: Vec<[f64; 3]>,
        speed: f64,
        dwell: f64,
    ) -> Self {
        let position = waypoints.first().copied().unwrap_or([0.0; 3]);
        Self {
            device_id: device_id.into(),
            name: name.into(),
            position,
            next_waypoint: if waypoints.len() > 1 { 1 } else { 0 },
            waypoints,
            speed,
            dwell,
            leave_at: None,
            return_at: None,
            dwell_left: dwell,
        }
    }

    /// Leave the building at `leave_at`, optionally returning at `return_at`.
    pub fn with_absence(mut self, leave_at: f64, return_at: Option<f64>) -> Self {
        self.leave_at = Some(leave_at);
        self.return_at = return_at;
        self
    }

    /// Propagate the true position by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        if self.waypoints.len() < 2 || self.speed <= 0.0 {
            return;
        }
        let mut remaining = dt;
        while remaining > 0.0 {
            if self.dwell_left > 0.0 {
                let pause = self.dwell_left.min(remaining);
                self.dwell_left -= pause;
                remaining -= pause;
                continue;
            }
            let target = self.waypoints[self.next_waypoint];
            let d = [
                target[0] - self.position[0],
                target[1] - self.position[1],
                target[2] - self.position[2],
            ];
            let dist = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
            let reach = self.speed * remaining;
            if reach >= dist {
                self.position = target;
                remaining -= dist / self.speed;
                self.next_waypoint = (self.next_waypoint + 1) % self.waypoints.len();
                self.dwell_left = self.dwell;
                if dist == 0.0 && self.dwell <= 0.0 {
                    // degenerate loop of identical points
                    return;
                }
            } else {
                let k = reach / dist;
                for (p, dp) in self.position.iter_mut().zip(d) {
                    *p += dp * k;
                }
                remaining = 0.0;
            }
        }
    }

    /// True if the device is in the building at time `t`.
    pub fn is_present(&self, t: f64) -> bool {
        match (self.leave_at, self.return_at) {
            (Some(leave), Some(back)) => t < leave || t >= back,
            (Some(leave), None) => t < leave,
            _ => true,
        }
    }

    pub fn true_position(&self) -> Position {
        Position::new(self.position[0], self.position[1], self.position[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_toward_next_waypoint() {
        let mut w = Walker::new("d", "D", vec![[0.0, 0.0, 1.0], [4.0, 0.0, 1.0]], 1.0, 0.0);
        w.step(1.5);
        assert!((w.position[0] - 1.5).abs() < 1e-9);
        w.step(3.0);
        // reached (4,0) after 2.5 s, then 0.5 s back toward (0,0)
        assert!((w.position[0] - 3.5).abs() < 1e-9);
    }

    #[test]
    fn dwell_pauses_motion() {
        let mut w = Walker::new("d", "D", vec![[0.0, 0.0, 1.0], [4.0, 0.0, 1.0]], 1.0, 2.0);
        w.step(1.0);
        assert_eq!(w.position[0], 0.0);
        w.step(2.0);
        assert!((w.position[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn absence_window() {
        let w = Walker::new("d", "D", vec![[0.0; 3]], 1.0, 0.0).with_absence(10.0, Some(20.0));
        assert!(w.is_present(5.0));
        assert!(!w.is_present(15.0));
        assert!(w.is_present(20.0));
    }
}
