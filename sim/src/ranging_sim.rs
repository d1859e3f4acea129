//! Anchor ranging simulator.
//!
//! Generates asynchronous distance reports with:
//! - Per-anchor report period and random phase (staggered anchors)
//! - Uniform distance jitter
//! - Drop probability (lost messages)
//! - Maximum range (anchors cannot hear distant devices)
//! - Optional delivery delay, so reports arrive out of order

use crate::walker::Walker;
use positioning_core::Observation;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Radio behaviour of one anchor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnchorParams {
    /// Average time between reports about one device (s)
    pub period: f64,
    /// Distance jitter half-width (m)
    pub noise: f64,
    /// Probability a report is lost
    pub p_drop: f64,
    /// Devices farther than this are not reported (m)
    pub max_range: f64,
    /// Maximum delivery delay (s)
    pub max_delay: f64,
}

impl Default for AnchorParams {
    fn default() -> Self {
        Self {
            period: 1.0,
            noise: 0.3,
            p_drop: 0.1,
            max_range: 15.0,
            max_delay: 0.0,
        }
    }
}

/// One configured anchor in the simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimAnchor {
    pub id: String,
    pub position: [f64; 3],
    pub params: AnchorParams,
    /// Next scheduled report time
    pub next_report: f64,
}

impl SimAnchor {
    pub fn new(id: impl Into<String>, position: [f64; 3], params: AnchorParams) -> Self {
        Self {
            id: id.into(),
            position,
            params,
            next_report: 0.0,
        }
    }

    /// Check if this anchor should report at the current simulation time.
    pub fn should_report(&self, t: f64) -> bool {
        t >= self.next_report
    }
}

/// Generates distance observations from a set of walkers.
pub struct RangingSimulator {
    pub anchors: Vec<SimAnchor>,
    rng: ChaCha8Rng,
    /// Reports delayed in flight: (delivery time, observation)
    in_flight: Vec<(f64, Observation)>,
}

impl RangingSimulator {
    pub fn new(mut anchors: Vec<SimAnchor>, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for a in &mut anchors {
            a.next_report = rng.gen::<f64>() * a.params.period;
        }
        Self {
            anchors,
            rng,
            in_flight: Vec::new(),
        }
    }

    /// All observations delivered at or before `sim_time`, in delivery order.
    /// Timestamps carry the time the distance was measured.
    pub fn generate(&mut self, walkers: &[Walker], sim_time: f64) -> Vec<Observation> {
        for anchor in &mut self.anchors {
            while anchor.should_report(sim_time) {
                let report_time = anchor.next_report;
                // ±20 % period jitter keeps anchors from locking in phase
                let jitter = 0.8 + 0.4 * self.rng.gen::<f64>();
                anchor.next_report += anchor.params.period * jitter;

                for walker in walkers {
                    if !walker.is_present(report_time) {
                        continue;
                    }
                    if self.rng.gen::<f64>() < anchor.params.p_drop {
                        continue;
                    }
                    let p = walker.position;
                    let a = anchor.position;
                    let range = ((p[0] - a[0]).powi(2) + (p[1] - a[1]).powi(2) + (p[2] - a[2]).powi(2))
                        .sqrt();
                    if range > anchor.params.max_range {
                        continue;
                    }
                    let noisy = range + self.rng.gen::<f64>() * anchor.params.noise * 2.0
                        - anchor.params.noise;
                    let delay = self.rng.gen::<f64>() * anchor.params.max_delay;
                    self.in_flight.push((
                        report_time + delay,
                        Observation::new(walker.device_id.clone(), &anchor.id, noisy.max(0.05), report_time),
                    ));
                }
            }
        }

        let mut delivered: Vec<(f64, Observation)> = Vec::new();
        let mut pending = Vec::with_capacity(self.in_flight.len());
        for (t, obs) in self.in_flight.drain(..) {
            if t <= sim_time {
                delivered.push((t, obs));
            } else {
                pending.push((t, obs));
            }
        }
        self.in_flight = pending;
        delivered.sort_by(|a, b| a.0.total_cmp(&b.0));
        delivered.into_iter().map(|(_, o)| o).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walker_at(p: [f64; 3]) -> Walker {
        Walker::new("dev", "Dev", vec![p], 0.0, 0.0)
    }

    #[test]
    fn reports_are_close_to_true_range() {
        let anchors = vec![SimAnchor::new(
            "a",
            [0.0, 0.0, 0.0],
            AnchorParams {
                p_drop: 0.0,
                noise: 0.2,
                ..Default::default()
            },
        )];
        let mut sim = RangingSimulator::new(anchors, 7);
        let walkers = vec![walker_at([3.0, 4.0, 0.0])];
        let mut all = Vec::new();
        for i in 1..=20 {
            all.extend(sim.generate(&walkers, i as f64));
        }
        assert!(all.len() >= 15);
        assert!(all.iter().all(|o| (o.distance - 5.0).abs() <= 0.2 + 1e-9));
        assert!(all.iter().all(|o| o.anchor_id.as_str() == "a"));
    }

    #[test]
    fn out_of_range_is_silent() {
        let anchors = vec![SimAnchor::new(
            "a",
            [0.0, 0.0, 0.0],
            AnchorParams {
                max_range: 2.0,
                ..Default::default()
            },
        )];
        let mut sim = RangingSimulator::new(anchors, 1);
        let walkers = vec![walker_at([10.0, 0.0, 0.0])];
        for i in 1..=10 {
            assert!(sim.generate(&walkers, i as f64).is_empty());
        }
    }

    #[test]
    fn same_seed_same_reports() {
        let anchors = vec![SimAnchor::new("a", [0.0; 3], AnchorParams::default())];
        let walkers = vec![walker_at([1.0, 1.0, 1.0])];
        let mut s1 = RangingSimulator::new(anchors.clone(), 99);
        let mut s2 = RangingSimulator::new(anchors, 99);
        for i in 1..=10 {
            assert_eq!(s1.generate(&walkers, i as f64), s2.generate(&walkers, i as f64));
        }
    }
}
