//! Scenario execution: simulate to a replay log, then evaluate a log
//! against its ground truth.

use crate::{
    ranging_sim::RangingSimulator,
    replay::{DeviceTruth, GroundTruthFrame, ReplayLog},
    scenarios::Scenario,
};
use positioning_core::{metrics::PositioningMetrics, Position, Tracker};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Outcome of feeding a replay log through the tracker.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Evaluation {
    pub scenario: String,
    pub seed: u64,
    pub observations: usize,
    pub ignored: usize,
    pub reports: usize,
    pub metrics: PositioningMetrics,
    /// Last room reported per device
    pub final_rooms: HashMap<String, String>,
}

/// Step walkers and anchors through the whole scenario.
pub fn simulate(scenario: &Scenario) -> ReplayLog {
    let mut walkers = scenario.walkers.clone();
    let mut ranging = RangingSimulator::new(scenario.anchors.clone(), scenario.seed);
    let dt = scenario.sim_dt;

    let mut observations = Vec::new();
    let mut ground_truth = Vec::new();
    let mut sim_time = 0.0f64;

    while sim_time < scenario.duration {
        for w in &mut walkers {
            w.step(dt);
        }
        sim_time += dt;

        ground_truth.push(GroundTruthFrame {
            time: sim_time,
            devices: walkers
                .iter()
                .filter(|w| w.is_present(sim_time))
                .map(|w| DeviceTruth {
                    id: w.device_id.clone(),
                    position: w.position,
                    room: scenario.true_room(&w.true_position()),
                })
                .collect(),
        });
        observations.extend(ranging.generate(&walkers, sim_time));
    }

    info!(
        scenario = %scenario.name,
        observations = observations.len(),
        frames = ground_truth.len(),
        "simulation complete"
    );
    ReplayLog {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        sim_dt: dt,
        duration: scenario.duration,
        config: scenario.config.clone(),
        observations,
        ground_truth,
    }
}

/// Rebuild the tracker from the log's config and replay it frame by frame:
/// each frame delivers the observations measured up to its time as one
/// batch, then runs a liveness scan.
pub fn evaluate(log: &ReplayLog) -> Evaluation {
    let mut tracker = Tracker::from_config(&log.config);
    let mut eval = Evaluation {
        scenario: log.scenario_name.clone(),
        seed: log.seed,
        observations: log.observations.len(),
        ..Default::default()
    };

    let mut next = 0;
    for frame in &log.ground_truth {
        let start = next;
        while next < log.observations.len() && log.observations[next].timestamp <= frame.time {
            next += 1;
        }
        let out = tracker.observe_batch(&log.observations[start..next]);
        eval.ignored += out.ignored;
        eval.metrics.solve_failures += out.failures.len() as u64;
        eval.reports += out.reports.len();

        for report in &out.reports {
            eval.final_rooms
                .insert(report.device_id.to_string(), report.room.clone());
            let Some(truth) = frame.devices.iter().find(|d| d.id == report.device_id.as_str())
            else {
                continue;
            };
            let p = truth.position;
            eval.metrics.accumulate(
                &report.position,
                &Position::new(p[0], p[1], p[2]),
                &report.room,
                &truth.room,
                report.converged,
            );
        }

        let gone = tracker.scan_liveness(frame.time);
        for g in &gone {
            debug!(device = %g.device_id, at = g.at, "not present");
        }
        eval.metrics.not_present_events += gone.len() as u64;
    }

    info!(
        scenario = %eval.scenario,
        fixes = eval.metrics.n_fixes,
        rmse = eval.metrics.rmse(),
        room_accuracy = eval.metrics.room_accuracy(),
        "evaluation complete"
    );
    eval
}
