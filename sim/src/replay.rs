//! Replay: serialize/deserialize simulation logs for offline analysis.

use positioning_core::{IpsConfig, Observation};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A full recorded simulation log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub sim_dt: f64,
    pub duration: f64,
    /// Configuration the tracker is rebuilt from on replay
    pub config: IpsConfig,
    /// All observations in delivery order
    pub observations: Vec<Observation>,
    /// Ground-truth device positions, sampled every `sim_dt`
    pub ground_truth: Vec<GroundTruthFrame>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroundTruthFrame {
    pub time: f64,
    /// Devices present at `time`
    pub devices: Vec<DeviceTruth>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceTruth {
    pub id: String,
    pub position: [f64; 3],
    pub room: String,
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)?;
    log.config.validate()?;
    Ok(log)
}
