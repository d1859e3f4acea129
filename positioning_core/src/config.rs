//! Configuration: devices, anchors, rooms and tunables, loaded once from JSON.

use crate::{
    device::DEFAULT_POSITION_HISTORY_LEN,
    error::ConfigError,
    minimize::NelderMeadConfig,
    ranging::{DEFAULT_RANGE_HISTORY_LEN, DEFAULT_RETENTION_WINDOW_S},
    rooms::{Room, RoomTieBreak},
    solver::MIN_ANCHORS,
    types::{AnchorId, Position},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// A device to track.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    pub points: Vec<Point2>,
}

impl RoomConfig {
    pub fn to_room(&self) -> Room {
        Room::new(
            self.name.clone(),
            self.points.iter().map(|p| (p.x, p.y)).collect(),
        )
    }
}

/// Tracker tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Samples older than this are ignored by aggregation (seconds)
    pub retention_window_s: f64,
    /// Silence after which a device is reported not present (seconds)
    pub liveness_timeout_s: f64,
    /// Samples kept per (device, anchor)
    pub range_history_len: usize,
    /// Positions kept per device
    pub position_history_len: usize,
    /// Anchors with a current aggregate required for a fix
    pub min_fixes: usize,
    pub room_tie_break: RoomTieBreak,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            retention_window_s: DEFAULT_RETENTION_WINDOW_S,
            liveness_timeout_s: 5.0,
            range_history_len: DEFAULT_RANGE_HISTORY_LEN,
            position_history_len: DEFAULT_POSITION_HISTORY_LEN,
            min_fixes: MIN_ANCHORS,
            room_tie_break: RoomTieBreak::FirstDeclared,
        }
    }
}

/// Topic layout of the message bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Inbound: `<rooms_channel>/<anchor>` plus `/status` and `/telemetry`
    pub rooms_channel: String,
    /// Outbound position / not-present: `<ips_topic>/<device>`
    pub ips_topic: String,
    /// Outbound geographic location: `<location_topic>/<device>`
    pub location_topic: String,
    /// Outbound room state: `<room_topic>/<device>`
    pub room_topic: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            rooms_channel: "espresense/rooms".into(),
            ips_topic: "espresense/ips".into(),
            location_topic: "espresense/location".into(),
            room_topic: "espresense/ips_room".into(),
        }
    }
}

/// Geographic reference of the floor-plan origin.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GeoReference {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: f64,
}

/// Meters per degree used for the flat-earth offset.
pub const METERS_PER_DEGREE: f64 = 111_111.0;

impl GeoReference {
    /// (latitude, longitude, elevation) of a floor-plan position.
    pub fn locate(&self, p: &Position) -> (f64, f64, f64) {
        (
            self.latitude + p.y / METERS_PER_DEGREE,
            self.longitude + p.x / METERS_PER_DEGREE,
            self.elevation + p.z,
        )
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IpsConfig {
    pub devices: Vec<DeviceConfig>,
    /// Anchor id → [x, y, z]
    pub anchors: BTreeMap<String, [f64; 3]>,
    pub rooms: Vec<RoomConfig>,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub solver: NelderMeadConfig,
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub geo: Option<GeoReference>,
}

impl IpsConfig {
    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: IpsConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Validation(msg));

        let mut ids = HashSet::new();
        for d in &self.devices {
            if d.id.is_empty() {
                return invalid("device with empty id".into());
            }
            if !ids.insert(d.id.as_str()) {
                return invalid(format!("duplicate device id '{}'", d.id));
            }
        }

        let mut anchors = HashSet::new();
        for (id, pos) in &self.anchors {
            if !pos.iter().all(|v| v.is_finite()) {
                return invalid(format!("anchor '{id}' has a non-finite coordinate"));
            }
            if !anchors.insert(AnchorId::new(id)) {
                return invalid(format!("anchor id '{id}' differs from another only by case"));
            }
        }

        if self.rooms.is_empty() {
            return invalid("at least one room is required".into());
        }
        for r in &self.rooms {
            if r.points.len() < 3 {
                return invalid(format!("room '{}' needs at least 3 points", r.name));
            }
            if !r.points.iter().all(|p| p.x.is_finite() && p.y.is_finite()) {
                return invalid(format!("room '{}' has a non-finite point", r.name));
            }
        }

        let t = &self.tracker;
        if !(t.retention_window_s > 0.0) || !(t.liveness_timeout_s > 0.0) {
            return invalid("retention window and liveness timeout must be positive".into());
        }
        if t.range_history_len == 0 || t.position_history_len == 0 {
            return invalid("history lengths must be at least 1".into());
        }
        if t.min_fixes < MIN_ANCHORS {
            return invalid(format!("min_fixes must be at least {MIN_ANCHORS}"));
        }
        Ok(())
    }

    /// Anchor table with lowercased ids.
    pub fn anchor_positions(&self) -> Vec<(AnchorId, Position)> {
        self.anchors
            .iter()
            .map(|(id, p)| (AnchorId::new(id), Position::new(p[0], p[1], p[2])))
            .collect()
    }

    pub fn room_list(&self) -> Vec<Room> {
        self.rooms.iter().map(RoomConfig::to_room).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
