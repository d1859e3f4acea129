//! Fundamental types used across the entire workspace.

use nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalar types: f64 throughout, same frame as the configured anchor coordinates.
// ---------------------------------------------------------------------------

/// 3D position [x, y, z] in meters.
pub type Position = Vector3<f64>;

/// Generic dynamic-size vector (minimizer parameter space)
pub type DVec = DVector<f64>;

/// Timestamp in seconds. The epoch is chosen by the host (UNIX time when
/// bridging live messages, simulation time in `sim`).
pub type Timestamp = f64;

// ---------------------------------------------------------------------------
// Identifier types: newtype wrappers so IDs are never confused at compile time
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AnchorId {
    /// Anchor ids are matched case-insensitively; they are stored lowercased.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Anchor
// ---------------------------------------------------------------------------

/// Reported liveness of a fixed anchor sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

/// A fixed reference sensor with a known position.
#[derive(Clone, Debug)]
pub struct Anchor {
    pub id: AnchorId,
    /// Immutable after configuration load
    pub position: Position,
    pub status: AnchorStatus,
}

impl Anchor {
    pub fn new(id: AnchorId, position: Position) -> Self {
        Self {
            id,
            position,
            status: AnchorStatus::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Observation: one distance report from one anchor about one device
// ---------------------------------------------------------------------------

/// A single distance reading: "device is approximately `distance` m from anchor".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub device_id: DeviceId,
    pub anchor_id: AnchorId,
    /// Reported distance in meters
    pub distance: f64,
    /// Time the reading was observed
    pub timestamp: Timestamp,
}

impl Observation {
    pub fn new(
        device_id: impl Into<String>,
        anchor_id: impl AsRef<str>,
        distance: f64,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            device_id: DeviceId::new(device_id),
            anchor_id: AnchorId::new(anchor_id),
            distance,
            timestamp,
        }
    }
}

/// Round to two decimals, as published on the wire.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
