//! Wire codec between the tracker and the message bus.
//!
//! # Inbound topics (under `rooms_channel`)
//! - `<rooms_channel>/<anchor>`           JSON `{id, name?, distance, timestamp?}`
//! - `<rooms_channel>/<anchor>/status`    `online` | `offline` | anything else
//! - `<rooms_channel>/<anchor>/telemetry` any payload; triggers a liveness scan
//!
//! # Outbound topics
//! - `<ips_topic>/<device>`      position or not-present
//! - `<room_topic>/<device>`     room state
//! - `<location_topic>/<device>` geographic location (when a reference is set)
//!
//! Decoding never panics; the caller drops anything that returns an error.

use crate::{
    config::{GeoReference, TopicConfig},
    error::MessageError,
    liveness::NotPresentReport,
    tracker::PositionReport,
    types::{round2, AnchorId, AnchorStatus, DeviceId, Observation, Timestamp},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Room name published for a device that is not present.
pub const NOT_HOME: &str = "not_home";

/// A decoded inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Observation(Observation),
    AnchorStatus {
        anchor_id: AnchorId,
        status: AnchorStatus,
    },
    Telemetry {
        anchor_id: AnchorId,
    },
}

/// An encoded outbound message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outbound {
    pub topic: String,
    pub payload: String,
}

#[derive(Debug, Deserialize)]
struct RangePayload {
    id: Option<String>,
    distance: Option<f64>,
    timestamp: Option<f64>,
}

/// Decode one inbound message. `now` stamps observations without a timestamp.
pub fn decode(
    topics: &TopicConfig,
    topic: &str,
    payload: &str,
    now: Timestamp,
) -> Result<Inbound, MessageError> {
    let prefix = topics.rooms_channel.trim_end_matches('/');
    let rest = topic
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(|| MessageError::UnknownTopic(topic.to_string()))?;

    let segments: Vec<&str> = rest.split('/').collect();
    match segments.as_slice() {
        [anchor] if !anchor.is_empty() => decode_range(AnchorId::new(anchor), payload, now),
        [anchor, "status"] if !anchor.is_empty() => Ok(Inbound::AnchorStatus {
            anchor_id: AnchorId::new(anchor),
            status: parse_status(payload),
        }),
        [anchor, "telemetry"] if !anchor.is_empty() => Ok(Inbound::Telemetry {
            anchor_id: AnchorId::new(anchor),
        }),
        _ => Err(MessageError::UnknownTopic(topic.to_string())),
    }
}

fn decode_range(anchor_id: AnchorId, payload: &str, now: Timestamp) -> Result<Inbound, MessageError> {
    let p: RangePayload = serde_json::from_str(payload)
        .map_err(|e| MessageError::MalformedPayload(e.to_string()))?;
    let id = p.id.filter(|s| !s.is_empty()).ok_or(MessageError::MissingField("id"))?;
    let distance = p.distance.ok_or(MessageError::MissingField("distance"))?;
    if !distance.is_finite() || distance < 0.0 {
        return Err(MessageError::InvalidDistance(distance));
    }
    Ok(Inbound::Observation(Observation {
        device_id: DeviceId(id),
        anchor_id,
        distance,
        timestamp: p.timestamp.filter(|t| t.is_finite()).unwrap_or(now),
    }))
}

fn parse_status(payload: &str) -> AnchorStatus {
    match payload.trim().trim_matches('"').to_ascii_lowercase().as_str() {
        "online" => AnchorStatus::Online,
        "offline" => AnchorStatus::Offline,
        _ => AnchorStatus::Unknown,
    }
}

/// Position result plus the room-state companion.
pub fn encode_position(topics: &TopicConfig, report: &PositionReport) -> Vec<Outbound> {
    let id = report.device_id.as_str();
    let position = json!({
        "device_id": id,
        "name": report.name,
        "x": round2(report.position.x),
        "y": round2(report.position.y),
        "z": round2(report.position.z),
        "fixes": report.fixes,
        "measurements": report.measurements,
        "room": report.room,
    });
    let room = json!({
        "device_id": id,
        "room_name": report.room,
    });
    vec![
        Outbound {
            topic: format!("{}/{}", topics.ips_topic, id),
            payload: position.to_string(),
        },
        Outbound {
            topic: format!("{}/{}", topics.room_topic, id),
            payload: room.to_string(),
        },
    ]
}

/// Geographic location of a position result.
pub fn encode_location(
    topics: &TopicConfig,
    geo: &GeoReference,
    report: &PositionReport,
) -> Outbound {
    let (latitude, longitude, elevation) = geo.locate(&report.position);
    let payload = json!({
        "name": report.name,
        "latitude": latitude,
        "longitude": longitude,
        "elevation": elevation,
    });
    Outbound {
        topic: format!("{}/{}", topics.location_topic, report.device_id),
        payload: payload.to_string(),
    }
}

/// Not-present result plus the room-state companion.
pub fn encode_not_present(topics: &TopicConfig, report: &NotPresentReport) -> Vec<Outbound> {
    let id = report.device_id.as_str();
    let position = json!({
        "device_id": id,
        "name": report.name,
        "x": -1,
        "y": -1,
        "z": -1,
        "fixes": 0,
        "measurements": 0,
        "room": NOT_HOME,
    });
    let room = json!({
        "device_id": id,
        "room_name": NOT_HOME,
    });
    vec![
        Outbound {
            topic: format!("{}/{}", topics.ips_topic, id),
            payload: position.to_string(),
        },
        Outbound {
            topic: format!("{}/{}", topics.room_topic, id),
            payload: room.to_string(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
