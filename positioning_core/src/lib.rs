//! `positioning_core`: Indoor positioning from noisy anchor distances.
//!
//! # Module layout
//! - [`types`]: IDs, positions, anchors, observations
//! - [`ranging`]: Per (device, anchor) history and recency-weighted aggregate
//! - [`minimize`]: Minimizer trait and Nelder-Mead
//! - [`solver`]: Multilateration (weighted centroid + refinement)
//! - [`device`]: Device struct and lifecycle state
//! - [`tracker`]: Observation orchestrator, anchor registry
//! - [`rooms`]: Point-in-polygon and nearest-room resolution
//! - [`liveness`]: Stale-device detection
//! - [`config`]: JSON configuration
//! - [`messages`]: Inbound / outbound wire codec
//! - [`metrics`]: RMSE and room accuracy
//! - [`error`]: Error types

pub mod config;
pub mod device;
pub mod error;
pub mod liveness;
pub mod messages;
pub mod metrics;
pub mod minimize;
pub mod ranging;
pub mod rooms;
pub mod solver;
pub mod tracker;
pub mod types;

pub use config::IpsConfig;
pub use device::{Device, DeviceState};
pub use error::{ConfigError, MessageError, SolveError};
pub use liveness::NotPresentReport;
pub use tracker::{PositionReport, Tracker};
pub use types::{AnchorId, AnchorStatus, DeviceId, Observation, Position, Timestamp};
