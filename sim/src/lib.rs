//! `sim`: deterministic scenarios of walkers and anchors, replay logs, evaluation.

pub mod ranging_sim;
pub mod replay;
pub mod run;
pub mod scenarios;
pub mod walker;

pub use ranging_sim::{AnchorParams, RangingSimulator, SimAnchor};
pub use replay::{load_replay, save_replay, ReplayLog};
pub use run::{evaluate, simulate, Evaluation};
pub use scenarios::{Scenario, ScenarioKind};
pub use walker::Walker;
