//! Scenario definitions.
//!
//! Each scenario is a floor plan (rooms + anchors) and a set of walkers.
//! All scenarios are deterministic given the same seed.

use crate::{
    ranging_sim::{AnchorParams, SimAnchor},
    walker::Walker,
};
use positioning_core::{
    config::{DeviceConfig, Point2, RoomConfig},
    rooms::RoomResolver,
    IpsConfig, Position,
};
use serde::{Deserialize, Serialize};

/// Which pre-defined scenario to load.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// 3 rooms, 4 anchors, 2 walkers
    Apartment,
    /// 6 rooms, 6 anchors, 4 walkers
    House,
    /// Apartment with one device leaving for 30 s and coming back
    Dropout,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub duration: f64, // seconds
    pub sim_dt: f64,   // simulation step (s)
    /// Engine configuration the tracker is built from
    pub config: IpsConfig,
    pub walkers: Vec<Walker>,
    pub anchors: Vec<SimAnchor>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Apartment => Self::apartment(seed),
            ScenarioKind::House => Self::house(seed),
            ScenarioKind::Dropout => Self::dropout(seed),
        }
    }

    /// Room the point actually lies in, with the same rules the tracker uses.
    pub fn true_room(&self, p: &Position) -> String {
        let resolver = RoomResolver::new(self.config.room_list(), self.config.tracker.room_tie_break);
        resolver.resolve(p).unwrap_or_default().to_string()
    }

    // -----------------------------------------------------------------------
    // Apartment: 10 × 8 m, living room on the left, kitchen and bedroom right
    // -----------------------------------------------------------------------
    fn apartment(seed: u64) -> Self {
        let rooms = vec![
            rect("living_room", 0.0, 0.0, 6.0, 8.0),
            rect("kitchen", 6.0, 0.0, 10.0, 4.0),
            rect("bedroom", 6.0, 4.0, 10.0, 8.0),
        ];
        let anchors = vec![
            ("living_room", [0.5, 0.5, 2.2]),
            ("kitchen", [9.5, 0.5, 0.4]),
            ("bedroom", [9.5, 7.5, 2.2]),
            ("hallway", [0.5, 7.5, 0.4]),
        ];
        let walkers = vec![
            Walker::new(
                "phone:alice",
                "Alice's phone",
                vec![[2.0, 2.0, 1.0], [4.5, 6.0, 1.0], [8.0, 6.5, 1.0], [8.0, 2.0, 1.0]],
                0.6,
                6.0,
            ),
            Walker::new(
                "watch:bob",
                "Bob's watch",
                vec![[8.5, 1.5, 1.2], [3.0, 5.0, 1.2]],
                0.4,
                10.0,
            ),
        ];
        Self::assemble("apartment", seed, 120.0, rooms, anchors, walkers)
    }

    // -----------------------------------------------------------------------
    // House: 15 × 10 m, 2 rows of 3 rooms, one anchor per room
    // -----------------------------------------------------------------------
    fn house(seed: u64) -> Self {
        let rooms = vec![
            rect("kitchen", 0.0, 0.0, 5.0, 5.0),
            rect("dining", 5.0, 0.0, 10.0, 5.0),
            rect("living_room", 10.0, 0.0, 15.0, 5.0),
            rect("office", 0.0, 5.0, 5.0, 10.0),
            rect("bedroom", 5.0, 5.0, 10.0, 10.0),
            rect("bathroom", 10.0, 5.0, 15.0, 10.0),
        ];
        let anchors = vec![
            ("kitchen", [0.5, 0.5, 2.3]),
            ("dining", [7.5, 0.5, 0.5]),
            ("living_room", [14.5, 0.5, 2.3]),
            ("office", [0.5, 9.5, 0.5]),
            ("bedroom", [7.5, 9.5, 2.3]),
            ("bathroom", [14.5, 9.5, 0.5]),
        ];
        let walkers = vec![
            Walker::new(
                "phone:alice",
                "Alice's phone",
                vec![[2.5, 2.5, 1.0], [7.5, 2.5, 1.0], [12.5, 2.5, 1.0]],
                0.5,
                8.0,
            ),
            Walker::new(
                "phone:bob",
                "Bob's phone",
                vec![[2.5, 7.5, 1.0], [7.5, 7.5, 1.0], [12.5, 7.5, 1.0]],
                0.5,
                8.0,
            ),
            Walker::new(
                "watch:carol",
                "Carol's watch",
                vec![[12.0, 3.0, 1.2], [12.0, 8.0, 1.2], [7.0, 6.5, 1.2]],
                0.3,
                12.0,
            ),
            Walker::new("tag:keys", "Keys", vec![[3.0, 6.0, 0.9]], 0.0, 0.0),
        ];
        Self::assemble("house", seed, 180.0, rooms, anchors, walkers)
    }

    // -----------------------------------------------------------------------
    // Dropout: the apartment, but Bob leaves at t = 30 s and returns at 60 s
    // -----------------------------------------------------------------------
    fn dropout(seed: u64) -> Self {
        let mut s = Self::apartment(seed);
        s.name = "dropout".into();
        s.duration = 90.0;
        if let Some(bob) = s.walkers.iter_mut().find(|w| w.device_id == "watch:bob") {
            *bob = bob.clone().with_absence(30.0, Some(60.0));
        }
        s
    }

    /// Deliver every anchor's reports up to `max_delay` seconds late, so
    /// they reach the tracker out of order.
    pub fn with_delivery_delay(mut self, max_delay: f64) -> Self {
        for a in &mut self.anchors {
            a.params.max_delay = max_delay;
        }
        self
    }

    fn assemble(
        name: &str,
        seed: u64,
        duration: f64,
        rooms: Vec<RoomConfig>,
        anchors: Vec<(&str, [f64; 3])>,
        walkers: Vec<Walker>,
    ) -> Self {
        let config = IpsConfig {
            devices: walkers
                .iter()
                .map(|w| DeviceConfig {
                    id: w.device_id.clone(),
                    name: w.name.clone(),
                })
                .collect(),
            anchors: anchors.iter().map(|(id, p)| (id.to_string(), *p)).collect(),
            rooms,
            tracker: Default::default(),
            solver: Default::default(),
            topics: Default::default(),
            geo: None,
        };
        let anchors = anchors
            .into_iter()
            .map(|(id, p)| SimAnchor::new(id, p, AnchorParams::default()))
            .collect();
        Self {
            name: name.into(),
            seed,
            duration,
            sim_dt: 0.5,
            config,
            walkers,
            anchors,
        }
    }
}

fn rect(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> RoomConfig {
    RoomConfig {
        name: name.into(),
        points: vec![
            Point2 { x: x0, y: y0 },
            Point2 { x: x1, y: y0 },
            Point2 { x: x1, y: y1 },
            Point2 { x: x0, y: y1 },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configs_validate() {
        for kind in [ScenarioKind::Apartment, ScenarioKind::House, ScenarioKind::Dropout] {
            let s = Scenario::build(kind, 1);
            s.config.validate().unwrap();
            assert_eq!(s.config.devices.len(), s.walkers.len());
            assert_eq!(s.config.anchors.len(), s.anchors.len());
        }
    }

    #[test]
    fn true_room_follows_floor_plan() {
        let s = Scenario::build(ScenarioKind::Apartment, 1);
        assert_eq!(s.true_room(&Position::new(2.0, 2.0, 1.0)), "living_room");
        assert_eq!(s.true_room(&Position::new(8.0, 2.0, 1.0)), "kitchen");
        assert_eq!(s.true_room(&Position::new(8.0, 6.0, 1.0)), "bedroom");
    }

    #[test]
    fn dropout_walker_leaves() {
        let s = Scenario::build(ScenarioKind::Dropout, 1);
        let bob = s.walkers.iter().find(|w| w.device_id == "watch:bob").unwrap();
        assert!(bob.is_present(10.0));
        assert!(!bob.is_present(45.0));
        assert!(bob.is_present(75.0));
    }
}
