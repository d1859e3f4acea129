//! Device state tracker: the orchestrator for one observation.
//!
//! # Processing steps per observation
//! 1. Look up the configured device and anchor (unknown ids are ignored)
//! 2. Mark the anchor Online
//! 3. Append the distance to the (device, anchor) ranging history
//! 4. Collect every anchor with a current aggregate for the device
//! 5. Fewer than `min_fixes` anchors → Tracking, no position
//! 6. Otherwise solve, seeded by the previous fix
//! 7. Push the fix into the position history → Located
//! 8. Resolve the room and return a [`PositionReport`]
//!
//! A degenerate solve leaves the previous fix untouched and surfaces the
//! [`SolveError`] to the caller.

use crate::{
    config::{IpsConfig, TrackerConfig},
    device::{Device, DeviceState, PositionFix},
    error::SolveError,
    liveness::{LivenessMonitor, NotPresentReport},
    minimize::NelderMeadConfig,
    rooms::{Room, RoomResolver},
    solver::MultilaterationSolver,
    types::{Anchor, AnchorId, AnchorStatus, DeviceId, Observation, Position, Timestamp},
};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Anchor registry
// ---------------------------------------------------------------------------

/// Fixed-size table of configured anchors, looked up by id.
#[derive(Clone, Debug, Default)]
pub struct AnchorRegistry {
    anchors: Vec<Anchor>,
    index: HashMap<AnchorId, usize>,
}

impl AnchorRegistry {
    pub fn new(anchors: impl IntoIterator<Item = (AnchorId, Position)>) -> Self {
        let mut registry = Self::default();
        for (id, pos) in anchors {
            if registry.index.contains_key(&id) {
                continue;
            }
            registry.index.insert(id.clone(), registry.anchors.len());
            registry.anchors.push(Anchor::new(id, pos));
        }
        registry
    }

    pub fn get(&self, id: &AnchorId) -> Option<&Anchor> {
        self.index.get(id).map(|&i| &self.anchors[i])
    }

    /// Returns false for an unknown anchor.
    pub fn set_status(&mut self, id: &AnchorId, status: AnchorStatus) -> bool {
        match self.index.get(id) {
            Some(&i) => {
                if self.anchors[i].status != status {
                    debug!(anchor = %id, ?status, "anchor status changed");
                }
                self.anchors[i].status = status;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A new position for a device.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionReport {
    pub device_id: DeviceId,
    pub name: String,
    pub position: Position,
    /// Anchors used in the solve
    pub fixes: usize,
    /// Running total of observations for the device
    pub measurements: u64,
    pub room: String,
    pub at: Timestamp,
    /// False when the minimiser ran out of budget
    pub converged: bool,
}

/// Outcome of [`Tracker::observe_batch`].
#[derive(Clone, Debug, Default)]
pub struct BatchOutput {
    pub reports: Vec<PositionReport>,
    pub failures: Vec<(DeviceId, SolveError)>,
    /// Observations for unknown devices / anchors or with unusable distances
    pub ignored: usize,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Read-only state shared by every per-device update.
struct SolveContext<'a> {
    anchors: &'a AnchorRegistry,
    rooms: &'a RoomResolver,
    solver: &'a MultilaterationSolver,
    min_fixes: usize,
}

/// Owns every configured device, the anchor registry and the room set.
pub struct Tracker {
    pub config: TrackerConfig,
    anchors: AnchorRegistry,
    devices: Vec<Device>,
    device_index: HashMap<DeviceId, usize>,
    rooms: RoomResolver,
    solver: MultilaterationSolver,
    liveness: LivenessMonitor,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        solver_config: NelderMeadConfig,
        devices: impl IntoIterator<Item = (DeviceId, String)>,
        anchors: impl IntoIterator<Item = (AnchorId, Position)>,
        rooms: Vec<Room>,
    ) -> Self {
        let mut device_list = Vec::new();
        let mut device_index = HashMap::new();
        for (id, name) in devices {
            if device_index.contains_key(&id) {
                continue;
            }
            device_index.insert(id.clone(), device_list.len());
            device_list.push(Device::new(
                id,
                name,
                config.range_history_len,
                config.retention_window_s,
                config.position_history_len,
            ));
        }
        let rooms = RoomResolver::new(rooms, config.room_tie_break);
        let liveness = LivenessMonitor::new(config.liveness_timeout_s);
        Self {
            config,
            anchors: AnchorRegistry::new(anchors),
            devices: device_list,
            device_index,
            rooms,
            solver: MultilaterationSolver::nelder_mead(solver_config),
            liveness,
        }
    }

    pub fn from_config(cfg: &IpsConfig) -> Self {
        Self::new(
            cfg.tracker.clone(),
            cfg.solver.clone(),
            cfg.devices
                .iter()
                .map(|d| (DeviceId::new(d.id.clone()), d.name.clone())),
            cfg.anchor_positions(),
            cfg.room_list(),
        )
    }

    /// Process one observation. `Ok(None)` means ignored or not yet locatable.
    pub fn observe(&mut self, obs: &Observation) -> Result<Option<PositionReport>, SolveError> {
        let Some(&di) = self.device_index.get(&obs.device_id) else {
            debug!(device = %obs.device_id, "ignoring unconfigured device");
            return Ok(None);
        };
        if self.anchors.get(&obs.anchor_id).is_none() {
            debug!(anchor = %obs.anchor_id, "ignoring unconfigured anchor");
            return Ok(None);
        }
        if !obs.distance.is_finite() {
            debug!(device = %obs.device_id, distance = obs.distance, "ignoring non-finite distance");
            return Ok(None);
        }

        self.anchors.set_status(&obs.anchor_id, AnchorStatus::Online);
        let ctx = SolveContext {
            anchors: &self.anchors,
            rooms: &self.rooms,
            solver: &self.solver,
            min_fixes: self.config.min_fixes,
        };
        update_device(&mut self.devices[di], &ctx, obs)
    }

    /// Process a batch. Observations are grouped per device and devices are
    /// updated in parallel; each device sees its observations in input order.
    pub fn observe_batch(&mut self, batch: &[Observation]) -> BatchOutput {
        let mut out = BatchOutput::default();
        let mut groups: HashMap<usize, Vec<&Observation>> = HashMap::new();
        let mut touched: Vec<AnchorId> = Vec::new();

        for obs in batch {
            match self.device_index.get(&obs.device_id) {
                Some(&di)
                    if self.anchors.get(&obs.anchor_id).is_some() && obs.distance.is_finite() =>
                {
                    groups.entry(di).or_default().push(obs);
                    touched.push(obs.anchor_id.clone());
                }
                _ => out.ignored += 1,
            }
        }
        for id in &touched {
            self.anchors.set_status(id, AnchorStatus::Online);
        }

        let ctx = SolveContext {
            anchors: &self.anchors,
            rooms: &self.rooms,
            solver: &self.solver,
            min_fixes: self.config.min_fixes,
        };
        let results: Vec<(Vec<PositionReport>, Vec<(DeviceId, SolveError)>)> = self
            .devices
            .par_iter_mut()
            .enumerate()
            .filter_map(|(di, device)| {
                let observations = groups.get(&di)?;
                let mut reports = Vec::new();
                let mut failures = Vec::new();
                for obs in observations {
                    match update_device(device, &ctx, obs) {
                        Ok(Some(r)) => reports.push(r),
                        Ok(None) => {}
                        Err(e) => failures.push((device.id.clone(), e)),
                    }
                }
                Some((reports, failures))
            })
            .collect();

        for (reports, failures) in results {
            out.reports.extend(reports);
            out.failures.extend(failures);
        }
        out
    }

    /// Anchor status event. Returns false for an unknown anchor.
    pub fn mark_online(&mut self, anchor: &AnchorId) -> bool {
        self.anchors.set_status(anchor, AnchorStatus::Online)
    }

    /// Anchor status event. Returns false for an unknown anchor.
    pub fn mark_offline(&mut self, anchor: &AnchorId) -> bool {
        self.anchors.set_status(anchor, AnchorStatus::Offline)
    }

    /// Liveness scan: not-present reports for devices that just went stale.
    pub fn scan_liveness(&mut self, now: Timestamp) -> Vec<NotPresentReport> {
        self.liveness.scan(&mut self.devices, now)
    }

    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.device_index.get(id).map(|&i| &self.devices[i])
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn anchors(&self) -> &AnchorRegistry {
        &self.anchors
    }

    pub fn rooms(&self) -> &RoomResolver {
        &self.rooms
    }
}

/// Record one observation on `device` and solve if enough anchors report it.
fn update_device(
    device: &mut Device,
    ctx: &SolveContext<'_>,
    obs: &Observation,
) -> Result<Option<PositionReport>, SolveError> {
    device.record_range(&obs.anchor_id, obs.distance, obs.timestamp);
    // A late report is folded in at the newest instant already seen, so fixes
    // never go back in time.
    let now = device.last_seen.unwrap_or(obs.timestamp);
    if matches!(device.state, DeviceState::Unseen | DeviceState::Stale) {
        device.state = DeviceState::Tracking;
    }

    let mut positions = Vec::new();
    let mut distances = Vec::new();
    for (anchor_id, d) in device.current_ranges(now) {
        if let Some(anchor) = ctx.anchors.get(anchor_id) {
            positions.push(anchor.position);
            distances.push(d);
        }
    }
    debug!(
        device = %device.id,
        anchor = %obs.anchor_id,
        distance = obs.distance,
        anchors = positions.len(),
        "observation recorded"
    );

    if positions.len() < ctx.min_fixes {
        device.state = DeviceState::Tracking;
        return Ok(None);
    }

    let previous = device.last_fix().map(|f| f.position);
    let solution = ctx
        .solver
        .solve(&positions, &distances, previous.as_ref())
        .map_err(|e| {
            warn!(device = %device.id, error = %e, "solve rejected; keeping previous fix");
            e
        })?;
    if !solution.converged {
        warn!(
            device = %device.id,
            iterations = solution.iterations,
            residual = solution.residual,
            "solver hit its budget; using best point"
        );
    }

    let fixes = positions.len();
    device.push_fix(PositionFix {
        position: solution.position,
        at: now,
        fixes,
    });
    if device.state != DeviceState::Located {
        info!(device = %device.id, fixes, "device located");
    }
    device.state = DeviceState::Located;

    let room = ctx
        .rooms
        .resolve(&solution.position)
        .unwrap_or_default()
        .to_string();
    device.room = Some(room.clone());

    Ok(Some(PositionReport {
        device_id: device.id.clone(),
        name: device.name.clone(),
        position: solution.position,
        fixes,
        measurements: device.measurement_count,
        room,
        at: now,
        converged: solution.converged,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn anchors() -> Vec<(AnchorId, Position)> {
        vec![
            (AnchorId::new("origin"), Position::new(0.0, 0.0, 0.0)),
            (AnchorId::new("east"), Position::new(10.0, 0.0, 0.0)),
            (AnchorId::new("north"), Position::new(0.0, 10.0, 0.0)),
            (AnchorId::new("up"), Position::new(0.0, 0.0, 10.0)),
        ]
    }

    fn rooms() -> Vec<Room> {
        vec![
            Room::new("west", vec![(0.0, 0.0), (5.0, 0.0), (5.0, 10.0), (0.0, 10.0)]),
            Room::new("east", vec![(5.0, 0.0), (10.0, 0.0), (10.0, 10.0), (5.0, 10.0)]),
        ]
    }

    fn tracker() -> Tracker {
        Tracker::new(
            TrackerConfig::default(),
            NelderMeadConfig::default(),
            vec![(DeviceId::new("phone"), "Phone".to_string())],
            anchors(),
            rooms(),
        )
    }

    fn dist(anchor: &str, truth: &Position) -> f64 {
        let pos = anchors()
            .into_iter()
            .find(|(id, _)| id.as_str() == anchor)
            .map(|(_, p)| p)
            .unwrap();
        (pos - truth).norm()
    }

    #[test]
    fn unseen_tracking_located() {
        let mut t = tracker();
        let id = DeviceId::new("phone");
        let truth = Position::new(2.0, 3.0, 1.0);
        assert_eq!(t.device(&id).unwrap().state, DeviceState::Unseen);

        let r = t.observe(&Observation::new("phone", "origin", dist("origin", &truth), 1.0));
        assert_eq!(r, Ok(None));
        assert_eq!(t.device(&id).unwrap().state, DeviceState::Tracking);

        let r = t.observe(&Observation::new("phone", "east", dist("east", &truth), 1.1));
        assert_eq!(r, Ok(None));
        assert_eq!(t.device(&id).unwrap().state, DeviceState::Tracking);

        let report = t
            .observe(&Observation::new("phone", "north", dist("north", &truth), 1.2))
            .unwrap()
            .expect("third anchor yields a fix");
        assert_eq!(t.device(&id).unwrap().state, DeviceState::Located);
        assert_eq!(report.fixes, 3);
        assert_eq!(report.measurements, 3);
        assert_eq!(report.room, "west");
        assert_eq!(t.device(&id).unwrap().position_history.len(), 1);
    }

    #[test]
    fn four_anchors_recover_position() {
        let mut t = tracker();
        let truth = Position::new(2.0, 3.0, 1.0);
        let mut last = None;
        for (i, a) in ["origin", "east", "north", "up"].iter().enumerate() {
            last = t
                .observe(&Observation::new("phone", a, dist(a, &truth), i as f64 * 0.1))
                .unwrap();
        }
        let report = last.unwrap();
        assert_eq!(report.fixes, 4);
        assert_abs_diff_eq!(report.position.x, 2.0, epsilon = 5e-2);
        assert_abs_diff_eq!(report.position.y, 3.0, epsilon = 5e-2);
        assert_abs_diff_eq!(report.position.z, 1.0, epsilon = 5e-2);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut t = tracker();
        assert_eq!(t.observe(&Observation::new("stranger", "origin", 1.0, 0.0)), Ok(None));
        assert_eq!(t.observe(&Observation::new("phone", "garage", 1.0, 0.0)), Ok(None));
        let d = t.device(&DeviceId::new("phone")).unwrap();
        assert_eq!(d.measurement_count, 0);
        assert_eq!(d.state, DeviceState::Unseen);
    }

    #[test]
    fn anchor_ids_match_case_insensitively() {
        let mut t = tracker();
        t.observe(&Observation::new("phone", "ORIGIN", 1.0, 0.0)).unwrap();
        assert_eq!(
            t.anchors().get(&AnchorId::new("origin")).unwrap().status,
            AnchorStatus::Online
        );
    }

    #[test]
    fn degenerate_solve_keeps_previous_fix() {
        let mut t = tracker();
        let truth = Position::new(2.0, 3.0, 1.0);
        for a in ["origin", "east", "north"] {
            t.observe(&Observation::new("phone", a, dist(a, &truth), 0.0)).unwrap();
        }
        let before = *t.device(&DeviceId::new("phone")).unwrap().last_fix().unwrap();

        // A zero range from the fourth anchor makes the solve degenerate
        let err = t.observe(&Observation::new("phone", "up", 0.0, 0.5)).unwrap_err();
        assert!(matches!(err, SolveError::InvalidGeometry(_)));
        let d = t.device(&DeviceId::new("phone")).unwrap();
        assert_eq!(d.position_history.len(), 1);
        assert_eq!(*d.last_fix().unwrap(), before);
        assert_eq!(d.state, DeviceState::Located);
    }

    #[test]
    fn status_events() {
        let mut t = tracker();
        assert!(t.mark_offline(&AnchorId::new("east")));
        assert_eq!(
            t.anchors().get(&AnchorId::new("east")).unwrap().status,
            AnchorStatus::Offline
        );
        assert!(t.mark_online(&AnchorId::new("east")));
        assert!(!t.mark_online(&AnchorId::new("attic")));
    }

    #[test]
    fn stale_then_back_to_located() {
        let mut t = tracker();
        let truth = Position::new(7.0, 2.0, 1.0);
        for a in ["origin", "east", "north"] {
            t.observe(&Observation::new("phone", a, dist(a, &truth), 0.0)).unwrap();
        }
        let gone = t.scan_liveness(6.0);
        assert_eq!(gone.len(), 1);
        assert!(t.scan_liveness(7.0).is_empty());
        let id = DeviceId::new("phone");
        assert_eq!(t.device(&id).unwrap().state, DeviceState::Stale);

        // Old ranges are still inside the retention window, so one fresh
        // observation is enough for a fix.
        let r = t
            .observe(&Observation::new("phone", "up", dist("up", &truth), 8.0))
            .unwrap();
        assert!(r.is_some());
        assert_eq!(t.device(&id).unwrap().state, DeviceState::Located);
        assert_eq!(r.unwrap().room, "east");
    }

    #[test]
    fn late_report_does_not_rewind_position_history() {
        let mut t = tracker();
        let truth = Position::new(2.0, 3.0, 1.0);
        for a in ["origin", "east", "north"] {
            t.observe(&Observation::new("phone", a, dist(a, &truth), 10.0)).unwrap();
        }
        let r = t
            .observe(&Observation::new("phone", "up", dist("up", &truth), 9.0))
            .unwrap()
            .expect("fourth anchor yields a fix");
        assert_eq!(r.at, 10.0);

        let d = t.device(&DeviceId::new("phone")).unwrap();
        let times: Vec<f64> = d.position_history.iter().map(|f| f.at).collect();
        assert!(times.windows(2).all(|w| w[0] >= w[1]), "newest first: {times:?}");
        assert_eq!(d.last_seen, Some(10.0));
        assert_eq!(d.last_fix().unwrap().fixes, 4);
    }

    #[test]
    fn batch_matches_sequential() {
        let truth = Position::new(2.0, 3.0, 1.0);
        let batch: Vec<Observation> = ["origin", "east", "north", "up"]
            .iter()
            .enumerate()
            .map(|(i, a)| Observation::new("phone", a, dist(a, &truth), i as f64 * 0.1))
            .chain(std::iter::once(Observation::new("ghost", "east", 1.0, 0.5)))
            .collect();

        let mut t = tracker();
        let out = t.observe_batch(&batch);
        assert_eq!(out.ignored, 1);
        assert!(out.failures.is_empty());
        assert_eq!(out.reports.len(), 2, "3rd and 4th observations produce fixes");

        let mut seq = tracker();
        let mut last = None;
        for obs in &batch {
            if let Ok(Some(r)) = seq.observe(obs) {
                last = Some(r);
            }
        }
        let a = out.reports.last().unwrap().position;
        let b = last.unwrap().position;
        assert_abs_diff_eq!((a - b).norm(), 0.0, epsilon = 1e-9);
    }
}
