//! Room resolution: which polygon a solved point lies in.
//!
//! # Policy
//! - Containment uses the 2D projection (z ignored) and ray casting, so
//!   non-convex simple polygons are fine.
//! - If several rooms contain the point the tie-break decides
//!   (first declared by default, or smallest area).
//! - If none contains it, the room whose boundary is nearest wins, so a
//!   room is always returned.

use crate::types::Position;
use serde::{Deserialize, Serialize};

/// How to choose between overlapping rooms that all contain a point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomTieBreak {
    #[default]
    FirstDeclared,
    SmallestArea,
}

/// A named 2D room boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct Room {
    pub name: String,
    /// Ordered (x, y) vertices, implicitly closed
    pub polygon: Vec<(f64, f64)>,
}

impl Room {
    pub fn new(name: impl Into<String>, polygon: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.into(),
            polygon,
        }
    }

    /// Ray-casting point-in-polygon test.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let v = &self.polygon;
        if v.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = v.len() - 1;
        for i in 0..v.len() {
            let (xi, yi) = v[i];
            let (xj, yj) = v[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Shortest Euclidean distance from (x, y) to any edge.
    pub fn boundary_distance(&self, x: f64, y: f64) -> f64 {
        let v = &self.polygon;
        match v.len() {
            0 => f64::INFINITY,
            1 => ((x - v[0].0).powi(2) + (y - v[0].1).powi(2)).sqrt(),
            n => (0..n)
                .map(|i| segment_distance((x, y), v[i], v[(i + 1) % n]))
                .fold(f64::INFINITY, f64::min),
        }
    }

    /// Polygon area (shoelace formula).
    pub fn area(&self) -> f64 {
        let v = &self.polygon;
        if v.len() < 3 {
            return 0.0;
        }
        let n = v.len();
        let twice: f64 = (0..n)
            .map(|i| {
                let j = (i + 1) % n;
                v[i].0 * v[j].1 - v[j].0 * v[i].1
            })
            .sum();
        (twice / 2.0).abs()
    }
}

fn segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

/// Maps solved points to room names.
#[derive(Clone, Debug, Default)]
pub struct RoomResolver {
    rooms: Vec<Room>,
    pub tie_break: RoomTieBreak,
}

impl RoomResolver {
    pub fn new(rooms: Vec<Room>, tie_break: RoomTieBreak) -> Self {
        Self { rooms, tie_break }
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// Room containing `point`, else the nearest one. `None` only when no
    /// rooms are configured.
    pub fn resolve(&self, point: &Position) -> Option<&str> {
        let (x, y) = (point.x, point.y);
        let mut containing = self.rooms.iter().filter(|r| r.contains(x, y));

        let hit = match self.tie_break {
            RoomTieBreak::FirstDeclared => containing.next(),
            RoomTieBreak::SmallestArea => {
                containing.min_by(|a, b| a.area().total_cmp(&b.area()))
            }
        };
        hit.or_else(|| {
            self.rooms.iter().min_by(|a, b| {
                a.boundary_distance(x, y)
                    .total_cmp(&b.boundary_distance(x, y))
            })
        })
        .map(|r| r.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square(name: &str, x0: f64, y0: f64, side: f64) -> Room {
        Room::new(
            name,
            vec![(x0, y0), (x0 + side, y0), (x0 + side, y0 + side), (x0, y0 + side)],
        )
    }

    #[test]
    fn point_inside_unit_square() {
        let resolver = RoomResolver::new(vec![square("unit", 0.0, 0.0, 1.0)], Default::default());
        assert_eq!(resolver.resolve(&Position::new(0.5, 0.5, 7.0)), Some("unit"));
    }

    #[test]
    fn outside_point_goes_to_nearest_boundary() {
        let resolver = RoomResolver::new(
            vec![square("far", 0.0, 0.0, 1.0), square("near", 6.0, 6.0, 2.0)],
            Default::default(),
        );
        assert_eq!(resolver.resolve(&Position::new(5.0, 5.0, 0.0)), Some("near"));
    }

    #[test]
    fn non_convex_polygon() {
        // L-shape: notch at the top right
        let l = Room::new(
            "hall",
            vec![(0.0, 0.0), (4.0, 0.0), (4.0, 2.0), (2.0, 2.0), (2.0, 4.0), (0.0, 4.0)],
        );
        assert!(l.contains(1.0, 3.0));
        assert!(l.contains(3.0, 1.0));
        assert!(!l.contains(3.0, 3.0));
        assert_abs_diff_eq!(l.area(), 12.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l.boundary_distance(3.0, 3.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn overlap_tie_break() {
        let rooms = vec![square("floor", 0.0, 0.0, 10.0), square("closet", 1.0, 1.0, 2.0)];
        let p = Position::new(2.0, 2.0, 0.0);

        let first = RoomResolver::new(rooms.clone(), RoomTieBreak::FirstDeclared);
        assert_eq!(first.resolve(&p), Some("floor"));

        let smallest = RoomResolver::new(rooms, RoomTieBreak::SmallestArea);
        assert_eq!(smallest.resolve(&p), Some("closet"));
    }

    #[test]
    fn no_rooms_resolves_to_none() {
        let resolver = RoomResolver::default();
        assert_eq!(resolver.resolve(&Position::zeros()), None);
    }
}
