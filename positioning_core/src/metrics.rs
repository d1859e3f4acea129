//! Positioning metrics: RMSE, room accuracy, failure counts.

use crate::types::Position;
use serde::{Deserialize, Serialize};

/// Accumulated metric statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PositioningMetrics {
    /// Number of fixes evaluated against ground truth
    pub n_fixes: u64,
    /// Sum of squared 3D position errors (for RMSE)
    pub sum_sq_err: f64,
    /// Sum of squared horizontal errors (for 2D RMSE)
    pub sum_sq_err_2d: f64,
    /// Largest 3D error seen
    pub max_err: f64,
    /// Fixes whose room matched the true room
    pub room_hits: u64,
    /// Solves rejected as degenerate
    pub solve_failures: u64,
    /// Fixes returned without meeting the tolerances
    pub unconverged: u64,
    /// Not-present transitions emitted
    pub not_present_events: u64,
}

impl PositioningMetrics {
    /// Root-mean-square 3D position error (meters).
    pub fn rmse(&self) -> f64 {
        if self.n_fixes == 0 {
            return 0.0;
        }
        (self.sum_sq_err / self.n_fixes as f64).sqrt()
    }

    /// Root-mean-square horizontal error (meters).
    pub fn rmse_2d(&self) -> f64 {
        if self.n_fixes == 0 {
            return 0.0;
        }
        (self.sum_sq_err_2d / self.n_fixes as f64).sqrt()
    }

    /// Fraction of fixes in the correct room.
    pub fn room_accuracy(&self) -> f64 {
        if self.n_fixes == 0 {
            1.0
        } else {
            self.room_hits as f64 / self.n_fixes as f64
        }
    }

    /// Accumulate one fix against ground truth.
    pub fn accumulate(
        &mut self,
        estimate: &Position,
        truth: &Position,
        room: &str,
        true_room: &str,
        converged: bool,
    ) {
        let err = estimate - truth;
        let e2 = err.norm_squared();
        self.n_fixes += 1;
        self.sum_sq_err += e2;
        self.sum_sq_err_2d += err.x * err.x + err.y * err.y;
        self.max_err = self.max_err.max(e2.sqrt());
        if room == true_room {
            self.room_hits += 1;
        }
        if !converged {
            self.unconverged += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rmse_and_accuracy() {
        let mut m = PositioningMetrics::default();
        m.accumulate(&Position::new(3.0, 4.0, 0.0), &Position::zeros(), "a", "a", true);
        m.accumulate(&Position::zeros(), &Position::zeros(), "b", "a", false);
        assert_abs_diff_eq!(m.rmse(), (25.0f64 / 2.0).sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(m.max_err, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.room_accuracy(), 0.5, epsilon = 1e-12);
        assert_eq!(m.unconverged, 1);
    }

    #[test]
    fn empty_metrics_are_neutral() {
        let m = PositioningMetrics::default();
        assert_eq!(m.rmse(), 0.0);
        assert_eq!(m.room_accuracy(), 1.0);
    }
}
