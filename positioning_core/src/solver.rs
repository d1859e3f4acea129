//! Multilateration: the 3D point that best fits a set of anchor distances.
//!
//! # Initial guess
//! - With a previous position, start there (the device has not teleported).
//! - Otherwise a weighted centroid. For l anchors with distances dᵢ and
//!   S = Σ dᵢ:
//!
//!   Wᵢ = (l − 1)·S / (S − dᵢ),   x₀ = Σ Wᵢ·pᵢ
//!
//! # Refinement
//! Minimise the relative residual objective
//!
//!   f(x) = Σᵢ ((‖x − pᵢ‖ − dᵢ) / dᵢ²)²
//!
//! with a derivative-free [`Minimizer`] (Nelder-Mead by default).
//!
//! # Convergence
//! `Solution::converged` only says the simplex shrank below `xatol`; the
//! objective is tiny near any local minimum, so the `fatol` test rarely
//! bites. With few or nearly coplanar anchors the mirror image of the true
//! point is also a local minimum, and a cold solve can settle there with
//! `converged = true`. Judge accuracy by `residual`, not by `converged`.
//!
//! # Degenerate input
//! Non-positive or non-finite distances, non-finite anchor coordinates,
//! coincident anchors and a zero centroid denominator all yield
//! [`SolveError::InvalidGeometry`]; NaN never leaves this module.

use crate::{
    error::SolveError,
    minimize::{Minimizer, NelderMead, NelderMeadConfig},
    types::{DVec, Position},
};

/// Minimum number of anchors for a determined 3D fix.
pub const MIN_ANCHORS: usize = 3;

/// Anchors closer together than this are treated as one point.
const COINCIDENT_EPS: f64 = 1e-9;

/// A refined position with solver diagnostics.
#[derive(Clone, Debug)]
pub struct Solution {
    pub position: Position,
    /// Objective value at `position`
    pub residual: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// False when the minimiser hit its budget; the point is still the best found
    pub converged: bool,
}

/// Multilateration solver, generic over the local minimiser.
#[derive(Clone, Debug)]
pub struct MultilaterationSolver<M: Minimizer = NelderMead> {
    pub minimizer: M,
}

impl Default for MultilaterationSolver<NelderMead> {
    fn default() -> Self {
        Self::new(NelderMead::default())
    }
}

impl MultilaterationSolver<NelderMead> {
    pub fn nelder_mead(config: NelderMeadConfig) -> Self {
        Self::new(NelderMead::new(config))
    }
}

impl<M: Minimizer> MultilaterationSolver<M> {
    pub fn new(minimizer: M) -> Self {
        Self { minimizer }
    }

    /// Solve for the position best matching `distances` to `anchors`.
    /// `previous` seeds the search when known.
    pub fn solve(
        &self,
        anchors: &[Position],
        distances: &[f64],
        previous: Option<&Position>,
    ) -> Result<Solution, SolveError> {
        validate(anchors, distances)?;

        let x0 = match previous {
            Some(p) if p.iter().all(|v| v.is_finite()) => *p,
            _ => weighted_centroid(anchors, distances)?,
        };

        let f = |x: &DVec| objective(&Position::new(x[0], x[1], x[2]), anchors, distances);
        let min = self
            .minimizer
            .minimize(&f, DVec::from_column_slice(x0.as_slice()));

        if min.x.len() != 3 || !min.x.iter().all(|v| v.is_finite()) || !min.value.is_finite() {
            return Err(SolveError::NonFinite);
        }

        Ok(Solution {
            position: Position::new(min.x[0], min.x[1], min.x[2]),
            residual: min.value,
            iterations: min.iterations,
            evaluations: min.evaluations,
            converged: min.converged,
        })
    }
}

/// Σ ((‖x − pᵢ‖ − dᵢ) / dᵢ²)²
pub fn objective(x: &Position, anchors: &[Position], distances: &[f64]) -> f64 {
    anchors
        .iter()
        .zip(distances)
        .map(|(p, &d)| {
            let r = ((x - p).norm() - d) / (d * d);
            r * r
        })
        .sum()
}

/// Closed-form starting point: anchors reporting a smaller distance weigh more.
pub fn weighted_centroid(anchors: &[Position], distances: &[f64]) -> Result<Position, SolveError> {
    let l = anchors.len() as f64;
    let s: f64 = distances.iter().sum();
    let mut x0 = Position::zeros();
    for (p, &d) in anchors.iter().zip(distances) {
        let denom = s - d;
        if denom.abs() < f64::EPSILON || !denom.is_finite() {
            return Err(SolveError::InvalidGeometry("centroid weight denominator is zero"));
        }
        x0 += p * ((l - 1.0) * s / denom);
    }
    if !x0.iter().all(|v| v.is_finite()) {
        return Err(SolveError::InvalidGeometry("centroid is not finite"));
    }
    Ok(x0)
}

fn validate(anchors: &[Position], distances: &[f64]) -> Result<(), SolveError> {
    if anchors.len() != distances.len() {
        return Err(SolveError::LengthMismatch {
            positions: anchors.len(),
            distances: distances.len(),
        });
    }
    if anchors.len() < MIN_ANCHORS {
        return Err(SolveError::TooFewAnchors {
            required: MIN_ANCHORS,
            got: anchors.len(),
        });
    }
    if distances.iter().any(|d| !d.is_finite()) {
        return Err(SolveError::InvalidGeometry("non-finite distance"));
    }
    if distances.iter().any(|&d| d <= 0.0) {
        return Err(SolveError::InvalidGeometry("non-positive distance"));
    }
    if anchors.iter().any(|p| !p.iter().all(|v| v.is_finite())) {
        return Err(SolveError::InvalidGeometry("non-finite anchor coordinate"));
    }
    let first = anchors[0];
    if anchors.iter().all(|p| (p - first).norm() < COINCIDENT_EPS) {
        return Err(SolveError::InvalidGeometry("all anchors coincide"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tetra_anchors() -> Vec<Position> {
        vec![
            Position::new(0.0, 0.0, 0.0),
            Position::new(10.0, 0.0, 0.0),
            Position::new(0.0, 10.0, 0.0),
            Position::new(0.0, 0.0, 10.0),
        ]
    }

    fn exact_distances(anchors: &[Position], truth: &Position) -> Vec<f64> {
        anchors.iter().map(|a| (a - truth).norm()).collect()
    }

    #[test]
    fn exact_distances_recover_truth() {
        let anchors = tetra_anchors();
        let truth = Position::new(2.0, 3.0, 1.0);
        let d = exact_distances(&anchors, &truth);

        let sol = MultilaterationSolver::default().solve(&anchors, &d, None).unwrap();
        assert_abs_diff_eq!(sol.position.x, 2.0, epsilon = 1e-2);
        assert_abs_diff_eq!(sol.position.y, 3.0, epsilon = 1e-2);
        assert_abs_diff_eq!(sol.position.z, 1.0, epsilon = 1e-2);
    }

    #[test]
    fn seeding_does_not_change_the_optimum() {
        let anchors = tetra_anchors();
        let truth = Position::new(2.0, 3.0, 1.0);
        let d = exact_distances(&anchors, &truth);
        let solver = MultilaterationSolver::default();

        let cold = solver.solve(&anchors, &d, None).unwrap();
        let warm = solver.solve(&anchors, &d, Some(&truth)).unwrap();
        assert_abs_diff_eq!(cold.position.x, warm.position.x, epsilon = 1e-2);
        assert_abs_diff_eq!(cold.position.y, warm.position.y, epsilon = 1e-2);
        assert_abs_diff_eq!(cold.position.z, warm.position.z, epsilon = 1e-2);
    }

    #[test]
    fn weighted_centroid_follows_formula() {
        let anchors = vec![
            Position::new(0.0, 0.0, 0.0),
            Position::new(1.0, 0.0, 0.0),
            Position::new(0.0, 1.0, 0.0),
        ];
        let d = [1.0, 2.0, 3.0];
        // S = 6, l - 1 = 2 → W = [12/5, 12/4, 12/3]
        let x0 = weighted_centroid(&anchors, &d).unwrap();
        assert_abs_diff_eq!(x0.x, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x0.y, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x0.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn objective_is_zero_at_truth() {
        let anchors = tetra_anchors();
        let truth = Position::new(4.0, 1.0, 2.0);
        let d = exact_distances(&anchors, &truth);
        assert_abs_diff_eq!(objective(&truth, &anchors, &d), 0.0, epsilon = 1e-20);
        assert!(objective(&Position::new(5.0, 5.0, 5.0), &anchors, &d) > 0.0);
    }

    #[test]
    fn zero_distance_is_invalid_geometry() {
        let anchors = tetra_anchors();
        let d = [0.0, 5.0, 5.0, 5.0];
        let err = MultilaterationSolver::default().solve(&anchors, &d, None).unwrap_err();
        assert!(matches!(err, SolveError::InvalidGeometry(_)));
    }

    #[test]
    fn negative_and_nan_distances_are_rejected() {
        let anchors = tetra_anchors();
        let solver = MultilaterationSolver::default();
        let neg = solver.solve(&anchors, &[-1.0, 5.0, 5.0, 5.0], None);
        assert!(matches!(neg, Err(SolveError::InvalidGeometry(_))));
        let nan = solver.solve(&anchors, &[f64::NAN, 5.0, 5.0, 5.0], None);
        assert!(matches!(nan, Err(SolveError::InvalidGeometry(_))));
    }

    #[test]
    fn too_few_anchors_and_mismatch() {
        let solver = MultilaterationSolver::default();
        let two = [Position::zeros(), Position::new(1.0, 0.0, 0.0)];
        assert!(matches!(
            solver.solve(&two, &[1.0, 1.0], None),
            Err(SolveError::TooFewAnchors { required: 3, got: 2 })
        ));
        assert!(matches!(
            solver.solve(&tetra_anchors(), &[1.0, 1.0, 1.0], None),
            Err(SolveError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn coincident_anchors_are_rejected() {
        let p = Position::new(1.0, 1.0, 1.0);
        let err = MultilaterationSolver::default()
            .solve(&[p, p, p], &[2.0, 2.0, 2.0], None)
            .unwrap_err();
        assert_eq!(err, SolveError::InvalidGeometry("all anchors coincide"));
    }

    #[test]
    fn residual_separates_consistent_from_inconsistent_ranges() {
        let anchors = tetra_anchors();
        let solver = MultilaterationSolver::default();
        let exact = exact_distances(&anchors, &Position::new(2.0, 3.0, 1.0));
        let good = solver.solve(&anchors, &exact, None).unwrap();
        // No point is 5 m from all four anchors
        let bad = solver.solve(&anchors, &[5.0, 5.0, 5.0, 5.0], None).unwrap();
        assert!(good.residual < 1e-5, "residual {}", good.residual);
        assert!(bad.residual > 1e-4, "residual {}", bad.residual);
    }

    #[test]
    fn collinear_anchors_stay_finite() {
        let anchors = vec![
            Position::new(0.0, 0.0, 0.0),
            Position::new(5.0, 0.0, 0.0),
            Position::new(10.0, 0.0, 0.0),
        ];
        let truth = Position::new(4.0, 3.0, 0.0);
        let d = exact_distances(&anchors, &truth);
        let sol = MultilaterationSolver::default().solve(&anchors, &d, None).unwrap();
        assert!(sol.position.iter().all(|v| v.is_finite()));
        assert!(sol.residual.is_finite());
    }
}
