//! Derivative-free local minimisation.
//!
//! # Design choices
//! - The multilateration objective contains Euclidean norms, which are not
//!   smooth at an anchor, so no gradient is required.
//! - The `Minimizer` trait is the only seam the solver sees; any local
//!   optimiser honouring `minimize(objective, x0) -> Minimum` can replace the
//!   Nelder-Mead implementation below.
//!
//! ## Nelder-Mead
//! Standard reflection / expansion / contraction / shrink on an (n+1)-vertex
//! simplex. With `adaptive` the coefficients depend on the dimension n
//! (Gao & Han 2012), which keeps the simplex from collapsing prematurely for
//! n > 2:
//!
//!   ρ = 1,  χ = 1 + 2/n,  ψ = 0.75 − 1/(2n),  σ = 1 − 1/n
//!
//! Termination when both the simplex diameter (∞-norm to the best vertex)
//! is ≤ `xatol` and the objective spread is ≤ `fatol`, or when the
//! iteration / evaluation budget is exhausted.

use crate::types::DVec;
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Relative perturbation of non-zero coordinates for the initial simplex.
const NONZERO_DELTA: f64 = 0.05;
/// Absolute perturbation of zero coordinates for the initial simplex.
const ZERO_DELTA: f64 = 0.00025;
/// Default iteration and evaluation budget per parameter.
const BUDGET_PER_DIM: usize = 200;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Outcome of a local minimisation.
#[derive(Clone, Debug)]
pub struct Minimum {
    /// Best point found
    pub x: DVec,
    /// Objective value at `x`
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    /// True if the tolerances were met before the budget ran out
    pub converged: bool,
}

/// A local minimiser over ℝⁿ.
pub trait Minimizer {
    fn minimize(&self, objective: &dyn Fn(&DVec) -> f64, x0: DVec) -> Minimum;
}

// ---------------------------------------------------------------------------
// Nelder-Mead
// ---------------------------------------------------------------------------

/// Nelder-Mead configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadConfig {
    /// Absolute tolerance on the simplex size
    pub xatol: f64,
    /// Absolute tolerance on the objective spread across the simplex
    pub fatol: f64,
    /// Use dimension-dependent coefficients
    pub adaptive: bool,
    /// Iteration cap; `None` means 200 × dimension. Evaluations share the same cap.
    pub max_iterations: Option<usize>,
    /// Fresh-simplex restarts from the best point after convergence
    pub restarts: usize,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            xatol: 1e-3,
            fatol: 1e-3,
            adaptive: true,
            max_iterations: None,
            restarts: 1,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NelderMead {
    pub config: NelderMeadConfig,
}

struct Coefficients {
    rho: f64,
    chi: f64,
    psi: f64,
    sigma: f64,
}

impl NelderMead {
    pub fn new(config: NelderMeadConfig) -> Self {
        Self { config }
    }

    fn coefficients(&self, dim: usize) -> Coefficients {
        if self.config.adaptive && dim > 0 {
            let n = dim as f64;
            Coefficients {
                rho: 1.0,
                chi: 1.0 + 2.0 / n,
                psi: 0.75 - 1.0 / (2.0 * n),
                sigma: 1.0 - 1.0 / n,
            }
        } else {
            Coefficients {
                rho: 1.0,
                chi: 2.0,
                psi: 0.5,
                sigma: 0.5,
            }
        }
    }

    /// Initial simplex: x0 plus one vertex per axis, perturbed by 5 %
    /// (or a small absolute step for zero coordinates).
    fn initial_simplex(x0: &DVec) -> Vec<DVec> {
        let mut simplex = Vec::with_capacity(x0.len() + 1);
        simplex.push(x0.clone());
        for k in 0..x0.len() {
            let mut v = x0.clone();
            v[k] = if v[k] != 0.0 {
                (1.0 + NONZERO_DELTA) * v[k]
            } else {
                ZERO_DELTA
            };
            simplex.push(v);
        }
        simplex
    }

    /// One full Nelder-Mead run from `x0` with the given remaining budget.
    fn run(
        &self,
        objective: &dyn Fn(&DVec) -> f64,
        x0: DVec,
        max_iter: usize,
        max_eval: usize,
    ) -> Minimum {
        let dim = x0.len();
        let c = self.coefficients(dim);
        let evaluations = Cell::new(0usize);
        let eval = |x: &DVec| {
            evaluations.set(evaluations.get() + 1);
            let v = objective(x);
            // Treat NaN as +∞ so it always loses comparisons
            if v.is_nan() {
                f64::INFINITY
            } else {
                v
            }
        };

        let mut sim = Self::initial_simplex(&x0);
        let mut fsim: Vec<f64> = sim.iter().map(|v| eval(v)).collect();
        sort_simplex(&mut sim, &mut fsim);

        let mut iterations = 1usize;
        let mut converged = false;

        while evaluations.get() < max_eval && iterations < max_iter {
            let x_spread = sim[1..]
                .iter()
                .map(|v| (v - &sim[0]).amax())
                .fold(0.0, f64::max);
            let f_spread = fsim[1..]
                .iter()
                .map(|f| (fsim[0] - f).abs())
                .fold(0.0, f64::max);
            if x_spread <= self.config.xatol && f_spread <= self.config.fatol {
                converged = true;
                break;
            }

            // Centroid of all but the worst vertex
            let mut xbar = DVec::zeros(dim);
            for v in &sim[..dim] {
                xbar += v;
            }
            xbar /= dim as f64;
            let worst = sim[dim].clone();

            let xr = &xbar * (1.0 + c.rho) - &worst * c.rho;
            let fxr = eval(&xr);
            let mut shrink = false;

            if fxr < fsim[0] {
                let xe = &xbar * (1.0 + c.rho * c.chi) - &worst * (c.rho * c.chi);
                let fxe = eval(&xe);
                if fxe < fxr {
                    sim[dim] = xe;
                    fsim[dim] = fxe;
                } else {
                    sim[dim] = xr;
                    fsim[dim] = fxr;
                }
            } else if fxr < fsim[dim - 1] {
                sim[dim] = xr;
                fsim[dim] = fxr;
            } else if fxr < fsim[dim] {
                // Outside contraction
                let xc = &xbar * (1.0 + c.psi * c.rho) - &worst * (c.psi * c.rho);
                let fxc = eval(&xc);
                if fxc <= fxr {
                    sim[dim] = xc;
                    fsim[dim] = fxc;
                } else {
                    shrink = true;
                }
            } else {
                // Inside contraction
                let xcc = &xbar * (1.0 - c.psi) + &worst * c.psi;
                let fxcc = eval(&xcc);
                if fxcc < fsim[dim] {
                    sim[dim] = xcc;
                    fsim[dim] = fxcc;
                } else {
                    shrink = true;
                }
            }

            if shrink {
                let best = sim[0].clone();
                for j in 1..=dim {
                    sim[j] = &best + (&sim[j] - &best) * c.sigma;
                    fsim[j] = eval(&sim[j]);
                }
            }

            iterations += 1;
            sort_simplex(&mut sim, &mut fsim);
        }

        Minimum {
            x: sim.swap_remove(0),
            value: fsim[0],
            iterations,
            evaluations: evaluations.get(),
            converged,
        }
    }
}

impl Minimizer for NelderMead {
    fn minimize(&self, objective: &dyn Fn(&DVec) -> f64, x0: DVec) -> Minimum {
        let budget = self
            .config
            .max_iterations
            .unwrap_or(BUDGET_PER_DIM * x0.len().max(1));

        let mut best = self.run(objective, x0, budget, budget);
        for _ in 0..self.config.restarts {
            let used_iter = best.iterations;
            let used_eval = best.evaluations;
            if used_iter >= budget || used_eval >= budget {
                break;
            }
            let again = self.run(
                objective,
                best.x.clone(),
                budget - used_iter,
                budget - used_eval,
            );
            let moved = (&again.x - &best.x).amax();
            let improved = again.value < best.value;
            let settled = moved <= self.config.xatol
                && (best.value - again.value).abs() <= self.config.fatol;

            let iterations = used_iter + again.iterations;
            let evaluations = used_eval + again.evaluations;
            if improved {
                best = again;
            } else {
                best.converged = best.converged && again.converged;
            }
            best.iterations = iterations;
            best.evaluations = evaluations;
            if settled {
                break;
            }
        }
        best
    }
}

/// Sort vertices by ascending objective value (stable, NaN-free by construction).
fn sort_simplex(sim: &mut Vec<DVec>, fsim: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..fsim.len()).collect();
    order.sort_by(|&a, &b| fsim[a].total_cmp(&fsim[b]));
    *sim = order.iter().map(|&i| sim[i].clone()).collect();
    *fsim = order.iter().map(|&i| fsim[i]).collect();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
