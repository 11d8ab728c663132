// SPDX-License-Identifier: Apache-2.0
//! Vertical implicit solve: 1-D Picard iteration over the 4-layer
//! Richards-Lite column, free-drainage lower boundary (§4.3 step 1).

use crate::error::ErrorCounters;
use crate::grid::cell::{Cell, SOIL_LAYERS};
use crate::math::barrier::{interval_barrier_gradient, BARRIER_WEIGHT};
use crate::math::trig::fxp_exp;
use crate::math::van_genuchten::VanGenuchtenLut;

/// Picard-iteration convergence tolerance (max absolute `theta` change
/// between iterations).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSolverConfig {
    /// Convergence tolerance on the per-layer `theta` update.
    pub tolerance: f64,
    /// Maximum Picard iterations per tick before giving up (non-fatal).
    pub max_iterations: u32,
    /// Vertical hydrology time step (seconds); §4.3 default is one hour.
    pub dt_seconds: f64,
}

impl Default for ColumnSolverConfig {
    fn default() -> Self {
        Self { tolerance: 1e-6, max_iterations: 50, dt_seconds: 3600.0 }
    }
}

/// Microtopography fill-and-spill sigmoid: `1 / (1 + exp(-a_c (zeta - zeta_c)))`.
#[must_use]
pub fn microtopography_sigmoid(zeta: f64, zeta_c: f64, a_c: f64) -> f64 {
    1.0 / (1.0 + fxp_exp(-a_c * (zeta - zeta_c)))
}

/// Advances one column's 4-layer `theta` profile one vertical tick using
/// Picard iteration, sampling `K`/`psi` from `lut` and adding a two-sided
/// barrier gradient to keep every layer strictly inside
/// `(theta_r, theta_s)`. Returns whether the iteration converged.
pub fn solve_column(
    cell: &mut Cell,
    lut: &mut VanGenuchtenLut,
    infiltration: f64,
    zeta: f64,
    config: ColumnSolverConfig,
    errors: &mut ErrorCounters,
) -> bool {
    let soil = cell.soil;
    let dz = cell.dz.max(1e-6);
    let theta_old = cell.theta;
    let mut guess = cell.theta;
    let mut converged = false;

    for _ in 0..config.max_iterations {
        let mut k = [0.0_f64; SOIL_LAYERS];
        let mut psi = [0.0_f64; SOIL_LAYERS];
        for l in 0..SOIL_LAYERS {
            let se = effective_saturation(guess[l], soil.theta_r, soil.theta_s);
            k[l] = lut.k(se);
            psi[l] = lut.psi(se);
        }

        let fill_spill = microtopography_sigmoid(zeta, 0.5, 6.0);
        let mut next_guess = guess;
        let mut max_delta = 0.0_f64;

        for l in 0..SOIL_LAYERS {
            let flux_above = if l == 0 {
                infiltration * fill_spill
            } else {
                darcy_flux(k[l - 1], k[l], psi[l - 1], psi[l], dz)
            };
            let flux_below = if l + 1 < SOIL_LAYERS {
                darcy_flux(k[l], k[l + 1], psi[l], psi[l + 1], dz)
            } else {
                // Free-drainage lower boundary: flux equals K at the
                // bottom layer's current saturation.
                k[l]
            };

            let barrier = interval_barrier_gradient(guess[l], soil.theta_r, soil.theta_s, errors) * BARRIER_WEIGHT;
            let dtheta_dt = (flux_above - flux_below) / dz + barrier;
            // Implicit update: the new guess is the tick-start value plus
            // the full-step flux evaluated at the *current* guess, so
            // repeated iterations converge on one self-consistent `dt`
            // step rather than re-integrating `dt` on every sub-iteration.
            let candidate = theta_old[l] + config.dt_seconds * dtheta_dt;
            let clamped_for_stability = candidate.clamp(soil.theta_r * 0.999_9, soil.theta_s * 1.000_1);
            max_delta = max_delta.max((clamped_for_stability - guess[l]).abs());
            next_guess[l] = clamped_for_stability;
        }

        guess = next_guess;
        if max_delta < config.tolerance {
            converged = true;
            break;
        }
    }
    let theta = guess;

    if !converged {
        errors.record_picard_nonconvergence();
    }

    for l in 0..SOIL_LAYERS {
        let se = effective_saturation(theta[l], soil.theta_r, soil.theta_s);
        cell.psi[l] = lut.psi(se);
    }
    cell.theta = theta;
    cell.k_tensor.k_zz = lut.k(effective_saturation(theta[0], soil.theta_r, soil.theta_s));
    converged
}

/// Darcy flux between two adjacent layers using the arithmetic-mean
/// conductivity and the potential gradient `(psi + z)`.
#[must_use]
fn darcy_flux(k_upper: f64, k_lower: f64, psi_upper: f64, psi_lower: f64, dz: f64) -> f64 {
    let k_mean = 0.5 * (k_upper + k_lower);
    k_mean * ((psi_upper - psi_lower) / dz + 1.0)
}

fn effective_saturation(theta: f64, theta_r: f64, theta_s: f64) -> f64 {
    let span = theta_s - theta_r;
    if span <= 0.0 {
        return 0.0;
    }
    ((theta - theta_r) / span).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::van_genuchten::SoilParams;

    fn test_cell() -> Cell {
        let soil = SoilParams { k_sat: 2.5e-5, theta_r: 0.04, theta_s: 0.42, alpha: 0.5, n: 1.5 };
        Cell::new_uniform([0.08, 0.12, 0.15, 0.20], soil, 100.0, 100.0, 0.25, 0, 0.0, 0.0)
    }

    #[test]
    fn column_stays_within_invariant_bounds_under_infiltration() {
        let mut cell = test_cell();
        let mut lut = VanGenuchtenLut::build(cell.soil);
        let mut errors = ErrorCounters::default();
        let config = ColumnSolverConfig { dt_seconds: 60.0, ..ColumnSolverConfig::default() };
        for _ in 0..100 {
            solve_column(&mut cell, &mut lut, 1e-6, 0.0, config, &mut errors);
            for l in 0..SOIL_LAYERS {
                assert!(cell.theta[l] >= cell.soil.theta_r * 0.99);
                assert!(cell.theta[l] <= cell.soil.theta_s * 1.01);
                assert!(cell.theta[l].is_finite());
            }
        }
    }

    #[test]
    fn zero_infiltration_drains_toward_residual() {
        // Wet at the surface, drying with depth: with no further
        // infiltration, free drainage should move water downward and out
        // the bottom boundary, so the surface layer should not gain
        // moisture.
        let soil = SoilParams { k_sat: 2.5e-5, theta_r: 0.04, theta_s: 0.42, alpha: 0.5, n: 1.5 };
        let mut cell = Cell::new_uniform([0.20, 0.15, 0.12, 0.08], soil, 100.0, 100.0, 0.25, 0, 0.0, 0.0);
        let mut lut = VanGenuchtenLut::build(cell.soil);
        let mut errors = ErrorCounters::default();
        let config = ColumnSolverConfig { dt_seconds: 60.0, ..ColumnSolverConfig::default() };
        let theta0 = cell.theta[0];
        for _ in 0..200 {
            solve_column(&mut cell, &mut lut, 0.0, 0.0, config, &mut errors);
        }
        assert!(cell.theta[0] <= theta0, "surface layer should not gain moisture with no infiltration");
    }

    #[test]
    fn fill_and_spill_sigmoid_is_bounded() {
        // The argument saturates against `fxp_exp`'s `[-4, 4]` LUT domain
        // well before `zeta` reaches +-10, so the bound is looser than the
        // std-`exp` version but still strongly saturated.
        assert!(microtopography_sigmoid(-10.0, 0.5, 6.0) < 0.1);
        assert!(microtopography_sigmoid(10.0, 0.5, 6.0) > 0.9);
    }
}
