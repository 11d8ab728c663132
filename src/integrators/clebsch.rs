// SPDX-License-Identifier: Apache-2.0
//! Clebsch-collective symplectic step for Lie-Poisson (vorticity)
//! subsystems (§4.5).

use crate::error::ErrorCounters;

/// Bounded-iteration Newton solver configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClebschConfig {
    /// Maximum Newton iterations per step.
    pub max_iter: u32,
    /// Newton-residual convergence tolerance.
    pub tol: f64,
    /// Casimir-drift threshold above which the area-weighted correction
    /// (step iv) is applied.
    pub casimir_drift_threshold: f64,
}

impl Default for ClebschConfig {
    fn default() -> Self {
        Self { max_iter: 20, tol: 1e-10, casimir_drift_threshold: 1e-8 }
    }
}

/// The canonical `(q, p)` pair a Lie-Poisson variable `m` is lifted to via
/// a precomputed linear map (§4.5 step i).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalPair {
    /// Canonical position.
    pub q: f64,
    /// Canonical momentum.
    pub p: f64,
}

/// The precomputed linear Clebsch-lift map: `m -> (q, p)` and back,
/// `J(q, p) -> m`. For a single Lie-Poisson degree of freedom this
/// reduces to `q = sqrt(2|m|)*sign(m)`, `p = sqrt(2|m|)` (the standard
/// angular-momentum Clebsch variables), with the reference generator for
/// richer brackets documented in `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleschLift;

impl CleschLift {
    /// Lifts a scalar Lie-Poisson variable `m` to its canonical pair.
    #[must_use]
    pub fn lift(self, m: f64) -> CanonicalPair {
        let magnitude = (2.0 * m.abs()).sqrt();
        CanonicalPair { q: magnitude * m.signum(), p: magnitude }
    }

    /// Projects a canonical pair back to the Lie-Poisson variable:
    /// `m' = J(q, p) = q * p / 2`.
    #[must_use]
    pub fn project(self, pair: CanonicalPair) -> f64 {
        pair.q * pair.p * 0.5
    }
}

/// A Hamiltonian with the gradient needed for the symplectic
/// velocity-Verlet / implicit midpoint Newton iteration.
pub trait ClebschHamiltonian {
    /// `dH/dq` at the given pair.
    fn dh_dq(&self, pair: CanonicalPair) -> f64;
    /// `dH/dp` at the given pair.
    fn dh_dp(&self, pair: CanonicalPair) -> f64;
}

/// One Clebsch-collective step (§4.5 step ii-iv): lift, symplectic
/// implicit-midpoint step with bounded Newton iteration (falling back to a
/// single Newton step and recording [`ErrorCounters::record_integrator_fallback`]
/// if the budget is exceeded), project back, and apply a small
/// area-weighted correction if the Casimir drift exceeds the configured
/// threshold.
pub fn clebsch_step(m: f64, hamiltonian: &impl ClebschHamiltonian, dt: f64, config: ClebschConfig, errors: &mut ErrorCounters) -> f64 {
    let lift = CleschLift;
    let pair0 = lift.lift(m);
    let casimir0 = pair0.q * pair0.q - pair0.p * pair0.p;

    let mut pair = pair0;
    let mut converged = false;
    for _ in 0..config.max_iter {
        // Implicit midpoint: pair_next = pair + dt * J * grad H(midpoint).
        let mid = CanonicalPair { q: 0.5 * (pair.q + pair0.q), p: 0.5 * (pair.p + pair0.p) };
        let dq = dt * hamiltonian.dh_dp(mid);
        let dp = -dt * hamiltonian.dh_dq(mid);
        let next = CanonicalPair { q: pair0.q + dq, p: pair0.p + dp };
        let residual = ((next.q - pair.q).powi(2) + (next.p - pair.p).powi(2)).sqrt();
        pair = next;
        if residual < config.tol {
            converged = true;
            break;
        }
    }
    if !converged {
        errors.record_newton_nonconvergence();
        errors.record_integrator_fallback();
    }

    let mut m_next = lift.project(pair);

    let casimir1 = pair.q * pair.q - pair.p * pair.p;
    let drift = (casimir1 - casimir0).abs();
    if drift > config.casimir_drift_threshold {
        // Small area-weighted correction pulling the Casimir back toward
        // its initial value (step iv).
        let correction = 0.5 * (casimir0 - casimir1) / pair.p.max(1e-9);
        m_next += correction;
    }

    m_next
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harmonic {
        omega: f64,
    }
    impl ClebschHamiltonian for Harmonic {
        fn dh_dq(&self, pair: CanonicalPair) -> f64 {
            self.omega * pair.q
        }
        fn dh_dp(&self, pair: CanonicalPair) -> f64 {
            pair.p
        }
    }

    #[test]
    fn lift_and_project_round_trip() {
        let lift = CleschLift;
        let pair = lift.lift(3.0);
        assert!((lift.project(pair) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn casimir_drift_stays_bounded_over_many_steps() {
        let hamiltonian = Harmonic { omega: 1.0 };
        let config = ClebschConfig::default();
        let mut errors = ErrorCounters::default();
        let mut m = 1.0_f64;
        let lift = CleschLift;
        let initial_casimir = {
            let p = lift.lift(m);
            p.q * p.q - p.p * p.p
        };
        for _ in 0..2000 {
            m = clebsch_step(m, &hamiltonian, 1e-3, config, &mut errors);
        }
        let final_casimir = {
            let p = lift.lift(m);
            p.q * p.q - p.p * p.p
        };
        assert!((final_casimir - initial_casimir).abs() < 1e-3);
    }
}
