// SPDX-License-Identifier: Apache-2.0
//! Deterministic `sin`/`cos` LUT: 8192 entries spanning `[0, 2*pi)`, linear
//! interpolation, `|error| < 1e-4` (§4.1, P5).
//!
//! No platform transcendental is called inside the simulation loop; table
//! construction (this module's `static` init) uses `f64::sin` once, at
//! startup, which is outside that loop by definition.

use std::f64::consts::{FRAC_PI_2, TAU};
use std::sync::OnceLock;

/// Number of samples spanning a full `2*pi` period.
pub const SIN_TABLE_LEN: usize = 8192;

fn sin_table() -> &'static [f64; SIN_TABLE_LEN] {
    static TABLE: OnceLock<[f64; SIN_TABLE_LEN]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0_f64; SIN_TABLE_LEN];
        for (i, slot) in table.iter_mut().enumerate() {
            let angle = TAU * (i as f64) / (SIN_TABLE_LEN as f64);
            *slot = angle.sin();
        }
        table
    })
}

fn lookup(angle: f64) -> f64 {
    let table = sin_table();
    let n = SIN_TABLE_LEN as f64;
    let wrapped = angle.rem_euclid(TAU);
    let pos = wrapped * n / TAU;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let i0 = pos as usize % SIN_TABLE_LEN;
    let i1 = (i0 + 1) % SIN_TABLE_LEN;
    let frac = pos.fract();
    table[i0] + frac * (table[i1] - table[i0])
}

/// Deterministic sine, accurate to within `1e-4` of `f64::sin` (P5).
#[must_use]
pub fn fxp_sin(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    lookup(angle)
}

/// Deterministic cosine, implemented as a quarter-turn phase shift of sine.
#[must_use]
pub fn fxp_cos(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 1.0;
    }
    lookup(angle + FRAC_PI_2)
}

/// Deterministic `(sin, cos)` pair, sharing one table lookup pass.
#[must_use]
pub fn fxp_sin_cos(angle: f64) -> (f64, f64) {
    (fxp_sin(angle), fxp_cos(angle))
}

/// 256-entry exp LUT spanning `[-4, 4]`; `log` is a deterministic binary
/// search over the same table (§4.1).
pub const EXP_TABLE_LEN: usize = 256;
const EXP_DOMAIN_LO: f64 = -4.0;
const EXP_DOMAIN_HI: f64 = 4.0;

fn exp_table() -> &'static [f64; EXP_TABLE_LEN] {
    static TABLE: OnceLock<[f64; EXP_TABLE_LEN]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0_f64; EXP_TABLE_LEN];
        for (i, slot) in table.iter_mut().enumerate() {
            let t = EXP_DOMAIN_LO
                + (EXP_DOMAIN_HI - EXP_DOMAIN_LO) * (i as f64) / ((EXP_TABLE_LEN - 1) as f64);
            *slot = t.exp();
        }
        table
    })
}

/// Deterministic `exp`, clamped to the `[-4, 4]` LUT domain (saturating
/// outside it, since the barrier potentials never push arguments further).
#[must_use]
pub fn fxp_exp(x: f64) -> f64 {
    let table = exp_table();
    let clamped = x.clamp(EXP_DOMAIN_LO, EXP_DOMAIN_HI);
    let n = (EXP_TABLE_LEN - 1) as f64;
    let pos = (clamped - EXP_DOMAIN_LO) * n / (EXP_DOMAIN_HI - EXP_DOMAIN_LO);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let i0 = (pos as usize).min(EXP_TABLE_LEN - 2);
    let frac = pos - i0 as f64;
    table[i0] + frac * (table[i0 + 1] - table[i0])
}

/// Deterministic `log`, via binary search over [`exp_table`] (the inverse
/// relation `log(exp_table[i]) == domain(i)`).
#[must_use]
pub fn fxp_log(y: f64) -> f64 {
    let table = exp_table();
    if y <= table[0] {
        return EXP_DOMAIN_LO;
    }
    if y >= table[EXP_TABLE_LEN - 1] {
        return EXP_DOMAIN_HI;
    }
    let mut lo = 0usize;
    let mut hi = EXP_TABLE_LEN - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if table[mid] <= y {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let n = (EXP_TABLE_LEN - 1) as f64;
    let span = table[hi] - table[lo];
    let frac = if span.abs() < 1e-300 { 0.0 } else { (y - table[lo]) / span };
    let t = (lo as f64 + frac) / n;
    EXP_DOMAIN_LO + (EXP_DOMAIN_HI - EXP_DOMAIN_LO) * t
}

/// 1024-entry reciprocal LUT for `1/x` over `x in (0, 1]`, used by hot
/// paths that need a fast approximate reciprocal of a normalized divisor.
pub const RECIP_TABLE_LEN: usize = 1024;

fn recip_table() -> &'static [f64; RECIP_TABLE_LEN] {
    static TABLE: OnceLock<[f64; RECIP_TABLE_LEN]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0_f64; RECIP_TABLE_LEN];
        for (i, slot) in table.iter_mut().enumerate() {
            let x = ((i + 1) as f64) / (RECIP_TABLE_LEN as f64);
            *slot = 1.0 / x;
        }
        table
    })
}

/// Deterministic approximate reciprocal for `x in (0, 1]`.
#[must_use]
pub fn fxp_recip_unit(x: f64) -> f64 {
    let table = recip_table();
    let clamped = x.clamp(1.0 / RECIP_TABLE_LEN as f64, 1.0);
    let pos = clamped * RECIP_TABLE_LEN as f64 - 1.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let i0 = (pos.round() as usize).min(RECIP_TABLE_LEN - 1);
    table[i0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sin_matches_reference_within_tolerance() {
        let mut max_err = 0.0_f64;
        let mut x = -10.0_f64;
        while x < 10.0 {
            let err = (fxp_sin(x) - x.sin()).abs();
            max_err = max_err.max(err);
            x += 0.013;
        }
        assert!(max_err < 1e-4, "max sin error {max_err}");
    }

    #[test]
    fn cos_matches_reference_within_tolerance() {
        let mut max_err = 0.0_f64;
        let mut x = -10.0_f64;
        while x < 10.0 {
            let err = (fxp_cos(x) - x.cos()).abs();
            max_err = max_err.max(err);
            x += 0.017;
        }
        assert!(max_err < 1e-4, "max cos error {max_err}");
    }

    #[test]
    fn exp_log_are_approximate_inverses() {
        for i in [-3.5, -1.0, 0.0, 0.5, 2.0, 3.9] {
            let y = fxp_exp(i);
            let back = fxp_log(y);
            assert!((back - i).abs() < 0.05, "{i} -> {y} -> {back}");
        }
    }

    #[test]
    fn nonfinite_inputs_never_propagate() {
        assert_eq!(fxp_sin(f64::NAN), 0.0);
        assert_eq!(fxp_cos(f64::INFINITY), 1.0);
    }
}
