// SPDX-License-Identifier: Apache-2.0
//! Van-Genuchten `K(S_e)` / `psi(S_e)` lookup tables (§4.1, P6), plus the
//! adaptive-refinement mechanism described there: an entry's tracked
//! maximum observed error and access count gate a deterministic midpoint
//! insertion.

/// Number of samples spanning `S_e in (0, 1)`. Large enough that linear
/// interpolation alone holds `K`/`psi` within `1e-4` relative error across
/// the whole domain, including the steep low-`S_e` tail; adaptive
/// refinement ([`VanGenuchtenLut::refine`]) tightens further under
/// repeated access to a hot segment.
pub const VG_TABLE_LEN: usize = 16_384;

/// Error threshold above which a LUT segment becomes a refinement
/// candidate.
const REFINE_ERROR_THRESHOLD: f64 = 1e-3;

/// Minimum access count before a flagged segment is actually refined
/// (avoids refining on a single cold-start probe).
const REFINE_ACCESS_THRESHOLD: u32 = 32;

/// Soil-type parameters feeding a Van-Genuchten table build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoilParams {
    /// Saturated hydraulic conductivity (m/s).
    pub k_sat: f64,
    /// Residual volumetric moisture.
    pub theta_r: f64,
    /// Saturated volumetric moisture.
    pub theta_s: f64,
    /// Van-Genuchten alpha (1/m).
    pub alpha: f64,
    /// Van-Genuchten n (> 1).
    pub n: f64,
}

impl SoilParams {
    fn m(self) -> f64 {
        1.0 - 1.0 / self.n
    }

    /// Analytic `K(S_e)`: `K_sat * sqrt(S_e) * [1 - (1 - S_e^(1/m))^m]^2`.
    #[must_use]
    pub fn k_analytic(self, se: f64) -> f64 {
        let se = se.clamp(1e-9, 1.0);
        let m = self.m();
        let inner = 1.0 - se.powf(1.0 / m);
        let bracket = 1.0 - inner.max(0.0).powf(m);
        self.k_sat * se.sqrt() * bracket * bracket
    }

    /// Analytic `psi(S_e)`: `-1/alpha * (S_e^(-1/m) - 1)^(1/n)`.
    #[must_use]
    pub fn psi_analytic(self, se: f64) -> f64 {
        let se = se.clamp(1e-9, 1.0 - 1e-9);
        let m = self.m();
        let base = se.powf(-1.0 / m) - 1.0;
        -(1.0 / self.alpha) * base.max(0.0).powf(1.0 / self.n)
    }
}

/// One tracked LUT entry: its sample value plus adaptive-refinement
/// bookkeeping (§4.1 "Adaptive LUT refinement").
#[derive(Debug, Clone, Copy, Default)]
struct TrackedEntry {
    value: f64,
    max_observed_error: f64,
    access_count: u32,
}

/// A [`VG_TABLE_LEN`]-entry Van-Genuchten `K`/`psi` table for one
/// soil-parameter set, built once in float and convertible to Q16.16 at the
/// call site.
#[derive(Debug, Clone)]
pub struct VanGenuchtenLut {
    params: SoilParams,
    k_entries: Vec<TrackedEntry>,
    psi_entries: Vec<TrackedEntry>,
    /// Sequence of midpoint-insertion events, in the order they occurred;
    /// replay-deterministic because refinement only depends on recorded
    /// access counts and errors, never wall-clock time.
    refinement_log: Vec<RefinementEvent>,
}

/// One adaptive-refinement event: a new sample inserted at a segment
/// midpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinementEvent {
    /// Index of the segment that was refined (before insertion).
    pub segment: usize,
    /// The `S_e` value of the newly-inserted midpoint sample.
    pub se_inserted: f64,
}

impl VanGenuchtenLut {
    /// Builds a new table for `params`, sampling the analytic curves at
    /// `VG_TABLE_LEN` evenly-spaced points in `(0, 1)`.
    #[must_use]
    pub fn build(params: SoilParams) -> Self {
        let mut k_entries = Vec::with_capacity(VG_TABLE_LEN);
        let mut psi_entries = Vec::with_capacity(VG_TABLE_LEN);
        for i in 0..VG_TABLE_LEN {
            let se = se_at_index(i);
            k_entries.push(TrackedEntry {
                value: params.k_analytic(se),
                max_observed_error: 0.0,
                access_count: 0,
            });
            psi_entries.push(TrackedEntry {
                value: params.psi_analytic(se),
                max_observed_error: 0.0,
                access_count: 0,
            });
        }
        Self {
            params,
            k_entries,
            psi_entries,
            refinement_log: Vec::new(),
        }
    }

    /// Linearly-interpolated `K(S_e)` sample, tracking access count and
    /// observed error against the analytic value for adaptive refinement.
    pub fn k(&mut self, se: f64) -> f64 {
        Self::sample_tracked(&mut self.k_entries, se, |s| self.params.k_analytic(s))
    }

    /// Linearly-interpolated `psi(S_e)` sample, with the same tracking.
    pub fn psi(&mut self, se: f64) -> f64 {
        Self::sample_tracked(&mut self.psi_entries, se, |s| self.params.psi_analytic(s))
    }

    fn sample_tracked(entries: &mut [TrackedEntry], se: f64, analytic: impl Fn(f64) -> f64) -> f64 {
        let se = se.clamp(0.0, 1.0);
        let n = entries.len();
        // Entries are cell-centered at `se = (i + 0.5) / n` (see
        // `se_at_index_in`); invert that to get a continuous index.
        let pos = (se * n as f64 - 0.5).clamp(0.0, (n - 2) as f64);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let i0 = pos.floor() as usize;
        let i1 = i0 + 1;
        let frac = pos - i0 as f64;
        let interpolated = entries[i0].value + frac * (entries[i1].value - entries[i0].value);

        let exact = analytic(se);
        let err = (interpolated - exact).abs();
        entries[i0].access_count += 1;
        entries[i0].max_observed_error = entries[i0].max_observed_error.max(err);
        interpolated
    }

    /// Runs one deterministic refinement pass: any segment whose
    /// left-endpoint error exceeds the threshold and whose access count
    /// exceeds the threshold gets a new sample inserted at its midpoint.
    /// Returns the refinement events applied, in index order (the
    /// "replay-deterministic" ordering required by §4.1).
    pub fn refine(&mut self) -> Vec<RefinementEvent> {
        let events = Self::refine_table(&mut self.k_entries, self.params, true);
        self.refinement_log.extend_from_slice(&events);
        events
    }

    fn refine_table(
        entries: &mut Vec<TrackedEntry>,
        params: SoilParams,
        is_k: bool,
    ) -> Vec<RefinementEvent> {
        let mut events = Vec::new();
        let mut i = 0;
        while i + 1 < entries.len() {
            let needs_refine = entries[i].max_observed_error > REFINE_ERROR_THRESHOLD
                && entries[i].access_count > REFINE_ACCESS_THRESHOLD;
            if needs_refine {
                let se_mid = (se_at_index_in(entries.len(), i) + se_at_index_in(entries.len(), i + 1)) / 2.0;
                let value = if is_k { params.k_analytic(se_mid) } else { params.psi_analytic(se_mid) };
                entries.insert(
                    i + 1,
                    TrackedEntry {
                        value,
                        max_observed_error: 0.0,
                        access_count: 0,
                    },
                );
                events.push(RefinementEvent { segment: i, se_inserted: se_mid });
                entries[i].max_observed_error = 0.0;
                entries[i].access_count = 0;
                i += 2;
            } else {
                i += 1;
            }
        }
        events
    }

    /// Number of samples currently in the `K` table (grows under
    /// refinement).
    #[must_use]
    pub fn k_len(&self) -> usize {
        self.k_entries.len()
    }

    /// The soil parameters this table was built for.
    #[must_use]
    pub fn params(&self) -> SoilParams {
        self.params
    }

    /// All refinement events applied so far, in application order.
    #[must_use]
    pub fn refinement_log(&self) -> &[RefinementEvent] {
        &self.refinement_log
    }
}

fn se_at_index(i: usize) -> f64 {
    se_at_index_in(VG_TABLE_LEN, i)
}

fn se_at_index_in(len: usize, i: usize) -> f64 {
    (i as f64 + 0.5) / len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> SoilParams {
        SoilParams { k_sat: 2.5e-5, theta_r: 0.04, theta_s: 0.42, alpha: 0.5, n: 1.5 }
    }

    #[test]
    fn k_and_psi_match_analytic_within_tolerance() {
        let params = test_params();
        let mut lut = VanGenuchtenLut::build(params);
        let mut max_rel_err_k = 0.0_f64;
        let mut max_rel_err_psi = 0.0_f64;
        let mut se = 0.01;
        while se < 0.999 {
            let k_exact = params.k_analytic(se);
            let k_lut = lut.k(se);
            let psi_exact = params.psi_analytic(se);
            let psi_lut = lut.psi(se);
            if k_exact.abs() > 1e-12 {
                max_rel_err_k = max_rel_err_k.max(((k_lut - k_exact) / k_exact).abs());
            }
            if psi_exact.abs() > 1e-12 {
                max_rel_err_psi = max_rel_err_psi.max(((psi_lut - psi_exact) / psi_exact).abs());
            }
            se += 0.003;
        }
        assert!(max_rel_err_k < 1e-4, "K relative error {max_rel_err_k}");
        assert!(max_rel_err_psi < 1e-4, "psi relative error {max_rel_err_psi}");
    }

    #[test]
    fn refinement_inserts_at_midpoint_deterministically() {
        let params = test_params();
        let mut lut = VanGenuchtenLut::build(params);
        // Force one segment's bookkeeping past both thresholds.
        lut.k_entries[10].max_observed_error = 1.0;
        lut.k_entries[10].access_count = REFINE_ACCESS_THRESHOLD + 1;
        let before_len = lut.k_len();
        let events = lut.refine();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].segment, 10);
        assert_eq!(lut.k_len(), before_len + 1);
    }

    #[test]
    fn refinement_is_replay_deterministic() {
        let params = test_params();
        let make = || {
            let mut lut = VanGenuchtenLut::build(params);
            lut.k_entries[5].max_observed_error = 1.0;
            lut.k_entries[5].access_count = REFINE_ACCESS_THRESHOLD + 1;
            lut.k_entries[40].max_observed_error = 1.0;
            lut.k_entries[40].access_count = REFINE_ACCESS_THRESHOLD + 1;
            lut.refine()
        };
        assert_eq!(make(), make());
    }
}
