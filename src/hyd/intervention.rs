// SPDX-License-Identifier: Apache-2.0
//! Intervention application (§4.3 "Intervention application").

use crate::grid::cell::Cell;
use crate::math::van_genuchten::VanGenuchtenLut;

/// One intervention kind recognized from the external event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionKind {
    /// `K_sat *= 6.0`, LUT rebuilt for the affected cell.
    GravelMulch,
    /// `depression_storage += 0.5 m`.
    Swale,
    /// `retention_capacity += 1.0 m`.
    CheckDam,
    /// Slope clamped to 5 degrees.
    Terracing,
    /// `V += 0.15` (clamped to 1.0), `SOM += 5 kg/m^3`.
    TreePlanting,
}

const GRAVEL_MULCH_MULTIPLIER: f64 = 6.0;
const SWALE_DEPRESSION_STORAGE_M: f64 = 0.5;
const CHECK_DAM_RETENTION_CAPACITY_M: f64 = 1.0;
const TERRACE_SLOPE_DEGREES: f64 = 5.0;
const TREE_PLANTING_VEGETATION_DELTA: f64 = 0.15;
const TREE_PLANTING_SOM_DELTA: f64 = 5.0;

/// Applies `kind` to `cell`, rebuilding its Van-Genuchten LUT in place when
/// the soil parameters change (gravel mulch). Returns the rebuilt LUT when
/// one was needed, so the caller can swap it into its per-cell LUT cache.
pub fn apply_intervention(cell: &mut Cell, kind: InterventionKind) -> Option<VanGenuchtenLut> {
    match kind {
        InterventionKind::GravelMulch => {
            cell.soil.k_sat *= GRAVEL_MULCH_MULTIPLIER;
            cell.k_tensor.k_xx = cell.soil.k_sat;
            cell.k_tensor.k_yy = cell.soil.k_sat;
            Some(VanGenuchtenLut::build(cell.soil))
        }
        InterventionKind::Swale => {
            cell.interventions.depression_storage += SWALE_DEPRESSION_STORAGE_M;
            None
        }
        InterventionKind::CheckDam => {
            cell.interventions.retention_capacity += CHECK_DAM_RETENTION_CAPACITY_M;
            None
        }
        InterventionKind::Terracing => {
            cell.interventions.terraced = true;
            None
        }
        InterventionKind::TreePlanting => {
            cell.vegetation = (cell.vegetation + TREE_PLANTING_VEGETATION_DELTA).min(1.0);
            cell.som += TREE_PLANTING_SOM_DELTA;
            None
        }
    }
}

/// Applies the terracing slope clamp to a raw slope value (degrees),
/// honoring [`TERRACE_SLOPE_DEGREES`] only when the cell is terraced.
#[must_use]
pub fn clamp_slope_if_terraced(cell: &Cell, slope_degrees: f64) -> f64 {
    if cell.interventions.terraced {
        slope_degrees.min(TERRACE_SLOPE_DEGREES)
    } else {
        slope_degrees
    }
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
    fn gravel_mulch_multiplies_k_sat_and_returns_rebuilt_lut() {
        let mut cell = test_cell();
        let k_sat0 = cell.soil.k_sat;
        let lut = apply_intervention(&mut cell, InterventionKind::GravelMulch);
        assert!(lut.is_some());
        assert!((cell.soil.k_sat - k_sat0 * GRAVEL_MULCH_MULTIPLIER).abs() < 1e-15);
    }

    #[test]
    fn swale_and_check_dam_accumulate() {
        let mut cell = test_cell();
        apply_intervention(&mut cell, InterventionKind::Swale);
        apply_intervention(&mut cell, InterventionKind::Swale);
        assert!((cell.interventions.depression_storage - 1.0).abs() < 1e-12);
        apply_intervention(&mut cell, InterventionKind::CheckDam);
        assert!((cell.interventions.retention_capacity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tree_planting_clamps_vegetation_at_one() {
        let mut cell = test_cell();
        cell.vegetation = 0.95;
        apply_intervention(&mut cell, InterventionKind::TreePlanting);
        assert!(cell.vegetation <= 1.0);
        assert!((cell.som - 5.0).abs() < 1e-12);
    }

    #[test]
    fn terracing_clamps_slope() {
        let mut cell = test_cell();
        apply_intervention(&mut cell, InterventionKind::Terracing);
        assert!((clamp_slope_if_terraced(&cell, 12.0) - TERRACE_SLOPE_DEGREES).abs() < 1e-12);
        assert!((clamp_slope_if_terraced(&cell, 2.0) - 2.0).abs() < 1e-12);
    }
}
