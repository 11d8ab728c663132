// SPDX-License-Identifier: Apache-2.0
//! REG: the vegetation/soil-organic-matter regeneration cascade (§4.4).
//!
//! Invoked every `N = 128` HYD ticks on the time-averaged accumulators.
//! Operates on the surface layer only (`theta[0]`), per the resolution of
//! the Open Question in the design notes: REG's inputs are the
//! [`crate::grid::accum::CellAccumulator`] averages, which already carry
//! only the surface-layer `theta` sample.

use crate::config::RegionParams;
use crate::grid::cell::Cell;

/// HYD ticks between REG invocations (§4.6, locked).
pub const REG_INTERVAL_TICKS: u64 = 128;

/// REGv2 porosity-feedback coefficient (`phi_eff += eta1 * delta_som`).
pub const ETA1_POROSITY_FEEDBACK: f64 = 0.002;

/// REGv2 conductivity-feedback base (`K_zz *= 1.15^delta_som`).
pub const K_ZZ_FEEDBACK_BASE: f64 = 1.15;

/// One REG Euler step on a single cell's `(V, SOM)` pair using the
/// time-averaged accumulator inputs. Returns `delta_som` since the cell's
/// last REG call, for the HYD feedback step.
#[must_use]
pub fn step_vegetation_som(cell: &mut Cell, theta_bar: f64, params: &RegionParams, dt_years: f64) -> f64 {
    let v = cell.vegetation;
    let som = cell.som;

    let logistic = params.r_v * v * (1.0 - v / params.k_v);
    let moisture_surplus = params.lambda1 * (theta_bar - params.theta_star).max(0.0);
    let som_surplus = params.lambda2 * (som - params.som_star).max(0.0);
    let dv_dt = logistic + moisture_surplus + som_surplus;

    let dsom_dt = params.a1 * v - params.a2 * som;

    let som_before = cell.som;
    cell.vegetation = (v + dt_years * dv_dt).clamp(0.0, 1.0);
    cell.som = (som + dt_years * dsom_dt).max(0.0);
    cell.som - som_before
}

/// Applies the end-of-REG feedback into HYD's porosity and conductivity
/// (§4.4 "Feedback into HYD").
pub fn apply_hyd_feedback(cell: &mut Cell, delta_som: f64) {
    cell.phi_eff += ETA1_POROSITY_FEEDBACK * delta_som;
    cell.k_tensor.k_zz *= K_ZZ_FEEDBACK_BASE.powf(delta_som);
}

/// A small deterministic fungal:bacterial SOM-production multiplier table,
/// indexed by a compost-parameter enum (§4.4 REGv2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompostRegime {
    /// No compost amendment; standard fungal:bacterial cap applies.
    None,
    /// Johnson-Su bioreactor compost; higher cap applies.
    JohnsonSu,
}

/// Returns the fungal:bacterial SOM-production multiplier for `regime`,
/// scaled by a fungal dominance fraction `f_fungal` in `[0, 1]`.
#[must_use]
pub fn fungal_bacterial_multiplier(regime: CompostRegime, f_fungal: f64, params: &RegionParams) -> f64 {
    let cap = match regime {
        CompostRegime::None => params.fungal_bacterial_cap,
        CompostRegime::JohnsonSu => params.fungal_bacterial_compost_cap,
    };
    1.0 + f_fungal.clamp(0.0, 1.0) * (cap - 1.0)
}

/// Aggregation/hyphae conductivity enhancement multiplier, a simple
/// monotone function of SOM (REGv2, fine LoD only).
#[must_use]
pub fn aggregation_hyphae_k_multiplier(som: f64, som_reference: f64) -> f64 {
    1.0 + (som / som_reference.max(1e-9)).min(4.0) * 0.1
}

/// Condensation flux: non-rainfall water input, optionally amplified by a
/// rock-mulch factor (REGv2).
#[must_use]
pub fn condensation_flux(params: &RegionParams, rock_mulch_active: bool, biotic_pump_active: bool, vegetation: f64) -> f64 {
    let mut flux = params.condensation_base;
    if rock_mulch_active {
        flux *= params.rock_mulch_factor;
    }
    if biotic_pump_active {
        flux *= 1.0 + params.beta_veg * vegetation;
    }
    flux
}

/// Night-gated hydraulic-lift redistribution: moves moisture from a deep
/// reservoir (`theta_deep`) to the surface layer when `is_night` is true.
/// Returns the amount moved (added to `theta[0]`, subtracted conceptually
/// from the deep reservoir by the caller).
#[must_use]
pub fn hydraulic_lift(params: &RegionParams, theta_deep: f64, theta_surface: f64, is_night: bool) -> f64 {
    if !is_night || theta_deep <= theta_surface {
        return 0.0;
    }
    params.hydraulic_lift_coeff * (theta_deep - theta_surface)
}

/// Breadth-first search over an `nx * ny` grid of cells, 8-connected,
/// gating on `vegetation >= 0.6`, returning the projected area (km^2) of
/// the contiguous component containing `start_index` (§4.4 biotic pump;
/// §4.8 Open-Question resolution: projected, not geodesic, area — see
/// `DESIGN.md`).
#[must_use]
pub fn contiguous_vegetated_area_km2(cells: &[Cell], nx: u32, ny: u32, start_index: usize) -> f64 {
    if cells[start_index].vegetation < 0.6 {
        return 0.0;
    }
    let mut visited = vec![false; cells.len()];
    let mut stack = vec![start_index];
    visited[start_index] = true;
    let mut area_m2 = 0.0_f64;

    const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)];

    while let Some(index) = stack.pop() {
        let dx_cell = cells[index].dx;
        area_m2 += dx_cell * dx_cell;
        let cx = (index as u32) % nx;
        let cy = (index as u32) / nx;
        for &(ox, oy) in &NEIGHBOR_OFFSETS {
            let nx_i = cx as i64 + i64::from(ox);
            let ny_i = cy as i64 + i64::from(oy);
            if nx_i < 0 || ny_i < 0 || nx_i >= i64::from(nx) || ny_i >= i64::from(ny) {
                continue;
            }
            let neighbor_index = (ny_i as u32 * nx + nx_i as u32) as usize;
            if visited[neighbor_index] || cells[neighbor_index].vegetation < 0.6 {
                continue;
            }
            visited[neighbor_index] = true;
            stack.push(neighbor_index);
        }
    }

    area_m2 / 1.0e6
}

/// Whether the biotic pump is currently active for the component
/// containing `start_index` (area over the configured threshold).
#[must_use]
pub fn biotic_pump_active(cells: &[Cell], nx: u32, ny: u32, start_index: usize, params: &RegionParams) -> bool {
    cells[start_index].vegetation > 0.6 && contiguous_vegetated_area_km2(cells, nx, ny, start_index) > params.biotic_pump_area_km2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::van_genuchten::SoilParams;

    fn test_cell(vegetation: f64) -> Cell {
        let soil = SoilParams { k_sat: 2.5e-5, theta_r: 0.04, theta_s: 0.42, alpha: 0.5, n: 1.5 };
        let mut cell = Cell::new_uniform([0.15, 0.15, 0.15, 0.15], soil, 0.0, 1000.0, 0.25, 0, 0.0, 0.0);
        cell.vegetation = vegetation;
        cell.som = 3.0;
        cell
    }

    #[test]
    fn vegetation_grows_toward_carrying_capacity_with_moisture_surplus() {
        let params = RegionParams { theta_star: 0.1, k_v: 1.0, ..RegionParams::default() };
        let mut cell = test_cell(0.2);
        for _ in 0..50 {
            let _ = step_vegetation_som(&mut cell, 0.3, &params, 0.1);
        }
        assert!(cell.vegetation > 0.2);
        assert!(cell.vegetation <= 1.0);
    }

    #[test]
    fn feedback_increases_porosity_and_conductivity_with_positive_delta_som() {
        let mut cell = test_cell(0.5);
        let phi0 = cell.phi_eff;
        let k0 = cell.k_tensor.k_zz;
        apply_hyd_feedback(&mut cell, 2.0);
        assert!(cell.phi_eff > phi0);
        assert!(cell.k_tensor.k_zz > k0);
    }

    #[test]
    fn fungal_bacterial_multiplier_is_capped_by_regime() {
        let params = RegionParams::default();
        let none = fungal_bacterial_multiplier(CompostRegime::None, 1.0, &params);
        let compost = fungal_bacterial_multiplier(CompostRegime::JohnsonSu, 1.0, &params);
        assert!((none - params.fungal_bacterial_cap).abs() < 1e-12);
        assert!((compost - params.fungal_bacterial_compost_cap).abs() < 1e-12);
        assert!(compost > none);
    }

    #[test]
    fn hydraulic_lift_only_moves_water_at_night_and_downhill_of_moisture() {
        let params = RegionParams::default();
        assert_eq!(hydraulic_lift(&params, 0.3, 0.1, false), 0.0);
        assert!(hydraulic_lift(&params, 0.3, 0.1, true) > 0.0);
        assert_eq!(hydraulic_lift(&params, 0.1, 0.3, true), 0.0);
    }

    #[test]
    fn biotic_pump_gates_on_contiguous_area_threshold() {
        let nx = 20;
        let ny = 20;
        let mut cells: Vec<Cell> = (0..nx * ny).map(|_| test_cell(0.7)).collect();
        for c in &mut cells {
            c.dx = 100.0; // 1 ha cells -> 400 cells needed for 4 km^2... use larger spacing
            c.dx = 1000.0; // 1 km^2 per cell; 20x20 = 400 km^2 contiguous block
        }
        let params = RegionParams::default();
        assert!(biotic_pump_active(&cells, nx, ny, 0, &params));

        let mut sparse_cells: Vec<Cell> = (0..nx * ny).map(|_| test_cell(0.1)).collect();
        sparse_cells[0].vegetation = 0.7;
        sparse_cells[0].dx = 1000.0;
        assert!(!biotic_pump_active(&sparse_cells, nx, ny, 0, &params));
    }
}
