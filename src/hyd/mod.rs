// SPDX-License-Identifier: Apache-2.0
//! HYD: operator-split Richards-Lite hydrology (§4.3).
//!
//! Each tick splits into a vertical implicit stage (per-column Picard
//! iteration, [`column`]) and a horizontal explicit stage (surface-water
//! routing, [`routing`]). [`intervention`] applies the external event
//! stream's modifiers between ticks.

pub mod column;
pub mod intervention;
pub mod routing;

pub use column::{solve_column, ColumnSolverConfig};
pub use intervention::{apply_intervention, InterventionKind};
pub use routing::{d8_steepest_neighbor, d_infinity_split, D8_OFFSETS};

use crate::error::ErrorCounters;
use crate::grid::cell::Cell;
use crate::math::van_genuchten::VanGenuchtenLut;
use routing::NeighborSlope;

/// Lateral routing scheme (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingScheme {
    /// D8 steepest-descent (default).
    D8,
    /// D-infinity triangular-facet splitting.
    DInfinity,
}

/// Drives the vertical + horizontal operator split over a rectangular
/// `nx * ny` active-cell grid. Owns one Van-Genuchten LUT per cell (soil
/// parameters can differ per cell after interventions, so LUTs are not
/// shared).
pub struct HydSolver {
    nx: u32,
    ny: u32,
    luts: Vec<VanGenuchtenLut>,
    config: ColumnSolverConfig,
    routing_scheme: RoutingScheme,
}

impl HydSolver {
    /// Builds a solver for an `nx * ny` grid, one LUT per cell built from
    /// that cell's initial soil parameters.
    #[must_use]
    pub fn new(nx: u32, ny: u32, cells: &[Cell], config: ColumnSolverConfig, routing_scheme: RoutingScheme) -> Self {
        let luts = cells.iter().map(|c| VanGenuchtenLut::build(c.soil)).collect();
        Self { nx, ny, luts, config, routing_scheme }
    }

    /// Rebuilds the LUT for a single cell, e.g. after an intervention
    /// changes its soil parameters.
    pub fn rebuild_lut(&mut self, index: usize, lut: VanGenuchtenLut) {
        self.luts[index] = lut;
    }

    fn neighbor_heads(&self, cells: &[Cell], cx: u32, cy: u32) -> [Option<(f64, f64)>; 8] {
        let mut out: [Option<(f64, f64)>; 8] = [None; 8];
        for (i, &(dx, dy)) in D8_OFFSETS.iter().enumerate() {
            let nx_i = cx as i64 + i64::from(dx);
            let ny_i = cy as i64 + i64::from(dy);
            if nx_i < 0 || ny_i < 0 || nx_i >= i64::from(self.nx) || ny_i >= i64::from(self.ny) {
                continue;
            }
            let idx = (ny_i as u32 * self.nx + nx_i as u32) as usize;
            let neighbor = &cells[idx];
            let head = neighbor.z + neighbor.h_surface;
            let distance = neighbor.dx * if dx != 0 && dy != 0 { std::f64::consts::SQRT_2 } else { 1.0 };
            out[i] = Some((head, distance));
        }
        out
    }

    /// Advances every cell one HYD tick of `dt` seconds (`dt <= 0.0` falls
    /// back to the solver's configured `dt_seconds`, the same "zero means
    /// configured default" idiom used at the kernel layer): vertical
    /// implicit solve first (at start-of-tick surface-water state), then
    /// horizontal explicit routing (§5 ordering: "horizontal transport
    /// observes the state at the start of the tick; the vertical solve
    /// uses end-of-horizontal state" — applied here as
    /// vertical-then-horizontal per the governing operator split of §4.3,
    /// with routing consuming the post-vertical `h_surface`). Returns
    /// per-cell runoff volume (m) leaving the grid boundary this tick, for
    /// mass-conservation accounting.
    pub fn step(&mut self, cells: &mut [Cell], precipitation: &[f64], dt: f64, errors: &mut ErrorCounters) -> Vec<f64> {
        debug_assert_eq!(cells.len(), self.luts.len());
        let n = cells.len();
        let config = ColumnSolverConfig { dt_seconds: if dt > 0.0 { dt } else { self.config.dt_seconds }, ..self.config };

        for i in 0..n {
            let infiltration = precipitation[i];
            let zeta = cells[i].interventions.depression_storage;
            cells[i].precipitation_rate = infiltration;
            solve_column(&mut cells[i], &mut self.luts[i], infiltration, zeta, config, errors);
        }

        let heads: Vec<[Option<(f64, f64)>; 8]> =
            (0..n).map(|i| self.neighbor_heads(cells, (i as u32) % self.nx, (i as u32) / self.nx)).collect();

        let mut outflow = vec![0.0_f64; n];
        let mut runoff = vec![0.0_f64; n];

        for i in 0..n {
            let center_head = cells[i].z + cells[i].h_surface;
            let available = cells[i].h_surface;
            if available <= 0.0 {
                continue;
            }
            match self.routing_scheme {
                RoutingScheme::D8 => {
                    if let Some(NeighborSlope { direction_index, .. }) = d8_steepest_neighbor(center_head, &heads[i]) {
                        let (dx, dy) = D8_OFFSETS[direction_index];
                        let cx = (i as u32) % self.nx;
                        let cy = (i as u32) / self.nx;
                        let nx_i = cx as i64 + i64::from(dx);
                        let ny_i = cy as i64 + i64::from(dy);
                        let moved = available.min(available * 0.5);
                        outflow[i] += moved;
                        if nx_i >= 0 && ny_i >= 0 && nx_i < i64::from(self.nx) && ny_i < i64::from(self.ny) {
                            let target = (ny_i as u32 * self.nx + nx_i as u32) as usize;
                            outflow[target] -= moved;
                        } else {
                            runoff[i] += moved;
                        }
                    }
                }
                RoutingScheme::DInfinity => {
                    if let Some(split) = d_infinity_split(center_head, &heads[i], cells[i].dx) {
                        let moved = available.min(available * 0.5);
                        for (direction_index, fraction) in
                            [(split.first_index, split.first_fraction), (split.second_index, 1.0 - split.first_fraction)]
                        {
                            let (dx, dy) = D8_OFFSETS[direction_index];
                            let cx = (i as u32) % self.nx;
                            let cy = (i as u32) / self.nx;
                            let nx_i = cx as i64 + i64::from(dx);
                            let ny_i = cy as i64 + i64::from(dy);
                            let share = moved * fraction;
                            outflow[i] += share;
                            if nx_i >= 0 && ny_i >= 0 && nx_i < i64::from(self.nx) && ny_i < i64::from(self.ny) {
                                let target = (ny_i as u32 * self.nx + nx_i as u32) as usize;
                                outflow[target] -= share;
                            } else {
                                runoff[i] += share;
                            }
                        }
                    }
                }
            }
        }

        for i in 0..n {
            cells[i].h_surface = (cells[i].h_surface - outflow[i]).max(0.0);
        }

        runoff
    }

    /// Vertical-only stepping for a sparse (unmaterialized-neighbor) grid:
    /// runs the Picard column solve for each active cell indexed by
    /// `active_indices` into the dense `nx * ny` LUT table this solver was
    /// built from, but skips lateral routing since a sparse cell's
    /// neighbors may not be materialized. This is a documented limitation,
    /// not a partial step: a sparse grid only gets the HYD vertical stage
    /// until an adjacency map for unmaterialized neighbors exists.
    pub fn step_sparse(&mut self, active_indices: &[u32], cells: &mut [Cell], precipitation: &[f64], dt: f64, errors: &mut ErrorCounters) {
        let config = ColumnSolverConfig { dt_seconds: if dt > 0.0 { dt } else { self.config.dt_seconds }, ..self.config };
        for (slot, &dense_idx) in active_indices.iter().enumerate() {
            let dense_idx = dense_idx as usize;
            let infiltration = precipitation[dense_idx];
            let zeta = cells[slot].interventions.depression_storage;
            cells[slot].precipitation_rate = infiltration;
            solve_column(&mut cells[slot], &mut self.luts[dense_idx], infiltration, zeta, config, errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::van_genuchten::SoilParams;

    fn flat_grid(nx: u32, ny: u32) -> Vec<Cell> {
        let soil = SoilParams { k_sat: 2.5e-5, theta_r: 0.04, theta_s: 0.42, alpha: 0.5, n: 1.5 };
        (0..nx * ny)
            .map(|i| {
                let x = i % nx;
                let y = i / nx;
                let z = f64::from(ny - 1 - y) * 0.1; // slope toward +y
                Cell::new_uniform([0.1, 0.12, 0.15, 0.2], soil, z, 10.0, 0.25, 0, f64::from(x), f64::from(y))
            })
            .collect()
    }

    #[test]
    fn water_flows_downhill_and_conserves_mass_approximately() {
        let nx = 4;
        let ny = 4;
        let mut cells = flat_grid(nx, ny);
        for c in &mut cells {
            c.h_surface = 1.0;
        }
        let mut solver =
            HydSolver::new(nx, ny, &cells, ColumnSolverConfig { dt_seconds: 1.0, ..ColumnSolverConfig::default() }, RoutingScheme::D8);
        let precip = vec![0.0; (nx * ny) as usize];
        let mut errors = ErrorCounters::default();
        let total_before: f64 = cells.iter().map(|c| c.h_surface).sum();
        let runoff = solver.step(&mut cells, &precip, 1.0, &mut errors);
        let total_after: f64 = cells.iter().map(|c| c.h_surface).sum::<f64>() + runoff.iter().sum::<f64>();
        assert!((total_before - total_after).abs() / total_before < 1e-6);
    }

    #[test]
    fn intervention_lut_rebuild_is_reflected_in_next_step() {
        let nx = 2;
        let ny = 2;
        let mut cells = flat_grid(nx, ny);
        let mut solver =
            HydSolver::new(nx, ny, &cells, ColumnSolverConfig::default(), RoutingScheme::D8);
        if let Some(lut) = apply_intervention(&mut cells[0], InterventionKind::GravelMulch) {
            solver.rebuild_lut(0, lut);
        }
        let precip = vec![0.0; (nx * ny) as usize];
        let mut errors = ErrorCounters::default();
        solver.step(&mut cells, &precip, 0.0, &mut errors);
        assert!(cells[0].k_tensor.k_zz.is_finite());
    }
}
