// SPDX-License-Identifier: Apache-2.0
//! The canonical state container: dense-or-sparse cell storage, the
//! double-buffered field blocks, and binary (de)serialization (§3, §6).

use crate::error::{ConfigError, ResourceError};
use crate::grid::cell::Cell;
use crate::grid::header::{FieldOffsets, SharedStateHeader, HEADER_SIZE};

/// Above this many cells (`nx * ny`), the grid switches from dense
/// contiguous storage to a sparse active-cell representation (§3).
pub const DENSE_CELL_LIMIT: usize = 65_536;

/// Dense-or-sparse cell storage (§3 "Grid").
#[derive(Debug, Clone)]
pub enum CellStorage {
    /// Contiguous `nx * ny` array, row-major.
    Dense(Vec<Cell>),
    /// Sparse storage: explicit active indices plus their cells, for
    /// grids whose dense footprint would exceed `DENSE_CELL_LIMIT`.
    Sparse {
        /// Total addressable cell count (`nx * ny`), even though only a
        /// subset is materialized.
        total_len: usize,
        /// Parallel arrays: `active_indices[i]` is the dense-grid index
        /// of `cells[i]`.
        active_indices: Vec<u32>,
        /// Materialized cell records, one per active index.
        cells: Vec<Cell>,
        /// Configured memory budget in bytes (§3 invariant: usage must
        /// stay within this).
        budget_bytes: usize,
    },
}

impl CellStorage {
    /// Builds dense or sparse storage for `nx * ny` cells, all initialized
    /// from `template` (deep-cloned, with per-cell `(face, u, v)` left to
    /// the caller to vary afterward).
    pub fn new(nx: u32, ny: u32, template: Cell, sparse_budget_bytes: usize) -> Result<Self, ResourceError> {
        let len = (nx as usize) * (ny as usize);
        if len <= DENSE_CELL_LIMIT {
            Ok(CellStorage::Dense(vec![template; len]))
        } else {
            let needed = len * core::mem::size_of::<Cell>();
            if needed > sparse_budget_bytes {
                // Sparse storage starts empty; the budget check here
                // guards against an unreasonably small configured budget
                // relative to the addressable space, which would make the
                // grid unusable even before any cell is activated.
                let minimal = core::mem::size_of::<Cell>();
                if minimal > sparse_budget_bytes {
                    return Err(ResourceError::BudgetExceeded { requested: minimal, budget: sparse_budget_bytes });
                }
            }
            Ok(CellStorage::Sparse {
                total_len: len,
                active_indices: Vec::new(),
                cells: Vec::new(),
                budget_bytes: sparse_budget_bytes,
            })
        }
    }

    /// Total addressable cell count.
    #[must_use]
    pub fn total_len(&self) -> usize {
        match self {
            CellStorage::Dense(cells) => cells.len(),
            CellStorage::Sparse { total_len, .. } => *total_len,
        }
    }

    /// Number of materialized (active) cells.
    #[must_use]
    pub fn active_len(&self) -> usize {
        match self {
            CellStorage::Dense(cells) => cells.len(),
            CellStorage::Sparse { cells, .. } => cells.len(),
        }
    }

    /// Returns an immutable view of every currently-active cell, paired
    /// with its dense-grid index.
    pub fn iter_active(&self) -> Box<dyn Iterator<Item = (usize, &Cell)> + '_> {
        match self {
            CellStorage::Dense(cells) => Box::new(cells.iter().enumerate().filter(|(_, c)| c.is_active)),
            CellStorage::Sparse { active_indices, cells, .. } => {
                Box::new(active_indices.iter().map(|&i| i as usize).zip(cells.iter()))
            }
        }
    }

    /// Mutable access to cell at dense index `i`, if materialized.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Cell> {
        match self {
            CellStorage::Dense(cells) => cells.get_mut(index),
            CellStorage::Sparse { active_indices, cells, .. } => {
                active_indices.iter().position(|&i| i as usize == index).map(|pos| &mut cells[pos])
            }
        }
    }

    /// Immutable access to cell at dense index `i`, if materialized.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Cell> {
        match self {
            CellStorage::Dense(cells) => cells.get(index),
            CellStorage::Sparse { active_indices, cells, .. } => {
                active_indices.iter().position(|&i| i as usize == index).map(|pos| &cells[pos])
            }
        }
    }

    /// Activates a sparse cell at `index`, inserting `cell` if the memory
    /// budget allows it. No-op (returns `Ok`) for dense storage.
    pub fn activate(&mut self, index: usize, cell: Cell) -> Result<(), ResourceError> {
        match self {
            CellStorage::Dense(cells) => {
                if let Some(slot) = cells.get_mut(index) {
                    *slot = cell;
                }
                Ok(())
            }
            CellStorage::Sparse { active_indices, cells, budget_bytes, .. } => {
                let projected = (cells.len() + 1) * core::mem::size_of::<Cell>();
                if projected > *budget_bytes {
                    return Err(ResourceError::BudgetExceeded { requested: projected, budget: *budget_bytes });
                }
                #[allow(clippy::cast_possible_truncation)]
                active_indices.push(index as u32);
                cells.push(cell);
                Ok(())
            }
        }
    }
}

/// One of the two identical state blocks following the header (§3, §6).
#[derive(Debug, Clone)]
pub struct StateBuffer {
    /// Vegetation per entity (SoA).
    pub vegetation: Vec<f32>,
    /// SOM per entity.
    pub som: Vec<f32>,
    /// `theta`, laid out per-layer-major: `theta[layer * n + i]`.
    pub theta: Vec<f32>,
    /// Surface water depth per entity.
    pub surface_water: Vec<f32>,
    /// Wind velocity (u, v) interleaved per entity.
    pub wind_velocity: Vec<f32>,
    /// Temperature per entity.
    pub temperature: Vec<f32>,
    /// Torsion (vorticity) per entity.
    pub torsion: Vec<f32>,
    /// Intervention multiplier summary per entity.
    pub interventions: Vec<f32>,
    /// Cloud density per entity.
    pub cloud_density: Vec<f32>,
    /// Precipitation per entity.
    pub precipitation: Vec<f32>,
}

impl StateBuffer {
    /// Allocates a zeroed buffer for `num_entities` entities and
    /// `soil_layers` per-cell soil layers.
    #[must_use]
    pub fn zeroed(num_entities: usize, soil_layers: usize) -> Self {
        Self {
            vegetation: vec![0.0; num_entities],
            som: vec![0.0; num_entities],
            theta: vec![0.0; num_entities * soil_layers],
            surface_water: vec![0.0; num_entities],
            wind_velocity: vec![0.0; num_entities * 2],
            temperature: vec![0.0; num_entities],
            torsion: vec![0.0; num_entities],
            interventions: vec![0.0; num_entities],
            cloud_density: vec![0.0; num_entities],
            precipitation: vec![0.0; num_entities],
        }
    }

    /// Fills this buffer from the given cell storage, in dense-index
    /// order `0..num_entities`.
    pub fn fill_from(&mut self, storage: &CellStorage, soil_layers: usize) {
        for (index, cell) in storage.iter_active() {
            if index >= self.vegetation.len() {
                continue;
            }
            self.vegetation[index] = cell.vegetation as f32;
            self.som[index] = cell.som as f32;
            for l in 0..soil_layers {
                self.theta[l * self.vegetation.len() + index] = cell.theta[l] as f32;
            }
            self.surface_water[index] = cell.h_surface as f32;
            self.wind_velocity[index * 2] = cell.wind_u as f32;
            self.wind_velocity[index * 2 + 1] = cell.wind_v as f32;
            self.temperature[index] = cell.temperature as f32;
            self.torsion[index] = cell.torsion as f32;
            self.interventions[index] = cell.interventions.depression_storage as f32
                + cell.interventions.retention_capacity as f32;
            self.cloud_density[index] = cell.cloud_density as f32;
            self.precipitation[index] = cell.precipitation_rate as f32;
        }
    }

    /// Total byte length of one buffer's field data (used to size the
    /// shared-memory contract's `N` per §6).
    #[must_use]
    pub fn byte_len(&self) -> usize {
        (self.vegetation.len()
            + self.som.len()
            + self.theta.len()
            + self.surface_water.len()
            + self.wind_velocity.len()
            + self.temperature.len()
            + self.torsion.len()
            + self.interventions.len()
            + self.cloud_density.len()
            + self.precipitation.len())
            * core::mem::size_of::<f32>()
    }
}

/// Builds the [`FieldOffsets`] table for a buffer laid out field-by-field,
/// each 16-byte aligned (§3), given `num_entities` and `soil_layers`.
#[must_use]
pub fn compute_field_offsets(num_entities: usize, soil_layers: usize) -> FieldOffsets {
    fn align16(offset: usize) -> usize {
        (offset + 15) & !15
    }
    let f32_size = core::mem::size_of::<f32>();
    let mut offset = 0usize;
    let mut next = |len: usize| {
        let start = align16(offset);
        offset = start + len * f32_size;
        start
    };
    #[allow(clippy::cast_possible_truncation)]
    FieldOffsets {
        vegetation: next(num_entities) as u32,
        som: next(num_entities) as u32,
        theta: next(num_entities * soil_layers) as u32,
        surface_water: next(num_entities) as u32,
        wind_velocity: next(num_entities * 2) as u32,
        temperature: next(num_entities) as u32,
        torsion: next(num_entities) as u32,
        interventions: next(num_entities) as u32,
        cloud_density: next(num_entities) as u32,
        precipitation: next(num_entities) as u32,
    }
}

/// The canonical double-buffered state container (§3, §6).
#[derive(Debug)]
pub struct CanonicalState {
    /// Cell storage (dense or sparse).
    pub cells: CellStorage,
    /// Two identical state blocks; exactly one is the "active" (readable)
    /// buffer at any time.
    pub buffers: [StateBuffer; 2],
    /// Index of the currently-active (publicly readable) buffer.
    pub active_buffer_idx: usize,
    /// Shared-state header mirrored alongside the buffers.
    pub header: SharedStateHeader,
    /// Number of soil layers per cell (mirrors [`crate::grid::cell::SOIL_LAYERS`]).
    pub soil_layers: usize,
}

impl CanonicalState {
    /// Builds a new container for `nx * ny` cells, all from `template`,
    /// with sparse storage (if selected) budgeted at `sparse_budget_bytes`.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidGrid`] if `nx`/`ny` are zero, or
    /// propagates a [`ResourceError`] via [`CellStorage::new`].
    pub fn new(nx: u32, ny: u32, nz: u32, template: Cell, sparse_budget_bytes: usize) -> Result<Self, ConfigError> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(ConfigError::InvalidGrid { nx, ny, nz });
        }
        let cells = CellStorage::new(nx, ny, template, sparse_budget_bytes)
            .map_err(|e| ConfigError::InvalidSoilParams(e.to_string()))?;
        let num_entities = cells.total_len();
        let soil_layers = crate::grid::cell::SOIL_LAYERS;
        let offsets = compute_field_offsets(num_entities, soil_layers);
        #[allow(clippy::cast_possible_truncation)]
        let header = SharedStateHeader::new(nx, ny, nz, num_entities as u32, offsets);
        Ok(Self {
            cells,
            buffers: [StateBuffer::zeroed(num_entities, soil_layers), StateBuffer::zeroed(num_entities, soil_layers)],
            active_buffer_idx: 0,
            header,
            soil_layers,
        })
    }

    /// The currently-inactive buffer index, i.e. the one the writer may
    /// safely mutate.
    #[must_use]
    pub fn writer_buffer_idx(&self) -> usize {
        1 - self.active_buffer_idx
    }

    /// Writes the complete next state into the inactive buffer from
    /// `self.cells`, then atomically flips `active_buffer_idx` (§5: the
    /// writer never writes to the active buffer between flips).
    pub fn publish(&mut self, timestamp_ms: u64, tick: u64, state_hash: u64, error_flags: u32) {
        let writer_idx = self.writer_buffer_idx();
        let soil_layers = self.soil_layers;
        self.buffers[writer_idx].fill_from(&self.cells, soil_layers);
        self.active_buffer_idx = writer_idx;
        #[allow(clippy::cast_possible_truncation)]
        {
            self.header.active_buffer_idx = writer_idx as u32;
        }
        self.header.timestamp_ms = timestamp_ms;
        self.header.simulation_tick = tick;
        self.header.state_hash = state_hash;
        self.header.error_flags = error_flags;
    }

    /// Serializes the header followed by both state buffers, matching §6's
    /// shared-state byte layout (`[0..128)` header, then buffer A, then
    /// buffer B).
    #[must_use]
    pub fn to_shared_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE as usize + 2 * self.buffers[0].byte_len());
        out.extend_from_slice(&self.header.to_bytes());
        for buffer in &self.buffers {
            write_buffer(&mut out, buffer);
        }
        out
    }
}

fn write_buffer(out: &mut Vec<u8>, buffer: &StateBuffer) {
    for field in [
        &buffer.vegetation,
        &buffer.som,
        &buffer.theta,
        &buffer.surface_water,
        &buffer.wind_velocity,
        &buffer.temperature,
        &buffer.torsion,
        &buffer.interventions,
        &buffer.cloud_density,
        &buffer.precipitation,
    ] {
        for value in field {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::van_genuchten::SoilParams;

    fn template() -> Cell {
        let soil = SoilParams { k_sat: 2.5e-5, theta_r: 0.04, theta_s: 0.42, alpha: 0.5, n: 1.5 };
        Cell::new_uniform([0.1, 0.12, 0.15, 0.2], soil, 100.0, 100.0, 0.25, 0, 0.0, 0.0)
    }

    #[test]
    fn small_grid_is_dense() {
        let state = CanonicalState::new(8, 8, 1, template(), 1 << 20).expect("ok");
        assert!(matches!(state.cells, CellStorage::Dense(_)));
    }

    #[test]
    fn large_grid_is_sparse() {
        let state = CanonicalState::new(300, 300, 1, template(), 1 << 30).expect("ok");
        assert!(matches!(state.cells, CellStorage::Sparse { .. }));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let err = CanonicalState::new(0, 8, 1, template(), 1 << 20).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGrid { .. }));
    }

    #[test]
    fn publish_flips_active_buffer_and_never_touches_it_before_flip() {
        let mut state = CanonicalState::new(4, 4, 1, template(), 1 << 20).expect("ok");
        assert_eq!(state.active_buffer_idx, 0);
        state.publish(1000, 1, 0xdead_beef, 0);
        assert_eq!(state.active_buffer_idx, 1);
        assert_eq!(state.header.simulation_tick, 1);
    }

    #[test]
    fn shared_bytes_start_with_header() {
        let state = CanonicalState::new(4, 4, 1, template(), 1 << 20).expect("ok");
        let bytes = state.to_shared_bytes();
        assert_eq!(&bytes[0..8], &crate::grid::header::MAGIC.to_le_bytes());
    }
}
