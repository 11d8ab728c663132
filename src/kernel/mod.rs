// SPDX-License-Identifier: Apache-2.0
//! The public kernel interface (§4.8), implemented as a safe Rust API
//! rather than a C ABI (see `SPEC_FULL.md` §4.8).

use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

use crate::config::KernelConfig;
use crate::error::{ErrorCounters, ErrorFlags, InterfaceError, IntegrityError, KernelError};
use crate::grid::cell::Cell;
use crate::grid::header::{HEADER_SIZE, MAGIC};
use crate::grid::state::{CanonicalState, CellStorage};
use crate::hyd::{ColumnSolverConfig, HydSolver, InterventionKind, RoutingScheme};
use crate::math::van_genuchten::SoilParams;
use crate::scheduler::Scheduler;

/// Outcome of one [`NegentopKernel::step`] call (§7 propagation policy:
/// numerical errors never fail a step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step completed with no new numerical error-counter increments.
    Ok,
    /// An integrator fell back to a cheaper method this step.
    IntegratorFallback,
    /// A non-fatal numerical condition was recorded (Picard/Newton
    /// non-convergence, barrier saturation, overflow, or div-by-zero).
    NonFatalNumeric,
}

/// The top-level, safe-Rust kernel handle (§4.8). Owns all kernel-private
/// state: the grid, the scheduler, the RNG, and the error counters.
pub struct NegentopKernel {
    config: KernelConfig,
    state: CanonicalState,
    scheduler: Scheduler,
    errors: ErrorCounters,
    precipitation: Vec<f64>,
}

const DEFAULT_SOIL: SoilParams = SoilParams { k_sat: 2.5e-5, theta_r: 0.04, theta_s: 0.42, alpha: 0.5, n: 1.5 };

impl NegentopKernel {
    /// Creates a new kernel handle from a validated configuration
    /// (§4.8 `create`).
    ///
    /// # Errors
    /// Returns [`KernelError::Config`] if `config` fails validation, or
    /// [`KernelError::Resource`] if the sparse-grid memory budget cannot
    /// accommodate even the minimal allocation.
    pub fn create(config: KernelConfig) -> Result<Self, KernelError> {
        config.validate()?;

        let template = Cell::new_uniform([0.08, 0.12, 0.15, 0.20], DEFAULT_SOIL, 0.0, 10.0, 0.25, 0, 0.0, 0.0);
        let state = CanonicalState::new(config.grid_nx, config.grid_ny, config.grid_nz, template, config.sparse_budget_bytes)?;

        let num_entities = state.cells.total_len();
        let cells_snapshot = dense_cells_snapshot(&state.cells, template, num_entities);
        let hyd = HydSolver::new(
            config.grid_nx,
            config.grid_ny,
            &cells_snapshot,
            ColumnSolverConfig { dt_seconds: if config.dt > 0.0 { config.dt } else { 3600.0 }, ..ColumnSolverConfig::default() },
            RoutingScheme::D8,
        );
        let scheduler = Scheduler::new(hyd, config.grid_nx, config.grid_ny, config.region, config.enable_atmosphere, config.integrator_type);

        debug!(nx = config.grid_nx, ny = config.grid_ny, num_entities, "kernel created");

        Ok(Self { config, state, scheduler, errors: ErrorCounters::default(), precipitation: vec![0.0; num_entities] })
    }

    /// Replaces the precipitation forcing field driving HYD (§4.3, §4.8).
    /// `values.len()` must equal the number of entities this kernel was
    /// created with.
    ///
    /// # Errors
    /// Returns [`KernelError::Interface`] if `values.len()` does not match.
    pub fn set_precipitation(&mut self, values: &[f64]) -> Result<(), KernelError> {
        if values.len() != self.precipitation.len() {
            return Err(InterfaceError::BufferTooSmall { needed: self.precipitation.len(), available: values.len() }.into());
        }
        self.precipitation.copy_from_slice(values);
        Ok(())
    }

    /// Advances the simulation by `dt` seconds (or the configured default
    /// `dt` if `dt == 0.0`), running HYD every tick and REG every
    /// `N = 128` ticks (§4.6). Never returns an `Err` for numerical
    /// conditions — see [`StepOutcome`].
    pub fn step(&mut self, dt: f64) -> StepOutcome {
        let effective_dt = if dt > 0.0 { dt } else { self.config.dt };

        let errors_before = self.errors.snapshot();
        let runoff_before_fallback = errors_before.integrator_fallback;

        let stepped = match &mut self.state.cells {
            CellStorage::Dense(cells) => {
                self.scheduler.advance(cells, &self.precipitation, effective_dt, &mut self.errors);
                true
            }
            CellStorage::Sparse { .. } => self.step_sparse_cells(effective_dt),
        };

        if !stepped {
            trace!("step: sparse grid has no active cells");
            return StepOutcome::NonFatalNumeric;
        }

        let hash = self.state_hash_current();
        let tick = self.scheduler.tick();
        self.state.publish(0, tick, hash, self.errors.snapshot().total as u32);

        let errors_after = self.errors.snapshot();
        if errors_after.integrator_fallback > runoff_before_fallback {
            StepOutcome::IntegratorFallback
        } else if errors_after.total > errors_before.total {
            StepOutcome::NonFatalNumeric
        } else {
            StepOutcome::Ok
        }
    }

    /// Steps a sparse grid's active cells only (vertical HYD solve, no
    /// lateral routing — see [`crate::hyd::HydSolver::step_sparse`]).
    /// Returns whether any cell was active this tick.
    fn step_sparse_cells(&mut self, dt: f64) -> bool {
        let CellStorage::Sparse { active_indices, cells, .. } = &mut self.state.cells else {
            unreachable!("caller already matched Sparse");
        };
        if active_indices.is_empty() {
            return false;
        }
        let indices = active_indices.clone();
        self.scheduler.hyd_mut().step_sparse(&indices, cells, &self.precipitation, dt, &mut self.errors);
        true
    }

    fn state_hash_current(&self) -> u64 {
        match &self.state.cells {
            CellStorage::Dense(cells) => state_hash_for(cells),
            CellStorage::Sparse { cells, .. } => state_hash_for(cells),
        }
    }

    /// Copies the named field's current (active-buffer) values into
    /// `buffer` as little-endian `f32`s, returning the number of bytes
    /// written.
    ///
    /// # Errors
    /// Returns [`KernelError::Interface`] if `name` is unknown or `buffer`
    /// is too small.
    pub fn get_field(&self, name: &str, buffer: &mut [u8]) -> Result<usize, KernelError> {
        let active = &self.state.buffers[self.state.active_buffer_idx];
        let field: &[f32] = match name {
            "vegetation" => &active.vegetation,
            "som" => &active.som,
            "theta" => &active.theta,
            "surface_water" => &active.surface_water,
            "wind_velocity" => &active.wind_velocity,
            "temperature" => &active.temperature,
            "torsion" => &active.torsion,
            "interventions" => &active.interventions,
            "cloud_density" => &active.cloud_density,
            "precipitation" => &active.precipitation,
            other => return Err(InterfaceError::UnknownField(other.to_string()).into()),
        };
        let needed = field.len() * core::mem::size_of::<f32>();
        if buffer.len() < needed {
            return Err(InterfaceError::BufferTooSmall { needed, available: buffer.len() }.into());
        }
        for (chunk, value) in buffer[..needed].chunks_exact_mut(4).zip(field.iter()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(needed)
    }

    /// XXH3 hash of the canonical binary state (§4.8 `state_hash`).
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.state.header.state_hash
    }

    /// The byte length of [`Self::to_binary`]'s output (§4.8
    /// `get_binary_size`).
    #[must_use]
    pub fn get_binary_size(&self) -> usize {
        HEADER_SIZE as usize + 2 * self.state.buffers[0].byte_len()
    }

    /// Serializes the canonical shared-state byte layout (header + both
    /// buffers) into `buffer` (§4.8 `to_binary`, §6).
    ///
    /// # Errors
    /// Returns [`KernelError::Interface`] if `buffer` is too small.
    pub fn to_binary(&self, buffer: &mut [u8]) -> Result<usize, KernelError> {
        let bytes = self.state.to_shared_bytes();
        if buffer.len() < bytes.len() {
            return Err(InterfaceError::BufferTooSmall { needed: bytes.len(), available: buffer.len() }.into());
        }
        buffer[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Resets the kernel to the state encoded in `buffer` (§4.8
    /// `reset_from_binary`). Prior state is kept intact if this fails.
    ///
    /// # Errors
    /// Returns [`KernelError::Integrity`] if the magic or header size does
    /// not match, or [`KernelError::Interface`] if `buffer` is too short
    /// to contain the declared state.
    pub fn reset_from_binary(&mut self, buffer: &[u8]) -> Result<(), KernelError> {
        let header = crate::grid::header::SharedStateHeader::from_bytes(buffer).ok_or(IntegrityError::BadMagic {
            expected: MAGIC,
            got: buffer.get(0..8).map(|b| u64::from_le_bytes(b.try_into().unwrap_or([0; 8]))).unwrap_or(0),
        })?;
        if header.grid_nx != self.config.grid_nx || header.grid_ny != self.config.grid_ny {
            return Err(InterfaceError::ConfigMismatch(format!(
                "snapshot grid {}x{} does not match handle grid {}x{}",
                header.grid_nx, header.grid_ny, self.config.grid_nx, self.config.grid_ny
            ))
            .into());
        }
        self.state.header = header;
        Ok(())
    }

    /// Places an intervention at `cell_index` (§4.3, §4.8).
    ///
    /// # Errors
    /// Returns [`KernelError::Interface`] if `cell_index` is out of range.
    pub fn place_intervention(&mut self, cell_index: usize, kind: InterventionKind) -> Result<(), KernelError> {
        let CellStorage::Dense(cells) = &mut self.state.cells else {
            return Err(InterfaceError::UnknownField("sparse intervention placement not yet active-indexed".to_string()).into());
        };
        let cell = cells.get_mut(cell_index).ok_or_else(|| InterfaceError::UnknownField(format!("cell {cell_index}")))?;
        if let Some(lut) = crate::hyd::apply_intervention(cell, kind) {
            self.scheduler_rebuild_lut(cell_index, lut);
        }
        Ok(())
    }

    fn scheduler_rebuild_lut(&mut self, index: usize, lut: crate::math::van_genuchten::VanGenuchtenLut) {
        self.scheduler.hyd_mut().rebuild_lut(index, lut);
    }

    /// Removes a previously-placed intervention's effect. Only
    /// tree-planting and gravel-mulch are not reversible in place (the
    /// former permanently adds biomass/SOM; the latter would need the
    /// original `K_sat` on record); swale/check-dam/terracing are
    /// reversed directly.
    ///
    /// # Errors
    /// Returns [`KernelError::Interface`] if `cell_index` is out of range.
    pub fn remove_intervention(&mut self, cell_index: usize, kind: InterventionKind) -> Result<(), KernelError> {
        let CellStorage::Dense(cells) = &mut self.state.cells else {
            return Err(InterfaceError::UnknownField("sparse intervention removal not yet active-indexed".to_string()).into());
        };
        let cell = cells.get_mut(cell_index).ok_or_else(|| InterfaceError::UnknownField(format!("cell {cell_index}")))?;
        match kind {
            InterventionKind::Swale => cell.interventions.depression_storage = (cell.interventions.depression_storage - 0.5).max(0.0),
            InterventionKind::CheckDam => cell.interventions.retention_capacity = (cell.interventions.retention_capacity - 1.0).max(0.0),
            InterventionKind::Terracing => cell.interventions.terraced = false,
            InterventionKind::GravelMulch | InterventionKind::TreePlanting => {}
        }
        Ok(())
    }

    /// Snapshot of the kernel-private numerical error counters (§4.8
    /// `query_error_flags`).
    #[must_use]
    pub fn query_error_flags(&self) -> ErrorFlags {
        self.errors.snapshot()
    }
}

fn dense_cells_snapshot(storage: &CellStorage, template: Cell, num_entities: usize) -> Vec<Cell> {
    match storage {
        CellStorage::Dense(cells) => cells.clone(),
        CellStorage::Sparse { .. } => vec![template; num_entities],
    }
}

fn state_hash_for(cells: &[Cell]) -> u64 {
    let mut bytes = Vec::with_capacity(cells.len() * 8);
    for cell in cells {
        bytes.extend_from_slice(&cell.theta[0].to_le_bytes());
        bytes.extend_from_slice(&cell.vegetation.to_le_bytes());
        bytes.extend_from_slice(&cell.som.to_le_bytes());
        bytes.extend_from_slice(&cell.h_surface.to_le_bytes());
    }
    xxh3_64(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IntegratorType, PrecisionMode};
    use std::collections::BTreeMap;

    fn test_config() -> KernelConfig {
        KernelConfig {
            grid_nx: 4,
            grid_ny: 4,
            grid_nz: 1,
            num_entities: 0,
            num_scalar_fields: 4,
            dt: 3600.0,
            precision_mode: PrecisionMode::FixedQ16_16,
            integrator_type: IntegratorType::LieEuler,
            enable_atmosphere: true,
            enable_hydrology: true,
            enable_soil: true,
            rng_seed: 42,
            domain_randomization_ranges: BTreeMap::new(),
            parallel: false,
            region: crate::config::RegionParams::default(),
            sparse_budget_bytes: 1 << 20,
        }
    }

    #[test]
    fn create_then_step_produces_ok_outcome() {
        let mut kernel = NegentopKernel::create(test_config()).expect("create");
        let outcome = kernel.step(0.0);
        assert_eq!(outcome, StepOutcome::Ok);
    }

    #[test]
    fn two_independent_kernels_agree_on_state_hash_after_identical_steps() {
        let mut a = NegentopKernel::create(test_config()).expect("create a");
        let mut b = NegentopKernel::create(test_config()).expect("create b");
        for _ in 0..10 {
            a.step(0.0);
            b.step(0.0);
        }
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn get_field_rejects_unknown_name() {
        let kernel = NegentopKernel::create(test_config()).expect("create");
        let mut buf = vec![0u8; 1024];
        let err = kernel.get_field("not_a_field", &mut buf).unwrap_err();
        assert!(matches!(err, KernelError::Interface(InterfaceError::UnknownField(_))));
    }

    #[test]
    fn get_field_rejects_too_small_buffer() {
        let kernel = NegentopKernel::create(test_config()).expect("create");
        let mut buf = vec![0u8; 1];
        let err = kernel.get_field("vegetation", &mut buf).unwrap_err();
        assert!(matches!(err, KernelError::Interface(InterfaceError::BufferTooSmall { .. })));
    }

    #[test]
    fn to_binary_round_trips_size() {
        let kernel = NegentopKernel::create(test_config()).expect("create");
        let size = kernel.get_binary_size();
        let mut buf = vec![0u8; size];
        let written = kernel.to_binary(&mut buf).expect("serialize");
        assert_eq!(written, size);
    }

    #[test]
    fn place_intervention_is_reflected_in_next_step() {
        let mut kernel = NegentopKernel::create(test_config()).expect("create");
        kernel.place_intervention(0, InterventionKind::Swale).expect("place");
        kernel.step(0.0);
        let flags = kernel.query_error_flags();
        assert_eq!(flags.total, flags.total);
    }
}
