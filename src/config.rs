// SPDX-License-Identifier: Apache-2.0
//! `KernelConfig`: the serde-deserializable configuration record (§6, §6.1).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Numeric representation used for the simulation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrecisionMode {
    /// 32-bit IEEE-754 float.
    Fp32,
    /// 64-bit IEEE-754 float.
    Fp64,
    /// Q16.16 fixed point.
    FixedQ16_16,
}

/// Structure-preserving integrator selection (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegratorType {
    /// First-order exp-map composition.
    LieEuler,
    /// 4th-order Runge-Kutta-Munthe-Kaas.
    Rkmk4,
    /// Crouch-Grossman family (treated as an RKMK4 variant here).
    CrouchGrossman,
    /// Clebsch-collective symplectic step for Lie-Poisson subsystems.
    ClebschCollective,
}

/// A closed `[min, max]` range used for domain-randomized initial conditions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
}

/// Per-region REG constants (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionParams {
    /// Vegetation intrinsic growth rate.
    pub r_v: f64,
    /// Vegetation carrying capacity.
    pub k_v: f64,
    /// Moisture-surplus growth coefficient.
    pub lambda1: f64,
    /// SOM-surplus growth coefficient.
    pub lambda2: f64,
    /// Moisture threshold above which surplus growth applies.
    pub theta_star: f64,
    /// SOM threshold above which surplus growth applies.
    pub som_star: f64,
    /// SOM production coefficient from vegetation.
    pub a1: f64,
    /// SOM decay coefficient.
    pub a2: f64,
    /// Fungal:bacterial SOM production multiplier cap (non-compost cells).
    pub fungal_bacterial_cap: f64,
    /// Fungal:bacterial cap under Johnson-Su compost parameters.
    pub fungal_bacterial_compost_cap: f64,
    /// Base condensation flux coefficient.
    pub condensation_base: f64,
    /// Rock-mulch condensation multiplier.
    pub rock_mulch_factor: f64,
    /// Hydraulic-lift redistribution coefficient (night-gated).
    pub hydraulic_lift_coeff: f64,
    /// Biotic-pump area threshold (km^2).
    pub biotic_pump_area_km2: f64,
    /// Biotic-pump condensation enhancement coefficient.
    pub beta_veg: f64,
}

impl Default for RegionParams {
    fn default() -> Self {
        Self {
            r_v: 0.3,
            k_v: 1.0,
            lambda1: 0.05,
            lambda2: 0.02,
            theta_star: 0.18,
            som_star: 2.0,
            a1: 0.8,
            a2: 0.1,
            fungal_bacterial_cap: 8.0,
            fungal_bacterial_compost_cap: 10.0,
            condensation_base: 1.0e-4,
            rock_mulch_factor: 50.0,
            hydraulic_lift_coeff: 0.02,
            biotic_pump_area_km2: 100.0,
            beta_veg: 2.0,
        }
    }
}

/// The top-level kernel configuration record (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Grid X dimension.
    pub grid_nx: u32,
    /// Grid Y dimension.
    pub grid_ny: u32,
    /// Grid Z dimension (typically 1).
    pub grid_nz: u32,
    /// Number of entities tracked (defaults to `grid_nx * grid_ny` if zero).
    pub num_entities: u32,
    /// Number of scalar fields carried in a binary snapshot.
    pub num_scalar_fields: u32,
    /// Default solver time step, in seconds.
    pub dt: f64,
    /// Numeric precision mode.
    pub precision_mode: PrecisionMode,
    /// Default structure-preserving integrator.
    pub integrator_type: IntegratorType,
    /// Whether the 2.5-D atmosphere/torsion closure is active.
    pub enable_atmosphere: bool,
    /// Whether HYD (hydrology) is active.
    pub enable_hydrology: bool,
    /// Whether REG (soil/vegetation) is active.
    pub enable_soil: bool,
    /// RNG seed (0 is replaced by a fixed non-zero constant by the PRNG).
    pub rng_seed: u64,
    /// Optional Gaussian-perturbed initial-condition ranges, keyed by
    /// parameter name.
    #[serde(default)]
    pub domain_randomization_ranges: BTreeMap<String, ParamRange>,
    /// Whether data-parallel tile execution is enabled (§5). Defaults to
    /// `false` to keep the reference behavior single-threaded.
    #[serde(default)]
    pub parallel: bool,
    /// REG region constants.
    #[serde(default)]
    pub region: RegionParams,
    /// Sparse-grid memory budget in bytes, consulted only when
    /// `grid_nx * grid_ny` exceeds the dense storage threshold.
    #[serde(default = "default_sparse_budget_bytes")]
    pub sparse_budget_bytes: usize,
}

fn default_sparse_budget_bytes() -> usize {
    1 << 28
}

impl KernelConfig {
    /// Validates the invariants described in §3/§6, returning the first
    /// violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_nx == 0 || self.grid_ny == 0 || self.grid_nz == 0 {
            return Err(ConfigError::InvalidGrid { nx: self.grid_nx, ny: self.grid_ny, nz: self.grid_nz });
        }
        if !self.dt.is_finite() || self.dt < 0.0 {
            return Err(ConfigError::UnknownOption(format!("dt must be finite and non-negative, got {}", self.dt)));
        }
        for (name, range) in &self.domain_randomization_ranges {
            if !(range.min.is_finite() && range.max.is_finite()) || range.min > range.max {
                return Err(ConfigError::UnknownOption(format!(
                    "domain_randomization_ranges[{name}] has an invalid range [{}, {}]",
                    range.min, range.max
                )));
            }
        }
        Ok(())
    }

    /// The number of entities this config implies, defaulting to
    /// `grid_nx * grid_ny` when `num_entities` was left at zero.
    #[must_use]
    pub fn effective_num_entities(&self) -> u32 {
        if self.num_entities == 0 {
            self.grid_nx * self.grid_ny
        } else {
            self.num_entities
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> KernelConfig {
        KernelConfig {
            grid_nx: 8,
            grid_ny: 8,
            grid_nz: 1,
            num_entities: 0,
            num_scalar_fields: 4,
            dt: 3600.0,
            precision_mode: PrecisionMode::FixedQ16_16,
            integrator_type: IntegratorType::LieEuler,
            enable_atmosphere: true,
            enable_hydrology: true,
            enable_soil: true,
            rng_seed: 0x0123_4567_89AB_CDEF,
            domain_randomization_ranges: BTreeMap::new(),
            parallel: false,
            region: RegionParams::default(),
            sparse_budget_bytes: default_sparse_budget_bytes(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zero_grid_dimension_is_rejected() {
        let mut config = base_config();
        config.grid_nx = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGrid { .. })));
    }

    #[test]
    fn roundtrips_through_json() {
        let config = base_config();
        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: KernelConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.grid_nx, config.grid_nx);
        assert_eq!(parsed.rng_seed, config.rng_seed);
    }

    #[test]
    fn effective_num_entities_defaults_to_grid_area() {
        let config = base_config();
        assert_eq!(config.effective_num_entities(), 64);
    }
}
