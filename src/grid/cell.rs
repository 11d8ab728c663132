// SPDX-License-Identifier: Apache-2.0
//! The `Cell` record: a 4-layer soil column plus surface state (§3).

use crate::geom::quat::Pose;
use crate::math::van_genuchten::SoilParams;

/// Number of soil layers per cell.
pub const SOIL_LAYERS: usize = 4;

/// Level of detail, `0..=3` (coarsest to finest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LodLevel(pub u8);

impl LodLevel {
    /// The coarsest level.
    pub const COARSEST: LodLevel = LodLevel(0);
    /// The finest level.
    pub const FINEST: LodLevel = LodLevel(3);
}

/// A 3x3 diagonal-biased effective conductivity tensor (§3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConductivityTensor {
    /// `K_xx`.
    pub k_xx: f64,
    /// `K_yy`.
    pub k_yy: f64,
    /// `K_zz`, updated by REG.
    pub k_zz: f64,
}

impl ConductivityTensor {
    /// Builds an isotropic tensor from a single scalar conductivity.
    #[must_use]
    pub fn isotropic(k: f64) -> Self {
        Self { k_xx: k, k_yy: k, k_zz: k }
    }
}

/// Intervention multipliers applied at a cell (§3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InterventionState {
    /// Added microtopography depression storage (m), from swales.
    pub depression_storage: f64,
    /// Added retention capacity (m), from check dams.
    pub retention_capacity: f64,
    /// Whether eastern-slope terracing has clamped this cell's slope.
    pub terraced: bool,
}

/// One grid column: a 4-layer soil profile and surface state (§3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    /// Volumetric moisture per layer, `theta_r <= theta <= theta_s`.
    pub theta: [f64; SOIL_LAYERS],
    /// Ponded surface water depth (m), `>= 0`.
    pub h_surface: f64,
    /// Matric potential per layer (derived, `<= 0`).
    pub psi: [f64; SOIL_LAYERS],
    /// Soil retention parameters (shared across layers for this cell).
    pub soil: SoilParams,
    /// Effective porosity, `>= theta_s`, modulated by SOM.
    pub phi_eff: f64,
    /// Effective conductivity tensor.
    pub k_tensor: ConductivityTensor,
    /// Vegetation fraction, `[0, 1]`.
    pub vegetation: f64,
    /// Soil organic matter (kg/m^3), `>= 0`.
    pub som: f64,
    /// Elevation (m).
    pub z: f64,
    /// Horizontal cell spacing (m).
    pub dx: f64,
    /// Vertical layer thickness (m).
    pub dz: f64,
    /// Cubed-sphere face index, `0..6`.
    pub face: u8,
    /// Face-local `u` coordinate.
    pub u: f64,
    /// Face-local `v` coordinate.
    pub v: f64,
    /// Reserved for event-driven routing (not consulted by the dense
    /// scheduler; kept for interface parity with hosts built against the
    /// dirty-flag model).
    pub is_dirty: bool,
    /// Whether this cell currently participates in stepping.
    pub is_active: bool,
    /// Current spatial level of detail.
    pub lod_level: LodLevel,
    /// Active intervention multipliers.
    pub interventions: InterventionState,
    /// Local-frame horizontal wind `u` component (m/s), driven by the
    /// torsion closure (§4.5, active when atmosphere is enabled).
    pub wind_u: f64,
    /// Local-frame horizontal wind `v` component (m/s).
    pub wind_v: f64,
    /// Temperature anomaly relative to the closure's fixed aloft reference
    /// (§4.5).
    pub temperature: f64,
    /// Vertical vorticity `omega_z` (1/s), the torsion closure's Lie-Poisson
    /// variable.
    pub torsion: f64,
    /// Bounded cloud-density proxy driven by the torsion closure's vertical
    /// pseudo-velocity, `[0, 1]`.
    pub cloud_density: f64,
    /// This cell's SE(3) attitude, advanced by the LoD-selected
    /// structure-preserving integrator (§4.5).
    pub pose: Pose,
    /// The precipitation forcing value applied to this cell on its last
    /// HYD tick (m), mirrored here for `get_field("precipitation")` output.
    pub precipitation_rate: f64,
}

impl Cell {
    /// Builds a cell with uniform initial moisture and the given soil
    /// parameters, at elevation `z`, world position `(face, u, v)`.
    #[must_use]
    pub fn new_uniform(theta0: [f64; SOIL_LAYERS], soil: SoilParams, z: f64, dx: f64, dz: f64, face: u8, u: f64, v: f64) -> Self {
        Self {
            theta: theta0,
            h_surface: 0.0,
            psi: [0.0; SOIL_LAYERS],
            soil,
            phi_eff: soil.theta_s,
            k_tensor: ConductivityTensor::isotropic(soil.k_sat),
            vegetation: 0.0,
            som: 0.0,
            z,
            dx,
            dz,
            face,
            u,
            v,
            is_dirty: false,
            is_active: true,
            lod_level: LodLevel::COARSEST,
            interventions: InterventionState::default(),
            wind_u: 0.0,
            wind_v: 0.0,
            temperature: 0.0,
            torsion: 0.0,
            cloud_density: 0.0,
            pose: Pose::IDENTITY,
            precipitation_rate: 0.0,
        }
    }

    /// Effective saturation of layer `l`: `(theta - theta_r) / (theta_s - theta_r)`.
    #[must_use]
    pub fn effective_saturation(&self, layer: usize) -> f64 {
        let span = self.soil.theta_s - self.soil.theta_r;
        if span <= 0.0 {
            return 0.0;
        }
        ((self.theta[layer] - self.soil.theta_r) / span).clamp(0.0, 1.0)
    }

    /// Clamps `theta[layer]` into the closed invariant interval
    /// `[theta_r, theta_s]`. Used only at ingestion/initialization
    /// boundaries; the HYD solver itself relies on barrier gradients, not
    /// this clamp, to stay interior (§9).
    pub fn clamp_theta_to_invariant(&mut self, layer: usize) {
        self.theta[layer] = self.theta[layer].clamp(self.soil.theta_r, self.soil.theta_s);
    }
}
