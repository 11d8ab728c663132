// SPDX-License-Identifier: Apache-2.0
//! Structure-preserving integrators for SE(3) and Lie-Poisson (vorticity)
//! subsystems, selected per level of detail (§4.5).

pub mod clebsch;
pub mod lie_euler;
pub mod rkmk4;
pub mod torsion;

pub use clebsch::{clebsch_step, CanonicalPair, ClebschConfig, ClebschHamiltonian, CleschLift};
pub use lie_euler::{lie_euler_step, Twist};
pub use rkmk4::{rkmk4_step, TwistField};
pub use torsion::{alpha_local, discrete_curl, torsion_feedback, vertical_pseudo_velocity, Neighborhood, TorsionFeedback};

use crate::config::IntegratorType;
use crate::error::ErrorCounters;
use crate::geom::quat::{Pose, Vec3};
use crate::grid::cell::Cell;

/// Chooses the integrator method for a cell based on its LoD level and the
/// configured default, per §4.5's "Method selection (LoD-gated)" rule:
/// LoD 0-1 use explicit transport (Lie-Euler), LoD 2 uses RKMK4, LoD 3
/// uses Clebsch-collective. The configured `default` is honored when it
/// would select a *more* expensive method than the LoD rule implies
/// (an explicit runtime escalation, never a silent downgrade).
#[must_use]
pub fn select_method(lod_level: u8, default: IntegratorType) -> IntegratorType {
    let lod_method = match lod_level {
        0 | 1 => IntegratorType::LieEuler,
        2 => IntegratorType::Rkmk4,
        _ => IntegratorType::ClebschCollective,
    };
    if method_rank(default) > method_rank(lod_method) {
        default
    } else {
        lod_method
    }
}

fn method_rank(method: IntegratorType) -> u8 {
    match method {
        IntegratorType::LieEuler => 0,
        IntegratorType::Rkmk4 | IntegratorType::CrouchGrossman => 1,
        IntegratorType::ClebschCollective => 2,
    }
}

/// Advances a cell's SE(3) pose using Lie-Euler, the cheapest method, for
/// transport-only LoD 0-1 cells.
#[must_use]
pub fn advance_pose_lie_euler(pose: Pose, twist: Twist, dt: f64) -> Pose {
    lie_euler_step(pose, twist, dt)
}

/// Reference potential temperature aloft for the torsion closure's
/// temperature-feedback term (§4.5); a fixed boundary condition standing in
/// for a prognostic aloft field, which a full atmospheric GCM is out of
/// scope to provide (see `spec.md` NON-GOALS).
const THETA_ALOFT: f64 = 0.0;

/// Coefficient translating a local surface-head gradient into a body-frame
/// horizontal wind sample driving the torsion closure.
const WIND_SLOPE_GAIN: f64 = 50.0;

/// Divisor bounding the cloud-density proxy derived from vertical
/// pseudo-velocity into `[0, 1]`.
const CLOUD_DENSITY_SCALE: f64 = 10.0;

fn head_at(cells: &[Cell], nx: u32, ny: u32, cx: i64, cy: i64) -> Option<f64> {
    if cx < 0 || cy < 0 || cx >= i64::from(nx) || cy >= i64::from(ny) {
        return None;
    }
    let idx = (cy as u32 * nx + cx as u32) as usize;
    Some(cells[idx].z + cells[idx].h_surface)
}

fn wind_at(cells: &[Cell], nx: u32, ny: u32, cx: i64, cy: i64) -> Option<(f64, f64)> {
    if cx < 0 || cy < 0 || cx >= i64::from(nx) || cy >= i64::from(ny) {
        return None;
    }
    let idx = (cy as u32 * nx + cx as u32) as usize;
    Some((cells[idx].wind_u, cells[idx].wind_v))
}

fn torsion_at(cells: &[Cell], nx: u32, ny: u32, cx: i64, cy: i64) -> f64 {
    if cx < 0 || cy < 0 || cx >= i64::from(nx) || cy >= i64::from(ny) {
        return 0.0;
    }
    let idx = (cy as u32 * nx + cx as u32) as usize;
    cells[idx].torsion
}

fn centered_diff(center: f64, plus: Option<f64>, minus: Option<f64>, d: f64) -> f64 {
    match (plus, minus) {
        (Some(p), Some(m)) => (p - m) / (2.0 * d),
        (Some(p), None) => (p - center) / d,
        (None, Some(m)) => (center - m) / d,
        (None, None) => 0.0,
    }
}

struct FrozenTwist(Twist);
impl TwistField for FrozenTwist {
    fn sample(&self, _pose: Pose, _t: f64) -> Twist {
        self.0
    }
}

/// A single free-rotor Lie-Poisson Hamiltonian for the Clebsch-collective
/// step, treating each cell's vorticity as an independent rigid-body-like
/// degree of freedom (§4.5). The reference generator for richer
/// multi-cell brackets is an Open Question resolved in `DESIGN.md`.
struct VorticityHamiltonian {
    omega_ref: f64,
}
impl ClebschHamiltonian for VorticityHamiltonian {
    fn dh_dq(&self, pair: CanonicalPair) -> f64 {
        self.omega_ref * pair.q
    }
    fn dh_dp(&self, pair: CanonicalPair) -> f64 {
        pair.p
    }
}

/// Advances the 2.5-D torsion/vorticity closure and each cell's SE(3) pose
/// for one tick (§4.5), gated at the call site by `config.enable_atmosphere`.
///
/// Wind is refreshed from the local surface-head slope (a transport proxy
/// standing in for a primitive-equation wind field, which is out of scope);
/// its discrete curl drives the torsion closure (buoyancy/momentum/
/// temperature feedback, vertical pseudo-velocity), and the LoD-selected
/// integrator (Lie-Euler, RKMK4, or Clebsch-collective) advances each
/// cell's twist into its pose, making [`clebsch_step`]'s internal
/// non-convergence fallback reachable for LoD-3 cells.
pub fn advance_atmosphere(cells: &mut [Cell], nx: u32, ny: u32, integrator_type: IntegratorType, dt: f64, errors: &mut ErrorCounters) {
    let n = cells.len();
    if n == 0 {
        return;
    }

    let mut new_wind = vec![(0.0_f64, 0.0_f64); n];
    for i in 0..n {
        let cx = i64::from(i as u32 % nx);
        let cy = i64::from(i as u32 / nx);
        let dx = cells[i].dx.max(1e-6);
        let center = cells[i].z + cells[i].h_surface;
        let grad_x = centered_diff(center, head_at(cells, nx, ny, cx + 1, cy), head_at(cells, nx, ny, cx - 1, cy), dx);
        let grad_y = centered_diff(center, head_at(cells, nx, ny, cx, cy + 1), head_at(cells, nx, ny, cx, cy - 1), dx);
        new_wind[i] = (-WIND_SLOPE_GAIN * grad_x, -WIND_SLOPE_GAIN * grad_y);
    }
    for (i, cell) in cells.iter_mut().enumerate() {
        cell.wind_u = new_wind[i].0;
        cell.wind_v = new_wind[i].1;
    }

    let mut new_torsion = vec![0.0_f64; n];
    for i in 0..n {
        let cx = i64::from(i as u32 % nx);
        let cy = i64::from(i as u32 / nx);
        let dx = cells[i].dx.max(1e-6);
        let neighborhood: Neighborhood = [
            [wind_at(cells, nx, ny, cx - 1, cy - 1), wind_at(cells, nx, ny, cx, cy - 1), wind_at(cells, nx, ny, cx + 1, cy - 1)],
            [wind_at(cells, nx, ny, cx - 1, cy), wind_at(cells, nx, ny, cx, cy), wind_at(cells, nx, ny, cx + 1, cy)],
            [wind_at(cells, nx, ny, cx - 1, cy + 1), wind_at(cells, nx, ny, cx, cy + 1), wind_at(cells, nx, ny, cx + 1, cy + 1)],
        ];
        new_torsion[i] = discrete_curl(neighborhood, dx, dx);
    }
    for (i, cell) in cells.iter_mut().enumerate() {
        cell.torsion = new_torsion[i];
    }

    for i in 0..n {
        let cx = i64::from(i as u32 % nx);
        let cy = i64::from(i as u32 / nx);
        let dx = cells[i].dx.max(1e-6);
        let omega_center = cells[i].torsion;
        let omega_n = torsion_at(cells, nx, ny, cx, cy + 1);
        let omega_s = torsion_at(cells, nx, ny, cx, cy - 1);
        let omega_e = torsion_at(cells, nx, ny, cx + 1, cy);
        let omega_w = torsion_at(cells, nx, ny, cx - 1, cy);
        let w_c = vertical_pseudo_velocity(omega_center, omega_n, omega_s, omega_e, omega_w, dx);

        let cell = &mut cells[i];
        let feedback = torsion_feedback(
            0.0,
            w_c,
            (0.0, 0.0, cell.torsion),
            (cell.wind_u, cell.wind_v, 0.0),
            THETA_ALOFT,
            cell.temperature,
            cell.lod_level.0,
        );
        cell.wind_u += feedback.momentum_gain.0 * dt;
        cell.wind_v += feedback.momentum_gain.1 * dt;
        cell.temperature += feedback.temperature_gain * dt;
        cell.cloud_density = (w_c.abs() / CLOUD_DENSITY_SCALE).clamp(0.0, 1.0);

        let method = select_method(cell.lod_level.0, integrator_type);
        let twist = Twist { omega: Vec3::new(0.0, 0.0, cell.torsion), v: Vec3::new(cell.wind_u, cell.wind_v, 0.0) };
        match method {
            IntegratorType::LieEuler => {
                cell.pose = lie_euler_step(cell.pose, twist, dt);
            }
            IntegratorType::Rkmk4 | IntegratorType::CrouchGrossman => {
                let field = FrozenTwist(twist);
                cell.pose = rkmk4_step(cell.pose, &field, dt);
            }
            IntegratorType::ClebschCollective => {
                let hamiltonian = VorticityHamiltonian { omega_ref: 1.0 };
                cell.torsion = clebsch_step(cell.torsion, &hamiltonian, dt, ClebschConfig::default(), errors);
                let updated_twist = Twist { omega: Vec3::new(0.0, 0.0, cell.torsion), v: twist.v };
                cell.pose = lie_euler_step(cell.pose, updated_twist, dt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lod_gates_method_selection() {
        assert_eq!(select_method(0, IntegratorType::LieEuler), IntegratorType::LieEuler);
        assert_eq!(select_method(2, IntegratorType::LieEuler), IntegratorType::Rkmk4);
        assert_eq!(select_method(3, IntegratorType::LieEuler), IntegratorType::ClebschCollective);
    }

    #[test]
    fn configured_default_can_escalate_but_not_downgrade() {
        assert_eq!(select_method(0, IntegratorType::ClebschCollective), IntegratorType::ClebschCollective);
        assert_eq!(select_method(3, IntegratorType::LieEuler), IntegratorType::ClebschCollective);
    }
}
