// SPDX-License-Identifier: Apache-2.0
//! RKMK4: 4th-order Runge-Kutta-Munthe-Kaas with BCH truncation (§4.5).
//!
//! Mandatory post-step re-orthonormalization of the rotation quaternion.

use crate::geom::quat::{Pose, Quat, Vec3};
use crate::integrators::lie_euler::Twist;

/// Classical RK4 Butcher tableau nodes/weights, used for the stage
/// combination in Lie-algebra (tangent) coordinates before the final
/// exp-map composition.
const RK4_WEIGHTS: [f64; 4] = [1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0];

/// Second-order Baker-Campbell-Hausdorff truncation:
/// `bch(a, b) ~= a + b + 0.5*[a,b]`, the bracket being the Lie-algebra
/// commutator (here, the vector cross product for `so(3)`).
#[must_use]
fn bch2(a: Vec3, b: Vec3) -> Vec3 {
    a.add(b).add(a.cross(b).scale(0.5))
}

/// A twist field sampled at a given pose, used to evaluate RK4 stages.
pub trait TwistField {
    /// Returns the body-frame twist at `pose` and time offset `t`.
    fn sample(&self, pose: Pose, t: f64) -> Twist;
}

/// Advances `pose` one RKMK4 step of size `dt` under `field`, combining the
/// four stage twists via the classical RK4 weights in tangent coordinates
/// (BCH-truncated to second order for the rotational part, which is exact
/// to `dt^3`), then re-orthonormalizing the resulting quaternion.
pub fn rkmk4_step(pose: Pose, field: &impl TwistField, dt: f64) -> Pose {
    let k1 = field.sample(pose, 0.0);
    let pose1 = advance_tangent(pose, k1, dt * 0.5);

    let k2 = field.sample(pose1, dt * 0.5);
    let pose2 = advance_tangent(pose, k2, dt * 0.5);

    let k3 = field.sample(pose2, dt * 0.5);
    let pose3 = advance_tangent(pose, k3, dt);

    let k4 = field.sample(pose3, dt);

    let omega_combined = bch2(
        bch2(k1.omega.scale(RK4_WEIGHTS[0]), k2.omega.scale(RK4_WEIGHTS[1])),
        bch2(k3.omega.scale(RK4_WEIGHTS[2]), k4.omega.scale(RK4_WEIGHTS[3])),
    );
    let v_combined = k1.v.scale(RK4_WEIGHTS[0]).add(k2.v.scale(RK4_WEIGHTS[1])).add(k3.v.scale(RK4_WEIGHTS[2])).add(k4.v.scale(RK4_WEIGHTS[3]));

    let rotation_delta = Quat::exp_map(omega_combined.scale(dt));
    let next = Pose {
        rotation: pose.rotation.mul(rotation_delta).normalize(),
        translation: pose.rotation.rotate(v_combined.scale(dt)).add(pose.translation),
    };
    next
}

fn advance_tangent(pose: Pose, twist: Twist, dt: f64) -> Pose {
    let rotation_delta = Quat::exp_map(twist.omega.scale(dt));
    Pose {
        rotation: pose.rotation.mul(rotation_delta).normalize(),
        translation: pose.rotation.rotate(twist.v.scale(dt)).add(pose.translation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstantTwist(Twist);
    impl TwistField for ConstantTwist {
        fn sample(&self, _pose: Pose, _t: f64) -> Twist {
            self.0
        }
    }

    #[test]
    fn rotation_stays_unit_norm_after_many_steps() {
        let field = ConstantTwist(Twist { omega: Vec3::new(0.1, 0.05, -0.02), v: Vec3::new(1.0, 0.0, 0.0) });
        let mut pose = Pose::IDENTITY;
        for _ in 0..10_000 {
            pose = rkmk4_step(pose, &field, 0.01);
        }
        assert!((pose.rotation.norm_sq() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn zero_twist_leaves_pose_unchanged() {
        let field = ConstantTwist(Twist { omega: Vec3::ZERO, v: Vec3::ZERO });
        let pose = Pose { rotation: Quat::new(1.0, 0.0, 0.0, 0.0), translation: Vec3::new(1.0, 2.0, 3.0) };
        let next = rkmk4_step(pose, &field, 1.0);
        assert!((next.translation.x - pose.translation.x).abs() < 1e-12);
    }
}
