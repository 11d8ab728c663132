// SPDX-License-Identifier: Apache-2.0
//! Lie-Euler: first-order exp-map composition on SE(3) (§4.5).

use crate::geom::quat::{Pose, Quat, Vec3};

/// A body-frame twist: angular velocity `omega` and linear velocity `v`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Twist {
    /// Angular velocity (rad/s).
    pub omega: Vec3,
    /// Linear velocity (m/s).
    pub v: Vec3,
}

/// Advances `pose` by one Lie-Euler step: `pose' = pose * exp(twist * dt)`.
#[must_use]
pub fn lie_euler_step(pose: Pose, twist: Twist, dt: f64) -> Pose {
    let rotation_delta = Quat::exp_map(Vec3::new(twist.omega.x * dt, twist.omega.y * dt, twist.omega.z * dt));
    let translation_delta = twist.v.scale(dt);
    let delta = Pose { rotation: rotation_delta, translation: translation_delta };
    pose.compose(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_twist_is_identity_step() {
        let pose = Pose { rotation: Quat::new(1.0, 0.0, 0.0, 0.0), translation: Vec3::new(1.0, 2.0, 3.0) };
        let twist = Twist { omega: Vec3::ZERO, v: Vec3::ZERO };
        let next = lie_euler_step(pose, twist, 1.0);
        assert!((next.translation.x - pose.translation.x).abs() < 1e-12);
    }

    #[test]
    fn forward_then_backward_step_is_reversible() {
        let pose = Pose { rotation: Quat::new(1.0, 0.0, 0.0, 0.0), translation: Vec3::ZERO };
        let twist = Twist { omega: Vec3::new(0.0, 0.0, 0.3), v: Vec3::new(1.0, 0.0, 0.0) };
        let forward = lie_euler_step(pose, twist, 0.1);
        let back_twist = Twist { omega: Vec3::new(0.0, 0.0, -0.3), v: Vec3::new(-1.0, 0.0, 0.0) };
        let back = lie_euler_step(forward, back_twist, 0.1);
        assert!((back.translation.x - pose.translation.x).abs() < 1e-3);
    }
}
