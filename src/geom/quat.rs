// SPDX-License-Identifier: Apache-2.0
//! SE(3) pose: unit quaternion + translation (§4.2).

use crate::math::trig::fxp_sin_cos;

/// A 3-vector of `f64`s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// The zero vector.
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    /// Constructs a vector from components.
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component-wise addition.
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Component-wise subtraction.
    #[must_use]
    pub fn sub(self, other: Self) -> Self {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Scales by a scalar.
    #[must_use]
    pub fn scale(self, s: f64) -> Self {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product.
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Euclidean norm.
    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// The largest-magnitude component, used for cubed-sphere face
    /// selection.
    #[must_use]
    pub fn max_abs_component(self) -> f64 {
        self.x.abs().max(self.y.abs()).max(self.z.abs())
    }
}

/// A unit quaternion `(w, x, y, z)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    /// Scalar part.
    pub w: f64,
    /// Vector part, x.
    pub x: f64,
    /// Vector part, y.
    pub y: f64,
    /// Vector part, z.
    pub z: f64,
}

impl Quat {
    /// The identity rotation `(1, 0, 0, 0)`.
    pub const IDENTITY: Quat = Quat { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    /// Builds a quaternion from raw components (not normalized).
    #[must_use]
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The vector (imaginary) part.
    #[must_use]
    pub fn vector_part(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Hamilton product `self * other`.
    #[must_use]
    pub fn mul(self, other: Self) -> Self {
        Quat::new(
            self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
            self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
        )
    }

    /// Squared norm.
    #[must_use]
    pub fn norm_sq(self) -> f64 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Re-normalizes to a unit quaternion, mandatory after RKMK4 steps
    /// (§4.5). Falls back to identity if the norm collapses to zero.
    #[must_use]
    pub fn normalize(self) -> Self {
        let n = self.norm_sq().sqrt();
        if n < 1e-12 {
            return Quat::IDENTITY;
        }
        Quat::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Conjugate (= inverse, for unit quaternions).
    #[must_use]
    pub fn conjugate(self) -> Self {
        Quat::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotates a vector using the optimized
    /// `v' = v + 2w(q_v x v) + 2(q_v x (q_v x v))` form (§4.2), avoiding a
    /// full quaternion-sandwich product.
    #[must_use]
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let q_v = self.vector_part();
        let t = q_v.cross(v).scale(2.0);
        v.add(t.scale(self.w)).add(q_v.cross(t))
    }

    /// Exponential map: builds the unit quaternion for a rotation vector
    /// `omega` (axis-angle, magnitude = angle in radians), used by
    /// Lie-Euler/RKMK4 composition steps.
    #[must_use]
    pub fn exp_map(omega: Vec3) -> Self {
        let theta = omega.length();
        if theta < 1e-12 {
            return Quat::IDENTITY;
        }
        let (s, c) = fxp_sin_cos(theta / 2.0);
        let axis = omega.scale(1.0 / theta);
        Quat::new(c, axis.x * s, axis.y * s, axis.z * s)
    }

    /// Logarithm map: recovers the rotation vector from a unit quaternion.
    #[must_use]
    pub fn log_map(self) -> Vec3 {
        let v = self.vector_part();
        let vn = v.length();
        if vn < 1e-12 {
            return Vec3::ZERO;
        }
        let w = self.w.clamp(-1.0, 1.0);
        let angle = 2.0 * vn.atan2(w);
        v.scale(angle / vn)
    }
}

/// An SE(3) pose: a unit quaternion and a translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Orientation.
    pub rotation: Quat,
    /// Position.
    pub translation: Vec3,
}

impl Pose {
    /// The identity pose `(1,0,0,0) + (0,0,0)` (§4.2).
    pub const IDENTITY: Pose = Pose { rotation: Quat::IDENTITY, translation: Vec3::ZERO };

    /// Composes two poses: `self` applied after `other`.
    #[must_use]
    pub fn compose(self, other: Self) -> Self {
        Pose {
            rotation: self.rotation.mul(other.rotation),
            translation: self.rotation.rotate(other.translation).add(self.translation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rotate_is_noop() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(Quat::IDENTITY.rotate(v), v);
    }

    #[test]
    fn quarter_turn_about_z_maps_x_to_y() {
        let q = Quat::exp_map(Vec3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
        let rotated = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!((rotated.x).abs() < 1e-3);
        assert!((rotated.y - 1.0).abs() < 1e-3);
    }

    #[test]
    fn exp_log_round_trip() {
        let omega = Vec3::new(0.3, -0.2, 0.1);
        let q = Quat::exp_map(omega);
        let back = q.log_map();
        assert!((back.x - omega.x).abs() < 1e-3);
        assert!((back.y - omega.y).abs() < 1e-3);
        assert!((back.z - omega.z).abs() < 1e-3);
    }

    #[test]
    fn normalize_restores_unit_length_after_drift() {
        let drifted = Quat::new(1.01, 0.01, -0.01, 0.0);
        let n = drifted.normalize();
        assert!((n.norm_sq() - 1.0).abs() < 1e-9);
    }
}
