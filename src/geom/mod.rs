// SPDX-License-Identifier: Apache-2.0
//! SE(3) tile-local frame math and cubed-sphere topology (§4.2).

pub mod cubed_sphere;
pub mod quat;

pub use cubed_sphere::{face_rotation_matrix, mat4_apply, mat4_mul, Face, Mat4};
pub use quat::{Pose, Quat, Vec3};
