// src/scene/transform.rs
// Object placement with a fixed translate-rotate-scale composition order

use glam::{Mat3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Position, Euler rotation in degrees and per-axis scale.
///
/// The model matrix is `T * Rx * Ry * Rz * S`: scale first, then rotate
/// about Z, Y, X, then translate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation_degrees: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation_degrees: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    pub fn with_rotation_degrees(mut self, rotation: Vec3) -> Self {
        self.rotation_degrees = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn model_matrix(&self) -> Mat4 {
        let r = self.rotation_degrees;
        Mat4::from_translation(self.translation)
            * Mat4::from_rotation_x(r.x.to_radians())
            * Mat4::from_rotation_y(r.y.to_radians())
            * Mat4::from_rotation_z(r.z.to_radians())
            * Mat4::from_scale(self.scale)
    }

    /// Largest absolute scale factor, used to grow mesh bounding radii
    pub fn max_scale(&self) -> f32 {
        self.scale.abs().max_element()
    }
}

/// Inverse-transpose of the upper 3x3 of `model_view`, widened back to 4x4
/// so it can travel in a mat4 uniform.
pub fn normal_matrix(model_view: Mat4) -> Mat4 {
    let m3 = Mat3::from_mat4(model_view);
    let det = m3.determinant();
    if det.abs() <= f32::EPSILON {
        return Mat4::from_mat3(m3);
    }
    Mat4::from_mat3(m3.inverse().transpose())
}
