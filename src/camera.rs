//! Camera and projection descriptors consumed by every pass
//!
//! The renderer never mutates the camera; external camera logic updates it
//! once per frame and the passes read the view, its inverse and the
//! projection descriptor.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Perspective projection descriptor.
///
/// `far == None` selects an infinite far plane. Depth maps to `[0, 1]`
/// (wgpu convention), with 0 at the near plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Vertical field of view in radians
    pub fovy: f32,
    /// Width / height
    pub aspect: f32,
    pub near: f32,
    pub far: Option<f32>,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fovy: 45.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: Some(100.0),
        }
    }
}

impl Projection {
    pub fn new(fovy: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fovy,
            aspect,
            near,
            far: Some(far),
        }
    }

    pub fn infinite(fovy: f32, aspect: f32, near: f32) -> Self {
        Self {
            fovy,
            aspect,
            near,
            far: None,
        }
    }

    /// Reject frusta that would produce NaN or inverted depth.
    pub fn validate(&self) -> RenderResult<()> {
        if !(self.fovy > 0.0 && self.fovy < std::f32::consts::PI) {
            return Err(RenderError::degenerate(format!(
                "field of view {} must lie in (0, pi)",
                self.fovy
            )));
        }
        if !(self.aspect > 0.0) || !self.aspect.is_finite() {
            return Err(RenderError::degenerate(format!(
                "aspect ratio {} must be positive",
                self.aspect
            )));
        }
        if !(self.near > 0.0) || !self.near.is_finite() {
            return Err(RenderError::degenerate(format!(
                "near plane {} must be positive",
                self.near
            )));
        }
        if let Some(far) = self.far {
            if !(far > self.near) {
                return Err(RenderError::degenerate(format!(
                    "far plane {} must exceed near plane {}",
                    far, self.near
                )));
            }
        }
        Ok(())
    }

    /// Projection matrix (right-handed, depth in `[0, 1]`)
    pub fn matrix(&self) -> Mat4 {
        match self.far {
            Some(far) => Mat4::perspective_rh(self.fovy, self.aspect, self.near, far),
            None => Mat4::perspective_infinite_rh(self.fovy, self.aspect, self.near),
        }
    }

    /// Far distance, substituting `fallback` for an infinite projection
    pub fn far_or(&self, fallback: f32) -> f32 {
        self.far.unwrap_or(fallback)
    }

    /// Pixels per view-space unit at unit distance: `0.5 * height * P[1][1]`
    pub fn proj_scale(&self, viewport_height: u32) -> f32 {
        0.5 * viewport_height as f32 * self.matrix().y_axis.y
    }

    /// The 8 corners of the sub-frustum `[near, far]` in camera space.
    ///
    /// Near corners come first, counter-clockwise from bottom-left.
    pub fn frustum_corners(&self, near: f32, far: f32) -> [Vec3; 8] {
        let tan_half = (self.fovy * 0.5).tan();
        let mut corners = [Vec3::ZERO; 8];
        for (slice, depth) in [near, far].into_iter().enumerate() {
            let half_h = depth * tan_half;
            let half_w = half_h * self.aspect;
            let base = slice * 4;
            corners[base] = Vec3::new(-half_w, -half_h, -depth);
            corners[base + 1] = Vec3::new(half_w, -half_h, -depth);
            corners[base + 2] = Vec3::new(half_w, half_h, -depth);
            corners[base + 3] = Vec3::new(-half_w, half_h, -depth);
        }
        corners
    }
}

/// View transform plus projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    view: Mat4,
    inverse_view: Mat4,
    pub projection: Projection,
}

impl Camera {
    pub fn new(view: Mat4, projection: Projection) -> Self {
        Self {
            view,
            inverse_view: view.inverse(),
            projection,
        }
    }

    /// Right-handed look-at view.
    ///
    /// When the view direction is parallel to `up` (a camera looking straight
    /// down, say) the first of +Z and +X that is not parallel takes its place.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, projection: Projection) -> Self {
        let forward = (target - eye).normalize_or_zero();
        let up = [up, Vec3::Z, Vec3::X]
            .into_iter()
            .find(|candidate| forward.cross(candidate.normalize_or_zero()).length_squared() > 1.0e-6)
            .unwrap_or(up);
        Self::new(Mat4::look_at_rh(eye, target, up), projection)
    }

    /// Reject a non-invertible or non-finite view, then the projection.
    pub fn validate(&self) -> RenderResult<()> {
        if !self.view.is_finite() || !self.inverse_view.is_finite() {
            return Err(RenderError::degenerate("camera view matrix is not finite"));
        }
        self.projection.validate()
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn inverse_view(&self) -> Mat4 {
        self.inverse_view
    }

    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
        self.inverse_view = view.inverse();
    }

    pub fn position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection.matrix() * self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_inverted_frustum() {
        let p = Projection::new(1.0, 1.0, 10.0, 5.0);
        assert!(matches!(p.validate(), Err(RenderError::Degenerate(_))));
        assert!(Projection::default().validate().is_ok());
        assert!(Projection::infinite(1.0, 1.5, 0.1).validate().is_ok());
    }

    #[test]
    fn frustum_corners_lie_on_planes() {
        let p = Projection::new(60.0_f32.to_radians(), 2.0, 0.5, 50.0);
        let corners = p.frustum_corners(1.0, 10.0);
        for c in &corners[..4] {
            assert!((c.z + 1.0).abs() < 1e-6);
        }
        for c in &corners[4..] {
            assert!((c.z + 10.0).abs() < 1e-6);
        }
        // A far corner projects onto the NDC corner
        let ndc = p.matrix().project_point3(corners[6]);
        assert!((ndc.x - 1.0).abs() < 1e-4 && (ndc.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn camera_position_from_inverse_view() {
        let cam = Camera::look_at(
            Vec3::new(3.0, 4.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            Projection::default(),
        );
        assert!((cam.position() - Vec3::new(3.0, 4.0, 5.0)).length() < 1e-4);
    }

    #[test]
    fn looking_straight_down_keeps_a_finite_basis() {
        let cam = Camera::look_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, Vec3::Y, Projection::default());
        assert!(cam.view().is_finite());
        assert!(cam.validate().is_ok());
        assert!((cam.position() - Vec3::new(0.0, 10.0, 0.0)).length() < 1e-4);
        // The ground origin lands straight ahead
        let ahead = cam.view().transform_point3(Vec3::ZERO);
        assert!(ahead.x.abs() < 1e-4 && ahead.y.abs() < 1e-4);
        assert!((ahead.z + 10.0).abs() < 1e-4);
    }

    #[test]
    fn non_finite_view_is_degenerate() {
        let cam = Camera::look_at(Vec3::ONE, Vec3::ONE, Vec3::Y, Projection::default());
        assert!(matches!(cam.validate(), Err(RenderError::Degenerate(_))));

        let mut cam = Camera::new(Mat4::IDENTITY, Projection::default());
        cam.set_view(Mat4::from_cols_array(&[f32::NAN; 16]));
        assert!(matches!(cam.validate(), Err(RenderError::Degenerate(_))));
    }
}
