// src/post/ssao_math.rs
// CPU mirrors of the SSAO depth linearization, mip selection and occlusion estimate
// RELEVANT FILES: src/shaders/ssao_linearize.wgsl, src/shaders/ssao_occlusion.wgsl

use glam::{Vec2, Vec3};

/// Linear depth written for pixels at the infinite far plane
pub const FAR_SENTINEL: f32 = 1.0e9;
/// Linear depth at or beyond which a pixel is treated as sky
pub const FAR_LIMIT: f32 = 1.0e8;

/// Hardware depth in `[0, 1]` to positive view distance.
///
/// `far == None` selects the infinite-far formula `near / (1 - d)`.
pub fn linearize_depth(ndc: f32, near: f32, far: Option<f32>) -> f32 {
    match far {
        Some(far) => far * near / (far - ndc * (far - near)),
        None => {
            let denom = 1.0 - ndc;
            if denom <= 1.0e-7 {
                FAR_SENTINEL
            } else {
                near / denom
            }
        }
    }
}

/// Sample radius in view units at `depth`, from a radius in pixels
pub fn view_space_radius(radius_px: f32, depth: f32, proj_scale: f32) -> f32 {
    radius_px * depth / proj_scale
}

/// Depth-chain level read for a tap `offset_px` away from the centre pixel
pub fn sample_mip_level(offset_px: f32, mip_switch_px: f32, mip_levels: u32) -> u32 {
    let max_mip = mip_levels.max(1) as i32 - 1;
    let level = (offset_px.max(1.0) / mip_switch_px.max(1.0)).log2().floor() as i32;
    level.clamp(0, max_mip) as u32
}

/// `1 - intensity * occluded / samples`, clamped to `[0, 1]`
pub fn occlusion_factor(intensity: f32, occluded: f32, samples: usize) -> f32 {
    (1.0 - intensity * occluded / samples.max(1) as f32).clamp(0.0, 1.0)
}

/// Camera and viewport terms shared by the reference estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenParams {
    /// `P[0][0]`, `P[1][1]`
    pub focal: Vec2,
    pub proj_scale: f32,
    pub width: u32,
    pub height: u32,
}

impl ScreenParams {
    fn view_from_pixel(&self, pixel: Vec2, depth: f32) -> Vec3 {
        let ndc = Vec2::new(
            pixel.x / self.width as f32 * 2.0 - 1.0,
            1.0 - pixel.y / self.height as f32 * 2.0,
        );
        Vec3::new(ndc.x * depth / self.focal.x, ndc.y * depth / self.focal.y, -depth)
    }

    fn pixel_from_view(&self, p: Vec3) -> Vec2 {
        let inv_w = 1.0 / (-p.z).max(1.0e-6);
        let ndc = Vec2::new(p.x * self.focal.x * inv_w, p.y * self.focal.y * inv_w);
        Vec2::new(
            (ndc.x * 0.5 + 0.5) * self.width as f32,
            (0.5 - ndc.y * 0.5) * self.height as f32,
        )
    }
}

/// Single-level reference of the occlusion program for one pixel.
///
/// `depth` is the level-0 linear depth image, row-major. The kernel is not
/// rotated; the tangent frame starts from +X.
#[allow(clippy::too_many_arguments)]
pub fn reference_occlusion(
    depth: &[f32],
    screen: ScreenParams,
    pixel: (u32, u32),
    normal: Vec3,
    kernel: &[Vec3],
    radius_px: f32,
    intensity: f32,
    bias: f32,
) -> f32 {
    let at = |x: u32, y: u32| depth[(y * screen.width + x) as usize];
    let centre_depth = at(pixel.0, pixel.1);
    if centre_depth >= FAR_LIMIT {
        return 1.0;
    }
    let centre_px = Vec2::new(pixel.0 as f32 + 0.5, pixel.1 as f32 + 0.5);
    let origin = screen.view_from_pixel(centre_px, centre_depth);
    let n = normal.normalize();
    let helper = if Vec3::X.dot(n).abs() > 0.99 { Vec3::Z } else { Vec3::X };
    let tangent = (helper - n * helper.dot(n)).normalize();
    let bitangent = n.cross(tangent);
    let radius_view = view_space_radius(radius_px, centre_depth, screen.proj_scale);

    let mut occluded = 0.0;
    for k in kernel {
        let offset = tangent * k.x + bitangent * k.y + n * k.z;
        let sample_view = origin + offset * radius_view;
        let sample_px = screen.pixel_from_view(sample_view);
        if sample_px.x < 0.0
            || sample_px.y < 0.0
            || sample_px.x >= screen.width as f32
            || sample_px.y >= screen.height as f32
        {
            continue;
        }
        let scene_depth = at(sample_px.x as u32, sample_px.y as u32);
        let sample_depth = -sample_view.z;
        let ratio = radius_view / (centre_depth - scene_depth).abs().max(1.0e-6);
        let range = smoothstep(ratio);
        if scene_depth <= sample_depth - bias {
            occluded += range;
        }
    }
    occlusion_factor(intensity, occluded, kernel.len())
}

pub(crate) fn smoothstep(x: f32) -> f32 {
    let t = x.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::ssao_kernel::generate_kernel;

    #[test]
    fn linearize_finite_endpoints() {
        assert!((linearize_depth(0.0, 0.1, Some(100.0)) - 0.1).abs() < 1e-6);
        assert!((linearize_depth(1.0, 0.1, Some(100.0)) - 100.0).abs() < 1e-2);
    }

    #[test]
    fn linearize_infinite_uses_sentinel() {
        assert!((linearize_depth(0.0, 0.5, None) - 0.5).abs() < 1e-6);
        assert!((linearize_depth(0.5, 0.5, None) - 1.0).abs() < 1e-6);
        assert_eq!(linearize_depth(1.0, 0.5, None), FAR_SENTINEL);
    }

    #[test]
    fn linearize_matches_projection() {
        let projection = crate::camera::Projection::new(1.0, 1.0, 0.1, 50.0);
        let m = projection.matrix();
        for z in [0.5f32, 3.0, 20.0, 49.0] {
            let clip = m * glam::Vec4::new(0.0, 0.0, -z, 1.0);
            let ndc = clip.z / clip.w;
            assert!((linearize_depth(ndc, 0.1, Some(50.0)) - z).abs() / z < 1e-3);
        }
    }

    #[test]
    fn mip_selection_steps_by_octaves() {
        assert_eq!(sample_mip_level(4.0, 8.0, 5), 0);
        assert_eq!(sample_mip_level(8.0, 8.0, 5), 0);
        assert_eq!(sample_mip_level(16.0, 8.0, 5), 1);
        assert_eq!(sample_mip_level(40.0, 8.0, 5), 2);
        assert_eq!(sample_mip_level(10_000.0, 8.0, 5), 4);
        assert_eq!(sample_mip_level(10_000.0, 8.0, 1), 0);
    }

    #[test]
    fn sky_pixels_are_unoccluded() {
        let screen = ScreenParams {
            focal: Vec2::new(1.0, 1.0),
            proj_scale: 16.0,
            width: 32,
            height: 32,
        };
        let depth = vec![linearize_depth(1.0, 0.1, None); 32 * 32];
        let kernel = generate_kernel(16);
        let ao = reference_occlusion(&depth, screen, (16, 16), Vec3::Z, &kernel, 8.0, 1.0, 0.01);
        assert_eq!(ao, 1.0);
    }

    #[test]
    fn camera_facing_wall_is_unoccluded() {
        let screen = ScreenParams {
            focal: Vec2::new(1.0, 1.0),
            proj_scale: 16.0,
            width: 32,
            height: 32,
        };
        // A wall at constant distance facing the camera
        let depth = vec![10.0; 32 * 32];
        let kernel = generate_kernel(32);
        let ao = reference_occlusion(&depth, screen, (16, 16), Vec3::Z, &kernel, 6.0, 1.0, 0.01);
        assert!(ao > 0.99, "flat wall occluded to {}", ao);
    }

    #[test]
    fn occlusion_factor_clamps() {
        assert_eq!(occlusion_factor(1.0, 0.0, 16), 1.0);
        assert_eq!(occlusion_factor(2.0, 16.0, 16), 0.0);
        assert!((occlusion_factor(1.0, 4.0, 16) - 0.75).abs() < 1e-6);
    }
}
