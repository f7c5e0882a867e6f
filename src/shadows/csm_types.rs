// src/shadows/csm_types.rs
// Cascade records, shadow configuration and debugging statistics
// RELEVANT FILES: src/shadows/csm.rs, src/config.rs

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::programs::MAX_CASCADES;
use crate::error::{RenderError, RenderResult};

const MIN_SHADOW_MAP_SIZE: u32 = 16;
const MAX_SHADOW_MAP_SIZE: u32 = 8192;
const MAX_BLUR_WIDTH: u32 = 15;

/// One split of the view frustum with its stabilized light transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cascade {
    /// View-space distance where the split starts
    pub near_distance: f32,
    pub far_distance: f32,
    pub light_projection: Mat4,
    pub light_view: Mat4,
    /// World space to shadow-map texture space (`uv` in xy, depth in z)
    pub biased_view_projection: Mat4,
    /// World-space size of one shadow texel
    pub stabilization_texel_size: f32,
    /// World-space centre of the enclosing sphere
    pub bounding_sphere_center: Vec3,
    pub bounding_sphere_radius_sq: f32,
}

impl Default for Cascade {
    fn default() -> Self {
        Self {
            near_distance: 0.0,
            far_distance: 0.0,
            light_projection: Mat4::IDENTITY,
            light_view: Mat4::IDENTITY,
            biased_view_projection: Mat4::IDENTITY,
            stabilization_texel_size: 0.0,
            bounding_sphere_center: Vec3::ZERO,
            bounding_sphere_radius_sq: 0.0,
        }
    }
}

impl Cascade {
    /// Clip-space transform used when rendering occluders
    pub fn view_projection(&self) -> Mat4 {
        self.light_projection * self.light_view
    }

    pub fn radius(&self) -> f32 {
        self.bounding_sphere_radius_sq.sqrt()
    }

    /// Whether a world-space point falls inside this cascade's sphere
    pub fn contains(&self, world: Vec3) -> bool {
        world.distance_squared(self.bounding_sphere_center) <= self.bounding_sphere_radius_sq
    }
}

/// Cascaded shadow map configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsmConfig {
    pub cascade_count: u32,
    /// Width and height of each atlas layer
    pub shadow_map_size: u32,
    /// Blend between uniform (0) and logarithmic (1) splits
    pub split_lambda: f32,
    pub max_shadow_distance: f32,
    /// Variance floor for the Chebyshev bound
    pub min_variance: f32,
    /// Fraction of the Chebyshev tail cut off to reduce light bleeding
    pub light_bleed_reduction: f32,
    /// Gaussian blur taps (odd, 1 disables the blur)
    pub blur_width: u32,
}

impl Default for CsmConfig {
    fn default() -> Self {
        Self {
            cascade_count: 4,
            shadow_map_size: 2048,
            split_lambda: 0.85,
            max_shadow_distance: 150.0,
            min_variance: 2.0e-5,
            light_bleed_reduction: 0.2,
            blur_width: 5,
        }
    }
}

impl CsmConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.cascade_count == 0 || self.cascade_count as usize > MAX_CASCADES {
            return Err(RenderError::invalid_config(format!(
                "cascade_count must be between 1 and {}, got {}",
                MAX_CASCADES, self.cascade_count
            )));
        }
        if self.shadow_map_size < MIN_SHADOW_MAP_SIZE || self.shadow_map_size > MAX_SHADOW_MAP_SIZE {
            return Err(RenderError::invalid_config(format!(
                "shadow_map_size must be between {} and {}",
                MIN_SHADOW_MAP_SIZE, MAX_SHADOW_MAP_SIZE
            )));
        }
        if !(0.0..=1.0).contains(&self.split_lambda) {
            return Err(RenderError::invalid_config("split_lambda must lie in [0, 1]"));
        }
        if !(self.max_shadow_distance > 0.0) {
            return Err(RenderError::invalid_config("max_shadow_distance must be positive"));
        }
        if !(self.min_variance >= 0.0) {
            return Err(RenderError::invalid_config("min_variance must be non-negative"));
        }
        if !(0.0..1.0).contains(&self.light_bleed_reduction) {
            return Err(RenderError::invalid_config("light_bleed_reduction must lie in [0, 1)"));
        }
        if self.blur_width % 2 == 0 || self.blur_width > MAX_BLUR_WIDTH {
            return Err(RenderError::invalid_config(format!(
                "blur_width must be odd and at most {}, got {}",
                MAX_BLUR_WIDTH, self.blur_width
            )));
        }
        Ok(())
    }
}

/// Coverage summary of a set of cascades
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeStatistics {
    /// Per-cascade world-space area of one texel
    pub texel_areas: Vec<f32>,
    /// Total view depth covered, first near to last far
    pub depth_range_coverage: f32,
    /// Adjacent cascades whose boundaries do not meet
    pub gaps: u32,
}

impl CascadeStatistics {
    pub fn from_cascades(cascades: &[Cascade]) -> Self {
        let texel_areas = cascades
            .iter()
            .map(|c| c.stabilization_texel_size * c.stabilization_texel_size)
            .collect();
        let depth_range_coverage = match (cascades.first(), cascades.last()) {
            (Some(first), Some(last)) => last.far_distance - first.near_distance,
            _ => 0.0,
        };
        let gaps = cascades
            .windows(2)
            .filter(|w| (w[0].far_distance - w[1].near_distance).abs() > 1e-5)
            .count() as u32;
        Self {
            texel_areas,
            depth_range_coverage,
            gaps,
        }
    }
}
