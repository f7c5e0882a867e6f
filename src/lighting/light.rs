// src/lighting/light.rs
// Light components and point-light falloff calibration
// RELEVANT FILES: src/lighting/pass.rs, src/shaders/light_point.wgsl

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Light attached to a scene object.
///
/// Point lights take their position from the object's transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Light {
    Directional {
        /// Unit vector from the surface toward the light, world space
        direction: Vec3,
        color: Vec3,
        casts_shadows: bool,
    },
    Point {
        color: Vec3,
        /// Distance at which the light falls to half intensity
        half_life_distance: f32,
        /// Distance at which the light falls to a quarter intensity
        three_quarter_life_distance: f32,
    },
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        Light::Directional {
            direction,
            color,
            casts_shadows: true,
        }
    }

    pub fn point(color: Vec3, half_life_distance: f32, three_quarter_life_distance: f32) -> Self {
        Light::Point {
            color,
            half_life_distance,
            three_quarter_life_distance,
        }
    }

    pub fn color(&self) -> Vec3 {
        match self {
            Light::Directional { color, .. } | Light::Point { color, .. } => *color,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Light::Directional { .. } => "directional",
            Light::Point { .. } => "point",
        }
    }
}

/// Falloff `f(d) = 1 / (1 + (linear * d^2)^exponent)`.
///
/// With `linear = 1/h^2`, `quadratic = 1/q^2` and
/// `exponent = ln 3 / ln(linear / quadratic)`, `f(h) = 1/2` and `f(q) = 1/4`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointAttenuation {
    pub linear: f32,
    pub quadratic: f32,
    pub exponent: f32,
}

impl PointAttenuation {
    pub fn from_distances(half_life: f32, three_quarter_life: f32) -> RenderResult<Self> {
        if !(half_life > 0.0 && half_life.is_finite()) {
            return Err(RenderError::degenerate(format!(
                "half-life distance {} must be positive",
                half_life
            )));
        }
        if !(three_quarter_life > half_life && three_quarter_life.is_finite()) {
            return Err(RenderError::degenerate(format!(
                "three-quarter-life distance {} must exceed half-life {}",
                three_quarter_life, half_life
            )));
        }
        let linear = 1.0 / (half_life * half_life);
        let quadratic = 1.0 / (three_quarter_life * three_quarter_life);
        let exponent = 3.0_f32.ln() / (linear / quadratic).ln();
        Ok(Self {
            linear,
            quadratic,
            exponent,
        })
    }

    /// Calibration for a point light, `None` for other kinds
    pub fn for_light(light: &Light) -> Option<RenderResult<Self>> {
        match light {
            Light::Point {
                half_life_distance,
                three_quarter_life_distance,
                ..
            } => Some(Self::from_distances(
                *half_life_distance,
                *three_quarter_life_distance,
            )),
            Light::Directional { .. } => None,
        }
    }

    pub fn evaluate(&self, distance: f32) -> f32 {
        let scaled = self.linear * distance * distance;
        if scaled <= 0.0 {
            return 1.0;
        }
        1.0 / (1.0 + scaled.powf(self.exponent))
    }

    /// Uniform packing: x = linear, y = quadratic, z = exponent
    pub fn to_vec4(&self) -> Vec4 {
        Vec4::new(self.linear, self.quadratic, self.exponent, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_points_hold() {
        for (h, q) in [(1.0, 2.0), (5.0, 7.5), (0.3, 10.0), (12.0, 12.5)] {
            let att = PointAttenuation::from_distances(h, q).unwrap();
            assert!((att.evaluate(h) - 0.5).abs() < 1e-4, "h={} q={}", h, q);
            assert!((att.evaluate(q) - 0.25).abs() < 1e-4, "h={} q={}", h, q);
            assert_eq!(att.evaluate(0.0), 1.0);
            assert!(att.evaluate(q * 2.0) < 0.25);
        }
    }

    #[test]
    fn invalid_distances_are_degenerate() {
        for (h, q) in [(0.0, 1.0), (2.0, 2.0), (3.0, 1.0), (-1.0, 4.0)] {
            assert!(matches!(
                PointAttenuation::from_distances(h, q),
                Err(RenderError::Degenerate(_))
            ));
        }
    }

    #[test]
    fn light_serializes_with_kind_tag() {
        let light = Light::point(Vec3::ONE, 2.0, 4.0);
        let json = serde_json::to_string(&light).unwrap();
        assert!(json.contains("\"kind\":\"point\""));
        let back: Light = serde_json::from_str(&json).unwrap();
        assert_eq!(back, light);
        assert!(PointAttenuation::for_light(&Light::directional(Vec3::Y, Vec3::ONE)).is_none());
    }
}
