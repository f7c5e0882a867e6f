// src/lighting/shading.rs
// CPU mirrors of the light programs' shading terms
// RELEVANT FILES: src/shaders/lighting_common.wgsl, src/shaders/light_directional.wgsl

use glam::{Vec2, Vec3};

/// G-buffer alpha to Blinn-Phong exponent
pub const SHININESS_SCALE: f32 = 128.0;

/// One-sided Chebyshev upper bound on the lit fraction at receiver depth `t`.
///
/// `moments` is (E[z], E[z^2]). The tail below `bleed` is cut and the rest
/// rescaled to `[0, 1]`.
pub fn chebyshev_upper_bound(moments: Vec2, t: f32, min_variance: f32, bleed: f32) -> f32 {
    if t <= moments.x {
        return 1.0;
    }
    let variance = (moments.y - moments.x * moments.x).max(min_variance);
    let d = t - moments.x;
    let p_max = variance / (variance + d * d);
    ((p_max - bleed) / (1.0 - bleed)).clamp(0.0, 1.0)
}

/// Lambert diffuse plus Blinn-Phong specular.
///
/// `shininess` of 0 disables the specular term.
pub fn blinn_phong(albedo: Vec3, shininess: f32, n: Vec3, l: Vec3, v: Vec3, color: Vec3) -> Vec3 {
    let n_dot_l = n.dot(l).max(0.0);
    let mut result = albedo * color * n_dot_l;
    if shininess > 0.0 && n_dot_l > 0.0 {
        let h = (l + v).normalize();
        result += color * n.dot(h).max(0.0).powf(shininess);
    }
    result
}

/// View-space normal packed into `[0, 1]` as the geometry pass stores it
pub fn encode_normal(n: Vec3) -> Vec3 {
    n * 0.5 + 0.5
}

pub fn decode_normal(encoded: Vec3) -> Vec3 {
    (encoded * 2.0 - 1.0).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_in_front_is_fully_lit() {
        assert_eq!(chebyshev_upper_bound(Vec2::new(0.5, 0.25), 0.4, 1e-5, 0.2), 1.0);
    }

    #[test]
    fn receiver_far_behind_is_dark() {
        let vis = chebyshev_upper_bound(Vec2::new(0.2, 0.04), 0.9, 1e-5, 0.2);
        assert!(vis < 1e-3);
    }

    #[test]
    fn bleed_reduction_darkens_partial_shadow() {
        let m = Vec2::new(0.5, 0.26);
        let raw = chebyshev_upper_bound(m, 0.6, 1e-5, 0.0);
        let reduced = chebyshev_upper_bound(m, 0.6, 1e-5, 0.3);
        assert!(raw > 0.0 && raw < 1.0);
        assert!(reduced < raw);
    }

    #[test]
    fn zero_shininess_has_no_highlight() {
        let n = Vec3::Z;
        let lit = blinn_phong(Vec3::splat(0.5), 0.0, n, n, n, Vec3::ONE);
        assert!((lit - Vec3::splat(0.5)).length() < 1e-6);
        let shiny = blinn_phong(Vec3::splat(0.5), 32.0, n, n, n, Vec3::ONE);
        assert!((shiny - Vec3::splat(1.5)).length() < 1e-5);
    }

    #[test]
    fn normal_encoding_inverts() {
        let n = Vec3::new(0.3, -0.8, 0.52).normalize();
        assert!((decode_normal(encode_normal(n)) - n).length() < 1e-6);
    }
}
