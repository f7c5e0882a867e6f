// src/post/ssao_kernel.rs
// Deterministic hemisphere kernel for screen-space ambient occlusion
// RELEVANT FILES: src/shaders/ssao_occlusion.wgsl, src/post/ssao.rs

use glam::Vec3;

/// Radical inverse of `index` in `base` (Halton low-discrepancy sequence).
///
/// Index 0 maps to 0; callers start at 1.
pub fn halton(index: u32, base: u32) -> f32 {
    let mut result = 0.0f32;
    let mut f = 1.0f32;
    let mut i = index;
    while i > 0 {
        f /= base as f32;
        result += f * (i % base) as f32;
        i /= base;
    }
    result
}

/// Shortest kernel vector, keeps the nearest samples off the origin
const MIN_SCALE: f32 = 0.1;
/// Minimum tangent-space height so no sample lies in the surface plane
const MIN_ELEVATION: f32 = 0.05;

/// `size` tangent-space offsets in the +Z hemisphere with length at most 1.
///
/// Directions come from Halton bases 2, 3 and 5; lengths grow quadratically
/// with the sample index so the set clusters near the origin.
pub fn generate_kernel(size: usize) -> Vec<Vec3> {
    (0..size)
        .map(|i| {
            let index = i as u32 + 1;
            let raw = Vec3::new(
                halton(index, 2) * 2.0 - 1.0,
                halton(index, 3) * 2.0 - 1.0,
                halton(index, 5).max(MIN_ELEVATION),
            );
            let direction = raw.try_normalize().unwrap_or(Vec3::Z);
            let t = i as f32 / size as f32;
            let scale = MIN_SCALE + (1.0 - MIN_SCALE) * t * t;
            direction * scale
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halton_matches_known_values() {
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert_eq!(halton(3, 2), 0.75);
        assert!((halton(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((halton(4, 3) - 4.0 / 9.0).abs() < 1e-6);
        assert_eq!(halton(0, 7), 0.0);
    }

    #[test]
    fn kernel_lies_in_unit_hemisphere() {
        let kernel = generate_kernel(64);
        assert_eq!(kernel.len(), 64);
        for k in &kernel {
            assert!(k.z > 0.0);
            assert!(k.length() <= 1.0 + 1e-6);
            assert!(k.length() >= MIN_SCALE - 1e-6);
        }
    }

    #[test]
    fn kernel_is_deterministic_and_clustered() {
        let a = generate_kernel(32);
        assert_eq!(a, generate_kernel(32));
        let near_half: f32 = a[..16].iter().map(|k| k.length()).sum();
        let far_half: f32 = a[16..].iter().map(|k| k.length()).sum();
        assert!(near_half < far_half);
    }
}
