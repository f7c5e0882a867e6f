// src/shadows/cascade_math.rs
// Split distances, light basis and texel snapping for stabilized cascades
// RELEVANT FILES: src/shadows/csm.rs, src/shaders/light_directional.wgsl

use glam::{Mat4, Vec3};

/// Above this |L·up| the preferred up vector is considered parallel to L
const PARALLEL_THRESHOLD: f32 = 0.99;

/// Split boundaries `[near_0, far_0 = near_1, ..., far_{N-1}]`.
///
/// Practical split scheme blending uniform and logarithmic distributions by
/// `lambda`, computed farthest first so each boundary is clamped to the one
/// after it. The last boundary is `min(camera_far, max_shadow_distance)`.
pub fn calculate_cascade_splits(
    cascade_count: u32,
    near: f32,
    camera_far: Option<f32>,
    max_shadow_distance: f32,
    lambda: f32,
) -> Vec<f32> {
    let n = cascade_count.max(1) as usize;
    let shadow_far = camera_far
        .map_or(max_shadow_distance, |far| far.min(max_shadow_distance))
        .max(near);

    let mut splits = vec![near; n + 1];
    splits[n] = shadow_far;
    let range = shadow_far - near;
    let ratio = shadow_far / near;
    for j in (1..n).rev() {
        let t = j as f32 / n as f32;
        let uniform = near + t * range;
        let logarithmic = near * ratio.powf(t);
        let blended = uniform + (logarithmic - uniform) * lambda;
        splits[j] = blended.min(splits[j + 1]).max(near);
    }
    splits
}

/// Pad a cascade radius by `res / (res - 1)` plus one texel of bias.
///
/// Returns `(radius, texel_size)` where `texel_size = 2 * radius / res`.
pub fn pad_radius(radius: f32, resolution: u32) -> (f32, f32) {
    let res = resolution.max(2) as f32;
    let scaled = radius * res / (res - 1.0);
    let padded = scaled + 2.0 * scaled / res;
    (padded, 2.0 * padded / res)
}

/// Up vector for the light view: Y, falling back to Z then X when parallel to L.
pub fn light_up_vector(light_direction: Vec3) -> Vec3 {
    [Vec3::Y, Vec3::Z]
        .into_iter()
        .find(|up| light_direction.dot(*up).abs() <= PARALLEL_THRESHOLD)
        .unwrap_or(Vec3::X)
}

/// Light view looking from `center` along `-L`, translation snapped to the texel grid.
pub fn stabilized_light_view(center: Vec3, light_direction: Vec3, texel_size: f32) -> Mat4 {
    let up = light_up_vector(light_direction);
    let view = Mat4::look_at_rh(center, center - light_direction, up);
    snap_to_texel_grid(view, texel_size)
}

/// Round the view translation down to whole texels on all three axes.
pub fn snap_to_texel_grid(view: Mat4, texel_size: f32) -> Mat4 {
    if !(texel_size > 0.0) {
        return view;
    }
    let mut snapped = view;
    let t = view.w_axis.truncate();
    let grid = (t / texel_size).floor() * texel_size;
    snapped.w_axis = grid.extend(view.w_axis.w);
    snapped
}

/// Orthographic projection of a stabilized cascade.
///
/// `[-r, r]` in X/Y; along the light axis the near plane is pulled back by
/// `z_near_correction` so occluders between the sphere and the light still
/// land in the map.
pub fn cascade_projection(radius: f32, z_near_correction: f32) -> Mat4 {
    Mat4::orthographic_rh(
        -radius,
        radius,
        -radius,
        radius,
        -radius - z_near_correction,
        radius,
    )
}

/// Clip space to shadow-map texture space: xy from `[-1, 1]` to `[0, 1]` with
/// y flipped, depth unchanged.
pub fn texture_space_bias() -> Mat4 {
    Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0)) * Mat4::from_scale(Vec3::new(0.5, -0.5, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_are_monotonic_and_clamped() {
        for n in 1..=8 {
            for lambda in [0.0, 0.25, 0.5, 0.85, 1.0] {
                let splits = calculate_cascade_splits(n, 0.1, Some(500.0), 150.0, lambda);
                assert_eq!(splits.len(), n as usize + 1);
                assert_eq!(splits[0], 0.1);
                assert_eq!(*splits.last().unwrap(), 150.0);
                for w in splits.windows(2) {
                    assert!(w[0] <= w[1], "{:?}", splits);
                }
            }
        }
    }

    #[test]
    fn infinite_projection_uses_shadow_distance() {
        let splits = calculate_cascade_splits(4, 0.5, None, 80.0, 0.7);
        assert_eq!(*splits.last().unwrap(), 80.0);
        let closer = calculate_cascade_splits(4, 0.5, Some(40.0), 80.0, 0.7);
        assert_eq!(*closer.last().unwrap(), 40.0);
    }

    #[test]
    fn uniform_lambda_gives_even_splits() {
        let splits = calculate_cascade_splits(4, 1.0, Some(9.0), 100.0, 0.0);
        for (s, expected) in splits.iter().zip([1.0, 3.0, 5.0, 7.0, 9.0]) {
            assert!((s - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn padding_adds_texel_border() {
        let (r, texel) = pad_radius(10.0, 1024);
        assert!(r > 10.0);
        assert!((texel - 2.0 * r / 1024.0).abs() < 1e-7);
    }

    #[test]
    fn up_vector_fallbacks() {
        assert_eq!(light_up_vector(Vec3::new(1.0, 1.0, 0.0).normalize()), Vec3::Y);
        assert_eq!(light_up_vector(Vec3::Y), Vec3::Z);
        assert_eq!(light_up_vector(Vec3::NEG_Y), Vec3::Z);
    }

    #[test]
    fn snapped_translation_is_on_grid() {
        let view = stabilized_light_view(
            Vec3::new(3.17, 0.4, -8.91),
            Vec3::new(0.3, 0.8, 0.2).normalize(),
            0.05,
        );
        for c in view.w_axis.truncate().to_array() {
            let cells = c / 0.05;
            assert!((cells - cells.round()).abs() < 1e-3, "{} off grid", c);
        }
    }

    #[test]
    fn bias_maps_clip_corners_to_texture_corners() {
        let bias = texture_space_bias();
        let top_left = bias.transform_point3(Vec3::new(-1.0, 1.0, 0.3));
        assert!((top_left - Vec3::new(0.0, 0.0, 0.3)).length() < 1e-6);
        let bottom_right = bias.transform_point3(Vec3::new(1.0, -1.0, 0.0));
        assert!((bottom_right - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-6);
    }
}
