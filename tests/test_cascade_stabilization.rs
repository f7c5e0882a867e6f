// tests/test_cascade_stabilization.rs
// Cascades stay on the shadow texel grid as the camera moves, so static
// geometry does not shimmer.

use deferred_forge::core::{RecordingBackend, RenderContext, ResourceRegistry};
use deferred_forge::shadows::cascade_math::calculate_cascade_splits;
use deferred_forge::{CascadedShadowMaps, CsmConfig, Projection};
use glam::{Mat4, Vec3, Vec4};

const RES: u32 = 1024;

fn shadow_maps() -> CascadedShadowMaps {
    let mut ctx = RenderContext::new(RecordingBackend::new());
    let mut registry = ResourceRegistry::new();
    let config = CsmConfig {
        shadow_map_size: RES,
        ..Default::default()
    };
    CascadedShadowMaps::new(&mut ctx, &mut registry, config).unwrap()
}

fn projection() -> Projection {
    Projection::new(60.0_f32.to_radians(), 16.0 / 9.0, 0.1, 120.0)
}

fn sun() -> Vec3 {
    Vec3::new(-0.35, 1.0, 0.45)
}

/// Texel-space position of a world point in one cascade
fn texel_coords(bvp: Mat4, world: Vec3) -> (f32, f32) {
    let p = bvp * Vec4::from((world, 1.0));
    (p.x / p.w * RES as f32, p.y / p.w * RES as f32)
}

fn fract_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(1.0);
    d.min(1.0 - d)
}

#[test]
fn splits_are_monotonic_and_capped() {
    let splits = calculate_cascade_splits(4, 0.1, Some(500.0), 150.0, 0.85);
    assert_eq!(splits.len(), 5);
    assert_eq!(splits[0], 0.1);
    assert_eq!(splits[4], 150.0);
    for w in splits.windows(2) {
        assert!(w[0] < w[1], "splits not increasing: {:?}", splits);
    }

    let infinite = calculate_cascade_splits(4, 0.1, None, 80.0, 0.5);
    assert_eq!(infinite[4], 80.0);

    // lambda 0 is uniform
    let uniform = calculate_cascade_splits(4, 1.0, Some(9.0), 100.0, 0.0);
    for (s, expected) in uniform.iter().zip([1.0, 3.0, 5.0, 7.0, 9.0]) {
        assert!((s - expected).abs() < 1e-4, "{:?}", uniform);
    }
}

#[test]
fn translation_moves_shadow_maps_by_whole_texels() {
    let mut csm = shadow_maps();
    let anchors = [Vec3::ZERO, Vec3::new(3.7, 0.0, -12.2), Vec3::new(-8.1, 2.5, -30.0)];
    let base_view = Mat4::look_at_rh(Vec3::new(0.0, 4.0, 6.0), Vec3::new(0.0, 0.0, -10.0), Vec3::Y);

    csm.calculate_matrices(sun(), &projection(), base_view, f32::NEG_INFINITY)
        .unwrap();
    let reference: Vec<Vec<(f32, f32)>> = csm
        .cascades()
        .iter()
        .map(|c| anchors.iter().map(|a| texel_coords(c.biased_view_projection, *a)).collect())
        .collect();
    let radii: Vec<f32> = csm.cascades().iter().map(|c| c.radius()).collect();

    for step in [0.013f32, 0.21, 1.37, 5.5] {
        let offset = Vec3::new(step, 0.0, -0.6 * step);
        let view = base_view * Mat4::from_translation(-offset);
        csm.calculate_matrices(sun(), &projection(), view, f32::NEG_INFINITY)
            .unwrap();
        for (i, cascade) in csm.cascades().iter().enumerate() {
            assert!((cascade.radius() - radii[i]).abs() < 1e-3 * radii[i]);
            for (a, anchor) in anchors.iter().enumerate() {
                let (u, v) = texel_coords(cascade.biased_view_projection, *anchor);
                let (u0, v0) = reference[i][a];
                assert!(
                    fract_distance(u, u0) < 2e-2 && fract_distance(v, v0) < 2e-2,
                    "cascade {} anchor {} moved by a sub-texel amount at step {}: ({}, {}) vs ({}, {})",
                    i,
                    a,
                    step,
                    u,
                    v,
                    u0,
                    v0
                );
            }
        }
    }
}

#[test]
fn rotation_keeps_cascade_extent() {
    let mut csm = shadow_maps();
    let eye = Vec3::new(1.0, 3.0, 2.0);
    let mut texels = None;
    for yaw in [0.0f32, 30.0, 95.0, 200.0] {
        let dir = Vec3::new(yaw.to_radians().sin(), -0.3, -yaw.to_radians().cos());
        let view = Mat4::look_at_rh(eye, eye + dir, Vec3::Y);
        csm.calculate_matrices(sun(), &projection(), view, f32::NEG_INFINITY)
            .unwrap();
        let current: Vec<f32> = csm
            .cascades()
            .iter()
            .map(|c| c.stabilization_texel_size)
            .collect();
        match &texels {
            None => texels = Some(current),
            Some(first) => {
                for (a, b) in first.iter().zip(&current) {
                    assert!((a - b).abs() < 1e-4 * a, "texel size changed with rotation");
                }
            }
        }
    }
}

#[test]
fn cascades_tile_the_view_depth_without_gaps() {
    let mut csm = shadow_maps();
    let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 2.0, -1.0), Vec3::Y);
    csm.calculate_matrices(sun(), &projection(), view, f32::NEG_INFINITY)
        .unwrap();
    let stats = csm.statistics();
    assert_eq!(stats.gaps, 0);
    assert!((stats.depth_range_coverage - (120.0 - 0.1)).abs() < 1e-3);
    for w in stats.texel_areas.windows(2) {
        assert!(w[0] < w[1], "near cascades should be sharper: {:?}", stats.texel_areas);
    }
    assert!((csm.light_direction().length() - 1.0).abs() < 1e-5);
}

#[test]
fn zero_light_direction_is_rejected() {
    let mut csm = shadow_maps();
    let err = csm
        .calculate_matrices(Vec3::ZERO, &projection(), Mat4::IDENTITY, 0.0)
        .unwrap_err();
    assert!(matches!(err, deferred_forge::RenderError::Degenerate(_)));
}
