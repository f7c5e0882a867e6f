// tests/test_ssao.rs
// Ambient occlusion through the full renderer and against the CPU estimate.

use deferred_forge::core::backend::TextureView;
use deferred_forge::core::{RecordingBackend, UniformValue};
use deferred_forge::post::ssao_kernel::generate_kernel;
use deferred_forge::post::ssao_math::{reference_occlusion, ScreenParams};
use deferred_forge::scene::Scene;
use deferred_forge::{Camera, DeferredRenderer, Projection, RendererConfig};
use glam::{Vec2, Vec3};

fn renderer(configure: impl FnOnce(&mut RendererConfig)) -> DeferredRenderer<RecordingBackend> {
    let mut config = RendererConfig {
        width: 200,
        height: 120,
        ..Default::default()
    };
    config.shadows.shadow_map_size = 64;
    configure(&mut config);
    DeferredRenderer::new(RecordingBackend::new(), config).unwrap()
}

fn camera() -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 1.0, 5.0),
        Vec3::ZERO,
        Vec3::Y,
        Projection::infinite(50.0_f32.to_radians(), 200.0 / 120.0, 0.1),
    )
}

#[test]
fn depth_chain_reads_the_previous_level() {
    let mut renderer = renderer(|c| c.ssao.mip_levels = 4);
    renderer.render_frame(&Scene::new(), &camera()).unwrap();
    let linear = renderer.ssao().linear_depth();
    let extents = renderer.ssao().config().mip_extents(200, 120);
    assert_eq!(extents, vec![(200, 120), (100, 60), (50, 30), (25, 15)]);

    let downsamples: Vec<_> = renderer
        .backend()
        .draws()
        .filter(|d| d.label == "ssao_downsample")
        .collect();
    assert_eq!(downsamples.len(), 3);
    for (i, draw) in downsamples.iter().enumerate() {
        let level = i as u32 + 1;
        assert_eq!(draw.target.target, linear);
        assert_eq!(draw.target.mip_level, level);
        let (_, source) = draw.textures.iter().find(|(n, _)| *n == "source").unwrap();
        assert_eq!(source.target, linear);
        assert_eq!(source.view, TextureView::Mip(level - 1));
        let (w, h) = extents[level as usize - 1];
        assert_eq!(
            draw.uniforms.get("source_extent"),
            Some(&UniformValue::Vec4(glam::Vec4::new(w as f32, h as f32, 0.0, 0.0)))
        );
    }

    let occlusion = renderer
        .backend()
        .draws()
        .find(|d| d.label == "ssao_occlusion")
        .unwrap();
    assert_eq!(occlusion.uniforms.get("mip_levels"), Some(&UniformValue::UInt(4)));
    assert_eq!(occlusion.uniforms.get("kernel_size"), Some(&UniformValue::UInt(64)));
}

#[test]
fn disabled_ssao_leaves_the_lit_image_alone() {
    let mut renderer = renderer(|c| c.ssao.enabled = false);
    let report = renderer.render_frame(&Scene::new(), &camera()).unwrap();
    assert!(!report.ssao);
    assert!(!renderer.backend().draws().any(|d| d.label.starts_with("ssao_")));
}

#[test]
fn json_config_drives_the_pass() {
    let config = RendererConfig::from_json_str(
        r#"{"width": 96, "height": 64, "shadows": {"shadow_map_size": 64},
            "ssao": {"kernel_size": 12, "mip_levels": 2, "blur_width": 3}}"#,
    )
    .unwrap();
    let mut renderer = DeferredRenderer::new(RecordingBackend::new(), config).unwrap();
    assert_eq!(renderer.ssao().kernel().len(), 12);
    renderer.render_frame(&Scene::new(), &camera()).unwrap();
    let downsamples = renderer
        .backend()
        .draws()
        .filter(|d| d.label == "ssao_downsample")
        .count();
    assert_eq!(downsamples, 1);
    let blur = renderer
        .backend()
        .draws()
        .find(|d| d.label == "ssao_blur_h")
        .unwrap();
    assert_eq!(blur.uniforms.get("radius"), Some(&UniformValue::UInt(1)));
}

#[test]
fn pit_is_darker_than_open_ground() {
    let screen = ScreenParams {
        focal: Vec2::new(1.0, 1.0),
        proj_scale: 16.0,
        width: 32,
        height: 32,
    };
    let kernel = generate_kernel(32);

    let open = vec![10.0f32; 32 * 32];
    let open_ao = reference_occlusion(&open, screen, (16, 16), Vec3::Z, &kernel, 24.0, 1.0, 0.01);

    // Every neighbour sits much closer to the camera than the centre pixel
    let mut pit = vec![5.0f32; 32 * 32];
    pit[16 * 32 + 16] = 10.0;
    let pit_ao = reference_occlusion(&pit, screen, (16, 16), Vec3::Z, &kernel, 24.0, 1.0, 0.01);

    assert!(open_ao > 0.99, "open ground occluded to {}", open_ao);
    assert!(pit_ao < 0.9, "pit only occluded to {}", pit_ao);
}
