// tests/test_gpu_smoke.rs
// Renders the demo scene on a real adapter. Ignored by default; run with
// `--ignored` on a machine with a GPU or a software Vulkan/Metal driver.

use deferred_forge::cli::demo_scene;
use deferred_forge::core::WgpuBackend;
use deferred_forge::{DeferredRenderer, RendererConfig};

#[test]
#[ignore]
fn demo_scene_renders_on_hardware() {
    let backend = match WgpuBackend::headless() {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("skipping: {err}");
            return;
        }
    };
    let mut config = RendererConfig {
        width: 160,
        height: 96,
        ..Default::default()
    };
    config.shadows.shadow_map_size = 256;
    let clear = config.clear_color;
    let mut renderer = DeferredRenderer::new(backend, config).unwrap();
    let (scene, camera) = demo_scene(&mut renderer, 160.0 / 96.0, true).unwrap();
    for _ in 0..2 {
        renderer.render_frame(&scene, &camera).unwrap();
    }
    assert!(renderer.backend().pipeline_count() > 0);

    let lit = renderer.lit_target();
    let pixels = renderer.backend_mut().read_target(lit, 0, 0, 0).unwrap();
    assert_eq!((pixels.width, pixels.height), (160, 96));
    assert!(pixels.data.iter().all(|v| v.is_finite()));

    // Top row looks over the plane at the sky
    let sky = pixels.texel(0, 0);
    for c in 0..3 {
        assert!((sky[c] - clear[c]).abs() < 1e-2, "sky {:?} vs {:?}", sky, clear);
    }
    // Centre of the frame sees lit geometry
    let centre = pixels.texel(80, 60);
    assert!(centre[..3].iter().any(|c| (c - clear[0]).abs() > 1e-2));
}
