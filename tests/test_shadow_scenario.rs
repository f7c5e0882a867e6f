// tests/test_shadow_scenario.rs
// A camera straight above a ground plane under a sun. The ground and a small
// occluder are both casters; their moments are rasterized into the atlas and
// visibility is evaluated from what was actually written.

use deferred_forge::core::{
    GpuBackend, MeshData, RecordingBackend, RenderContext, ResourceRegistry, ShadingClass,
};
use deferred_forge::lighting::shading::chebyshev_upper_bound;
use deferred_forge::lighting::Light;
use deferred_forge::scene::{Material, MeshHandle, ObjectRecord, Scene, ShadowCaster, Transform};
use deferred_forge::shadows::farthest_occluder_distance;
use deferred_forge::{
    Camera, CascadedShadowMaps, CsmConfig, DeferredRenderer, Projection, RendererConfig,
};
use glam::{Vec2, Vec3, Vec4};

const MAP_SIZE: u32 = 256;

fn sun() -> Vec3 {
    Vec3::new(0.3, 1.0, 0.2).normalize()
}

fn camera() -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 3.0, 0.0),
        Vec3::ZERO,
        Vec3::Y,
        Projection::new(60.0_f32.to_radians(), 16.0 / 9.0, 0.1, 100.0),
    )
}

/// Ground point under the occluder
fn shadowed_point() -> Vec3 {
    Vec3::new(0.8, 0.0, 0.0)
}

/// Ground point well away from the occluder's shadow
fn open_point() -> Vec3 {
    Vec3::new(-1.0, 0.0, -0.5)
}

fn occluder() -> Vec3 {
    shadowed_point() + sun() * 1.5
}

fn spawn_casters(scene: &mut Scene, plane: MeshHandle, cube: MeshHandle) {
    scene.spawn(
        ObjectRecord::new()
            .with(Transform::default())
            .with(plane)
            .with(Material::new(Vec3::ONE, 0.0))
            .with(ShadowCaster(true)),
    );
    scene.spawn(
        ObjectRecord::new()
            .with(Transform::from_translation(occluder()))
            .with(cube)
            .with(Material::new(Vec3::ONE, 0.0))
            .with(ShadowCaster(true)),
    );
}

fn handle<B: GpuBackend>(backend: &mut B, mesh: &MeshData) -> MeshHandle {
    MeshHandle {
        mesh: backend.upload_mesh(mesh).unwrap(),
        bounding_radius: mesh.bounding_radius(),
    }
}

struct Fixture {
    ctx: RenderContext<RecordingBackend>,
    csm: CascadedShadowMaps,
}

fn fixture() -> Fixture {
    let mut ctx = RenderContext::new(RecordingBackend::with_raster());
    let mut registry = ResourceRegistry::new();
    let config = CsmConfig {
        shadow_map_size: MAP_SIZE,
        ..Default::default()
    };
    let mut csm = CascadedShadowMaps::new(&mut ctx, &mut registry, config).unwrap();

    let plane = handle(ctx.backend_mut(), &MeshData::plane(10.0));
    let cube = handle(ctx.backend_mut(), &MeshData::cube(0.3));
    let mut scene = Scene::new();
    spawn_casters(&mut scene, plane, cube);

    let z_max = farthest_occluder_distance(&scene, sun());
    assert!((z_max - plane.bounding_radius).abs() < 1e-4);
    let camera = camera();
    csm.calculate_matrices(sun(), &camera.projection, camera.view(), z_max)
        .unwrap();
    csm.render(&mut ctx, &scene).unwrap();
    Fixture { ctx, csm }
}

fn shadow_coords(csm: &CascadedShadowMaps, cascade: usize, world: Vec3) -> Vec4 {
    let p = csm.cascades()[cascade].biased_view_projection * world.extend(1.0);
    p / p.w
}

/// Filtered moments of cascade 0 at `world`, and the receiver depth there
fn lookup(f: &Fixture, world: Vec3) -> (Vec2, f32) {
    let raster = f.ctx.backend().raster().unwrap();
    let layer = raster.color(f.csm.atlas(), 0, 0, 0).unwrap();
    let coord = shadow_coords(&f.csm, 0, world);
    (layer.bilinear_rg(Vec2::new(coord.x, coord.y)), coord.z)
}

fn visibility(f: &Fixture, world: Vec3) -> f32 {
    let (moments, t) = lookup(f, world);
    let config = f.csm.config();
    chebyshev_upper_bound(moments, t, config.min_variance, config.light_bleed_reduction)
}

#[test]
fn nearest_cascade_covers_the_ground_below_the_camera() {
    let f = fixture();
    let cascades = f.csm.cascades();
    assert_eq!(cascades.len(), 4);
    for point in [Vec3::ZERO, shadowed_point(), open_point()] {
        let selected = cascades.iter().position(|c| c.contains(point));
        assert_eq!(selected, Some(0), "{:?}", point);
    }
    for other in &cascades[1..] {
        assert!(cascades[0].stabilization_texel_size < other.stabilization_texel_size);
    }
    for p in [shadowed_point(), occluder()] {
        let c = shadow_coords(&f.csm, 0, p);
        assert!((0.0..=1.0).contains(&c.x) && (0.0..=1.0).contains(&c.y), "{:?}", c);
        assert!((0.0..=1.0).contains(&c.z), "{:?}", c);
    }
}

#[test]
fn ground_writes_its_own_depth_into_the_atlas() {
    let f = fixture();
    let (moments, t) = lookup(&f, open_point());
    // Not the cleared (1, 1)
    assert!(moments.x < 0.99, "{:?}", moments);
    assert!((moments.x - t).abs() < 1e-3, "mean {} vs receiver {}", moments.x, t);
    assert!(moments.y >= moments.x * moments.x - 1e-6);
    assert!(visibility(&f, open_point()) > 0.95);
}

#[test]
fn occluded_ground_is_dark() {
    let f = fixture();
    let (moments, t) = lookup(&f, shadowed_point());
    let (_, occluder_depth) = lookup(&f, occluder());
    assert!(occluder_depth < t);
    // The occluder, not the ground, is what the map holds above the receiver
    assert!(moments.x < t - 0.02, "mean {} vs receiver {}", moments.x, t);
    assert!(visibility(&f, shadowed_point()) < 0.05);
}

#[test]
fn only_shadowed_ground_loses_the_sun_in_the_frame() {
    let mut config = RendererConfig {
        width: 64,
        height: 36,
        ..Default::default()
    };
    config.shadows.shadow_map_size = MAP_SIZE;
    config.ssao.enabled = false;
    let ambient = config.ambient;
    let mut renderer = DeferredRenderer::new(RecordingBackend::with_raster(), config).unwrap();

    let plane = handle(renderer.backend_mut(), &MeshData::plane(10.0));
    let cube = handle(renderer.backend_mut(), &MeshData::cube(0.3));
    let mut scene = Scene::new();
    spawn_casters(&mut scene, plane, cube);
    scene.spawn(ObjectRecord::new().with(Light::directional(sun(), Vec3::ONE)));

    let camera = camera();
    let report = renderer.render_frame(&scene, &camera).unwrap();
    assert_eq!(report.lighting.shadowed, 1);

    let raster = renderer.backend().raster().unwrap();
    let lit = raster.color(renderer.lit_target(), 0, 0, 0).unwrap();
    let stencil = raster.stencil(renderer.gbuffer().target(), 0).unwrap();
    let pixel_of = |world: Vec3| {
        let ndc = camera.view_projection().project_point3(world);
        let x = ((ndc.x * 0.5 + 0.5) * 64.0) as u32;
        let y = ((0.5 - ndc.y * 0.5) * 36.0) as u32;
        (y * 64 + x) as usize
    };

    let shadowed = pixel_of(shadowed_point());
    let open = pixel_of(open_point());
    for i in [shadowed, open] {
        assert_eq!(stencil[i], ShadingClass::Shaded as u8);
    }
    // White ground facing +Y: ambient everywhere, plus n.l where the sun reaches
    let n_dot_l = sun().y;
    assert!((lit.texels[shadowed].x - ambient.x).abs() < 0.05 * n_dot_l);
    assert!((lit.texels[open].x - (ambient.x + n_dot_l)).abs() < 0.05 * n_dot_l);
}
