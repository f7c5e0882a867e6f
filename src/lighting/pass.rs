// src/lighting/pass.rs
// Additive per-light accumulation into the lit target, gated on Shaded pixels
// RELEVANT FILES: src/shaders/light_directional.wgsl, src/shaders/light_point.wgsl, src/shadows/csm.rs

use glam::Vec3;
use log::{debug, warn};

use super::light::{Light, PointAttenuation};
use crate::camera::Camera;
use crate::core::backend::{Geometry, GpuBackend, ProgramId, TargetId};
use crate::core::context::{RenderContext, StateScope};
use crate::core::gbuffer::GBuffer;
use crate::core::programs;
use crate::core::state::{BlendMode, DepthState, ShadingClass, StencilMode, TargetBinding};
use crate::error::{RenderError, RenderResult};
use crate::scene::{ObjectId, SceneQuery};
use crate::shadows::{farthest_occluder_distance, CascadedShadowMaps};

/// A light resolved to world space for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct LightInstance {
    pub id: ObjectId,
    pub light: Light,
    /// Transform translation, origin when the object has none
    pub position: Vec3,
}

/// Every object carrying a light, in id order
pub fn collect_lights<S: SceneQuery>(scene: &S) -> Vec<LightInstance> {
    scene
        .query_component::<Light>()
        .into_iter()
        .filter_map(|id| {
            let record = scene.record(id)?;
            Some(LightInstance {
                id,
                light: record.light.clone()?,
                position: record.transform.map(|t| t.translation).unwrap_or(Vec3::ZERO),
            })
        })
        .collect()
}

/// Lights drawn and skipped by one accumulation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LightingStats {
    pub directional: u32,
    pub point: u32,
    pub shadowed: u32,
    pub skipped: u32,
}

impl LightingStats {
    pub fn drawn(&self) -> u32 {
        self.directional + self.point
    }
}

pub struct LightingPass {
    directional: Option<ProgramId>,
    point: Option<ProgramId>,
}

impl LightingPass {
    pub fn new<B: GpuBackend>(ctx: &mut RenderContext<B>) -> RenderResult<Self> {
        Ok(Self {
            directional: ctx.load_program(&programs::LIGHT_DIRECTIONAL)?,
            point: ctx.load_program(&programs::LIGHT_POINT)?,
        })
    }

    /// Accumulate every light into `lit`.
    ///
    /// Shadow-casting directional lights refit and redraw `shadows` first.
    /// Lights with degenerate parameters are logged and skipped.
    #[allow(clippy::too_many_arguments)]
    pub fn render<B: GpuBackend, S: SceneQuery>(
        &self,
        ctx: &mut RenderContext<B>,
        lit: TargetId,
        gbuffer: &GBuffer,
        camera: &Camera,
        scene: &S,
        lights: &[LightInstance],
        shadows: &mut CascadedShadowMaps,
    ) -> RenderResult<LightingStats> {
        let mut stats = LightingStats::default();
        if lights.is_empty() {
            return Ok(stats);
        }

        for instance in lights {
            let drawn = match &instance.light {
                Light::Directional {
                    direction,
                    color,
                    casts_shadows,
                } => self.directional_light(
                    ctx,
                    lit,
                    gbuffer,
                    camera,
                    scene,
                    (*direction, *color, *casts_shadows),
                    shadows,
                    &mut stats,
                ),
                Light::Point { color, .. } => {
                    self.point_light(ctx, lit, gbuffer, camera, instance, *color, &mut stats)
                }
            };
            match drawn {
                Ok(()) => {}
                Err(err @ RenderError::Degenerate(_)) => {
                    warn!(
                        "[{}] {} light {:?} skipped: {}",
                        err.category(),
                        instance.light.kind(),
                        instance.id,
                        err
                    );
                    stats.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        debug!(
            "Lighting: {} directional ({} shadowed), {} point, {} skipped",
            stats.directional, stats.shadowed, stats.point, stats.skipped
        );
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn directional_light<B: GpuBackend, S: SceneQuery>(
        &self,
        ctx: &mut RenderContext<B>,
        lit: TargetId,
        gbuffer: &GBuffer,
        camera: &Camera,
        scene: &S,
        (direction, color, casts_shadows): (Vec3, Vec3, bool),
        shadows: &mut CascadedShadowMaps,
        stats: &mut LightingStats,
    ) -> RenderResult<()> {
        let length = direction.length();
        if !length.is_finite() || length <= f32::EPSILON {
            return Err(RenderError::degenerate("directional light has zero direction"));
        }
        let Some(program) = self.directional else {
            return Ok(());
        };

        let shadowed = casts_shadows && shadows.is_enabled();
        if shadowed {
            let z_max = farthest_occluder_distance(scene, direction);
            shadows.calculate_matrices(direction, &camera.projection, camera.view(), z_max)?;
            shadows.render(ctx, scene)?;
            stats.shadowed += 1;
        }

        let view = camera.view();
        let view_direction = view.transform_vector3(direction / length).normalize();
        let mut scope = open_light_scope(ctx, lit)?;
        scope.use_program(Some(program));
        bind_gbuffer(&mut scope, gbuffer);
        scope.set_texture("moments", shadows.moments());
        scope.set_uniform("inverse_projection", camera.projection.matrix().inverse());
        scope.set_uniform("inverse_view", camera.inverse_view());
        scope.set_uniform("cascade_matrices", shadows.cascade_matrices());
        scope.set_uniform("cascade_spheres", shadows.cascade_spheres());
        scope.set_uniform("light_direction", view_direction.extend(0.0));
        scope.set_uniform("color", color.extend(1.0));
        scope.set_uniform("shadow_params", shadows.shadow_params());
        scope.set_uniform("cascade_count", shadows.cascades().len() as u32);
        scope.set_uniform("shadowed", shadowed as u32);
        if scope.draw("light_directional", Geometry::FullScreen)? {
            stats.directional += 1;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn point_light<B: GpuBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        lit: TargetId,
        gbuffer: &GBuffer,
        camera: &Camera,
        instance: &LightInstance,
        color: Vec3,
        stats: &mut LightingStats,
    ) -> RenderResult<()> {
        let attenuation = match PointAttenuation::for_light(&instance.light) {
            Some(result) => result?,
            None => return Ok(()),
        };
        let Some(program) = self.point else {
            return Ok(());
        };
        let view_position = camera.view().transform_point3(instance.position);

        let mut scope = open_light_scope(ctx, lit)?;
        scope.use_program(Some(program));
        bind_gbuffer(&mut scope, gbuffer);
        scope.set_uniform("inverse_projection", camera.projection.matrix().inverse());
        scope.set_uniform("light_position", view_position.extend(1.0));
        scope.set_uniform("color", color.extend(1.0));
        scope.set_uniform("attenuation", attenuation.to_vec4());
        if scope.draw("light_point", Geometry::FullScreen)? {
            stats.point += 1;
        }
        Ok(())
    }
}

fn open_light_scope<B: GpuBackend>(
    ctx: &mut RenderContext<B>,
    lit: TargetId,
) -> RenderResult<StateScope<'_, B>> {
    let mut scope = ctx.scope("lighting");
    scope.bind_target(TargetBinding::new(lit))?;
    scope.set_blend(BlendMode::Additive);
    scope.set_depth(DepthState::DISABLED);
    scope.set_stencil(StencilMode::Equal(ShadingClass::Shaded));
    Ok(scope)
}

fn bind_gbuffer<B: GpuBackend>(scope: &mut StateScope<'_, B>, gbuffer: &GBuffer) {
    scope.set_texture("albedo", gbuffer.albedo());
    scope.set_texture("normal", gbuffer.normal());
    scope.set_texture("depth", gbuffer.depth());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Projection;
    use crate::core::backend::{DepthAttachment, MeshData, TargetDesc, TargetFormat};
    use crate::core::gbuffer::GBufferConfig;
    use crate::core::recording::RecordingBackend;
    use crate::core::registry::ResourceRegistry;
    use crate::scene::{MeshHandle, ObjectRecord, Scene, ShadowCaster, Transform};
    use crate::shadows::CsmConfig;

    struct Fixture {
        ctx: RenderContext<RecordingBackend>,
        gbuffer: GBuffer,
        lit: TargetId,
        shadows: CascadedShadowMaps,
        pass: LightingPass,
        camera: Camera,
    }

    fn fixture() -> Fixture {
        let mut ctx = RenderContext::new(RecordingBackend::new());
        let mut registry = ResourceRegistry::new();
        let gbuffer = GBuffer::new(
            ctx.backend_mut(),
            &mut registry,
            GBufferConfig {
                width: 64,
                height: 36,
                ..Default::default()
            },
        )
        .unwrap();
        let lit = ctx
            .backend_mut()
            .create_target(
                &TargetDesc::new("lit", 64, 36)
                    .with_color(TargetFormat::Rgba16Float)
                    .with_depth(DepthAttachment::Shared(gbuffer.target())),
            )
            .unwrap();
        let shadows = CascadedShadowMaps::new(
            &mut ctx,
            &mut registry,
            CsmConfig {
                shadow_map_size: 64,
                ..Default::default()
            },
        )
        .unwrap();
        let pass = LightingPass::new(&mut ctx).unwrap();
        let camera = Camera::look_at(
            Vec3::new(0.0, 5.0, 10.0),
            Vec3::ZERO,
            Vec3::Y,
            Projection::new(1.0, 64.0 / 36.0, 0.1, 100.0),
        );
        Fixture {
            ctx,
            gbuffer,
            lit,
            shadows,
            pass,
            camera,
        }
    }

    fn run(f: &mut Fixture, scene: &Scene) -> LightingStats {
        let lights = collect_lights(scene);
        f.pass
            .render(
                &mut f.ctx,
                f.lit,
                &f.gbuffer,
                &f.camera,
                scene,
                &lights,
                &mut f.shadows,
            )
            .unwrap()
    }

    #[test]
    fn no_lights_issue_no_commands() {
        let mut f = fixture();
        let stats = run(&mut f, &Scene::new());
        assert_eq!(stats, LightingStats::default());
        assert!(f.ctx.backend().commands().is_empty());
    }

    #[test]
    fn light_draws_are_additive_and_gated_on_shaded() {
        let mut f = fixture();
        let mut scene = Scene::new();
        scene.spawn(ObjectRecord::new().with(Light::point(Vec3::ONE, 2.0, 4.0)));
        let mut sun = Light::directional(Vec3::new(0.2, 1.0, 0.3), Vec3::ONE);
        if let Light::Directional { casts_shadows, .. } = &mut sun {
            *casts_shadows = false;
        }
        scene.spawn(ObjectRecord::new().with(sun));

        let stats = run(&mut f, &scene);
        assert_eq!(stats.drawn(), 2);
        assert_eq!(stats.shadowed, 0);
        let lit = f.lit;
        for draw in f.ctx.backend().draws() {
            assert_eq!(draw.target.target, lit);
            assert_eq!(draw.state.blend, BlendMode::Additive);
            assert_eq!(draw.state.stencil, StencilMode::Equal(ShadingClass::Shaded));
            assert!(!draw.state.stencil.writes());
            assert_eq!(draw.state.depth, DepthState::DISABLED);
        }
    }

    #[test]
    fn degenerate_lights_are_skipped() {
        let mut f = fixture();
        let mut scene = Scene::new();
        scene.spawn(ObjectRecord::new().with(Light::point(Vec3::ONE, 3.0, 2.0)));
        scene.spawn(ObjectRecord::new().with(Light::directional(Vec3::ZERO, Vec3::ONE)));
        let stats = run(&mut f, &scene);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.drawn(), 0);
        assert_eq!(f.ctx.backend().draws().count(), 0);
    }

    #[test]
    fn shadowed_sun_renders_atlas_before_lighting() {
        let mut f = fixture();
        let cube = f.ctx.backend_mut().upload_mesh(&MeshData::cube(1.0)).unwrap();
        let mut scene = Scene::new();
        scene.spawn(
            ObjectRecord::new()
                .with(Transform::default())
                .with(MeshHandle {
                    mesh: cube,
                    bounding_radius: 3.0_f32.sqrt(),
                })
                .with(ShadowCaster(true)),
        );
        scene.spawn(ObjectRecord::new().with(Light::directional(Vec3::new(0.1, 1.0, 0.2), Vec3::ONE)));

        let stats = run(&mut f, &scene);
        assert_eq!(stats.shadowed, 1);
        let labels: Vec<_> = f.ctx.backend().draws().map(|d| d.label).collect();
        assert_eq!(labels.last(), Some(&"light_directional"));
        assert!(labels.iter().filter(|l| **l == "csm_caster").count() == 4);
        let last = f.ctx.backend().draws().last().unwrap();
        assert_eq!(
            last.uniforms.get("shadowed"),
            Some(&crate::core::uniforms::UniformValue::UInt(1))
        );
    }
}
