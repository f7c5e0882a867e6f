// src/shadows/csm.rs
// Cascaded variance shadow maps: per-frame cascade fitting and atlas rendering
// RELEVANT FILES: src/shadows/cascade_math.rs, src/shaders/shadow_moments.wgsl, src/shaders/light_directional.wgsl

use glam::{Mat4, Vec3, Vec4};
use log::{debug, info};

use super::blur_pass::ShadowBlurPass;
use super::bounding_sphere::minimum_bounding_sphere;
use super::cascade_math::{
    calculate_cascade_splits, cascade_projection, pad_radius, stabilized_light_view,
    texture_space_bias,
};
use super::csm_types::{Cascade, CascadeStatistics, CsmConfig};
use crate::camera::Projection;
use crate::core::backend::{
    ClearValues, DepthAttachment, Geometry, GpuBackend, MeshId, ProgramId, TargetDesc,
    TargetFormat, TargetId, TextureRef,
};
use crate::core::context::{RenderContext, StateScope};
use crate::core::programs::{self, MAX_CASCADES};
use crate::core::registry::{ResourceRegistry, Sizing};
use crate::core::state::{BlendMode, DepthState, StencilMode, TargetBinding};
use crate::error::{RenderError, RenderResult};
use crate::scene::{Capabilities, SceneQuery, ShadowCaster};

/// Moments written where no occluder was drawn: depth 1, depth² 1
const EMPTY_MOMENTS: [f32; 4] = [1.0, 1.0, 0.0, 0.0];

/// Farthest extent along `light_direction` of every shadow caster's bounding sphere.
///
/// Returns `f32::NEG_INFINITY` when the scene has no casters.
pub fn farthest_occluder_distance<S: SceneQuery>(scene: &S, light_direction: Vec3) -> f32 {
    let l = light_direction.normalize_or_zero();
    scene
        .query(Capabilities::TRANSFORM | Capabilities::MESH | Capabilities::SHADOW_CASTER)
        .into_iter()
        .filter_map(|id| scene.record(id))
        .filter(|r| r.shadow_caster == Some(ShadowCaster(true)))
        .filter_map(|r| Some((r.transform?, r.mesh?)))
        .map(|(t, mesh)| l.dot(t.translation) + mesh.bounding_radius * t.max_scale())
        .fold(f32::NEG_INFINITY, f32::max)
}

/// Cascaded shadow maps for one directional light
pub struct CascadedShadowMaps {
    config: CsmConfig,
    cascades: Vec<Cascade>,
    light_direction: Vec3,
    atlas: TargetId,
    scratch: TargetId,
    moment_program: Option<ProgramId>,
    blur: ShadowBlurPass,
}

impl CascadedShadowMaps {
    pub fn new<B: GpuBackend>(
        ctx: &mut RenderContext<B>,
        registry: &mut ResourceRegistry,
        config: CsmConfig,
    ) -> RenderResult<Self> {
        config.validate()?;
        let size = config.shadow_map_size;
        let atlas = ctx.backend_mut().create_target(
            &TargetDesc::new("csm_atlas", size, size)
                .with_color(TargetFormat::Rg32Float)
                .with_layers(config.cascade_count)
                .with_depth(DepthAttachment::Owned(TargetFormat::Depth32Float)),
        )?;
        let scratch = ctx.backend_mut().create_target(
            &TargetDesc::new("csm_blur_scratch", size, size).with_color(TargetFormat::Rg32Float),
        )?;
        registry.register("csm", atlas, Sizing::Fixed);
        registry.register("csm", scratch, Sizing::Fixed);
        info!(
            "Allocated {} shadow cascades at {}x{} ({:.1} MiB of moments)",
            config.cascade_count,
            size,
            size,
            (size as f64 * size as f64 * 8.0 * (config.cascade_count + 1) as f64) / (1024.0 * 1024.0)
        );

        let moment_program = ctx.load_program(&programs::SHADOW_MOMENTS)?;
        let blur = ShadowBlurPass::new(ctx, config.blur_width)?;
        Ok(Self {
            cascades: vec![Cascade::default(); config.cascade_count as usize],
            config,
            light_direction: Vec3::ZERO,
            atlas,
            scratch,
            moment_program,
            blur,
        })
    }

    pub fn config(&self) -> &CsmConfig {
        &self.config
    }

    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    pub fn atlas(&self) -> TargetId {
        self.atlas
    }

    /// The moment atlas as a layered texture for the lighting pass
    pub fn moments(&self) -> TextureRef {
        TextureRef::color(self.atlas, 0)
    }

    /// Unit direction toward the light used by the last [`Self::calculate_matrices`]
    pub fn light_direction(&self) -> Vec3 {
        self.light_direction
    }

    pub fn is_enabled(&self) -> bool {
        self.moment_program.is_some()
    }

    pub fn statistics(&self) -> CascadeStatistics {
        CascadeStatistics::from_cascades(&self.cascades)
    }

    /// Refit every cascade to the camera for a light shining from `light_direction`.
    ///
    /// `z_max` is the farthest occluder extent along the light direction; the
    /// near plane of each cascade is pulled back to include it.
    pub fn calculate_matrices(
        &mut self,
        light_direction: Vec3,
        projection: &Projection,
        camera_view: Mat4,
        z_max: f32,
    ) -> RenderResult<()> {
        let length = light_direction.length();
        if !length.is_finite() || length <= f32::EPSILON {
            return Err(RenderError::degenerate(format!(
                "light direction {:?} has no length",
                light_direction
            )));
        }
        projection.validate()?;
        let inverse_view = camera_view.inverse();
        if !camera_view.is_finite() || !inverse_view.is_finite() {
            return Err(RenderError::degenerate("camera view matrix is not finite"));
        }
        let l = light_direction / length;
        let res = self.config.shadow_map_size;
        let splits = calculate_cascade_splits(
            self.config.cascade_count,
            projection.near,
            projection.far,
            self.config.max_shadow_distance,
            self.config.split_lambda,
        );
        let bias = texture_space_bias();

        let mut running_z_max = z_max;
        for i in (0..self.cascades.len()).rev() {
            let (near, far) = (splits[i], splits[i + 1]);
            let sphere = minimum_bounding_sphere(&projection.frustum_corners(near, far));
            let center = inverse_view.transform_point3(sphere.center);
            let (radius, texel) = pad_radius(sphere.radius, res);

            let c_l_r = l.dot(center) + radius;
            let z_near_correction = running_z_max.max(c_l_r) - c_l_r;
            running_z_max = running_z_max.max(c_l_r);

            let light_projection = cascade_projection(radius, z_near_correction);
            let light_view = stabilized_light_view(center, l, texel);
            self.cascades[i] = Cascade {
                near_distance: near,
                far_distance: far,
                light_projection,
                light_view,
                biased_view_projection: bias * light_projection * light_view,
                stabilization_texel_size: texel,
                bounding_sphere_center: center,
                bounding_sphere_radius_sq: radius * radius,
            };
            debug!(
                "cascade {}: [{:.2}, {:.2}] r={:.3} texel={:.4} z_corr={:.3}",
                i, near, far, radius, texel, z_near_correction
            );
        }
        self.light_direction = l;
        Ok(())
    }

    /// Render occluder moments into every atlas layer and blur them.
    pub fn render<B: GpuBackend, S: SceneQuery>(
        &self,
        ctx: &mut RenderContext<B>,
        scene: &S,
    ) -> RenderResult<()> {
        let casters: Vec<_> = scene
            .query(Capabilities::TRANSFORM | Capabilities::MESH | Capabilities::SHADOW_CASTER)
            .into_iter()
            .filter_map(|id| scene.record(id))
            .filter(|r| r.shadow_caster == Some(ShadowCaster(true)))
            .filter_map(|r| Some((r.transform?.model_matrix(), r.mesh?.mesh)))
            .collect();

        for (layer, cascade) in self.cascades.iter().enumerate() {
            let layer = layer as u32;
            {
                let mut scope = ctx.scope("csm_cascade");
                scope.bind_target(TargetBinding::layer(self.atlas, layer))?;
                scope.set_blend(BlendMode::Replace);
                scope.set_stencil(StencilMode::Disabled);
                scope.set_depth(DepthState::TEST_AND_WRITE);
                scope.clear(&ClearValues::color(EMPTY_MOMENTS).with_depth(1.0))?;
                self.draw_casters(&mut scope, cascade, &casters)?;
            }
            self.blur.blur_layer(ctx, self.atlas, self.scratch, layer)?;
        }
        debug!(
            "Shadow atlas: {} casters into {} cascades",
            casters.len(),
            self.cascades.len()
        );
        Ok(())
    }

    fn draw_casters<B: GpuBackend>(
        &self,
        scope: &mut StateScope<'_, B>,
        cascade: &Cascade,
        casters: &[(Mat4, MeshId)],
    ) -> RenderResult<()> {
        let Some(program) = self.moment_program else {
            return Ok(());
        };
        scope.use_program(Some(program));
        scope.set_uniform("light_view_projection", cascade.view_projection());
        for (model, mesh) in casters {
            scope.set_uniform("model", *model);
            scope.draw("csm_caster", Geometry::Mesh(*mesh))?;
        }
        Ok(())
    }

    /// Per-cascade texture transforms padded to the uniform array length
    pub fn cascade_matrices(&self) -> Vec<Mat4> {
        let mut matrices: Vec<Mat4> = self
            .cascades
            .iter()
            .map(|c| c.biased_view_projection)
            .collect();
        matrices.resize(MAX_CASCADES, Mat4::IDENTITY);
        matrices
    }

    /// World-space selection spheres (xyz centre, w squared radius)
    pub fn cascade_spheres(&self) -> Vec<Vec4> {
        let mut spheres: Vec<Vec4> = self
            .cascades
            .iter()
            .map(|c| c.bounding_sphere_center.extend(c.bounding_sphere_radius_sq))
            .collect();
        spheres.resize(MAX_CASCADES, Vec4::ZERO);
        spheres
    }

    /// x = minimum variance, y = light-bleed reduction, z = atlas resolution
    pub fn shadow_params(&self) -> Vec4 {
        Vec4::new(
            self.config.min_variance,
            self.config.light_bleed_reduction,
            self.config.shadow_map_size as f32,
            0.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::core::backend::MeshData;
    use crate::core::recording::{Recorded, RecordingBackend};
    use crate::scene::{MeshHandle, ObjectRecord, Scene, Transform};

    fn setup(config: CsmConfig) -> (RenderContext<RecordingBackend>, CascadedShadowMaps) {
        let mut ctx = RenderContext::new(RecordingBackend::new());
        let mut registry = ResourceRegistry::new();
        let csm = CascadedShadowMaps::new(&mut ctx, &mut registry, config).unwrap();
        (ctx, csm)
    }

    fn small_config() -> CsmConfig {
        CsmConfig {
            shadow_map_size: 256,
            ..Default::default()
        }
    }

    fn camera() -> Camera {
        Camera::look_at(
            Vec3::new(0.0, 10.0, 20.0),
            Vec3::ZERO,
            Vec3::Y,
            Projection::new(1.0, 16.0 / 9.0, 0.1, 300.0),
        )
    }

    #[test]
    fn zero_direction_is_degenerate() {
        let (_, mut csm) = setup(small_config());
        let cam = camera();
        let err = csm
            .calculate_matrices(Vec3::ZERO, &cam.projection, cam.view(), 0.0)
            .unwrap_err();
        assert!(matches!(err, RenderError::Degenerate(_)));
    }

    #[test]
    fn non_finite_camera_view_is_degenerate() {
        let (_, mut csm) = setup(small_config());
        let projection = camera().projection;
        let nan_view = Mat4::look_at_rh(Vec3::ONE, Vec3::ONE, Vec3::Y);
        let err = csm
            .calculate_matrices(Vec3::Y, &projection, nan_view, 0.0)
            .unwrap_err();
        assert!(matches!(err, RenderError::Degenerate(_)));
        assert!(csm.cascades().iter().all(|c| c.bounding_sphere_center.is_finite()));
    }

    #[test]
    fn overhead_camera_yields_finite_cascades() {
        let (_, mut csm) = setup(small_config());
        let cam = Camera::look_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, Vec3::Y, camera().projection);
        csm.calculate_matrices(Vec3::new(0.3, 1.0, 0.2), &cam.projection, cam.view(), 0.0)
            .unwrap();
        for cascade in csm.cascades() {
            assert!(cascade.bounding_sphere_center.is_finite());
            assert!(cascade.biased_view_projection.is_finite());
        }
    }

    #[test]
    fn cascades_are_contiguous_and_enclose_their_slices() {
        let (_, mut csm) = setup(small_config());
        let cam = camera();
        csm.calculate_matrices(Vec3::new(0.3, 1.0, 0.2), &cam.projection, cam.view(), f32::NEG_INFINITY)
            .unwrap();
        let cascades = csm.cascades();
        assert_eq!(cascades[0].near_distance, 0.1);
        assert_eq!(cascades[3].far_distance, 150.0);
        assert_eq!(csm.statistics().gaps, 0);

        let inverse_view = cam.inverse_view();
        for c in cascades {
            let corners = cam.projection.frustum_corners(c.near_distance, c.far_distance);
            for corner in corners {
                let world = inverse_view.transform_point3(corner);
                assert!(
                    world.distance(c.bounding_sphere_center) <= c.radius() + 1e-3,
                    "corner outside cascade sphere"
                );
            }
        }
        // Nearer cascades cover less area per texel
        for w in cascades.windows(2) {
            assert!(w[0].stabilization_texel_size <= w[1].stabilization_texel_size);
        }
    }

    #[test]
    fn tall_occluder_pulls_near_plane_back() {
        let (_, mut csm) = setup(small_config());
        let cam = camera();
        let l = Vec3::Y;
        csm.calculate_matrices(l, &cam.projection, cam.view(), f32::NEG_INFINITY)
            .unwrap();
        let loose = csm.cascades()[0].light_projection;
        csm.calculate_matrices(l, &cam.projection, cam.view(), 500.0).unwrap();
        let corrected = csm.cascades()[0];
        assert_ne!(loose, corrected.light_projection);

        // A point far up the light axis above the cascade centre still maps into [0, 1]
        let above = corrected.bounding_sphere_center + l * 400.0;
        let tex = corrected.biased_view_projection.project_point3(above);
        assert!((0.0..=1.0).contains(&tex.z), "depth {} outside range", tex.z);
    }

    #[test]
    fn render_clears_draws_and_blurs_each_layer() {
        let (mut ctx, mut csm) = setup(small_config());
        let cube = ctx.backend_mut().upload_mesh(&MeshData::cube(0.5)).unwrap();
        let mut scene = Scene::new();
        scene.spawn(
            ObjectRecord::new()
                .with(Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)))
                .with(MeshHandle {
                    mesh: cube,
                    bounding_radius: 0.87,
                })
                .with(ShadowCaster(true)),
        );
        scene.spawn(
            ObjectRecord::new()
                .with(Transform::default())
                .with(MeshHandle {
                    mesh: cube,
                    bounding_radius: 0.87,
                })
                .with(ShadowCaster(false)),
        );
        let cam = camera();
        let l = Vec3::new(0.2, 1.0, 0.1);
        let z_max = farthest_occluder_distance(&scene, l);
        assert!(z_max > 0.0);
        csm.calculate_matrices(l, &cam.projection, cam.view(), z_max).unwrap();
        csm.render(&mut ctx, &scene).unwrap();

        let backend = ctx.backend();
        let clears = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Recorded::Clear { values, .. } if values.color == Some(EMPTY_MOMENTS)))
            .count();
        assert_eq!(clears, 4);
        let labels: Vec<_> = backend.draws().map(|d| d.label).collect();
        // One enabled caster plus two blur passes per cascade
        assert_eq!(labels.iter().filter(|l| **l == "csm_caster").count(), 4);
        assert_eq!(labels.iter().filter(|l| **l == "shadow_blur_h").count(), 4);
        assert_eq!(labels.iter().filter(|l| **l == "shadow_blur_v").count(), 4);
        assert_eq!(ctx.state_machine().scope_depth(), 0);
    }

    #[test]
    fn uniform_arrays_are_padded() {
        let (_, mut csm) = setup(small_config());
        let cam = camera();
        csm.calculate_matrices(Vec3::Y, &cam.projection, cam.view(), 0.0).unwrap();
        assert_eq!(csm.cascade_matrices().len(), MAX_CASCADES);
        let spheres = csm.cascade_spheres();
        assert_eq!(spheres.len(), MAX_CASCADES);
        assert!(spheres[3].w > 0.0);
        assert_eq!(spheres[4], Vec4::ZERO);
    }
}
