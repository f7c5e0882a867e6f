//! G-buffer targets and the geometry pass of the deferred pipeline
//!
//! Holds albedo + shininess, view-space normals and depth-stencil, with the
//! shading classification of every covered pixel in the stencil.

use glam::Vec4;
use log::debug;

use super::backend::{
    ClearValues, DepthAttachment, Geometry, GpuBackend, ProgramId, TargetDesc, TargetFormat,
    TargetId, TextureRef,
};
use super::context::RenderContext;
use super::programs;
use super::registry::{ResourceRegistry, Sizing};
use super::state::{BlendMode, DepthState, ShadingClass, StencilMode, TargetBinding};
use crate::camera::Camera;
use crate::error::RenderResult;
use crate::scene::transform::normal_matrix;
use crate::scene::{Capabilities, SceneQuery};

/// G-buffer attachment formats
#[derive(Debug, Clone)]
pub struct GBufferConfig {
    pub width: u32,
    pub height: u32,
    /// rgb albedo, a = shininess / 128
    pub albedo_format: TargetFormat,
    /// View-space normal encoded as `n * 0.5 + 0.5`
    pub normal_format: TargetFormat,
    pub depth_format: TargetFormat,
}

impl Default for GBufferConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            albedo_format: TargetFormat::Rgba8Unorm,
            normal_format: TargetFormat::Rgba16Float,
            depth_format: TargetFormat::Depth24PlusStencil8,
        }
    }
}

/// G-buffer render target
#[derive(Debug, Clone)]
pub struct GBuffer {
    target: TargetId,
    config: GBufferConfig,
}

impl GBuffer {
    pub fn new<B: GpuBackend>(
        backend: &mut B,
        registry: &mut ResourceRegistry,
        config: GBufferConfig,
    ) -> RenderResult<Self> {
        let desc = TargetDesc::new("gbuffer", config.width, config.height)
            .with_color(config.albedo_format)
            .with_color(config.normal_format)
            .with_depth(DepthAttachment::Owned(config.depth_format));
        let target = backend.create_target(&desc)?;
        registry.register("gbuffer", target, Sizing::Screen);
        Ok(Self { target, config })
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn albedo(&self) -> TextureRef {
        TextureRef::color(self.target, 0)
    }

    pub fn normal(&self) -> TextureRef {
        TextureRef::color(self.target, 1)
    }

    pub fn depth(&self) -> TextureRef {
        TextureRef::depth(self.target)
    }

    pub fn config(&self) -> &GBufferConfig {
        &self.config
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Record the new extent after the registry reallocated the target
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
    }
}

/// Objects drawn and rejected by one geometry pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GeometryStats {
    pub drawn: u32,
    pub rejected: u32,
}

/// Rasterizes every meshed object into the G-buffer
pub struct GBufferPass {
    program: Option<ProgramId>,
}

impl GBufferPass {
    pub fn new<B: GpuBackend>(ctx: &mut RenderContext<B>) -> RenderResult<Self> {
        Ok(Self {
            program: ctx.load_program(&programs::GBUFFER)?,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.program.is_some()
    }

    /// Clear the G-buffer and draw all objects with {transform, mesh} plus a
    /// material or a light.
    pub fn render<B: GpuBackend, S: SceneQuery>(
        &self,
        ctx: &mut RenderContext<B>,
        gbuffer: &GBuffer,
        scene: &S,
        camera: &Camera,
    ) -> RenderResult<GeometryStats> {
        let mut stats = GeometryStats::default();
        let mut scope = ctx.scope("gbuffer");
        scope.bind_target(TargetBinding::new(gbuffer.target()))?;
        scope.set_blend(BlendMode::Replace);
        scope.set_depth(DepthState::TEST_AND_WRITE);
        scope.clear(
            &ClearValues::color([0.0; 4])
                .with_depth(1.0)
                .with_stencil(ShadingClass::Background),
        )?;

        let Some(program) = self.program else {
            return Ok(stats);
        };
        scope.use_program(Some(program));
        let view = camera.view();
        scope.set_uniform("view", view);
        scope.set_uniform("projection", camera.projection.matrix());

        for id in scene.query(Capabilities::TRANSFORM | Capabilities::MESH) {
            let Some(record) = scene.record(id) else {
                continue;
            };
            let (Some(transform), Some(mesh)) = (record.transform, record.mesh) else {
                continue;
            };

            let (diffuse, shininess, class) = match (&record.light, &record.material) {
                // Light markers are unlit and take the light's colour
                (Some(light), _) => (light.color(), 0.0, ShadingClass::Flat),
                (None, Some(material)) => (
                    material.diffuse,
                    material.shininess,
                    record.shading.unwrap_or(ShadingClass::Shaded),
                ),
                (None, None) => {
                    debug!("object {:?} has no material, skipped", id);
                    continue;
                }
            };
            match class {
                ShadingClass::Background => {
                    debug!("object {:?} classified Background, rejected", id);
                    stats.rejected += 1;
                    continue;
                }
                ShadingClass::Shaded | ShadingClass::Flat => {}
            }

            let model = transform.model_matrix();
            scope.set_stencil(StencilMode::Write(class));
            scope.set_uniform("model", model);
            scope.set_uniform("normal_matrix", normal_matrix(view * model));
            scope.set_uniform("diffuse", Vec4::from((diffuse, shininess)));
            if scope.draw("gbuffer_object", Geometry::Mesh(mesh.mesh))? {
                stats.drawn += 1;
            }
        }
        debug!(
            "G-buffer pass: {} drawn, {} rejected",
            stats.drawn, stats.rejected
        );
        Ok(stats)
    }
}
