//! Frame orchestration for the deferred pipeline
//!
//! [`DeferredRenderer`] owns the render context, the resource registry and
//! every pass. Each frame runs geometry, base resolve, shadowed light
//! accumulation and SSAO in that order inside one state scope.

use log::{debug, info};

use crate::camera::Camera;
use crate::config::{check_mips_fit, RendererConfig};
use crate::core::backend::{DepthAttachment, GpuBackend, MeshData, TargetDesc, TargetFormat, TargetId};
use crate::core::context::{FrameStats, RenderContext};
use crate::core::gbuffer::{GBuffer, GBufferConfig, GBufferPass, GeometryStats};
use crate::core::registry::{ResourceRegistry, Sizing};
use crate::error::{RenderError, RenderResult};
use crate::lighting::{collect_lights, BaseResolvePass, LightingPass, LightingStats};
use crate::post::SsaoPass;
use crate::scene::{MeshHandle, SceneQuery};
use crate::shadows::CascadedShadowMaps;

/// What one call to [`DeferredRenderer::render_frame`] issued
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub commands: FrameStats,
    pub geometry: GeometryStats,
    pub lighting: LightingStats,
    /// Lights found in the scene, drawn or not
    pub lights: u32,
    pub ssao: bool,
}

pub struct DeferredRenderer<B: GpuBackend> {
    ctx: RenderContext<B>,
    registry: ResourceRegistry,
    config: RendererConfig,
    gbuffer: GBuffer,
    lit: TargetId,
    geometry: GBufferPass,
    resolve: BaseResolvePass,
    lighting: LightingPass,
    shadows: CascadedShadowMaps,
    ssao: SsaoPass,
    frame_index: u64,
}

impl<B: GpuBackend> DeferredRenderer<B> {
    pub fn new(backend: B, config: RendererConfig) -> RenderResult<Self> {
        config.validate()?;
        let mut ctx = RenderContext::new(backend);
        let mut registry = ResourceRegistry::new();
        let (width, height) = (config.width, config.height);

        let gbuffer = GBuffer::new(
            ctx.backend_mut(),
            &mut registry,
            GBufferConfig {
                width,
                height,
                ..Default::default()
            },
        )?;
        let lit = ctx.backend_mut().create_target(
            &TargetDesc::new("lit", width, height)
                .with_color(TargetFormat::Rgba16Float)
                .with_depth(DepthAttachment::Shared(gbuffer.target())),
        )?;
        registry.register("lit", lit, Sizing::Screen);

        let geometry = GBufferPass::new(&mut ctx)?;
        let resolve = BaseResolvePass::new(&mut ctx)?;
        let lighting = LightingPass::new(&mut ctx)?;
        let shadows = CascadedShadowMaps::new(&mut ctx, &mut registry, config.shadows.clone())?;
        let ssao = SsaoPass::new(&mut ctx, &mut registry, config.ssao.clone(), width, height)?;
        info!(
            "Deferred renderer ready at {}x{} ({} targets)",
            width,
            height,
            registry.len()
        );

        Ok(Self {
            ctx,
            registry,
            config,
            gbuffer,
            lit,
            geometry,
            resolve,
            lighting,
            shadows,
            ssao,
            frame_index: 0,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn context(&self) -> &RenderContext<B> {
        &self.ctx
    }

    pub fn backend(&self) -> &B {
        self.ctx.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.ctx.backend_mut()
    }

    pub fn into_backend(self) -> B {
        self.ctx.into_backend()
    }

    /// Composited colour target (Rgba16F)
    pub fn lit_target(&self) -> TargetId {
        self.lit
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    pub fn shadows(&self) -> &CascadedShadowMaps {
        &self.shadows
    }

    pub fn ssao(&self) -> &SsaoPass {
        &self.ssao
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Upload a mesh and return the handle scene objects refer to
    pub fn upload_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshHandle> {
        let id = self.ctx.backend_mut().upload_mesh(mesh)?;
        Ok(MeshHandle {
            mesh: id,
            bounding_radius: mesh.bounding_radius(),
        })
    }

    /// Render one frame of `scene` seen from `camera` into the lit target.
    pub fn render_frame<S: SceneQuery>(
        &mut self,
        scene: &S,
        camera: &Camera,
    ) -> RenderResult<FrameReport> {
        camera.validate()?;
        self.ctx.take_stats();
        let lights = collect_lights(scene);

        let (geometry, lighting) = {
            let mut frame = self.ctx.scope("frame");
            let geometry = self.geometry.render(&mut frame, &self.gbuffer, scene, camera)?;
            self.resolve.render(
                &mut frame,
                self.lit,
                &self.gbuffer,
                self.config.ambient,
                self.config.clear_color,
            )?;
            let lighting = self.lighting.render(
                &mut frame,
                self.lit,
                &self.gbuffer,
                camera,
                scene,
                &lights,
                &mut self.shadows,
            )?;
            self.ssao.render(&mut frame, &self.gbuffer, camera, self.lit)?;
            (geometry, lighting)
        };
        self.ctx.backend_mut().finish_frame()?;

        let report = FrameReport {
            frame_index: self.frame_index,
            commands: self.ctx.take_stats(),
            geometry,
            lighting,
            lights: lights.len() as u32,
            ssao: self.ssao.is_enabled(),
        };
        debug!(
            "Frame {}: {} draws, {} clears, {} lights",
            report.frame_index, report.commands.draws, report.commands.clears, report.lights
        );
        self.frame_index += 1;
        Ok(report)
    }

    /// Reallocate every screen-sized target and schedule the SSAO clear.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::invalid_config(format!(
                "cannot resize to {}x{}",
                width, height
            )));
        }
        check_mips_fit(self.config.ssao.mip_levels, width, height)?;
        let resized = self.registry.resize_all(self.ctx.backend_mut(), width, height)?;
        if resized.is_empty() {
            return Ok(());
        }
        self.gbuffer.set_dimensions(width, height);
        self.config.width = width;
        self.config.height = height;
        self.ssao.mark_dirty();
        Ok(())
    }
}
