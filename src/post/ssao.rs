// src/post/ssao.rs
// Screen-space ambient occlusion over a linear depth mip chain
// RELEVANT FILES: src/shaders/ssao_occlusion.wgsl, src/post/ssao_kernel.rs, src/renderer.rs

use glam::{Vec3, Vec4};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::ssao_kernel::generate_kernel;
use super::ssao_math::FAR_SENTINEL;
use crate::camera::Camera;
use crate::core::backend::{
    mip_extent, ClearValues, Geometry, GpuBackend, ProgramId, TargetDesc, TargetFormat, TargetId,
    TextureRef, TextureView,
};
use crate::core::context::RenderContext;
use crate::core::gbuffer::GBuffer;
use crate::core::programs::{self, pack_weights, MAX_KERNEL_SIZE};
use crate::core::registry::{ResourceRegistry, Sizing};
use crate::core::state::{BlendMode, DepthState, ShadingClass, StencilMode, TargetBinding};
use crate::error::{RenderError, RenderResult};
use crate::shadows::blur_pass::gaussian_weights;

/// SSAO tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoConfig {
    pub enabled: bool,
    pub kernel_size: u32,
    /// Levels in the linear depth chain, level 0 included
    pub mip_levels: u32,
    /// Sample radius in pixels at level 0
    pub radius_px: f32,
    pub intensity: f32,
    /// View-space depth tolerance before a sample counts as occluded
    pub bias: f32,
    /// Tap distance in pixels at which sampling moves to level 1
    pub mip_switch_px: f32,
    /// Blend between no occlusion (0) and the full term (1)
    pub strength: f32,
    pub blur_width: u32,
    /// Relative depth difference that halves a blur tap
    pub blur_depth_sigma: f32,
    pub blur_normal_power: f32,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_size: 64,
            mip_levels: 5,
            radius_px: 48.0,
            intensity: 1.0,
            bias: 0.025,
            mip_switch_px: 8.0,
            strength: 1.0,
            blur_width: 5,
            blur_depth_sigma: 0.1,
            blur_normal_power: 8.0,
        }
    }
}

impl SsaoConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.kernel_size == 0 || self.kernel_size as usize > MAX_KERNEL_SIZE {
            return Err(RenderError::invalid_config(format!(
                "kernel_size must be between 1 and {}, got {}",
                MAX_KERNEL_SIZE, self.kernel_size
            )));
        }
        if self.mip_levels == 0 {
            return Err(RenderError::invalid_config("mip_levels must be at least 1"));
        }
        if !(self.radius_px > 0.0) {
            return Err(RenderError::invalid_config("radius_px must be positive"));
        }
        if !(self.intensity >= 0.0) {
            return Err(RenderError::invalid_config("intensity must be non-negative"));
        }
        if !(self.mip_switch_px > 0.0) {
            return Err(RenderError::invalid_config("mip_switch_px must be positive"));
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(RenderError::invalid_config("strength must lie in [0, 1]"));
        }
        if self.blur_width % 2 == 0 || self.blur_width > 15 {
            return Err(RenderError::invalid_config(format!(
                "blur_width must be odd and at most 15, got {}",
                self.blur_width
            )));
        }
        Ok(())
    }

    /// Extent of every depth-chain level for a `width` x `height` viewport
    pub fn mip_extents(&self, width: u32, height: u32) -> Vec<(u32, u32)> {
        (0..self.mip_levels)
            .map(|k| mip_extent(width, height, k))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct SsaoPrograms {
    linearize: ProgramId,
    downsample: ProgramId,
    occlusion: ProgramId,
    blur: ProgramId,
    composite: ProgramId,
}

impl SsaoPrograms {
    fn load<B: GpuBackend>(ctx: &mut RenderContext<B>) -> RenderResult<Option<Self>> {
        let linearize = ctx.load_program(&programs::SSAO_LINEARIZE)?;
        let downsample = ctx.load_program(&programs::SSAO_DOWNSAMPLE)?;
        let occlusion = ctx.load_program(&programs::SSAO_OCCLUSION)?;
        let blur = ctx.load_program(&programs::SSAO_BLUR)?;
        let composite = ctx.load_program(&programs::SSAO_COMPOSITE)?;
        Ok(
            match (linearize, downsample, occlusion, blur, composite) {
                (Some(linearize), Some(downsample), Some(occlusion), Some(blur), Some(composite)) => {
                    Some(Self {
                        linearize,
                        downsample,
                        occlusion,
                        blur,
                        composite,
                    })
                }
                _ => None,
            },
        )
    }
}

/// Linearize, downsample, occlude, blur and composite onto Shaded pixels
pub struct SsaoPass {
    config: SsaoConfig,
    kernel: Vec<Vec3>,
    blur_weights: Vec<f32>,
    linear_depth: TargetId,
    occlusion: TargetId,
    scratch: TargetId,
    programs: Option<SsaoPrograms>,
    dirty: bool,
}

impl SsaoPass {
    pub fn new<B: GpuBackend>(
        ctx: &mut RenderContext<B>,
        registry: &mut ResourceRegistry,
        config: SsaoConfig,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        config.validate()?;
        let backend = ctx.backend_mut();
        let linear_depth = backend.create_target(
            &TargetDesc::new("ssao_linear_depth", width, height)
                .with_color(TargetFormat::R32Float)
                .with_mips(config.mip_levels),
        )?;
        let occlusion = backend.create_target(
            &TargetDesc::new("ssao_occlusion", width, height).with_color(TargetFormat::R16Float),
        )?;
        let scratch = backend.create_target(
            &TargetDesc::new("ssao_blur_scratch", width, height).with_color(TargetFormat::R16Float),
        )?;
        for target in [linear_depth, occlusion, scratch] {
            registry.register("ssao", target, Sizing::Screen);
        }

        let programs = SsaoPrograms::load(ctx)?;
        if programs.is_none() {
            info!("SSAO disabled: one or more programs failed to load");
        }
        let kernel = generate_kernel(config.kernel_size as usize);
        let blur_weights = gaussian_weights(config.blur_width);
        Ok(Self {
            config,
            kernel,
            blur_weights,
            linear_depth,
            occlusion,
            scratch,
            programs,
            dirty: true,
        })
    }

    pub fn config(&self) -> &SsaoConfig {
        &self.config
    }

    pub fn kernel(&self) -> &[Vec3] {
        &self.kernel
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.programs.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Request a one-off clear of every SSAO target before the next render
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn linear_depth(&self) -> TargetId {
        self.linear_depth
    }

    pub fn occlusion(&self) -> TargetId {
        self.occlusion
    }

    /// Multiply occlusion into `lit` on Shaded pixels.
    pub fn render<B: GpuBackend>(
        &mut self,
        ctx: &mut RenderContext<B>,
        gbuffer: &GBuffer,
        camera: &Camera,
        lit: TargetId,
    ) -> RenderResult<()> {
        let Some(programs) = self.programs.filter(|_| self.config.enabled) else {
            return Ok(());
        };
        let (width, height) = ctx
            .backend()
            .target_extent(self.occlusion)
            .ok_or_else(|| RenderError::render("SSAO occlusion target missing"))?;

        let mut scope = ctx.scope("ssao");
        scope.set_blend(BlendMode::Replace);
        scope.set_depth(DepthState::DISABLED);
        scope.set_stencil(StencilMode::Disabled);

        if self.dirty {
            for level in 0..self.config.mip_levels {
                scope.bind_target(TargetBinding::mip(self.linear_depth, level))?;
                scope.clear(&ClearValues::color([FAR_SENTINEL, 0.0, 0.0, 0.0]))?;
                scope.unbind_target();
            }
            for target in [self.occlusion, self.scratch] {
                scope.bind_target(TargetBinding::new(target))?;
                scope.clear(&ClearValues::color([1.0; 4]))?;
                scope.unbind_target();
            }
            self.dirty = false;
            debug!("SSAO targets cleared after reallocation");
        }

        // Linear depth, level 0
        let projection = camera.projection;
        scope.bind_target(TargetBinding::mip(self.linear_depth, 0))?;
        scope.use_program(Some(programs.linearize));
        scope.set_texture("depth", gbuffer.depth());
        scope.set_uniform(
            "depth_params",
            Vec4::new(
                projection.near,
                projection.far.unwrap_or(0.0),
                if projection.far.is_none() { 1.0 } else { 0.0 },
                0.0,
            ),
        );
        scope.draw("ssao_linearize", Geometry::FullScreen)?;
        scope.unbind_target();

        // Min-reduced chain
        scope.use_program(Some(programs.downsample));
        for level in 1..self.config.mip_levels {
            let (src_w, src_h) = mip_extent(width, height, level - 1);
            scope.bind_target(TargetBinding::mip(self.linear_depth, level))?;
            scope.set_texture(
                "source",
                TextureRef::color(self.linear_depth, 0).with_view(TextureView::Mip(level - 1)),
            );
            scope.set_uniform("source_extent", Vec4::new(src_w as f32, src_h as f32, 0.0, 0.0));
            scope.draw("ssao_downsample", Geometry::FullScreen)?;
            scope.unbind_target();
        }

        // Occlusion
        let matrix = projection.matrix();
        scope.bind_target(TargetBinding::new(self.occlusion))?;
        scope.use_program(Some(programs.occlusion));
        scope.set_texture("linear_depth", TextureRef::color(self.linear_depth, 0));
        scope.set_texture("normal", gbuffer.normal());
        scope.set_uniform(
            "kernel",
            self.kernel.iter().map(|k| k.extend(0.0)).collect::<Vec<_>>(),
        );
        scope.set_uniform(
            "projection",
            Vec4::new(
                matrix.x_axis.x,
                matrix.y_axis.y,
                projection.proj_scale(height),
                0.0,
            ),
        );
        scope.set_uniform(
            "params",
            Vec4::new(
                self.config.radius_px,
                self.config.intensity,
                self.config.bias,
                self.config.mip_switch_px,
            ),
        );
        scope.set_uniform(
            "viewport",
            Vec4::new(
                width as f32,
                height as f32,
                1.0 / width as f32,
                1.0 / height as f32,
            ),
        );
        scope.set_uniform("kernel_size", self.kernel.len() as u32);
        scope.set_uniform("mip_levels", self.config.mip_levels);
        scope.draw("ssao_occlusion", Geometry::FullScreen)?;
        scope.unbind_target();

        // Bilateral blur, horizontal into scratch then vertical back
        let radius = self.blur_weights.len() as u32 - 1;
        scope.use_program(Some(programs.blur));
        scope.set_uniform("weights", pack_weights(&self.blur_weights));
        scope.set_uniform("radius", radius);
        scope.set_uniform(
            "params",
            Vec4::new(
                self.config.blur_depth_sigma,
                self.config.blur_normal_power,
                0.0,
                0.0,
            ),
        );
        scope.set_texture("linear_depth", TextureRef::color(self.linear_depth, 0));
        scope.set_texture("normal", gbuffer.normal());
        for (source, target, direction, label) in [
            (self.occlusion, self.scratch, Vec4::X, "ssao_blur_h"),
            (self.scratch, self.occlusion, Vec4::Y, "ssao_blur_v"),
        ] {
            scope.bind_target(TargetBinding::new(target))?;
            scope.set_texture("occlusion", TextureRef::color(source, 0));
            scope.set_uniform("direction", direction);
            scope.draw(label, Geometry::FullScreen)?;
            scope.unbind_target();
        }

        // Composite onto Shaded pixels only
        scope.bind_target(TargetBinding::new(lit))?;
        scope.use_program(Some(programs.composite));
        scope.set_blend(BlendMode::Multiply);
        scope.set_stencil(StencilMode::Equal(ShadingClass::Shaded));
        scope.set_texture("occlusion", TextureRef::color(self.occlusion, 0));
        scope.set_uniform("params", Vec4::new(self.config.strength, 0.0, 0.0, 0.0));
        scope.draw("ssao_composite", Geometry::FullScreen)?;
        Ok(())
    }
}
