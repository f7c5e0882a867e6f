// src/lighting/resolve.rs
// Base resolve of the lit target ahead of light accumulation
// RELEVANT FILES: src/shaders/light_resolve.wgsl, src/renderer.rs

use glam::Vec3;

use crate::core::backend::{ClearValues, Geometry, GpuBackend, ProgramId, TargetId};
use crate::core::context::RenderContext;
use crate::core::gbuffer::GBuffer;
use crate::core::programs;
use crate::core::state::{BlendMode, DepthState, ShadingClass, StencilMode, TargetBinding};
use crate::error::RenderResult;

/// Fills the lit target per shading class.
///
/// Background keeps the clear colour, Shaded gets `albedo * ambient` and Flat
/// copies albedo unchanged.
pub struct BaseResolvePass {
    program: Option<ProgramId>,
}

impl BaseResolvePass {
    pub fn new<B: GpuBackend>(ctx: &mut RenderContext<B>) -> RenderResult<Self> {
        Ok(Self {
            program: ctx.load_program(&programs::LIGHT_RESOLVE)?,
        })
    }

    pub fn render<B: GpuBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        lit: TargetId,
        gbuffer: &GBuffer,
        ambient: Vec3,
        clear_color: [f32; 4],
    ) -> RenderResult<()> {
        let mut scope = ctx.scope("base_resolve");
        scope.bind_target(TargetBinding::new(lit))?;
        // Colour only: depth and stencil belong to the G-buffer
        scope.clear(&ClearValues::color(clear_color))?;

        let Some(program) = self.program else {
            return Ok(());
        };
        scope.use_program(Some(program));
        scope.set_blend(BlendMode::Replace);
        scope.set_depth(DepthState::DISABLED);
        scope.set_texture("albedo", gbuffer.albedo());
        scope.set_uniform("ambient", ambient.extend(1.0));

        for class in ShadingClass::ALL {
            let mode = match class {
                ShadingClass::Background => continue,
                ShadingClass::Shaded => 0u32,
                ShadingClass::Flat => 1u32,
            };
            scope.set_stencil(StencilMode::Equal(class));
            scope.set_uniform("mode", mode);
            scope.draw("base_resolve", Geometry::FullScreen)?;
        }
        Ok(())
    }
}
