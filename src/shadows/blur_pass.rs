// src/shadows/blur_pass.rs
// Separable Gaussian blur of one moment-atlas layer through a scratch target
// RELEVANT FILES: src/shaders/shadow_blur.wgsl, src/shadows/csm.rs

use glam::Vec4;

use crate::core::backend::{GpuBackend, Geometry, ProgramId, TargetId, TextureRef, TextureView};
use crate::core::context::RenderContext;
use crate::core::programs::{self, pack_weights, MAX_BLUR_TAPS};
use crate::core::state::{BlendMode, DepthState, StencilMode, TargetBinding};
use crate::error::RenderResult;

/// One-sided normalized Gaussian taps for an odd `width`, centre first.
///
/// `sigma = width / 4`; the weights satisfy `w[0] + 2 * sum(w[1..]) = 1`.
pub fn gaussian_weights(width: u32) -> Vec<f32> {
    let radius = (width / 2).min(MAX_BLUR_TAPS as u32 - 1) as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let sigma = (width as f32 / 4.0).max(0.5);
    let raw: Vec<f32> = (0..=radius)
        .map(|i| (-(i as f32 * i as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total = raw[0] + 2.0 * raw[1..].iter().sum::<f32>();
    raw.into_iter().map(|w| w / total).collect()
}

pub struct ShadowBlurPass {
    program: Option<ProgramId>,
    weights: Vec<f32>,
}

impl ShadowBlurPass {
    pub fn new<B: GpuBackend>(ctx: &mut RenderContext<B>, width: u32) -> RenderResult<Self> {
        Ok(Self {
            program: ctx.load_program(&programs::SHADOW_BLUR)?,
            weights: gaussian_weights(width),
        })
    }

    pub fn radius(&self) -> u32 {
        self.weights.len() as u32 - 1
    }

    /// Blur `layer` of `atlas`: horizontal into `scratch`, vertical back into the layer.
    pub fn blur_layer<B: GpuBackend>(
        &self,
        ctx: &mut RenderContext<B>,
        atlas: TargetId,
        scratch: TargetId,
        layer: u32,
    ) -> RenderResult<()> {
        let Some(program) = self.program else {
            return Ok(());
        };
        if self.radius() == 0 {
            return Ok(());
        }

        let mut scope = ctx.scope("shadow_blur");
        scope.set_blend(BlendMode::Replace);
        scope.set_depth(DepthState::DISABLED);
        scope.set_stencil(StencilMode::Disabled);
        scope.use_program(Some(program));
        scope.set_uniform("weights", pack_weights(&self.weights));
        scope.set_uniform("radius", self.radius());

        scope.bind_target(TargetBinding::new(scratch))?;
        scope.set_uniform("direction", Vec4::new(1.0, 0.0, 0.0, 0.0));
        scope.set_texture(
            "source",
            TextureRef::color(atlas, 0).with_view(TextureView::Layer(layer)),
        );
        scope.draw("shadow_blur_h", Geometry::FullScreen)?;
        scope.unbind_target();

        scope.bind_target(TargetBinding::layer(atlas, layer))?;
        scope.set_uniform("direction", Vec4::new(0.0, 1.0, 0.0, 0.0));
        scope.set_texture("source", TextureRef::color(scratch, 0));
        scope.draw("shadow_blur_v", Geometry::FullScreen)?;
        Ok(())
    }
}
