// src/core/context.rs
// Render context owning the backend and the scoped pipeline state
// RELEVANT FILES: src/core/state.rs, src/core/backend.rs

use log::{debug, trace, warn};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use super::backend::{ClearValues, DrawCommand, Geometry, GpuBackend, ProgramId, ProgramSource, TextureRef};
use super::state::{BlendMode, DepthState, PipelineState, StateMachine, StencilMode, TargetBinding};
use super::uniforms::{UniformBlock, UniformValue};
use crate::error::{RenderError, RenderResult};

#[derive(Debug, Default, Clone)]
struct ProgramBindings {
    uniforms: UniformBlock,
    textures: Vec<(&'static str, TextureRef)>,
}

/// Commands issued since the last [`RenderContext::take_stats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub draws: u32,
    pub clears: u32,
    /// Draws dropped because the program was unusable
    pub skipped_draws: u32,
}

/// Owns the backend and the global pipeline state.
///
/// State changes go through [`StateScope`] guards obtained from [`RenderContext::scope`].
pub struct RenderContext<B: GpuBackend> {
    backend: B,
    state: StateMachine,
    bindings: HashMap<ProgramId, ProgramBindings>,
    stats: FrameStats,
}

impl<B: GpuBackend> RenderContext<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: StateMachine::new(),
            bindings: HashMap::new(),
            stats: FrameStats::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.state
    }

    pub fn pipeline_state(&self) -> &PipelineState {
        self.state.state()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn take_stats(&mut self) -> FrameStats {
        std::mem::take(&mut self.stats)
    }

    /// Compile a program.
    ///
    /// Compile failures are logged and yield `Ok(None)`; the owning pass then
    /// skips its draws while the rest of the frame continues.
    pub fn load_program(&mut self, source: &ProgramSource) -> RenderResult<Option<ProgramId>> {
        match self.backend.load_program(source) {
            Ok(id) => {
                debug!("Loaded program '{}' as {:?}", source.label, id);
                self.bindings.entry(id).or_default();
                Ok(Some(id))
            }
            Err(err @ RenderError::ShaderCompile { .. }) => {
                warn!("[{}] {}; pass disabled", err.category(), err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Open a state scope. Everything changed through the guard is restored when
    /// it drops, including target bindings pushed inside it.
    pub fn scope(&mut self, label: &'static str) -> StateScope<'_, B> {
        self.state.push_scope();
        trace!("enter scope '{}' (depth {})", label, self.state.scope_depth());
        StateScope { ctx: self, label }
    }
}

/// RAII guard over the pipeline state. Scopes nest through `Deref`.
pub struct StateScope<'a, B: GpuBackend> {
    ctx: &'a mut RenderContext<B>,
    label: &'static str,
}

impl<'a, B: GpuBackend> StateScope<'a, B> {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn set_blend(&mut self, blend: BlendMode) {
        self.ctx.state.state_mut().blend = blend;
    }

    pub fn set_depth(&mut self, depth: DepthState) {
        self.ctx.state.state_mut().depth = depth;
    }

    pub fn set_stencil(&mut self, stencil: StencilMode) {
        self.ctx.state.state_mut().stencil = stencil;
    }

    /// Bind a program for subsequent uniform updates and draws; `None` unbinds.
    pub fn use_program(&mut self, program: Option<ProgramId>) {
        self.ctx.state.state_mut().program = program;
    }

    pub fn bind_target(&mut self, binding: TargetBinding) -> RenderResult<()> {
        let desc = self.ctx.backend.target_desc(binding.target).ok_or_else(|| {
            RenderError::render(format!("bind of unknown target {:?}", binding.target))
        })?;
        if binding.layer >= desc.layers || binding.mip_level >= desc.mip_levels {
            return Err(RenderError::render(format!(
                "binding {:?} is outside '{}' ({} layers, {} mips)",
                binding, desc.label, desc.layers, desc.mip_levels
            )));
        }
        self.ctx.state.bind_target(binding);
        Ok(())
    }

    /// Pop the innermost binding, restoring the one below it.
    pub fn unbind_target(&mut self) -> Option<TargetBinding> {
        self.ctx.state.unbind_target()
    }

    /// Set a uniform on the bound program. Returns false when no program is bound.
    pub fn set_uniform(&mut self, name: &'static str, value: impl Into<UniformValue>) -> bool {
        let Some(program) = self.ctx.state.state().program else {
            return false;
        };
        self.ctx
            .bindings
            .entry(program)
            .or_default()
            .uniforms
            .insert(name, value.into());
        true
    }

    /// Attach a texture to a named slot of the bound program.
    pub fn set_texture(&mut self, name: &'static str, texture: TextureRef) -> bool {
        let Some(program) = self.ctx.state.state().program else {
            return false;
        };
        let textures = &mut self.ctx.bindings.entry(program).or_default().textures;
        match textures.iter_mut().find(|(slot, _)| *slot == name) {
            Some(entry) => entry.1 = texture,
            None => textures.push((name, texture)),
        }
        true
    }

    /// Clear the currently bound target.
    pub fn clear(&mut self, values: &ClearValues) -> RenderResult<()> {
        let target = self
            .ctx
            .state
            .current_target()
            .ok_or_else(|| RenderError::render(format!("clear in '{}' with no target", self.label)))?;
        self.ctx.backend.clear(target, values)?;
        self.ctx.stats.clears += 1;
        Ok(())
    }

    /// Draw with the current state.
    ///
    /// Returns `Ok(false)` when no program is bound or the backend reports the
    /// program as unusable.
    pub fn draw(&mut self, label: &'static str, geometry: Geometry) -> RenderResult<bool> {
        let state = *self.ctx.state.state();
        let Some(program) = state.program else {
            trace!("draw '{}' skipped: no program bound", label);
            return Ok(false);
        };
        let target = self
            .ctx
            .state
            .current_target()
            .ok_or_else(|| RenderError::render(format!("draw '{}' with no target", label)))?;
        let bindings = self.ctx.bindings.get(&program).cloned().unwrap_or_default();
        let command = DrawCommand {
            label,
            target,
            state,
            program,
            geometry,
            uniforms: bindings.uniforms,
            textures: bindings.textures,
        };
        match self.ctx.backend.draw(&command) {
            Ok(()) => {
                self.ctx.stats.draws += 1;
                Ok(true)
            }
            Err(err @ RenderError::ShaderCompile { .. }) => {
                warn!("[{}] draw '{}' skipped: {}", err.category(), label, err);
                self.ctx.stats.skipped_draws += 1;
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

impl<'a, B: GpuBackend> Deref for StateScope<'a, B> {
    type Target = RenderContext<B>;

    fn deref(&self) -> &RenderContext<B> {
        self.ctx
    }
}

impl<'a, B: GpuBackend> DerefMut for StateScope<'a, B> {
    fn deref_mut(&mut self) -> &mut RenderContext<B> {
        self.ctx
    }
}

impl<'a, B: GpuBackend> Drop for StateScope<'a, B> {
    fn drop(&mut self) {
        self.ctx.state.pop_scope();
        trace!("leave scope '{}'", self.label);
    }
}
