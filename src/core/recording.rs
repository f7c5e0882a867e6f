// src/core/recording.rs
// Headless backend that records every clear and draw with its resolved state
// Exists so sequencing, scoping and stencil gating can be tested without a GPU
// With a raster attached, clears and draws are also executed on the CPU

use std::collections::HashSet;

use super::backend::{
    Attachment, ClearValues, DepthAttachment, DrawCommand, Geometry, GpuBackend, MeshData, MeshId,
    ProgramId, ProgramSource, TargetDesc, TargetId, TextureKind, TextureView, VertexInput,
};
use super::raster::{DrawJob, Raster, SlotSource};
use super::state::{StencilMode, TargetBinding};
use super::uniforms::UniformLayout;
use crate::error::{RenderError, RenderResult};

/// One recorded GPU command
#[derive(Debug, Clone)]
pub enum Recorded {
    Clear {
        target: TargetBinding,
        values: ClearValues,
    },
    Draw(DrawCommand),
    FinishFrame,
}

#[derive(Debug, Clone)]
struct RecordedProgram {
    source: ProgramSource,
    layout: UniformLayout,
}

/// Validating command recorder.
///
/// Draws are checked the way a real device would check them: unknown ids,
/// stencil use without a stencil attachment, texture slots the program does
/// not declare, mismatched uniform types and feedback loops all fail.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    targets: Vec<TargetDesc>,
    programs: Vec<RecordedProgram>,
    meshes: Vec<MeshData>,
    failing: HashSet<&'static str>,
    commands: Vec<Recorded>,
    frames: u32,
    raster: Option<Raster>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder that also rasterizes every command into CPU images.
    pub fn with_raster() -> Self {
        Self {
            raster: Some(Raster::default()),
            ..Self::default()
        }
    }

    pub fn raster(&self) -> Option<&Raster> {
        self.raster.as_ref()
    }

    /// Make `load_program` fail for the program with this label.
    pub fn fail_program(&mut self, label: &'static str) {
        self.failing.insert(label);
    }

    pub fn commands(&self) -> &[Recorded] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Recorded> {
        std::mem::take(&mut self.commands)
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands.iter().filter_map(|c| match c {
            Recorded::Draw(d) => Some(d),
            _ => None,
        })
    }

    pub fn program_label(&self, id: ProgramId) -> Option<&'static str> {
        self.programs.get(id.0 as usize).map(|p| p.source.label)
    }

    pub fn target_label(&self, id: TargetId) -> Option<&str> {
        self.targets.get(id.0 as usize).map(|d| d.label.as_str())
    }

    pub fn frames_finished(&self) -> u32 {
        self.frames
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    fn desc(&self, id: TargetId) -> RenderResult<&TargetDesc> {
        self.targets
            .get(id.0 as usize)
            .ok_or_else(|| RenderError::render(format!("unknown target {:?}", id)))
    }

    /// Resolve the depth-stencil owner of a target
    fn depth_owner(&self, id: TargetId) -> RenderResult<Option<(TargetId, &TargetDesc)>> {
        let desc = self.desc(id)?;
        match desc.depth {
            DepthAttachment::None => Ok(None),
            DepthAttachment::Owned(_) => Ok(Some((id, desc))),
            DepthAttachment::Shared(owner) => Ok(Some((owner, self.desc(owner)?))),
        }
    }

    fn validate_draw(&self, cmd: &DrawCommand) -> RenderResult<()> {
        let program = self
            .programs
            .get(cmd.program.0 as usize)
            .ok_or_else(|| RenderError::render(format!("unknown program {:?}", cmd.program)))?;
        let label = program.source.label;
        let target = self.desc(cmd.target.target)?;
        if target.color_formats.is_empty() && program.source.vertex_input == VertexInput::FullScreen {
            return Err(RenderError::render(format!(
                "'{}' draws full-screen into depth-only target '{}'",
                label, target.label
            )));
        }

        match (program.source.vertex_input, cmd.geometry) {
            (VertexInput::Mesh, Geometry::Mesh(mesh)) => {
                if mesh.0 as usize >= self.meshes.len() {
                    return Err(RenderError::render(format!("unknown mesh {:?}", mesh)));
                }
            }
            (VertexInput::FullScreen, Geometry::FullScreen) => {}
            (input, geometry) => {
                return Err(RenderError::render(format!(
                    "'{}' expects {:?} input, got {:?}",
                    label, input, geometry
                )))
            }
        }

        let depth_format = self
            .depth_owner(cmd.target.target)?
            .and_then(|(_, d)| d.owned_depth_format());
        let needs_stencil = cmd.state.stencil != StencilMode::Disabled;
        if needs_stencil && !depth_format.map(|f| f.has_stencil()).unwrap_or(false) {
            return Err(RenderError::render(format!(
                "'{}' uses {:?} on '{}' which has no stencil",
                label, cmd.state.stencil, target.label
            )));
        }
        if (cmd.state.depth.test.is_some() || cmd.state.depth.write) && depth_format.is_none() {
            return Err(RenderError::render(format!(
                "'{}' enables depth on '{}' which has no depth attachment",
                label, target.label
            )));
        }

        for decl in program.source.textures {
            let Some((_, tex)) = cmd.textures.iter().find(|(name, _)| *name == decl.name) else {
                return Err(RenderError::render(format!(
                    "'{}' texture slot '{}' is unbound",
                    label, decl.name
                )));
            };
            let source = self.desc(tex.target)?;
            let kind_ok = match (decl.kind, tex.attachment, tex.view) {
                (TextureKind::Depth2D, Attachment::Depth, _) => {
                    self.depth_owner(tex.target)?.is_some()
                }
                (TextureKind::Color2D, Attachment::Color(i), view) => {
                    (i as usize) < source.color_formats.len()
                        && (source.layers == 1 || matches!(view, TextureView::Layer(_)))
                }
                (TextureKind::Color2DArray, Attachment::Color(i), TextureView::All) => {
                    (i as usize) < source.color_formats.len()
                }
                _ => false,
            };
            if !kind_ok {
                return Err(RenderError::render(format!(
                    "'{}' slot '{}' ({:?}) cannot read {:?}",
                    label, decl.name, decl.kind, tex
                )));
            }
            // Reading the attachment being rendered
            if tex.target == cmd.target.target {
                let same_sub = match tex.view {
                    TextureView::All => true,
                    TextureView::Layer(l) => l == cmd.target.layer,
                    TextureView::Mip(m) => m == cmd.target.mip_level,
                };
                if same_sub && matches!(tex.attachment, Attachment::Color(_)) {
                    return Err(RenderError::render(format!(
                        "'{}' reads '{}' while rendering into it",
                        label, source.label
                    )));
                }
            }
        }

        program.layout.pack(label, &cmd.uniforms)?;
        Ok(())
    }

    fn rasterize(&mut self, cmd: &DrawCommand) -> RenderResult<()> {
        if self.raster.is_none() {
            return Ok(());
        }
        let program = self
            .programs
            .get(cmd.program.0 as usize)
            .ok_or_else(|| RenderError::render(format!("unknown program {:?}", cmd.program)))?
            .source
            .label;
        let depth_owner = self.depth_owner(cmd.target.target)?.map(|(owner, _)| owner);
        let mut slots = Vec::with_capacity(cmd.textures.len());
        for (name, tex) in &cmd.textures {
            let source = match tex.attachment {
                Attachment::Color(i) => SlotSource::Color {
                    target: tex.target,
                    attachment: i as usize,
                    view: tex.view,
                },
                Attachment::Depth => match self.depth_owner(tex.target)? {
                    Some((owner, _)) => SlotSource::Depth { owner },
                    None => {
                        return Err(RenderError::render(format!(
                            "slot '{}' reads depth of {:?} which has none",
                            name, tex.target
                        )))
                    }
                },
            };
            slots.push((*name, source));
        }
        let mesh = match cmd.geometry {
            Geometry::Mesh(id) => self.meshes.get(id.0 as usize),
            Geometry::FullScreen => None,
        };
        let target = self
            .targets
            .get(cmd.target.target.0 as usize)
            .ok_or_else(|| RenderError::render(format!("unknown target {:?}", cmd.target.target)))?;
        let job = DrawJob {
            program,
            command: cmd,
            target,
            depth_owner,
            slots,
            mesh,
        };
        match self.raster.as_mut() {
            Some(raster) => raster.draw(&job),
            None => Ok(()),
        }
    }
}

impl GpuBackend for RecordingBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> RenderResult<TargetId> {
        desc.validate()?;
        if let DepthAttachment::Shared(owner) = desc.depth {
            let owner_desc = self.desc(owner)?;
            if (owner_desc.width, owner_desc.height) != (desc.width, desc.height) {
                return Err(RenderError::incomplete_target(format!(
                    "'{}' shares depth of '{}' with a different extent",
                    desc.label, owner_desc.label
                )));
            }
        }
        self.targets.push(desc.clone());
        let id = TargetId(self.targets.len() as u32 - 1);
        if let Some(raster) = self.raster.as_mut() {
            raster.allocate(id, desc);
        }
        Ok(id)
    }

    fn resize_target(&mut self, id: TargetId, width: u32, height: u32) -> RenderResult<()> {
        let mut desc = self.desc(id)?.clone();
        desc.width = width;
        desc.height = height;
        desc.validate()?;
        if let Some(raster) = self.raster.as_mut() {
            raster.allocate(id, &desc);
        }
        self.targets[id.0 as usize] = desc;
        Ok(())
    }

    fn target_desc(&self, id: TargetId) -> Option<&TargetDesc> {
        self.targets.get(id.0 as usize)
    }

    fn load_program(&mut self, source: &ProgramSource) -> RenderResult<ProgramId> {
        if self.failing.contains(source.label) {
            return Err(RenderError::shader(source.label, "forced failure"));
        }
        self.programs.push(RecordedProgram {
            source: *source,
            layout: UniformLayout::new(source.uniforms),
        });
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn upload_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshId> {
        self.meshes.push(mesh.clone());
        Ok(MeshId(self.meshes.len() as u32 - 1))
    }

    fn clear(&mut self, target: TargetBinding, values: &ClearValues) -> RenderResult<()> {
        let desc = self.desc(target.target)?;
        if values.stencil.is_some() {
            let has_stencil = self
                .depth_owner(target.target)?
                .and_then(|(_, d)| d.owned_depth_format())
                .map(|f| f.has_stencil())
                .unwrap_or(false);
            if !has_stencil {
                return Err(RenderError::render(format!(
                    "stencil clear on '{}' which has no stencil",
                    desc.label
                )));
            }
        }
        let depth_owner = self.depth_owner(target.target)?.map(|(owner, _)| owner);
        if let Some(raster) = self.raster.as_mut() {
            raster.clear(target, depth_owner, values);
        }
        self.commands.push(Recorded::Clear {
            target,
            values: *values,
        });
        Ok(())
    }

    fn draw(&mut self, command: &DrawCommand) -> RenderResult<()> {
        self.validate_draw(command)?;
        self.rasterize(command)?;
        self.commands.push(Recorded::Draw(command.clone()));
        Ok(())
    }

    fn finish_frame(&mut self) -> RenderResult<()> {
        self.frames += 1;
        self.commands.push(Recorded::FinishFrame);
        Ok(())
    }
}
