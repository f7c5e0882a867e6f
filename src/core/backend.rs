// src/core/backend.rs
// GPU abstraction consumed by the passes: targets, programs, meshes, draws
// RELEVANT FILES: src/core/context.rs, src/core/recording.rs, src/core/wgpu_backend/mod.rs

use glam::Vec3;

use super::state::{PipelineState, ShadingClass, TargetBinding};
use super::uniforms::{UniformBlock, UniformDecl};
use crate::error::{RenderError, RenderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

/// Attachment formats used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rg32Float,
    R32Float,
    R16Float,
    Depth24PlusStencil8,
    Depth32Float,
}

impl TargetFormat {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TargetFormat::Depth24PlusStencil8 | TargetFormat::Depth32Float
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, TargetFormat::Depth24PlusStencil8)
    }

    /// Bytes per texel for colour formats
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TargetFormat::Rgba8Unorm | TargetFormat::R32Float => 4,
            TargetFormat::R16Float => 2,
            TargetFormat::Rgba16Float | TargetFormat::Rg32Float => 8,
            TargetFormat::Depth24PlusStencil8 | TargetFormat::Depth32Float => 4,
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TargetFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TargetFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
            TargetFormat::R32Float => wgpu::TextureFormat::R32Float,
            TargetFormat::R16Float => wgpu::TextureFormat::R16Float,
            TargetFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
            TargetFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }
}

/// Depth attachment of a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthAttachment {
    None,
    Owned(TargetFormat),
    /// Borrow the depth-stencil of another target with the same extent
    Shared(TargetId),
}

/// Everything needed to allocate a render target
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub mip_levels: u32,
    pub color_formats: Vec<TargetFormat>,
    pub depth: DepthAttachment,
}

impl TargetDesc {
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            layers: 1,
            mip_levels: 1,
            color_formats: Vec::new(),
            depth: DepthAttachment::None,
        }
    }

    pub fn with_color(mut self, format: TargetFormat) -> Self {
        self.color_formats.push(format);
        self
    }

    pub fn with_depth(mut self, depth: DepthAttachment) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Extent of `mip_level`: `ceil(dim / 2^k)`, at least 1
    pub fn mip_extent(&self, mip_level: u32) -> (u32, u32) {
        mip_extent(self.width, self.height, mip_level)
    }

    /// Level-0 size actually allocated.
    ///
    /// Mipped targets round each dimension up to a multiple of
    /// `2^(mip_levels - 1)` so that halving the allocation never drops below
    /// `mip_extent(k)`; draws and reads are limited to `mip_extent(k)`.
    pub fn allocation_extent(&self) -> (u32, u32) {
        let align = 1u32 << self.mip_levels.saturating_sub(1).min(31);
        let pad = |d: u32| d.div_ceil(align) * align;
        (pad(self.width), pad(self.height))
    }

    pub fn owned_depth_format(&self) -> Option<TargetFormat> {
        match self.depth {
            DepthAttachment::Owned(f) => Some(f),
            _ => None,
        }
    }

    /// Completeness check, run before allocation.
    pub fn validate(&self) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::incomplete_target(format!(
                "'{}' has zero extent {}x{}",
                self.label, self.width, self.height
            )));
        }
        if self.layers == 0 || self.mip_levels == 0 {
            return Err(RenderError::incomplete_target(format!(
                "'{}' needs at least one layer and one mip level",
                self.label
            )));
        }
        if self.color_formats.is_empty() && self.depth == DepthAttachment::None {
            return Err(RenderError::incomplete_target(format!(
                "'{}' has no attachments",
                self.label
            )));
        }
        if let Some(bad) = self.color_formats.iter().find(|f| f.is_depth()) {
            return Err(RenderError::incomplete_target(format!(
                "'{}' uses depth format {:?} as a colour attachment",
                self.label, bad
            )));
        }
        if let DepthAttachment::Owned(format) = self.depth {
            if !format.is_depth() {
                return Err(RenderError::incomplete_target(format!(
                    "'{}' uses colour format {:?} as depth attachment",
                    self.label, format
                )));
            }
        }
        if self.depth != DepthAttachment::None && self.mip_levels > 1 {
            return Err(RenderError::incomplete_target(format!(
                "'{}' combines a depth attachment with {} mip levels",
                self.label, self.mip_levels
            )));
        }
        let max_mips = 32 - self.width.max(self.height).leading_zeros();
        if self.mip_levels > max_mips {
            return Err(RenderError::incomplete_target(format!(
                "'{}' requests {} mip levels, extent allows {}",
                self.label, self.mip_levels, max_mips
            )));
        }
        Ok(())
    }
}

pub fn mip_extent(width: u32, height: u32, mip_level: u32) -> (u32, u32) {
    let shrink = |d: u32| -> u32 {
        let div = 1u64 << mip_level.min(31);
        (((d as u64) + div - 1) / div).max(1) as u32
    };
    (shrink(width), shrink(height))
}

/// Which attachment of a target a texture binding reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color(u32),
    Depth,
}

/// Subresource range of a texture binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureView {
    All,
    Layer(u32),
    Mip(u32),
}

/// A target attachment bound to a program texture slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureRef {
    pub target: TargetId,
    pub attachment: Attachment,
    pub view: TextureView,
}

impl TextureRef {
    pub fn color(target: TargetId, index: u32) -> Self {
        Self {
            target,
            attachment: Attachment::Color(index),
            view: TextureView::All,
        }
    }

    pub fn depth(target: TargetId) -> Self {
        Self {
            target,
            attachment: Attachment::Depth,
            view: TextureView::All,
        }
    }

    pub fn with_view(mut self, view: TextureView) -> Self {
        self.view = view;
        self
    }
}

/// Shader-side shape of a texture slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// `texture_2d<f32>` read with `textureLoad`
    Color2D,
    /// `texture_depth_2d`
    Depth2D,
    /// `texture_2d_array<f32>`
    Color2DArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDecl {
    pub name: &'static str,
    pub kind: TextureKind,
}

impl TextureDecl {
    pub const fn new(name: &'static str, kind: TextureKind) -> Self {
        Self { name, kind }
    }
}

/// Vertex input expected by a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInput {
    /// Interleaved position and normal, `f32x3` each
    Mesh,
    /// No vertex buffer; one oversized triangle generated from the vertex index
    FullScreen,
}

/// Source and interface of a shader program
#[derive(Debug, Clone, Copy)]
pub struct ProgramSource {
    pub label: &'static str,
    pub source: &'static str,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
    pub uniforms: &'static [UniformDecl],
    pub textures: &'static [TextureDecl],
    pub vertex_input: VertexInput,
}

/// CPU-side mesh data
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub label: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    Mesh(MeshId),
    FullScreen,
}

/// Values for a clear; `None` leaves that aspect untouched
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<ShadingClass>,
}

impl ClearValues {
    pub fn color(rgba: [f32; 4]) -> Self {
        Self {
            color: Some(rgba),
            depth: None,
            stencil: None,
        }
    }

    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_stencil(mut self, class: ShadingClass) -> Self {
        self.stencil = Some(class);
        self
    }
}

/// A fully resolved draw as handed to the backend
#[derive(Debug, Clone)]
pub struct DrawCommand {
    pub label: &'static str,
    pub target: TargetBinding,
    pub state: PipelineState,
    pub program: ProgramId,
    pub geometry: Geometry,
    pub uniforms: UniformBlock,
    pub textures: Vec<(&'static str, TextureRef)>,
}

/// Render-target provider and program host.
///
/// Pipeline state and the target stack live in the core; the backend only
/// executes fully resolved clears and draws.
pub trait GpuBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> RenderResult<TargetId>;

    /// Reallocate storage at a new extent, keeping formats and layout.
    fn resize_target(&mut self, id: TargetId, width: u32, height: u32) -> RenderResult<()>;

    fn target_desc(&self, id: TargetId) -> Option<&TargetDesc>;

    /// Compile a program. Compile failures are `RenderError::ShaderCompile`.
    fn load_program(&mut self, source: &ProgramSource) -> RenderResult<ProgramId>;

    fn upload_mesh(&mut self, mesh: &MeshData) -> RenderResult<MeshId>;

    fn clear(&mut self, target: TargetBinding, values: &ClearValues) -> RenderResult<()>;

    fn draw(&mut self, command: &DrawCommand) -> RenderResult<()>;

    /// Submit outstanding work for the frame
    fn finish_frame(&mut self) -> RenderResult<()>;

    fn target_extent(&self, id: TargetId) -> Option<(u32, u32)> {
        self.target_desc(id).map(|d| (d.width, d.height))
    }
}
