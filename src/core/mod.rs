//! Core rendering infrastructure
//!
//! Backend abstraction, scoped pipeline state, program catalog and the
//! G-buffer shared by every later pass.

pub mod backend;
pub mod context;
pub mod gbuffer;
pub mod mesh;
pub mod programs;
pub mod raster;
pub mod recording;
pub mod registry;
pub mod state;
pub mod uniforms;
pub mod wgpu_backend;

pub use backend::{
    ClearValues, DepthAttachment, Geometry, GpuBackend, MeshData, MeshId, ProgramId, ProgramSource,
    TargetDesc, TargetFormat, TargetId, TextureRef,
};
pub use context::{FrameStats, RenderContext, StateScope};
pub use gbuffer::{GBuffer, GBufferConfig, GBufferPass};
pub use raster::{Image, Raster};
pub use recording::{Recorded, RecordingBackend};
pub use registry::{ResourceRegistry, Sizing};
pub use state::{BlendMode, DepthState, PipelineState, ShadingClass, StencilMode, TargetBinding};
pub use uniforms::{UniformBlock, UniformValue};
pub use wgpu_backend::WgpuBackend;
