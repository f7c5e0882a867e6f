//! deferred-forge: deferred shading core with cascaded variance shadow maps
//! and screen-space ambient occlusion.
//!
//! The frame pipeline runs against the [`core::GpuBackend`] trait so it can be
//! driven by the wgpu backend or by the command-recording backend used in
//! tests. Scene data is read through [`scene::SceneQuery`].

pub mod camera;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod gpu;
pub mod lighting;
pub mod post;
pub mod renderer;
pub mod scene;
pub mod shadows;

pub use camera::{Camera, Projection};
pub use config::RendererConfig;
pub use core::context::{RenderContext, StateScope};
pub use core::state::{BlendMode, DepthState, PipelineState, ShadingClass, StencilMode};
pub use error::{RenderError, RenderResult};
pub use lighting::light::{Light, PointAttenuation};
pub use renderer::{DeferredRenderer, FrameReport};
pub use scene::{Capabilities, ObjectId, Scene, SceneQuery};
pub use shadows::{Cascade, CascadedShadowMaps, CsmConfig};
