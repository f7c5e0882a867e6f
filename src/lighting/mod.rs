// src/lighting/mod.rs
// Light components, the base resolve and additive light accumulation
// RELEVANT FILES: src/shaders/lighting_common.wgsl, src/renderer.rs

pub mod light;
pub mod pass;
pub mod resolve;
pub mod shading;

pub use light::{Light, PointAttenuation};
pub use pass::{collect_lights, LightInstance, LightingPass, LightingStats};
pub use resolve::BaseResolvePass;
