// src/shadows/mod.rs
// Cascaded variance shadow maps for the directional light
// RELEVANT FILES: src/shaders/shadow_moments.wgsl, src/shaders/shadow_blur.wgsl, src/lighting/pass.rs

pub mod blur_pass;
pub mod bounding_sphere;
pub mod cascade_math;
pub mod csm;
pub mod csm_types;

pub use bounding_sphere::{minimum_bounding_sphere, BoundingSphere};
pub use csm::{farthest_occluder_distance, CascadedShadowMaps};
pub use csm_types::{Cascade, CascadeStatistics, CsmConfig};
