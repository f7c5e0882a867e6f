//! Screen-space post effects composited onto the lit image
//!
//! Currently ambient occlusion: a linear depth mip chain, hemisphere-kernel
//! occlusion, a bilateral blur and a multiplicative composite.

pub mod ssao;
pub mod ssao_kernel;
pub mod ssao_math;

pub use ssao::{SsaoConfig, SsaoPass};
