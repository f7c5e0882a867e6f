//! Renderer configuration loaded from JSON
//!
//! Every field has a default, so a partial document such as
//! `{"ssao": {"kernel_size": 32}}` is a complete configuration.

use std::path::Path;

use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::backend::mip_extent;
use crate::error::{RenderError, RenderResult};
use crate::post::SsaoConfig;
use crate::shadows::CsmConfig;

/// Top-level renderer tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    /// Ambient term applied to Shaded pixels before light accumulation
    pub ambient: Vec3,
    /// Lit-target colour of Background pixels
    pub clear_color: [f32; 4],
    pub shadows: CsmConfig,
    pub ssao: SsaoConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            ambient: Vec3::splat(0.08),
            clear_color: [0.05, 0.06, 0.08, 1.0],
            shadows: CsmConfig::default(),
            ssao: SsaoConfig::default(),
        }
    }
}

impl RendererConfig {
    pub fn from_json_str(json: &str) -> RenderResult<Self> {
        let config: RendererConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        debug!("Loading renderer config from {}", path.display());
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> RenderResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::invalid_config(format!(
                "viewport {}x{} must be non-empty",
                self.width, self.height
            )));
        }
        if !self.ambient.is_finite() || self.ambient.min_element() < 0.0 {
            return Err(RenderError::invalid_config("ambient must be finite and non-negative"));
        }
        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(RenderError::invalid_config("clear_color must be finite"));
        }
        self.shadows.validate()?;
        self.ssao.validate()?;
        check_mips_fit(self.ssao.mip_levels, self.width, self.height)
    }
}

/// The SSAO depth chain may not shrink past 1x1 on both axes before its last level.
pub(crate) fn check_mips_fit(mip_levels: u32, width: u32, height: u32) -> RenderResult<()> {
    let last = mip_levels.saturating_sub(1);
    if last > 0 && mip_extent(width, height, last - 1) == (1, 1) {
        return Err(RenderError::invalid_config(format!(
            "{} SSAO mip levels do not fit a {}x{} viewport",
            mip_levels, width, height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shadows.cascade_count, 4);
        assert_eq!(config.shadows.shadow_map_size, 2048);
        assert_eq!(config.shadows.split_lambda, 0.85);
        assert_eq!(config.shadows.max_shadow_distance, 150.0);
        assert_eq!(config.shadows.blur_width, 5);
        assert_eq!(config.ssao.kernel_size, 64);
        assert_eq!(config.ssao.mip_levels, 5);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            RendererConfig::from_json_str(r#"{"width": 640, "ssao": {"kernel_size": 16}}"#).unwrap();
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 720);
        assert_eq!(config.ssao.kernel_size, 16);
        assert_eq!(config.ssao.mip_levels, 5);
        assert_eq!(config.shadows, CsmConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = RendererConfig::from_json_str(r#"{"shadows": {"cascade_count": 0}}"#).unwrap_err();
        assert!(matches!(err, RenderError::InvalidConfig(_)));
        let err = RendererConfig::from_json_str(r#"{"width": 4, "height": 4}"#).unwrap_err();
        assert!(matches!(err, RenderError::InvalidConfig(_)));
        let err = RendererConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, RenderError::ConfigParse(_)));
    }

    #[test]
    fn file_round_trip() {
        let mut config = RendererConfig::default();
        config.ambient = Vec3::new(0.1, 0.2, 0.3);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json_string().unwrap().as_bytes()).unwrap();
        let loaded = RendererConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, config);

        let missing = RendererConfig::from_json_file("/nonexistent/renderer.json").unwrap_err();
        assert!(matches!(missing, RenderError::Io(_)));
    }
}
