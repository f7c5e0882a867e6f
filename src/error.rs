//! Central error handling for the deferred renderer
//!
//! Provides a unified RenderError enum with consistent categorization so
//! passes can decide which failures are recoverable for the frame loop.

/// Centralized error type for all renderer operations
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Device error: {0}")]
    Device(String),

    /// A program failed to compile or link. Passes treat this as a no-op.
    #[error("Shader compile error in '{program}': {message}")]
    ShaderCompile { program: String, message: String },

    /// Attachment sizes or formats do not form a usable render target.
    #[error("Incomplete render target: {0}")]
    IncompleteTarget(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Numeric input that would propagate NaNs into render targets.
    #[error("Degenerate input: {0}")]
    Degenerate(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Readback error: {0}")]
    Readback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl RenderError {
    /// Short category prefix used in log lines
    pub fn category(&self) -> &'static str {
        match self {
            RenderError::Device(_) => "Device",
            RenderError::ShaderCompile { .. } => "Shader",
            RenderError::IncompleteTarget(_) => "Target",
            RenderError::InvalidConfig(_) => "Config",
            RenderError::Degenerate(_) => "Degenerate",
            RenderError::Render(_) => "Render",
            RenderError::Readback(_) => "Readback",
            RenderError::Io(_) => "IO",
            RenderError::ConfigParse(_) => "Config",
        }
    }

    /// Whether the frame loop may continue after this error.
    ///
    /// Shader failures and numeric degeneracies only disable the affected pass;
    /// everything else indicates a broken device or configuration.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RenderError::ShaderCompile { .. } | RenderError::Degenerate(_)
        )
    }

    pub fn device<T: ToString>(msg: T) -> Self {
        RenderError::Device(msg.to_string())
    }

    pub fn shader<P: ToString, M: ToString>(program: P, message: M) -> Self {
        RenderError::ShaderCompile {
            program: program.to_string(),
            message: message.to_string(),
        }
    }

    pub fn incomplete_target<T: ToString>(msg: T) -> Self {
        RenderError::IncompleteTarget(msg.to_string())
    }

    pub fn invalid_config<T: ToString>(msg: T) -> Self {
        RenderError::InvalidConfig(msg.to_string())
    }

    pub fn degenerate<T: ToString>(msg: T) -> Self {
        RenderError::Degenerate(msg.to_string())
    }

    pub fn render<T: ToString>(msg: T) -> Self {
        RenderError::Render(msg.to_string())
    }

    pub fn readback<T: ToString>(msg: T) -> Self {
        RenderError::Readback(msg.to_string())
    }
}

/// Result type alias for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_are_pass_level() {
        assert!(RenderError::shader("gbuffer", "bad token").is_recoverable());
        assert!(RenderError::degenerate("zero light direction").is_recoverable());
        assert!(!RenderError::incomplete_target("size mismatch").is_recoverable());
        assert!(!RenderError::device("lost").is_recoverable());
    }

    #[test]
    fn display_includes_program_name() {
        let err = RenderError::shader("ssao_occlusion", "unknown identifier");
        let text = err.to_string();
        assert!(text.contains("ssao_occlusion"));
        assert_eq!(err.category(), "Shader");
    }
}
