use std::fmt;
use std::path::PathBuf;

/// Pipeline stage a shader source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Errors from render resource creation and frame submission.
///
/// Setup-time errors (`Init`, `Compile`, `Link`, `InvalidBinding`,
/// `InvalidDrawable`, allocation `Device` failures) are fatal. Uniform errors
/// are tolerated by [`crate::ShaderProgram::set_uniform`]. `Device` errors
/// inside the frame loop skip the frame or draw.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("initialization failed: {0}")]
    Init(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("{stage} shader `{label}` failed to compile:\n{log}")]
    Compile {
        label: String,
        stage: ShaderStage,
        log: String,
    },
    #[error("program `{label}` failed to link:\n{log}")]
    Link { label: String, log: String },
    #[error("invalid binding for slot {slot}: {reason}")]
    InvalidBinding { slot: u32, reason: String },
    #[error("invalid drawable: {0}")]
    InvalidDrawable(String),
    #[error("`{0}` is not an active uniform")]
    UniformNotFound(String),
    #[error("uniform `{name}` is declared as {expected}, got {found}")]
    UniformKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("degenerate camera orientation: {0}")]
    DegenerateCamera(String),
    #[error("failed to read shader source {path}: {source}")]
    ShaderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub(crate) fn binding(slot: u32, reason: impl Into<String>) -> Self {
        Self::InvalidBinding {
            slot,
            reason: reason.into(),
        }
    }

    /// Whether the error comes from the uniform interface rather than the device.
    pub fn is_uniform_error(&self) -> bool {
        matches!(self, Self::UniformNotFound(_) | Self::UniformKind { .. })
    }
}
