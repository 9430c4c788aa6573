use thiserror::Error;

use super::shader::ShaderError;
use super::ShaderId;
use crate::atlas::AtlasError;
use crate::gfx::BackendError;

/// Invalid vertex attribute registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("attribute `{name}` has {size} components; expected 1 to 4")]
    InvalidSize { name: String, size: u8 },

    #[error("attribute `{0}` is already registered")]
    Duplicate(String),

    #[error("attribute `{name}` at byte offset {offset} overlaps the previous attribute (ends at {min})")]
    OffsetOverlap { name: String, offset: u32, min: u32 },
}

/// Compositor failures. All of them are configuration or programming errors;
/// none is retried.
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Atlas(#[from] AtlasError),

    #[error("vertex layout changed while {pending} vertices are buffered; flush first")]
    LayoutChangeWithPendingVertices { pending: usize },

    #[error("texture unit {unit} requested but the GPU reports {max} texture units")]
    TextureUnitOutOfRange { unit: u32, max: u32 },

    #[error("texture cache overflow: {max} texture units available for this GPU")]
    TextureCacheOverflow { max: u32 },

    #[error("unknown shader {0:?}")]
    UnknownShader(ShaderId),

    #[error("no shader is in use")]
    NoShader,

    #[error("vertex layout has no `{0}` attribute")]
    MissingAttribute(&'static str),

    #[error("attribute `{name}` starts at byte {offset}; packed attributes need 4-byte alignment")]
    UnalignedAttribute { name: &'static str, offset: u32 },

    #[error("raw texture upload needs a zero border, got {0}")]
    InvalidBorder(u32),

    #[error("graphics context is lost; restore before drawing")]
    ContextLost,
}
