use thiserror::Error;

use super::{ProgramId, TextureId};
use crate::render::layout::ComponentType;

/// Failures reported by a [`super::GraphicsBackend`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("graphics context is lost")]
    ContextLost,

    #[error("program creation failed: {0}")]
    ProgramCreation(String),

    #[error("unknown program {0:?}")]
    UnknownProgram(ProgramId),

    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("no program is bound")]
    NoProgramBound,

    #[error("uniform write out of bounds: binding {binding}, offset {offset}, {len} bytes")]
    UniformOutOfBounds { binding: u32, offset: u32, len: usize },

    #[error("program has no sampler group {0}")]
    UnknownSamplerGroup(u32),

    #[error("texture unit {unit} exceeds the {max} units available")]
    TextureUnitOutOfRange { unit: u32, max: u32 },

    #[error("texture data has {actual} bytes, expected {expected}")]
    InvalidTextureData { expected: usize, actual: usize },

    #[error("texture size {width}x{height} is outside 1..={max}")]
    TextureSize { width: u32, height: u32, max: u32 },

    #[error("unsupported vertex format: {size} x {component_type:?} (normalized: {normalized})")]
    UnsupportedVertexFormat {
        size: u8,
        component_type: ComponentType,
        normalized: bool,
    },

    #[error("draw of {vertex_count} vertices does not fit the {mode} topology")]
    InvalidDraw { vertex_count: u32, mode: &'static str },
}
