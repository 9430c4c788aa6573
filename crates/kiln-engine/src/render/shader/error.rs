use thiserror::Error;

use super::{Precision, Stage};
use crate::gfx::BackendError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShaderError {
    #[error("failed to compile {stage} stage of shader `{shader}`:\n{log}")]
    Compile {
        shader: String,
        stage: Stage,
        log: String,
    },

    #[error("failed to link shader `{shader}`:\n{log}")]
    Link { shader: String, log: String },

    #[error("shader `{shader}` requested {precision:?} precision, which this GPU does not support")]
    UnsupportedPrecision { shader: String, precision: Precision },

    #[error("unknown uniform `{name}` in shader `{shader}`")]
    UnknownUniform { name: String, shader: String },

    #[error("uniform `{name}` in shader `{shader}` is {expected}; got a {found} value")]
    UniformTypeMismatch {
        name: String,
        shader: String,
        expected: String,
        found: &'static str,
    },

    #[error("shader `{0}` has been destroyed")]
    Destroyed(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
