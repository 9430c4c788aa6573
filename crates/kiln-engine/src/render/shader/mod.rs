//! WGSL shader programs.
//!
//! A [`ShaderProgram`] is built from one vertex and one fragment source. The
//! sources are minified, given a float precision alias (`pfloat`), compiled
//! and validated with `naga`, linked against each other, and only then handed
//! to the backend. Attribute locations and uniform offsets come from
//! reflection, so callers address everything by name.

mod error;
mod preprocess;
mod program;
mod reflect;
mod uniform;

use std::fmt;

use serde::Deserialize;

pub use error::ShaderError;
pub use preprocess::{PRECISION_ALIAS, minify};
pub use program::ShaderProgram;
pub use uniform::{ScalarType, UniformKind, UniformValue};

use crate::gfx::BackendLimits;

/// Pipeline stage of a shader source.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Vertex => "vertex",
            Stage::Fragment => "fragment",
        })
    }
}

/// Float precision used for `pfloat` in shader code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// `f32`
    #[serde(alias = "highp")]
    High,
    /// `f16`; needs the `shader-f16` feature.
    #[serde(alias = "mediump")]
    Medium,
}

impl Precision {
    /// The alias declaration injected after the source's global directives.
    pub fn alias(self) -> &'static str {
        match self {
            Precision::High => "alias pfloat = f32;",
            Precision::Medium => "alias pfloat = f16;",
        }
    }

    /// Highest precision the device supports.
    pub fn highest(_limits: &BackendLimits) -> Self {
        // f32 is mandatory in WGSL.
        Precision::High
    }

    pub fn is_supported(self, limits: &BackendLimits) -> bool {
        match self {
            Precision::High => true,
            Precision::Medium => limits.supports_f16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_needs_f16() {
        let mut limits = BackendLimits::default();
        assert!(!Precision::Medium.is_supported(&limits));
        limits.supports_f16 = true;
        assert!(Precision::Medium.is_supported(&limits));
        assert_eq!(Precision::highest(&limits), Precision::High);
    }

    #[test]
    fn precision_accepts_glsl_style_names() {
        let p: Precision = serde_json::from_str("\"mediump\"").unwrap();
        assert_eq!(p, Precision::Medium);
        let p: Precision = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(p, Precision::High);
    }
}
