//! Compositor configuration.

use serde::Deserialize;

use super::builtin;
use super::error::LayoutError;
use super::layout::{ComponentType, VertexLayout};
use super::shader::Precision;
use crate::gfx::Filter;

/// One vertex attribute as written in settings JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttributeSettings {
    pub name: String,
    pub size: u8,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    #[serde(default)]
    pub normalized: bool,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            vertex: builtin::QUAD_VERTEX.to_string(),
            fragment: builtin::QUAD_FRAGMENT.to_string(),
        }
    }
}

/// Settings of a [`super::GpuCompositor`].
///
/// ```json
/// { "attribute": [{"name": "aVertex", "size": 2, "type": "float32", "offset": 0}],
///   "shader": {"vertex": "...", "fragment": "..."},
///   "max_quads": 4096, "precision": "high", "antialias": false }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompositorSettings {
    pub attribute: Vec<AttributeSettings>,
    pub shader: ShaderSources,
    #[serde(alias = "maxQuads")]
    pub max_quads: usize,
    /// `None` picks the highest precision the device supports.
    pub precision: Option<Precision>,
    /// Linear filtering when set, nearest otherwise.
    pub antialias: bool,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        let attribute = VertexLayout::standard()
            .attributes()
            .iter()
            .map(|a| AttributeSettings {
                name: a.name.clone(),
                size: a.size,
                component_type: a.component_type,
                normalized: a.normalized,
                offset: a.byte_offset,
            })
            .collect();
        Self {
            attribute,
            shader: ShaderSources::default(),
            max_quads: 4096,
            precision: None,
            antialias: false,
        }
    }
}

impl CompositorSettings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn layout(&self) -> Result<VertexLayout, LayoutError> {
        let mut layout = VertexLayout::new();
        for a in &self.attribute {
            layout.add_attribute(a.name.clone(), a.size, a.component_type, a.normalized, a.offset)?;
        }
        Ok(layout)
    }

    /// Vertex capacity of one batch.
    pub fn max_vertices(&self) -> usize {
        self.max_quads.max(1) * 4
    }

    pub fn filter(&self) -> Filter {
        if self.antialias { Filter::Linear } else { Filter::Nearest }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_standard_layout() {
        let settings = CompositorSettings::default();
        assert_eq!(settings.layout().unwrap(), VertexLayout::standard());
        assert_eq!(settings.max_vertices(), 4096 * 4);
        assert_eq!(settings.filter(), Filter::Nearest);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = CompositorSettings::from_json(r#"{"maxQuads": 8, "antialias": true}"#).unwrap();
        assert_eq!(settings.max_quads, 8);
        assert_eq!(settings.filter(), Filter::Linear);
        assert_eq!(settings.shader, ShaderSources::default());
    }

    #[test]
    fn custom_attributes_accept_gl_type_names() {
        let json = r#"{"attribute": [
            {"name": "position", "size": 2, "type": "float", "offset": 0},
            {"name": "color", "size": 4, "type": "unsigned_byte", "normalized": true, "offset": 8}
        ]}"#;
        let layout = CompositorSettings::from_json(json).unwrap().layout().unwrap();
        assert_eq!(layout.vertex_byte_size(), 12);
    }

    #[test]
    fn invalid_layout_is_reported() {
        let json = r#"{"attribute": [{"name": "a", "size": 7, "type": "float32", "offset": 0}]}"#;
        assert!(CompositorSettings::from_json(json).unwrap().layout().is_err());
    }
}
