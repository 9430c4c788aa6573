//! Vertex attribute layout.

use serde::Deserialize;

use super::error::LayoutError;
use crate::gfx::{BoundAttribute, VertexInput};

/// Component type of a vertex attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    #[serde(alias = "float")]
    Float32,
    #[serde(alias = "unsigned_byte")]
    Uint8,
    #[serde(alias = "byte")]
    Int8,
    #[serde(alias = "unsigned_short")]
    Uint16,
    #[serde(alias = "short")]
    Int16,
    #[serde(alias = "unsigned_int")]
    Uint32,
    #[serde(alias = "int")]
    Int32,
}

impl ComponentType {
    pub const fn byte_size(self) -> u32 {
        match self {
            ComponentType::Uint8 | ComponentType::Int8 => 1,
            ComponentType::Uint16 | ComponentType::Int16 => 2,
            ComponentType::Float32 | ComponentType::Uint32 | ComponentType::Int32 => 4,
        }
    }
}

/// One interleaved vertex attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub name: String,
    /// Component count, 1 to 4.
    pub size: u8,
    pub component_type: ComponentType,
    pub normalized: bool,
    pub byte_offset: u32,
}

impl AttributeDescriptor {
    pub fn byte_len(&self) -> u32 {
        self.size as u32 * self.component_type.byte_size()
    }

    pub fn byte_end(&self) -> u32 {
        self.byte_offset + self.byte_len()
    }
}

/// Ordered attribute list plus the derived vertex sizes.
///
/// `vertex_byte_size` is the furthest attribute end (the sum of attribute
/// sizes for a contiguous layout); `vertex_float_size` rounds it up to whole
/// 32-bit words, which is the stride used by the vertex buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    attributes: Vec<AttributeDescriptor>,
    vertex_byte_size: u32,
    vertex_float_size: u32,
}

impl VertexLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position, texture region and packed tint: the layout quads are written in.
    ///
    /// | name | size | type | offset |
    /// |------|------|------|--------|
    /// | `aVertex` | 2 | f32 | 0 |
    /// | `aRegion` | 2 | f32 | 8 |
    /// | `aColor` | 4 | u8 normalized | 16 |
    pub fn standard() -> Self {
        let mut layout = Self::new();
        let attrs = [
            ("aVertex", 2, ComponentType::Float32, false, 0),
            ("aRegion", 2, ComponentType::Float32, false, 8),
            ("aColor", 4, ComponentType::Uint8, true, 16),
        ];
        for (name, size, ty, normalized, offset) in attrs {
            // Statically valid; a failure here would be a bug in the table above.
            if let Err(err) = layout.add_attribute(name, size, ty, normalized, offset) {
                log::error!("standard vertex layout rejected: {err}");
            }
        }
        layout
    }

    /// Registers an attribute and recomputes the vertex sizes.
    pub fn add_attribute(
        &mut self,
        name: impl Into<String>,
        size: u8,
        component_type: ComponentType,
        normalized: bool,
        byte_offset: u32,
    ) -> Result<(), LayoutError> {
        let name = name.into();
        if !(1..=4).contains(&size) {
            return Err(LayoutError::InvalidSize { name, size });
        }
        if self.attribute(&name).is_some() {
            return Err(LayoutError::Duplicate(name));
        }
        let min = self.attributes.last().map_or(0, AttributeDescriptor::byte_end);
        if byte_offset < min {
            return Err(LayoutError::OffsetOverlap { name, offset: byte_offset, min });
        }

        self.attributes.push(AttributeDescriptor {
            name,
            size,
            component_type,
            normalized,
            byte_offset,
        });

        let summed: u32 = self.attributes.iter().map(AttributeDescriptor::byte_len).sum();
        let furthest = self.attributes.iter().map(AttributeDescriptor::byte_end).max().unwrap_or(0);
        self.vertex_byte_size = summed.max(furthest);
        self.vertex_float_size = self.vertex_byte_size.div_ceil(4);
        Ok(())
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn vertex_byte_size(&self) -> u32 {
        self.vertex_byte_size
    }

    pub fn vertex_float_size(&self) -> u32 {
        self.vertex_float_size
    }

    /// Distance between consecutive vertices in the buffer, in bytes.
    pub fn stride(&self) -> u32 {
        self.vertex_float_size * 4
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Resolves attributes against a program; attributes the program does not
    /// consume (`locate` returns `None`) are left out.
    pub fn bind(&self, locate: impl Fn(&str) -> Option<u32>) -> VertexInput {
        let attributes = self
            .attributes
            .iter()
            .filter_map(|a| {
                locate(&a.name).map(|location| BoundAttribute {
                    location,
                    size: a.size,
                    component_type: a.component_type,
                    normalized: a.normalized,
                    byte_offset: a.byte_offset,
                })
            })
            .collect();
        VertexInput {
            stride: self.stride(),
            attributes,
        }
    }
}
