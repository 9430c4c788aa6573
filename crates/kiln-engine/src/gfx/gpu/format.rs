//! Translation from backend-neutral draw state to wgpu descriptors.

use super::super::{DrawMode, Filter, QUAD_INDICES, Repeat, Topology};
use crate::render::layout::ComponentType;

/// The wgpu vertex format for an attribute, if wgpu has one.
pub(super) fn vertex_format(size: u8, component_type: ComponentType, normalized: bool) -> Option<wgpu::VertexFormat> {
    use ComponentType as C;
    use wgpu::VertexFormat as F;

    let format = match (component_type, normalized, size) {
        (C::Float32, _, 1) => F::Float32,
        (C::Float32, _, 2) => F::Float32x2,
        (C::Float32, _, 3) => F::Float32x3,
        (C::Float32, _, 4) => F::Float32x4,

        (C::Uint8, false, 1) => F::Uint8,
        (C::Uint8, false, 2) => F::Uint8x2,
        (C::Uint8, false, 4) => F::Uint8x4,
        (C::Uint8, true, 1) => F::Unorm8,
        (C::Uint8, true, 2) => F::Unorm8x2,
        (C::Uint8, true, 4) => F::Unorm8x4,
        (C::Int8, false, 1) => F::Sint8,
        (C::Int8, false, 2) => F::Sint8x2,
        (C::Int8, false, 4) => F::Sint8x4,
        (C::Int8, true, 1) => F::Snorm8,
        (C::Int8, true, 2) => F::Snorm8x2,
        (C::Int8, true, 4) => F::Snorm8x4,

        (C::Uint16, false, 1) => F::Uint16,
        (C::Uint16, false, 2) => F::Uint16x2,
        (C::Uint16, false, 4) => F::Uint16x4,
        (C::Uint16, true, 1) => F::Unorm16,
        (C::Uint16, true, 2) => F::Unorm16x2,
        (C::Uint16, true, 4) => F::Unorm16x4,
        (C::Int16, false, 1) => F::Sint16,
        (C::Int16, false, 2) => F::Sint16x2,
        (C::Int16, false, 4) => F::Sint16x4,
        (C::Int16, true, 1) => F::Snorm16,
        (C::Int16, true, 2) => F::Snorm16x2,
        (C::Int16, true, 4) => F::Snorm16x4,

        (C::Uint32, false, 1) => F::Uint32,
        (C::Uint32, false, 2) => F::Uint32x2,
        (C::Uint32, false, 3) => F::Uint32x3,
        (C::Uint32, false, 4) => F::Uint32x4,
        (C::Int32, false, 1) => F::Sint32,
        (C::Int32, false, 2) => F::Sint32x2,
        (C::Int32, false, 3) => F::Sint32x3,
        (C::Int32, false, 4) => F::Sint32x4,

        _ => return None,
    };
    Some(format)
}

/// Primitive topology wgpu draws `mode` with.
///
/// Line loops become strips (closed by repeating the first vertex) and
/// fans become indexed lists.
pub(super) fn primitive_topology(mode: DrawMode) -> wgpu::PrimitiveTopology {
    match mode {
        DrawMode::Points => wgpu::PrimitiveTopology::PointList,
        DrawMode::Lines => wgpu::PrimitiveTopology::LineList,
        DrawMode::LineStrip | DrawMode::LineLoop => wgpu::PrimitiveTopology::LineStrip,
        DrawMode::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        DrawMode::TriangleFan | DrawMode::Triangles => wgpu::PrimitiveTopology::TriangleList,
    }
}

/// Index list for draws wgpu cannot express directly; `None` draws the
/// vertices in order.
pub(super) fn draw_indices(mode: DrawMode, topology: Topology, vertex_count: u32) -> Option<Vec<u32>> {
    match (topology, mode) {
        (Topology::Quads, _) => Some(
            (0..vertex_count / 4)
                .flat_map(|quad| QUAD_INDICES.map(|i| quad * 4 + i))
                .collect(),
        ),
        (Topology::Raw, DrawMode::TriangleFan) => Some(
            (1..vertex_count.saturating_sub(1))
                .flat_map(|i| [0, i, i + 1])
                .collect(),
        ),
        (Topology::Raw, _) => None,
    }
}

pub(super) fn sampler_descriptor(filter: Filter, repeat: Repeat) -> wgpu::SamplerDescriptor<'static> {
    let address = |wraps: bool| {
        if wraps { wgpu::AddressMode::Repeat } else { wgpu::AddressMode::ClampToEdge }
    };
    let (wrap_u, wrap_v) = repeat.wraps();
    let filter = match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    };
    wgpu::SamplerDescriptor {
        label: Some("kiln texture sampler"),
        address_mode_u: address(wrap_u),
        address_mode_v: address(wrap_v),
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    }
}

/// `src + dst * (1 - src.a)`, for premultiplied colour.
pub(super) fn premultiplied_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState { color: component, alpha: component }
}

pub(super) fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment.max(1)) * alignment.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_attributes_have_formats() {
        assert_eq!(vertex_format(2, ComponentType::Float32, false), Some(wgpu::VertexFormat::Float32x2));
        assert_eq!(vertex_format(4, ComponentType::Uint8, true), Some(wgpu::VertexFormat::Unorm8x4));
        assert_eq!(vertex_format(3, ComponentType::Uint8, true), None);
        assert_eq!(vertex_format(2, ComponentType::Int32, true), None);
    }

    #[test]
    fn quads_expand_to_two_triangles_each() {
        let indices = draw_indices(DrawMode::Triangles, Topology::Quads, 8).unwrap();
        assert_eq!(indices, vec![0, 1, 2, 2, 1, 3, 4, 5, 6, 6, 5, 7]);
    }

    #[test]
    fn fans_become_lists() {
        let indices = draw_indices(DrawMode::TriangleFan, Topology::Raw, 5).unwrap();
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);
        assert_eq!(primitive_topology(DrawMode::TriangleFan), wgpu::PrimitiveTopology::TriangleList);
        assert!(draw_indices(DrawMode::TriangleFan, Topology::Raw, 2).unwrap().is_empty());
    }

    #[test]
    fn other_modes_draw_in_order() {
        assert!(draw_indices(DrawMode::LineLoop, Topology::Raw, 4).is_none());
        assert_eq!(primitive_topology(DrawMode::LineLoop), wgpu::PrimitiveTopology::LineStrip);
    }

    #[test]
    fn repeat_maps_to_address_modes() {
        let desc = sampler_descriptor(Filter::Linear, Repeat::RepeatX);
        assert_eq!(desc.address_mode_u, wgpu::AddressMode::Repeat);
        assert_eq!(desc.address_mode_v, wgpu::AddressMode::ClampToEdge);
        assert_eq!(desc.mag_filter, wgpu::FilterMode::Linear);
    }

    #[test]
    fn alignment_rounds_up() {
        assert_eq!(align_to(0, 256), 0);
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(512, 256), 512);
    }
}
