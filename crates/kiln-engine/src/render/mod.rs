//! Batched 2D rendering.
//!
//! Scene code hands textured quads and primitive vertex lists to a
//! [`GpuCompositor`], which packs them into one interleaved vertex buffer and
//! submits a draw only when something forces it: the buffer is full, the
//! shader changes, the sampled texture changes, or the owner calls `flush`.
//!
//! Convention:
//! - geometry is in pixels (top-left origin, +Y down); the projection matrix
//!   (see [`screen_projection`]) maps it to clip space
//! - every quad is 4 vertices in [`crate::coords::Rect::corners`] order
//! - tints travel as one packed ARGB word per vertex

mod compositor;
mod error;
mod gpu_compositor;
pub mod layout;
mod settings;
pub mod shader;
mod texture_cache;
pub mod vertex;

pub use compositor::{BaseCompositor, Compositor, PROJECTION_UNIFORM, SAMPLER_UNIFORM, ShaderId};
pub use error::{CompositorError, LayoutError};
pub use gpu_compositor::{GpuCompositor, TexturePixels, TextureSource};
pub use layout::{AttributeDescriptor, ComponentType, VertexLayout};
pub use settings::{AttributeSettings, CompositorSettings, ShaderSources};
pub use shader::{Precision, ShaderError, ShaderProgram, UniformValue};
pub use texture_cache::TextureCache;
pub use vertex::VertexBuffer;

use glam::Mat4;

/// WGSL sources of the built-in programs.
pub mod builtin {
    /// Textured, tinted quads. Expects the standard layout.
    pub const QUAD_VERTEX: &str = include_str!("shaders/quad.vert.wgsl");
    pub const QUAD_FRAGMENT: &str = include_str!("shaders/quad.frag.wgsl");
    /// Flat-coloured primitives (`aVertex`, `aColor`).
    pub const PRIMITIVE_VERTEX: &str = include_str!("shaders/primitive.vert.wgsl");
    pub const PRIMITIVE_FRAGMENT: &str = include_str!("shaders/primitive.frag.wgsl");
}

/// Pixel-space orthographic projection for a `width` x `height` target.
pub fn screen_projection(width: f32, height: f32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width, height, 0.0, -1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn screen_projection_maps_corners_to_clip_space() {
        let p = screen_projection(320.0, 240.0);
        assert!(p.project_point3(Vec3::new(0.0, 0.0, 0.0)).abs_diff_eq(Vec3::new(-1.0, 1.0, 0.5), 1e-6));
        assert!(p.project_point3(Vec3::new(320.0, 240.0, 0.0)).abs_diff_eq(Vec3::new(1.0, -1.0, 0.5), 1e-6));
    }
}
