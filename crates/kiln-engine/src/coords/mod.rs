//! Coordinate, geometry and colour value types shared by the compositor and atlases.
//!
//! Canonical CPU space:
//! - pixels, origin top-left
//! - +X right, +Y down
//!
//! The compositor converts to clip space through the projection matrix
//! uploaded to the active shader.

mod color;
mod rect;
mod vec2;

pub use color::Color;
pub use rect::Rect;
pub use vec2::Vec2;
