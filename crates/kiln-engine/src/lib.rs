//! kiln engine crate.
//!
//! A batched 2D compositor over wgpu: scene code queues textured quads and
//! primitive vertex lists, and the compositor turns them into as few draw
//! calls as shader, texture and capacity changes allow.
//!
//! - [`gfx`]: the graphics API seam and its wgpu / headless backends
//! - [`render`]: vertex layout, shader programs, compositors
//! - [`atlas`]: texture atlases and sprite regions
//! - [`device`]: wgpu device and window surface bootstrap

pub mod atlas;
pub mod coords;
pub mod device;
pub mod gfx;
pub mod logging;
pub mod render;
