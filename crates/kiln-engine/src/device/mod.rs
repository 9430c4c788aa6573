//! GPU device and window surface.
//!
//! [`Gpu`] creates the wgpu instance, adapter, device and queue, configures
//! the window surface and hands out per-frame encoders. [`Gpu::backend`]
//! wraps the device as the compositor's [`crate::gfx::WgpuBackend`].

mod gpu;
mod surface;

pub use gpu::{Gpu, GpuFrame, GpuInit};
