use std::sync::Arc;

use anyhow::{Context, Result};
use wgpu::SurfaceError;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::surface::{choose_alpha_mode, choose_surface_format};
use crate::gfx::WgpuBackend;

/// Initialization parameters for the GPU layer.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    pub present_mode: wgpu::PresentMode,

    /// Falls back to the surface's first supported mode when unsupported.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub required_features: wgpu::Features,

    pub required_limits: wgpu::Limits,

    /// Enable `SHADER_F16` when the adapter has it, so shaders may run at
    /// medium precision.
    pub request_f16: bool,

    /// A hint; support depends on platform and backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            request_f16: true,
            desired_maximum_frame_latency: 2,
        }
    }
}

/// Window surface plus the device the compositor backends draw with.
pub struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
}

/// An acquired swapchain image. Holding it blocks acquisition of the next one.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}

/// What happened to a frame that could not be acquired.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    SkipFrame,
    /// Unrecoverable (commonly out of memory).
    Fatal,
}

impl SurfaceErrorAction {
    fn classify(err: &SurfaceError) -> Self {
        match err {
            SurfaceError::Lost | SurfaceError::Outdated => Self::Reconfigured,
            SurfaceError::OutOfMemory => Self::Fatal,
            SurfaceError::Timeout | SurfaceError::Other => Self::SkipFrame,
        }
    }
}

async fn request_device(adapter: &wgpu::Adapter, init: &GpuInit) -> Result<(wgpu::Device, wgpu::Queue)> {
    let mut required_features = init.required_features;
    if init.request_f16 && adapter.features().contains(wgpu::Features::SHADER_F16) {
        required_features |= wgpu::Features::SHADER_F16;
    }
    let info = adapter.get_info();
    log::info!("using {} ({:?}), features {required_features:?}", info.name, info.backend);

    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("kiln device"),
            required_features,
            required_limits: init.required_limits.clone(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .context("failed to create wgpu device/queue")
}

impl Gpu {
    pub async fn new(window: Arc<Window>, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create wgpu surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;
        let (device, queue) = request_device(&adapter, &init).await?;

        let caps = surface.get_capabilities(&adapter);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: choose_surface_format(&caps.formats, init.prefer_srgb)
                .context("no supported surface formats")?,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode: choose_alpha_mode(&caps.alpha_modes, init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);
        log::info!("surface configured: {:?}, {}x{}", config.format, config.width, config.height);

        Ok(Gpu {
            window,
            surface,
            device,
            queue,
            config,
            size,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Current drawable size in physical pixels.
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// A compositor backend drawing into this surface's format. Device loss
    /// is reported on the backend's context events.
    pub fn backend(&self) -> WgpuBackend {
        WgpuBackend::new(self.device.clone(), self.queue.clone(), self.config.format)
    }

    /// Reconfigures the surface. A zero size is recorded but not applied.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Acquires the next swapchain image.
    ///
    /// Recoverable surface errors are handled here (the surface is
    /// reconfigured or the frame skipped) and yield `Ok(None)`.
    pub fn acquire(&mut self) -> Result<Option<GpuFrame>> {
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err) => {
                return match SurfaceErrorAction::classify(&err) {
                    SurfaceErrorAction::Fatal => Err(anyhow::anyhow!("surface error: {err}")),
                    SurfaceErrorAction::Reconfigured => {
                        log::debug!("surface {err}; reconfiguring");
                        if self.size.width > 0 && self.size.height > 0 {
                            self.surface.configure(&self.device, &self.config);
                        }
                        Ok(None)
                    }
                    SurfaceErrorAction::SkipFrame => {
                        log::debug!("surface {err}; skipping frame");
                        Ok(None)
                    }
                };
            }
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kiln frame encoder"),
            });
        Ok(Some(GpuFrame {
            surface_texture,
            view,
            encoder,
        }))
    }

    /// Encodes the draws `backend` recorded since the last frame, clearing to
    /// `clear` first, then submits and presents.
    pub fn present(&self, mut frame: GpuFrame, backend: &mut WgpuBackend, clear: Option<wgpu::Color>) {
        backend.render(&mut frame.encoder, &frame.view, clear);
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        drop(frame.view);
        frame.surface_texture.present();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_errors_map_to_actions() {
        assert_eq!(SurfaceErrorAction::classify(&SurfaceError::Lost), SurfaceErrorAction::Reconfigured);
        assert_eq!(SurfaceErrorAction::classify(&SurfaceError::Outdated), SurfaceErrorAction::Reconfigured);
        assert_eq!(SurfaceErrorAction::classify(&SurfaceError::Timeout), SurfaceErrorAction::SkipFrame);
        assert_eq!(SurfaceErrorAction::classify(&SurfaceError::OutOfMemory), SurfaceErrorAction::Fatal);
    }
}
