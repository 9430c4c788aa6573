//! Opens a window and drives the compositor with a generated sprite sheet:
//! a grid of animated sprites, an ad-hoc sub-image and a line-loop frame.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use kiln_engine::atlas::{Image, ImageData, ImageLibrary, TextureAtlas};
use kiln_engine::coords::{Color, Rect, Vec2};
use kiln_engine::device::{Gpu, GpuInit};
use kiln_engine::gfx::{DrawMode, WgpuBackend};
use kiln_engine::logging::{LoggingConfig, init_logging};
use kiln_engine::render::{Compositor, CompositorSettings, GpuCompositor, TextureSource, screen_projection};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

const FRAME: u32 = 16;
const FRAMES: u32 = 4;
const SETTINGS: &str = r#"{ "maxQuads": 256, "antialias": false }"#;

/// A `FRAMES`-wide strip of `FRAME`x`FRAME` cells, each a ring of a different hue.
fn sprite_sheet() -> Result<Image> {
    let (w, h) = (FRAME * FRAMES, FRAME);
    let mut pixels = Vec::with_capacity((w * h * 4) as usize);
    for y in 0..h {
        for x in 0..w {
            let cell = x / FRAME;
            let (cx, cy) = ((x % FRAME) as f32 - 7.5, y as f32 - 7.5);
            let d = (cx * cx + cy * cy).sqrt();
            let alpha = if d < 7.5 && d > 3.0 + cell as f32 { 255 } else { 0 };
            let hue = [[255, 96, 64], [255, 208, 64], [96, 224, 128], [96, 160, 255]][cell as usize];
            pixels.extend_from_slice(&[hue[0], hue[1], hue[2], alpha]);
        }
    }
    Ok(ImageData::new("sheet", w, h, pixels)?)
}

struct Scene {
    gpu: Gpu,
    compositor: GpuCompositor<WgpuBackend>,
    atlas: TextureAtlas,
    sheet: Image,
    started: Instant,
}

impl Scene {
    fn new(window: Arc<Window>) -> Result<Self> {
        let gpu = pollster::block_on(Gpu::new(window, GpuInit::default()))?;
        let settings = CompositorSettings::from_json(SETTINGS).context("invalid compositor settings")?;
        let mut compositor =
            GpuCompositor::new(gpu.backend(), &settings).context("failed to build compositor")?;

        let sheet = sprite_sheet()?;
        let mut images = ImageLibrary::new();
        images.insert(Arc::clone(&sheet));
        let json = format!(r#"{{"framewidth": {FRAME}, "frameheight": {FRAME}, "image": "sheet"}}"#);
        let atlas = TextureAtlas::from_json(&json, &images).context("failed to load sprite sheet")?;

        let size = gpu.size();
        compositor.set_projection(screen_projection(size.width as f32, size.height as f32))?;

        Ok(Self {
            gpu,
            compositor,
            atlas,
            sheet,
            started: Instant::now(),
        })
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.gpu.resize(winit::dpi::PhysicalSize::new(width, height));
        self.compositor
            .set_projection(screen_projection(width.max(1) as f32, height.max(1) as f32))?;
        Ok(())
    }

    fn draw(&mut self) -> Result<()> {
        let size = self.gpu.size();
        let (w, h) = (size.width as f32, size.height as f32);
        let elapsed = self.started.elapsed().as_secs_f32();
        let scale = 3.0;
        let cell = FRAME as f32 * scale;

        let cols = (w / cell) as u32;
        let rows = (h / cell) as u32;
        for row in 0..rows {
            for col in 0..cols {
                let frame = ((elapsed * 8.0) as u32 + row + col) % FRAMES;
                let name = frame.to_string();
                let Some(region) = self.atlas.get_region(&name, None)? else { continue };
                let uvs = region.uvs;
                let source = TextureSource::from_atlas(&self.atlas, Some(region))
                    .context("sprite sheet has no texture")?;
                let dest = Rect::new(col as f32 * cell, row as f32 * cell, cell, cell);
                self.compositor.add_quad(source, dest, uvs, Color::white())?;
            }
        }

        // the sheet itself, drawn through the ad-hoc region cache
        let strip = Rect::new(0.0, 0.0, (FRAME * FRAMES) as f32, FRAME as f32);
        let banner = Rect::new(w * 0.5 - 128.0, h * 0.5 - 32.0, 256.0, 64.0);
        self.compositor
            .draw_image(&self.sheet, strip, banner, Color::new(1.0, 1.0, 1.0, 0.85))?;

        let outline = [
            Vec2::new(banner.min().x - 4.0, banner.min().y - 4.0),
            Vec2::new(banner.max().x + 4.0, banner.min().y - 4.0),
            Vec2::new(banner.max().x + 4.0, banner.max().y + 4.0),
            Vec2::new(banner.min().x - 4.0, banner.max().y + 4.0),
        ];
        self.compositor
            .draw_vertices(DrawMode::LineLoop, &outline, Color::white())?;
        self.compositor.flush()?;

        match self.gpu.acquire()? {
            Some(frame) => {
                let clear = wgpu::Color { r: 0.05, g: 0.05, b: 0.08, a: 1.0 };
                self.gpu.present(frame, self.compositor.backend_mut(), Some(clear));
            }
            None => self.compositor.backend_mut().discard_frame(),
        }
        Ok(())
    }
}

#[derive(Default)]
struct Studio {
    scene: Option<Scene>,
}

impl Studio {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("kiln studio")
            .with_inner_size(LogicalSize::new(960.0, 540.0));
        let window = Arc::new(event_loop.create_window(attrs).context("failed to create window")?);
        let scene = Scene::new(window)?;
        scene.gpu.window().request_redraw();
        self.scene = Some(scene);
        Ok(())
    }
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.scene.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            log::error!("failed to start: {e:#}");
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(scene) = self.scene.as_ref() {
            scene.gpu.window().request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(scene) = self.scene.as_mut() else { return };
        let result = match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }
            WindowEvent::Resized(size) => scene.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                if scene.compositor.poll_context() {
                    Err(anyhow::anyhow!("graphics device lost"))
                } else {
                    scene.draw()
                }
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            log::error!("{e:#}");
            event_loop.exit();
        }
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut studio = Studio::default();
    event_loop
        .run_app(&mut studio)
        .context("winit event loop terminated with error")?;
    Ok(())
}
