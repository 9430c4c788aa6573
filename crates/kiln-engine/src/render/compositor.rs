//! Batch lifecycle shared by every compositor.

use glam::Mat4;

use super::error::CompositorError;
use super::layout::{ComponentType, VertexLayout};
use super::shader::{Precision, ShaderProgram};
use super::vertex::VertexBuffer;
use super::gpu_compositor::TextureSource;
use crate::coords::{Color, Rect, Vec2};
use crate::gfx::{ContextEvent, ContextSubscription, DrawCall, DrawMode, GraphicsBackend, Topology};

/// Handle to a shader registered with a compositor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ShaderId(u32);

impl ShaderId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub const PROJECTION_UNIFORM: &str = "uProjectionMatrix";
pub const SAMPLER_UNIFORM: &str = "uSampler";

/// What scene code draws through.
pub trait Compositor {
    /// Drops buffered vertices and transient binding state.
    fn reset(&mut self);

    /// Re-establishes this compositor's state on the backend.
    fn bind(&mut self) -> Result<(), CompositorError>;

    fn use_shader(&mut self, shader: ShaderId) -> Result<(), CompositorError>;

    fn set_projection(&mut self, projection: Mat4) -> Result<(), CompositorError>;

    fn add_attribute(
        &mut self,
        name: &str,
        size: u8,
        component_type: ComponentType,
        normalized: bool,
        byte_offset: u32,
    ) -> Result<(), CompositorError>;

    fn add_quad(
        &mut self,
        source: TextureSource<'_>,
        dest: Rect,
        uvs: [f32; 4],
        tint: Color,
    ) -> Result<(), CompositorError>;

    fn draw_vertices(&mut self, mode: DrawMode, vertices: &[Vec2], color: Color) -> Result<(), CompositorError>;

    fn flush_mode(&mut self, mode: DrawMode) -> Result<(), CompositorError>;

    /// Submits buffered vertices as triangles.
    fn flush(&mut self) -> Result<(), CompositorError> {
        self.flush_mode(DrawMode::Triangles)
    }
}

/// Owns the vertex buffer, attribute layout, shader registry and projection,
/// and is the only place draws are submitted.
#[derive(Debug)]
pub struct BaseCompositor<B: GraphicsBackend> {
    backend: B,
    layout: VertexLayout,
    buffer: VertexBuffer,
    shaders: Vec<Option<ShaderProgram>>,
    current: Option<ShaderId>,
    projection: Mat4,
    active_unit: u32,
    sampler_unit: Option<u32>,
    pending_quads: bool,
    subscription: ContextSubscription,
    lost: bool,
}

impl<B: GraphicsBackend> BaseCompositor<B> {
    pub fn new(backend: B, layout: VertexLayout, max_vertex: usize) -> Self {
        let subscription = backend.context_events().subscribe();
        let buffer = VertexBuffer::new(layout.vertex_float_size(), max_vertex);
        Self {
            backend,
            layout,
            buffer,
            shaders: Vec::new(),
            current: None,
            projection: Mat4::IDENTITY,
            active_unit: 0,
            sampler_unit: None,
            pending_quads: false,
            subscription,
            lost: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn buffer(&self) -> &VertexBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut VertexBuffer {
        &mut self.buffer
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn current_shader(&self) -> Option<ShaderId> {
        self.current
    }

    pub fn active_unit(&self) -> u32 {
        self.active_unit
    }

    pub(crate) fn set_active_unit(&mut self, unit: u32) {
        self.active_unit = unit;
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub(crate) fn mark_quads(&mut self) {
        self.pending_quads = true;
    }

    /// Compiles a shader and registers it.
    pub fn create_shader(
        &mut self,
        label: &str,
        vertex: &str,
        fragment: &str,
        precision: Option<Precision>,
    ) -> Result<ShaderId, CompositorError> {
        let program = ShaderProgram::new(&mut self.backend, label, vertex, fragment, precision)?;
        Ok(self.add_shader(program))
    }

    /// Registers an already built shader; the compositor takes ownership.
    pub fn add_shader(&mut self, program: ShaderProgram) -> ShaderId {
        let id = ShaderId(self.shaders.len() as u32);
        self.shaders.push(Some(program));
        id
    }

    pub fn shader(&self, id: ShaderId) -> Result<&ShaderProgram, CompositorError> {
        self.shaders
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(CompositorError::UnknownShader(id))
    }

    /// Destroys and unregisters a shader. Its id is never reused.
    pub fn remove_shader(&mut self, id: ShaderId) -> Result<(), CompositorError> {
        if self.current == Some(id) {
            self.flush()?;
            self.current = None;
        }
        let mut program = self
            .shaders
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(CompositorError::UnknownShader(id))?;
        program.destroy(&mut self.backend);
        Ok(())
    }

    pub fn add_attribute(
        &mut self,
        name: &str,
        size: u8,
        component_type: ComponentType,
        normalized: bool,
        byte_offset: u32,
    ) -> Result<(), CompositorError> {
        if !self.buffer.is_empty() {
            return Err(CompositorError::LayoutChangeWithPendingVertices { pending: self.buffer.len() });
        }
        self.layout.add_attribute(name, size, component_type, normalized, byte_offset)?;
        self.buffer.set_vertex_float_size(self.layout.vertex_float_size());
        Ok(())
    }

    /// Switches shaders, flushing first. Re-selecting the current shader is a no-op.
    pub fn use_shader(&mut self, id: ShaderId) -> Result<(), CompositorError> {
        if self.current == Some(id) {
            return Ok(());
        }
        self.shader(id)?;
        self.flush()?;
        self.activate(id)?;
        self.current = Some(id);
        Ok(())
    }

    /// Binds `id` and pushes the projection and sampler unit it declares.
    fn activate(&mut self, id: ShaderId) -> Result<(), CompositorError> {
        let shader = self
            .shaders
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(CompositorError::UnknownShader(id))?;
        shader.bind(&mut self.backend)?;
        if shader.has_uniform(PROJECTION_UNIFORM) {
            shader.set_uniform(&mut self.backend, PROJECTION_UNIFORM, self.projection)?;
        }
        self.sampler_unit = None;
        if shader.has_uniform(SAMPLER_UNIFORM) {
            shader.set_uniform(&mut self.backend, SAMPLER_UNIFORM, self.active_unit)?;
            self.sampler_unit = Some(self.active_unit);
        }
        Ok(())
    }

    /// Points the current shader's sampler at `unit` if it is not already.
    pub(crate) fn set_sampler_unit(&mut self, unit: u32) -> Result<(), CompositorError> {
        if self.sampler_unit == Some(unit) {
            return Ok(());
        }
        let Some(id) = self.current else {
            return Ok(());
        };
        let shader = self
            .shaders
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(CompositorError::UnknownShader(id))?;
        if shader.has_uniform(SAMPLER_UNIFORM) {
            shader.set_uniform(&mut self.backend, SAMPLER_UNIFORM, unit)?;
            self.sampler_unit = Some(unit);
        }
        Ok(())
    }

    /// Stores the projection and pushes it to the current shader. Never flushes.
    pub fn set_projection(&mut self, projection: Mat4) -> Result<(), CompositorError> {
        self.projection = projection;
        let Some(id) = self.current else {
            return Ok(());
        };
        let shader = self
            .shaders
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(CompositorError::UnknownShader(id))?;
        if shader.has_uniform(PROJECTION_UNIFORM) {
            shader.set_uniform(&mut self.backend, PROJECTION_UNIFORM, projection)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CompositorError> {
        self.flush_mode(DrawMode::Triangles)
    }

    /// Submits every buffered vertex as one draw and resets the cursor.
    pub fn flush_mode(&mut self, mode: DrawMode) -> Result<(), CompositorError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let topology = if self.pending_quads && mode == DrawMode::Triangles {
            Topology::Quads
        } else {
            Topology::Raw
        };
        let vertex_count = self.buffer.len() as u32;

        let input = match self.current {
            Some(id) => self
                .shaders
                .get(id.index())
                .and_then(Option::as_ref)
                .map(|shader| self.layout.bind(|name| shader.attrib_location(name)))
                .ok_or(CompositorError::UnknownShader(id)),
            None => Err(CompositorError::NoShader),
        };
        let result = input.and_then(|input| {
            log::trace!("flush {vertex_count} vertices as {mode:?} ({topology:?})");
            self.backend
                .draw(&DrawCall {
                    mode,
                    topology,
                    input: &input,
                    vertices: self.buffer.as_bytes(),
                    vertex_count,
                })
                .map_err(CompositorError::from)
        });

        self.buffer.clear();
        self.pending_quads = false;
        result
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending_quads = false;
        self.current = None;
        self.sampler_unit = None;
    }

    /// Re-binds the current shader and re-issues its static uniforms.
    pub fn bind(&mut self) -> Result<(), CompositorError> {
        match self.current {
            Some(id) => self.activate(id),
            None => Ok(()),
        }
    }

    /// Drains context events. On loss every shader is released and buffered
    /// vertices are dropped. Returns whether a loss was processed.
    pub fn poll_context(&mut self) -> bool {
        let events = self.subscription.drain();
        let lost = events.iter().any(|e| matches!(e, ContextEvent::Lost { .. }));
        if lost {
            for shader in self.shaders.iter_mut().flatten() {
                shader.poll_context(&mut self.backend);
                shader.destroy(&mut self.backend);
            }
            self.reset();
            self.lost = true;
        } else {
            // keep shader subscriptions from piling up events
            for shader in self.shaders.iter_mut().flatten() {
                shader.poll_context(&mut self.backend);
            }
        }
        lost
    }

    /// Rebuilds every registered shader on the (restored) backend. Ids stay valid.
    pub fn restore_shaders(&mut self) -> Result<(), CompositorError> {
        for slot in self.shaders.iter_mut() {
            let Some(old) = slot.as_ref() else { continue };
            let rebuilt = ShaderProgram::new(
                &mut self.backend,
                old.label(),
                old.vertex_source(),
                old.fragment_source(),
                Some(old.precision()),
            )?;
            if let Some(mut previous) = slot.replace(rebuilt) {
                previous.destroy(&mut self.backend);
            }
        }
        self.lost = false;
        self.reset();
        Ok(())
    }

    /// Swaps in a new backend (e.g. a fresh device after loss) and rebuilds
    /// the shaders on it. Returns the old backend with this compositor's
    /// programs released.
    pub fn replace_backend(&mut self, backend: B) -> Result<B, CompositorError> {
        let mut old = std::mem::replace(&mut self.backend, backend);
        self.subscription = self.backend.context_events().subscribe();
        for shader in self.shaders.iter_mut().flatten() {
            shader.destroy(&mut old);
        }
        self.restore_shaders()?;
        Ok(old)
    }
}
