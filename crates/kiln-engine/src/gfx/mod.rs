//! Graphics API seam.
//!
//! The compositor and shader programs never talk to wgpu directly; they drive
//! a [`GraphicsBackend`], which models the small slice of an immediate-mode
//! graphics API the batcher needs: program objects with uniform storage,
//! texture objects bound to numbered units, and draw submission.
//!
//! Implementations:
//! - [`WgpuBackend`]: records draws during the frame and encodes them into a
//!   single render pass in [`WgpuBackend::render`].
//! - [`HeadlessBackend`]: records every call as a [`BackendCommand`]; used by
//!   tests and offline tooling.

mod context;
mod error;
mod gpu;
mod headless;

pub use context::{ContextEvent, ContextEvents, ContextSubscription};
pub use error::BackendError;
pub use gpu::WgpuBackend;
pub use headless::{BackendCommand, HeadlessBackend, RecordedDraw};

use crate::render::layout::ComponentType;

/// Backend program object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u32);

impl ProgramId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Backend texture object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u32);

impl TextureId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Primitive topology of a draw call.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Points,
    LineStrip,
    LineLoop,
    Lines,
    TriangleStrip,
    TriangleFan,
    #[default]
    Triangles,
}

/// How the vertices of a draw are assembled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Vertices are consumed in order according to the draw mode.
    Raw,
    /// Every 4 vertices form a quad, expanded through the index pattern
    /// `[0, 1, 2, 2, 1, 3]`. Only valid with [`DrawMode::Triangles`].
    Quads,
}

/// Number of indices emitted per quad.
pub const QUAD_INDEX_COUNT: u32 = 6;

/// Index pattern for one quad written in [`crate::coords::Rect::corners`] order.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 1, 3];

/// Texture sampling filter.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

/// Texture wrap behaviour, named after the CSS-style values atlases carry.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, serde::Deserialize)]
pub enum Repeat {
    #[default]
    #[serde(rename = "no-repeat")]
    NoRepeat,
    #[serde(rename = "repeat")]
    Repeat,
    #[serde(rename = "repeat-x")]
    RepeatX,
    #[serde(rename = "repeat-y")]
    RepeatY,
}

impl Repeat {
    /// Whether the texture wraps along (u, v).
    pub fn wraps(self) -> (bool, bool) {
        match self {
            Repeat::NoRepeat => (false, false),
            Repeat::Repeat => (true, true),
            Repeat::RepeatX => (true, false),
            Repeat::RepeatY => (false, true),
        }
    }
}

/// Hardware capabilities reported by a backend at initialization.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BackendLimits {
    /// Number of addressable texture units.
    pub max_texture_units: u32,
    /// Largest texture edge, in texels.
    pub max_texture_dimension: u32,
    /// Whether shaders may use `f16` (medium precision).
    pub supports_f16: bool,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            max_texture_units: 16,
            max_texture_dimension: 8192,
            supports_f16: false,
        }
    }
}

/// One uniform buffer declared by a program (always bind group 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlockDesc {
    pub binding: u32,
    pub size: u32,
    pub vertex: bool,
    pub fragment: bool,
}

/// Everything a backend needs to create a program object.
///
/// Sources are already preprocessed, validated and linked by
/// [`crate::render::ShaderProgram`].
#[derive(Debug, Clone)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub vertex_source: &'a str,
    pub vertex_entry: &'a str,
    pub fragment_source: &'a str,
    pub fragment_entry: &'a str,
    pub uniform_blocks: &'a [UniformBlockDesc],
    /// Bind groups holding a `texture_2d` at binding 0 and its sampler at
    /// binding 1, in ascending order starting at 1.
    pub sampler_groups: &'a [u32],
}

/// Texel data for a texture upload (tightly packed RGBA8).
#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
    pub filter: Filter,
    pub repeat: Repeat,
}

impl TextureDesc<'_> {
    pub(crate) fn validate(&self, limits: &BackendLimits) -> Result<(), BackendError> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(BackendError::InvalidTextureData {
                expected,
                actual: self.pixels.len(),
            });
        }
        if self.width == 0
            || self.height == 0
            || self.width > limits.max_texture_dimension
            || self.height > limits.max_texture_dimension
        {
            return Err(BackendError::TextureSize {
                width: self.width,
                height: self.height,
                max: limits.max_texture_dimension,
            });
        }
        Ok(())
    }
}

/// A vertex attribute resolved against a program's attribute locations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BoundAttribute {
    pub location: u32,
    pub size: u8,
    pub component_type: ComponentType,
    pub normalized: bool,
    pub byte_offset: u32,
}

/// Interleaved vertex format of a draw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexInput {
    pub stride: u32,
    pub attributes: Vec<BoundAttribute>,
}

/// One draw submission.
#[derive(Debug, Clone)]
pub struct DrawCall<'a> {
    pub mode: DrawMode,
    pub topology: Topology,
    pub input: &'a VertexInput,
    pub vertices: &'a [u8],
    pub vertex_count: u32,
}

/// The graphics API as seen by the compositor.
///
/// State model (mirrors a classic immediate-mode API):
/// - one current program (`use_program`)
/// - per-program uniform storage written through `write_uniform`
/// - numbered texture units, each holding at most one texture
/// - a program's sampler group reads the unit assigned by `set_sampler_unit`
///
/// A draw samples the state current at the time `draw` is called.
pub trait GraphicsBackend {
    fn limits(&self) -> BackendLimits;

    /// Channel on which context loss / restore is announced.
    fn context_events(&self) -> &ContextEvents;

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, BackendError>;

    /// Releases a program. Unknown ids are ignored.
    fn delete_program(&mut self, program: ProgramId);

    fn use_program(&mut self, program: ProgramId) -> Result<(), BackendError>;

    /// Writes `bytes` at `offset` into the uniform block at `binding`.
    fn write_uniform(
        &mut self,
        program: ProgramId,
        binding: u32,
        offset: u32,
        bytes: &[u8],
    ) -> Result<(), BackendError>;

    /// Points the program's sampler group at a texture unit.
    fn set_sampler_unit(
        &mut self,
        program: ProgramId,
        group: u32,
        unit: u32,
    ) -> Result<(), BackendError>;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, BackendError>;

    /// Replaces the texels (and sampling state) of an existing texture.
    fn update_texture(
        &mut self,
        texture: TextureId,
        desc: &TextureDesc<'_>,
    ) -> Result<(), BackendError>;

    /// Releases a texture and clears any unit holding it. Unknown ids are ignored.
    fn delete_texture(&mut self, texture: TextureId);

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) -> Result<(), BackendError>;

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError>;
}
