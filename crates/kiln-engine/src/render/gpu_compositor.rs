//! Texture-aware batching on top of [`BaseCompositor`].

use std::collections::HashMap;

use glam::Mat4;

use super::builtin;
use super::compositor::{BaseCompositor, Compositor, ShaderId};
use super::error::CompositorError;
use super::layout::{ComponentType, VertexLayout};
use super::settings::CompositorSettings;
use super::shader::Precision;
use super::texture_cache::TextureCache;
use super::vertex::pack_word;
use crate::atlas::{AtlasRegion, Image, ImageId, TextureAtlas};
use crate::coords::{Color, Rect, Vec2};
use crate::gfx::{DrawMode, Filter, GraphicsBackend, Repeat, TextureDesc, TextureId};

/// An image to sample and how it wraps.
#[derive(Debug, Clone, Copy)]
pub struct TextureSource<'a> {
    pub image: &'a Image,
    pub repeat: Repeat,
}

impl<'a> TextureSource<'a> {
    pub fn new(image: &'a Image) -> Self {
        Self { image, repeat: Repeat::NoRepeat }
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    /// The page image holding `region` (or the atlas' first page), with the
    /// atlas' repeat mode.
    pub fn from_atlas(atlas: &'a TextureAtlas, region: Option<&AtlasRegion>) -> Option<Self> {
        let image = atlas.texture(region)?;
        Some(Self { image, repeat: atlas.repeat() })
    }
}

impl<'a> From<&'a Image> for TextureSource<'a> {
    fn from(image: &'a Image) -> Self {
        Self::new(image)
    }
}

/// Texel input of [`GpuCompositor::create_texture_2d`].
#[derive(Debug, Clone, Copy)]
pub enum TexturePixels<'a> {
    Image(&'a Image),
    /// Tightly packed RGBA8. `border` exists for parity with classic texture
    /// APIs and must be zero.
    Raw { data: &'a [u8], width: u32, height: u32, border: u32 },
}

#[derive(Debug, Clone, Copy)]
struct ImageTexture {
    texture: TextureId,
    generation: u64,
}

/// Float indices of the attributes the compositor writes itself.
#[derive(Debug, Clone, Copy)]
struct VertexSlots {
    position: usize,
    region: usize,
    color: usize,
    /// `None` when the colour is one packed `unorm8x4` word, else the float count.
    color_floats: Option<usize>,
}

impl VertexSlots {
    fn from_layout(layout: &VertexLayout) -> Result<Self, CompositorError> {
        let slot = |name: &'static str| {
            let attr = layout.attribute(name).ok_or(CompositorError::MissingAttribute(name))?;
            if attr.byte_offset % 4 != 0 {
                return Err(CompositorError::UnalignedAttribute { name, offset: attr.byte_offset });
            }
            Ok(((attr.byte_offset / 4) as usize, attr))
        };
        let (position, _) = slot("aVertex")?;
        let (region, _) = slot("aRegion")?;
        let (color, attr) = slot("aColor")?;
        let color_floats = match attr.component_type {
            ComponentType::Float32 => Some(attr.size as usize),
            _ => None,
        };
        Ok(Self { position, region, color, color_floats })
    }

    fn write_color(&self, record: &mut [f32], tint: Color) {
        match self.color_floats {
            None => write(record, self.color, &[pack_word(tint.to_argb())]),
            // same (b, g, r, a) order the packed word unpacks to
            Some(n) => {
                let bgra = [tint.b, tint.g, tint.r, tint.a];
                write(record, self.color, &bgra[..n.min(4)]);
            }
        }
    }
}

fn write(record: &mut [f32], at: usize, values: &[f32]) {
    if let Some(dst) = record.get_mut(at..at + values.len()) {
        dst.copy_from_slice(values);
    }
}

/// The compositor scene code draws through: a [`BaseCompositor`] plus a
/// texture-unit slot table, per-image texture objects and the built-in quad
/// and primitive shaders.
#[derive(Debug)]
pub struct GpuCompositor<B: GraphicsBackend> {
    base: BaseCompositor<B>,
    filter: Filter,
    quad_shader: ShaderId,
    primitive_shader: ShaderId,
    bound_textures: Vec<Option<TextureId>>,
    image_textures: HashMap<ImageId, ImageTexture>,
    texture_cache: TextureCache,
    slots: VertexSlots,
}

impl<B: GraphicsBackend> GpuCompositor<B> {
    pub fn new(backend: B, settings: &CompositorSettings) -> Result<Self, CompositorError> {
        let cache = TextureCache::new(backend.limits().max_texture_units);
        Self::with_texture_cache(backend, settings, cache)
    }

    pub fn with_defaults(backend: B) -> Result<Self, CompositorError> {
        Self::new(backend, &CompositorSettings::default())
    }

    /// Builds a compositor sharing unit assignments and atlases from `cache`.
    pub fn with_texture_cache(
        backend: B,
        settings: &CompositorSettings,
        texture_cache: TextureCache,
    ) -> Result<Self, CompositorError> {
        let layout = settings.layout()?;
        let slots = VertexSlots::from_layout(&layout)?;
        let max_units = backend.limits().max_texture_units;

        let mut base = BaseCompositor::new(backend, layout, settings.max_vertices());
        let quad_shader = base.create_shader(
            "quad",
            &settings.shader.vertex,
            &settings.shader.fragment,
            settings.precision,
        )?;
        let primitive_shader = base.create_shader(
            "primitive",
            builtin::PRIMITIVE_VERTEX,
            builtin::PRIMITIVE_FRAGMENT,
            settings.precision,
        )?;
        base.use_shader(quad_shader)?;

        log::debug!(
            "gpu compositor ready: {} vertices per batch, {max_units} texture units",
            settings.max_vertices()
        );

        Ok(Self {
            base,
            filter: settings.filter(),
            quad_shader,
            primitive_shader,
            bound_textures: vec![None; max_units as usize],
            image_textures: HashMap::new(),
            texture_cache,
            slots,
        })
    }

    pub fn base(&self) -> &BaseCompositor<B> {
        &self.base
    }

    pub fn backend(&self) -> &B {
        self.base.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.base.backend_mut()
    }

    pub fn texture_cache(&self) -> &TextureCache {
        &self.texture_cache
    }

    pub fn quad_shader(&self) -> ShaderId {
        self.quad_shader
    }

    pub fn primitive_shader(&self) -> ShaderId {
        self.primitive_shader
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Texture held by `unit` in the slot table.
    pub fn bound_texture(&self, unit: u32) -> Option<TextureId> {
        self.bound_textures.get(unit as usize).copied().flatten()
    }

    /// Texture object uploaded for `image`, if any.
    pub fn image_texture(&self, image: &Image) -> Option<TextureId> {
        self.image_textures.get(&image.id()).map(|t| t.texture)
    }

    pub fn create_shader(
        &mut self,
        label: &str,
        vertex: &str,
        fragment: &str,
        precision: Option<Precision>,
    ) -> Result<ShaderId, CompositorError> {
        self.base.create_shader(label, vertex, fragment, precision)
    }

    fn check_unit(&self, unit: u32) -> Result<(), CompositorError> {
        let max = self.bound_textures.len() as u32;
        if unit >= max {
            return Err(CompositorError::TextureUnitOutOfRange { unit, max });
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), CompositorError> {
        if self.base.is_lost() { Err(CompositorError::ContextLost) } else { Ok(()) }
    }

    /// Makes `unit` the one the current shader samples.
    fn activate_unit(&mut self, unit: u32) -> Result<(), CompositorError> {
        self.base.set_active_unit(unit);
        self.base.set_sampler_unit(unit)
    }

    /// Uploads pixels as a texture object bound at `unit`.
    ///
    /// An image that already has a texture object is only re-uploaded with
    /// `force`; otherwise its existing texture is bound.
    pub fn create_texture_2d(
        &mut self,
        unit: u32,
        pixels: TexturePixels<'_>,
        filter: Filter,
        repeat: Repeat,
        force: bool,
    ) -> Result<TextureId, CompositorError> {
        self.check_unit(unit)?;
        self.ensure_live()?;

        let texture = match pixels {
            TexturePixels::Raw { border, .. } if border != 0 => {
                return Err(CompositorError::InvalidBorder(border));
            }
            TexturePixels::Raw { data, width, height, .. } => {
                let desc = TextureDesc { label: None, width, height, pixels: data, filter, repeat };
                let texture = self.base.backend_mut().create_texture(&desc)?;
                log::debug!("uploaded {width}x{height} texture {texture:?} to unit {unit}");
                texture
            }
            TexturePixels::Image(image) => {
                let existing = self.image_textures.get(&image.id()).copied();
                if let Some(existing) = existing {
                    if !force {
                        self.bind_texture_2d(existing.texture, unit)?;
                        return Ok(existing.texture);
                    }
                    // pending quads may still sample the old texels
                    self.base.flush()?;
                }
                let generation = image.generation();
                let backend = self.base.backend_mut();
                let texture = image.with_pixels(|px| {
                    let desc = TextureDesc {
                        label: Some(image.name()),
                        width: image.width(),
                        height: image.height(),
                        pixels: px,
                        filter,
                        repeat,
                    };
                    match existing {
                        Some(e) => backend.update_texture(e.texture, &desc).map(|()| e.texture),
                        None => backend.create_texture(&desc),
                    }
                })?;
                log::debug!(
                    "uploaded image `{}` ({}x{}) as {texture:?} to unit {unit}",
                    image.name(),
                    image.width(),
                    image.height()
                );
                self.image_textures.insert(image.id(), ImageTexture { texture, generation });
                texture
            }
        };

        self.bind_texture_2d(texture, unit)?;
        Ok(texture)
    }

    /// Binds `texture` at `unit`, flushing first whenever the batch would
    /// otherwise sample something else.
    pub fn bind_texture_2d(&mut self, texture: TextureId, unit: u32) -> Result<(), CompositorError> {
        self.check_unit(unit)?;
        if self.bound_texture(unit) != Some(texture) {
            self.base.flush()?;
            self.base.backend_mut().bind_texture(unit, Some(texture))?;
            if let Some(slot) = self.bound_textures.get_mut(unit as usize) {
                *slot = Some(texture);
            }
            self.activate_unit(unit)?;
        } else if self.base.active_unit() != unit {
            self.base.flush()?;
            self.activate_unit(unit)?;
        }
        Ok(())
    }

    /// Clears a slot and returns its unit.
    ///
    /// With a `unit`, the slot is cleared if it holds `texture` (or
    /// unconditionally when `texture` is `None`). Without one, the slot holding
    /// `texture` is searched for. Returns `None` when nothing was cleared.
    pub fn unbind_texture_2d(
        &mut self,
        texture: Option<TextureId>,
        unit: Option<u32>,
    ) -> Result<Option<u32>, CompositorError> {
        let unit = match (texture, unit) {
            (_, Some(unit)) => {
                self.check_unit(unit)?;
                if texture.is_some_and(|t| self.bound_texture(unit) != Some(t)) {
                    return Ok(None);
                }
                unit
            }
            (Some(t), None) => match self.bound_textures.iter().position(|b| *b == Some(t)) {
                Some(unit) => unit as u32,
                None => return Ok(None),
            },
            (None, None) => return Ok(None),
        };
        self.base.flush()?;
        self.base.backend_mut().bind_texture(unit, None)?;
        if let Some(slot) = self.bound_textures.get_mut(unit as usize) {
            *slot = None;
        }
        Ok(Some(unit))
    }

    /// Releases a texture object, clearing every slot and image entry that
    /// refers to it. The image itself is untouched.
    pub fn delete_texture_2d(&mut self, texture: TextureId) -> Result<(), CompositorError> {
        self.base.flush()?;
        self.base.backend_mut().delete_texture(texture);
        for slot in self.bound_textures.iter_mut().filter(|s| **s == Some(texture)) {
            *slot = None;
        }
        let cache = &mut self.texture_cache;
        self.image_textures.retain(|image, t| {
            if t.texture == texture {
                cache.free_unit(*image);
                false
            } else {
                true
            }
        });
        Ok(())
    }

    /// Makes `source` resident on its cache unit and returns the unit.
    ///
    /// The image is uploaded on first use, re-uploaded when `force` is set or
    /// its pixels changed since the last upload, and otherwise just bound.
    pub fn upload_texture(&mut self, source: TextureSource<'_>, force: bool) -> Result<u32, CompositorError> {
        let image = source.image;
        let unit = self.texture_cache.unit_for(image.id())?;
        let stale = self
            .image_textures
            .get(&image.id())
            .is_some_and(|t| t.generation != image.generation());
        self.create_texture_2d(unit, TexturePixels::Image(image), self.filter, source.repeat, force || stale)?;
        Ok(unit)
    }

    /// Queues one textured quad covering `dest`, sampling `uvs` =
    /// `[u0, v0, u1, v1]` of `source`, multiplied by `tint`.
    pub fn add_quad(
        &mut self,
        source: TextureSource<'_>,
        dest: Rect,
        uvs: [f32; 4],
        tint: Color,
    ) -> Result<(), CompositorError> {
        if tint.a <= 0.0 {
            return Ok(());
        }
        self.ensure_live()?;

        let current = self.base.current_shader();
        if current.is_none() || current == Some(self.primitive_shader) {
            self.base.use_shader(self.quad_shader)?;
        }

        let unit = self.upload_texture(source, false)?;
        self.base.set_sampler_unit(unit)?;

        if self.base.buffer().is_full(4) {
            self.base.flush()?;
        }

        let [u0, v0, u1, v1] = uvs;
        let texcoords = [[u0, v0], [u1, v0], [u0, v1], [u1, v1]];
        let slots = self.slots;
        let buffer = self.base.buffer_mut();
        for (corner, uv) in dest.corners().into_iter().zip(texcoords) {
            let record = buffer.push_vertex();
            write(record, slots.position, &[corner.x, corner.y]);
            write(record, slots.region, &uv);
            slots.write_color(record, tint);
        }
        self.base.mark_quads();
        Ok(())
    }

    /// Draws a raw vertex list with the primitive shader, immediately.
    pub fn draw_vertices(&mut self, mode: DrawMode, vertices: &[Vec2], color: Color) -> Result<(), CompositorError> {
        if vertices.is_empty() {
            return Ok(());
        }
        self.ensure_live()?;

        if self.base.current_shader() != Some(self.primitive_shader) {
            self.base.use_shader(self.primitive_shader)?;
        }
        self.base.flush()?;

        let slots = self.slots;
        let buffer = self.base.buffer_mut();
        if buffer.is_full(vertices.len()) {
            buffer.resize(vertices.len());
        }
        for v in vertices {
            let record = buffer.push_vertex();
            write(record, slots.position, &[v.x, v.y]);
            slots.write_color(record, color);
        }
        self.base.flush_mode(mode)
    }

    /// Draws the `src` pixel rectangle of `image` into `dest`.
    ///
    /// UVs come from the image's cached whole-image atlas, where `src` is
    /// registered as an ad-hoc region on first use.
    pub fn draw_image(&mut self, image: &Image, src: Rect, dest: Rect, tint: Color) -> Result<(), CompositorError> {
        let key = format!("{},{},{},{}", src.origin.x, src.origin.y, src.size.x, src.size.y);
        let uvs = self
            .texture_cache
            .atlas_for(image, Repeat::NoRepeat)
            .get_uvs(&key)?;
        self.add_quad(TextureSource::new(image), dest, uvs, tint)
    }

    /// Drains context events. On loss, texture objects, slot assignments and
    /// cached atlases are forgotten along with the shaders.
    pub fn poll_context(&mut self) -> bool {
        let lost = self.base.poll_context();
        if lost {
            log::warn!("graphics context lost; {} textures dropped", self.image_textures.len());
            self.forget_textures();
        }
        lost
    }

    fn forget_textures(&mut self) {
        self.bound_textures.iter_mut().for_each(|s| *s = None);
        self.image_textures.clear();
        self.texture_cache.clear();
        self.base.set_active_unit(0);
    }

    /// Rebuilds the shaders after a restore. Textures re-upload lazily.
    pub fn restore(&mut self) -> Result<(), CompositorError> {
        self.base.restore_shaders()?;
        self.forget_textures();
        self.base.use_shader(self.quad_shader)?;
        log::debug!("gpu compositor restored");
        Ok(())
    }

    /// Moves the compositor onto a new backend. The old backend is returned
    /// with this compositor's textures and programs released.
    pub fn replace_backend(&mut self, backend: B) -> Result<B, CompositorError> {
        let textures: Vec<TextureId> = self.image_textures.values().map(|t| t.texture).collect();
        let mut old = self.base.replace_backend(backend)?;
        for texture in textures {
            old.delete_texture(texture);
        }
        self.forget_textures();
        self.base.use_shader(self.quad_shader)?;
        Ok(old)
    }
}

impl<B: GraphicsBackend> Compositor for GpuCompositor<B> {
    fn reset(&mut self) {
        self.base.reset();
    }

    fn bind(&mut self) -> Result<(), CompositorError> {
        for (unit, texture) in self.bound_textures.iter().enumerate() {
            if texture.is_some() {
                self.base.backend_mut().bind_texture(unit as u32, *texture)?;
            }
        }
        self.base.bind()
    }

    fn use_shader(&mut self, shader: ShaderId) -> Result<(), CompositorError> {
        self.base.use_shader(shader)
    }

    fn set_projection(&mut self, projection: Mat4) -> Result<(), CompositorError> {
        self.base.set_projection(projection)
    }

    fn add_attribute(
        &mut self,
        name: &str,
        size: u8,
        component_type: ComponentType,
        normalized: bool,
        byte_offset: u32,
    ) -> Result<(), CompositorError> {
        self.base.add_attribute(name, size, component_type, normalized, byte_offset)
    }

    fn add_quad(
        &mut self,
        source: TextureSource<'_>,
        dest: Rect,
        uvs: [f32; 4],
        tint: Color,
    ) -> Result<(), CompositorError> {
        GpuCompositor::add_quad(self, source, dest, uvs, tint)
    }

    fn draw_vertices(&mut self, mode: DrawMode, vertices: &[Vec2], color: Color) -> Result<(), CompositorError> {
        GpuCompositor::draw_vertices(self, mode, vertices, color)
    }

    fn flush_mode(&mut self, mode: DrawMode) -> Result<(), CompositorError> {
        self.base.flush_mode(mode)
    }
}
