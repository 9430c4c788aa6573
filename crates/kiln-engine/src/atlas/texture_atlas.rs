use std::collections::HashMap;

use super::format::{AtlasDescriptor, AtlasFormat, AtlasInput, FrameDescriptor, FrameList, FrameRect};
use super::image::{Image, ImageSource};
use super::region::{AtlasRegion, RegionTable, add_uvs, parse_region_key};
use super::{Animation, AtlasError, parse};
use crate::coords::Vec2;
use crate::gfx::Repeat;

/// Key used for sources and atlases that carry no image name.
pub const DEFAULT_KEY: &str = "default";

/// Named sprite regions over one or more source images.
///
/// Sub-atlases (one per packed page) keep their registration order; lookups
/// without an explicit atlas name return the first match.
#[derive(Debug, Clone)]
pub struct TextureAtlas {
    format: AtlasFormat,
    sources: Vec<(String, Image)>,
    atlases: Vec<(String, RegionTable)>,
    repeat: Repeat,
    animations: HashMap<String, Animation>,
    warnings: Vec<String>,
}

impl TextureAtlas {
    /// Loads a descriptor (or a list of them) from JSON, resolving images by
    /// name through `images`.
    pub fn from_json(json: &str, images: &impl ImageSource) -> Result<Self, AtlasError> {
        Self::new(AtlasInput::from_json(json)?.into_descriptors(), images, None)
    }

    /// Loads descriptors. `source`, when given, overrides the image named by
    /// a single-page descriptor (and is the only way to feed a spritesheet
    /// that names no image).
    pub fn new(
        descriptors: Vec<AtlasDescriptor>,
        images: &impl ImageSource,
        source: Option<Image>,
    ) -> Result<Self, AtlasError> {
        let mut atlas = Self::empty(AtlasFormat::MelonJs);
        let mut format = None;

        for desc in &descriptors {
            let kind = desc.classify()?;
            format.get_or_insert(kind);
            atlas.repeat = desc.effective_repeat();

            match kind {
                AtlasFormat::SpriteSheet => atlas.load_sprite_sheet(desc, images, source.clone())?,
                AtlasFormat::ImageCollection => atlas.load_image_collection(desc, images)?,
                _ => atlas.load_packed(desc, images, source.clone())?,
            }
        }

        atlas.format = format.ok_or_else(|| AtlasError::UnsupportedFormat("no descriptor given".into()))?;
        if atlas.atlases.is_empty() {
            return Err(AtlasError::UnsupportedFormat("no texture atlas found".into()));
        }
        log::debug!(
            "loaded {} atlas: {} page(s), {} source(s)",
            atlas.format,
            atlas.atlases.len(),
            atlas.sources.len()
        );
        Ok(atlas)
    }

    /// A single-region atlas covering the whole image, named `"default"`.
    pub fn from_image(image: &Image, repeat: Repeat) -> Self {
        let (w, h) = (image.width() as f32, image.height() as f32);
        let frames = FrameList::List(vec![FrameDescriptor {
            filename: Some(DEFAULT_KEY.into()),
            frame: FrameRect { x: 0.0, y: 0.0, w, h },
            rotated: false,
            trimmed: false,
            sprite_source_size: None,
            source_size: None,
            pivot: None,
            duration: None,
        }]);

        let mut atlas = Self::empty(AtlasFormat::MelonJs);
        atlas.repeat = repeat;
        atlas.set_source(DEFAULT_KEY, image.clone());
        atlas.set_atlas(DEFAULT_KEY, parse::packed_frames(&frames, DEFAULT_KEY, w, h));
        atlas
    }

    fn empty(format: AtlasFormat) -> Self {
        Self {
            format,
            sources: Vec::new(),
            atlases: Vec::new(),
            repeat: Repeat::default(),
            animations: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    fn set_source(&mut self, key: &str, image: Image) {
        match self.sources.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = image,
            None => self.sources.push((key.to_string(), image)),
        }
    }

    fn set_atlas(&mut self, key: &str, table: RegionTable) {
        match self.atlases.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = table,
            None => self.atlases.push((key.to_string(), table)),
        }
    }

    fn load_packed(
        &mut self,
        desc: &AtlasDescriptor,
        images: &impl ImageSource,
        source: Option<Image>,
    ) -> Result<(), AtlasError> {
        let meta = desc.meta.clone().unwrap_or_default();

        if let Some(pages) = &desc.textures {
            for page in pages {
                let image = images
                    .image(&page.image)
                    .ok_or_else(|| AtlasError::MissingSource(page.image.clone()))?;
                let table = parse::packed_frames(&page.frames, &page.image, page.size.w, page.size.h);
                self.set_source(&page.image, image);
                self.set_atlas(&page.image, table);
            }
            return Ok(());
        }

        let key = meta.image.as_deref().unwrap_or(DEFAULT_KEY);
        let image = match source {
            Some(image) => image,
            None => images
                .image(key)
                .ok_or_else(|| AtlasError::MissingSource(key.to_string()))?,
        };
        let (sheet_w, sheet_h) = meta
            .size
            .map_or((image.width() as f32, image.height() as f32), |s| (s.w, s.h));
        let frames = desc
            .frames
            .as_ref()
            .ok_or_else(|| AtlasError::UnsupportedFormat("packed atlas has no frames".into()))?;

        let table = parse::packed_frames(frames, key, sheet_w, sheet_h);
        for animation in parse::frame_tags(frames, &meta.frame_tags) {
            self.animations.insert(animation.name.clone(), animation);
        }
        self.set_source(key, image);
        self.set_atlas(key, table);
        Ok(())
    }

    fn load_sprite_sheet(
        &mut self,
        desc: &AtlasDescriptor,
        images: &impl ImageSource,
        source: Option<Image>,
    ) -> Result<(), AtlasError> {
        let image = match (source, desc.image.as_deref()) {
            (Some(image), _) => image,
            (None, Some(name)) => images
                .image(name)
                .ok_or_else(|| AtlasError::MissingSource(name.to_string()))?,
            (None, None) => return Err(AtlasError::MissingSource(DEFAULT_KEY.into())),
        };
        let sheet = parse::sprite_sheet(desc, image.name(), image.width(), image.height())?;
        self.warnings.extend(sheet.warning);
        self.set_source(DEFAULT_KEY, image);
        self.set_atlas(DEFAULT_KEY, sheet.regions);
        Ok(())
    }

    /// One region per tile, covering that tile's whole image. Every tile sits
    /// at `0,0` of its own source, so tiles of equal size share one
    /// `"0,0,w,h"` alias and the last tile loaded owns it. Look tiles up by
    /// id.
    fn load_image_collection(
        &mut self,
        desc: &AtlasDescriptor,
        images: &impl ImageSource,
    ) -> Result<(), AtlasError> {
        let tiles = desc.tiles.as_deref().unwrap_or_default();
        let mut table = RegionTable::new();
        for tile in tiles {
            let Some(name) = tile.image.as_deref() else { continue };
            let image = images
                .image(name)
                .ok_or_else(|| AtlasError::MissingSource(name.to_string()))?;
            let id = tile.id.to_string();
            let (w, h) = (image.width() as f32, image.height() as f32);
            table.insert(id.clone(), AtlasRegion::new(id.clone(), name, Vec2::zero(), w, h));
            add_uvs(&mut table, &id, w, h);
            self.set_source(name, image);
        }
        for animation in parse::tile_animations(tiles) {
            self.animations.insert(animation.name.clone(), animation);
        }
        self.set_atlas(DEFAULT_KEY, table);
        Ok(())
    }

    pub fn format(&self) -> AtlasFormat {
        self.format
    }

    pub fn repeat(&self) -> Repeat {
        self.repeat
    }

    pub fn set_repeat(&mut self, repeat: Repeat) {
        self.repeat = repeat;
    }

    /// Soft problems found while loading (e.g. truncated spritesheets).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn sources(&self) -> impl Iterator<Item = (&str, &Image)> {
        self.sources.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn atlas_names(&self) -> impl Iterator<Item = &str> {
        self.atlases.iter().map(|(k, _)| k.as_str())
    }

    /// Regions of one page. Note the table also holds `"x,y,w,h"` aliases.
    pub fn atlas(&self, name: &str) -> Option<&RegionTable> {
        self.atlases.iter().find(|(k, _)| k == name).map(|(_, t)| t)
    }

    /// Source image of `region`, or the first source when `region` is `None`
    /// or names an unknown source.
    pub fn texture(&self, region: Option<&AtlasRegion>) -> Option<&Image> {
        region
            .and_then(|r| self.sources.iter().find(|(k, _)| *k == r.texture))
            .or_else(|| self.sources.first())
            .map(|(_, image)| image)
    }

    /// Looks a region up by name, in `atlas` when given, else in every page in
    /// registration order (first match wins).
    pub fn get_region(&self, name: &str, atlas: Option<&str>) -> Result<Option<&AtlasRegion>, AtlasError> {
        match atlas {
            Some(atlas) => self
                .atlas(atlas)
                .map(|table| table.get(name))
                .ok_or_else(|| AtlasError::UnknownAtlas(atlas.to_string())),
            None => Ok(self.atlases.iter().find_map(|(_, table)| table.get(name))),
        }
    }

    /// UVs of a named region, or of an ad-hoc `"x,y,w,h"` region which is
    /// registered on first use.
    pub fn get_uvs(&mut self, name: &str) -> Result<[f32; 4], AtlasError> {
        if let Some(region) = self.get_region(name, None)? {
            return Ok(region.uvs);
        }
        let rect = parse_region_key(name).ok_or_else(|| AtlasError::InvalidRegionKey(name.to_string()))?;
        let region = self.add_region(name, rect.origin.x, rect.origin.y, rect.size.x, rect.size.y)?;
        Ok(region.uvs)
    }

    /// Adds a region to the first page, with UVs against the first source.
    pub fn add_region(&mut self, name: &str, x: f32, y: f32, w: f32, h: f32) -> Result<&AtlasRegion, AtlasError> {
        let (key, image) = self
            .sources
            .first()
            .ok_or_else(|| AtlasError::MissingSource(DEFAULT_KEY.into()))?;
        let (key, sheet_w, sheet_h) = (key.clone(), image.width() as f32, image.height() as f32);

        let (_, table) = self
            .atlases
            .first_mut()
            .ok_or_else(|| AtlasError::UnknownAtlas(DEFAULT_KEY.into()))?;
        log::debug!("adding texture region `{name}` to atlas page `{key}`");
        table.insert(name.to_string(), AtlasRegion::new(name, key, Vec2::new(x, y), w, h));
        add_uvs(table, name, sheet_w, sheet_h);
        table
            .get(name)
            .ok_or_else(|| AtlasError::InvalidRegionKey(name.to_string()))
    }

    pub fn animations(&self) -> impl Iterator<Item = &Animation> {
        self.animations.values()
    }

    pub fn animation(&self, name: &str) -> Option<&Animation> {
        self.animations.get(name)
    }

    /// Regions of an animation, in playback order.
    pub fn animation_regions(&self, name: &str) -> Result<Vec<&AtlasRegion>, AtlasError> {
        let animation = self
            .animations
            .get(name)
            .ok_or_else(|| AtlasError::UnknownAnimation(name.to_string()))?;
        animation
            .frames
            .iter()
            .map(|frame| {
                self.get_region(&frame.region, None)?.ok_or_else(|| AtlasError::MissingAnimationFrame {
                    animation: name.to_string(),
                    region: frame.region.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{ImageData, ImageLibrary};

    fn library(images: &[(&str, u32, u32)]) -> ImageLibrary {
        let mut lib = ImageLibrary::new();
        for &(name, w, h) in images {
            lib.insert(ImageData::filled(name, w, h, [255; 4]));
        }
        lib
    }

    const TWO_FRAMES: &str = r#"{
        "meta": {"app": "https://www.codeandweb.com/texturepacker", "image": "sheet.png", "size": {"w": 20, "h": 10}},
        "frames": [
            {"filename": "a.png", "frame": {"x": 0, "y": 0, "w": 10, "h": 10}},
            {"filename": "b.png", "frame": {"x": 10, "y": 0, "w": 10, "h": 10}}
        ]
    }"#;

    #[test]
    fn texture_packer_regions_get_uvs() {
        let atlas = TextureAtlas::from_json(TWO_FRAMES, &library(&[("sheet.png", 20, 10)])).unwrap();
        assert_eq!(atlas.format(), AtlasFormat::TexturePacker);
        assert_eq!(atlas.get_region("a.png", None).unwrap().unwrap().uvs, [0.0, 0.0, 0.5, 1.0]);
        assert_eq!(atlas.get_region("b.png", None).unwrap().unwrap().uvs, [0.5, 0.0, 1.0, 1.0]);
        assert_eq!(atlas.texture(None).unwrap().name(), "sheet.png");
    }

    #[test]
    fn missing_source_image_is_an_error() {
        let err = TextureAtlas::from_json(TWO_FRAMES, &ImageLibrary::new()).unwrap_err();
        assert!(matches!(err, AtlasError::MissingSource(name) if name == "sheet.png"));
    }

    #[test]
    fn uv_round_trip_reproduces_the_source_rect() {
        let atlas = TextureAtlas::from_json(TWO_FRAMES, &library(&[("sheet.png", 20, 10)])).unwrap();
        let b = atlas.get_region("b.png", None).unwrap().unwrap();
        let [u0, v0, u1, v1] = b.uvs;
        assert!((u0 * 20.0 - b.offset.x).abs() < 1e-4);
        assert!((v0 * 10.0 - b.offset.y).abs() < 1e-4);
        assert!(((u1 - u0) * 20.0 - b.width).abs() < 1e-4);
        assert!(((v1 - v0) * 10.0 - b.height).abs() < 1e-4);
    }

    #[test]
    fn multipack_pages_are_searched_in_order() {
        let json = r#"{
            "meta": {"app": "texturepacker"},
            "textures": [
                {"image": "p0.png", "size": {"w": 10, "h": 10},
                 "frames": [{"filename": "shared", "frame": {"x": 0, "y": 0, "w": 5, "h": 5}}]},
                {"image": "p1.png", "size": {"w": 20, "h": 20},
                 "frames": [{"filename": "shared", "frame": {"x": 10, "y": 0, "w": 5, "h": 5}},
                            {"filename": "only1", "frame": {"x": 0, "y": 0, "w": 5, "h": 5}}]}
            ]
        }"#;
        let atlas = TextureAtlas::from_json(json, &library(&[("p0.png", 10, 10), ("p1.png", 20, 20)])).unwrap();
        let shared = atlas.get_region("shared", None).unwrap().unwrap();
        assert_eq!(shared.texture, "p0.png");
        let explicit = atlas.get_region("shared", Some("p1.png")).unwrap().unwrap();
        assert_eq!(explicit.texture, "p1.png");
        assert_eq!(atlas.texture(Some(explicit)).unwrap().name(), "p1.png");
        assert!(atlas.get_region("only1", Some("p0.png")).unwrap().is_none());
        assert!(matches!(atlas.get_region("x", Some("p9.png")), Err(AtlasError::UnknownAtlas(_))));
    }

    #[test]
    fn descriptor_list_is_a_multipack() {
        let json = r#"[
            {"meta": {"app": "texturepacker", "image": "a.png", "size": {"w": 4, "h": 4}},
             "frames": [{"filename": "one", "frame": {"x": 0, "y": 0, "w": 4, "h": 4}}]},
            {"meta": {"app": "texturepacker", "image": "b.png", "size": {"w": 8, "h": 8}},
             "frames": [{"filename": "two", "frame": {"x": 0, "y": 0, "w": 4, "h": 4}}]}
        ]"#;
        let atlas = TextureAtlas::from_json(json, &library(&[("a.png", 4, 4), ("b.png", 8, 8)])).unwrap();
        assert_eq!(atlas.atlas_names().collect::<Vec<_>>(), vec!["a.png", "b.png"]);
        assert_eq!(atlas.get_region("two", None).unwrap().unwrap().uvs, [0.0, 0.0, 0.5, 0.5]);
    }

    #[test]
    fn ad_hoc_region_keys_are_registered_on_demand() {
        let image = ImageData::filled("img", 64, 32, [0; 4]);
        let mut atlas = TextureAtlas::from_image(&image, Repeat::NoRepeat);
        assert_eq!(atlas.get_uvs("16,8,16,8").unwrap(), [0.25, 0.25, 0.5, 0.5]);
        assert!(atlas.get_region("16,8,16,8", None).unwrap().is_some());
        assert!(matches!(atlas.get_uvs("not-a-key"), Err(AtlasError::InvalidRegionKey(_))));
    }

    #[test]
    fn whole_image_region_is_indexed_by_its_key() {
        let image = ImageData::filled("img", 64, 32, [0; 4]);
        let atlas = TextureAtlas::from_image(&image, Repeat::Repeat);
        assert_eq!(atlas.get_region("default", None).unwrap().unwrap().uvs, [0.0, 0.0, 1.0, 1.0]);
        assert!(atlas.get_region("0,0,64,32", None).unwrap().is_some());
        assert_eq!(atlas.repeat(), Repeat::Repeat);
    }

    #[test]
    fn spritesheet_uses_the_explicit_image() {
        let desc = AtlasDescriptor::from_json(r#"{"framewidth":32,"frameheight":32}"#).unwrap();
        let image = ImageData::filled("ragged.png", 100, 70, [0; 4]);
        let atlas = TextureAtlas::new(vec![desc], &ImageLibrary::new(), Some(image)).unwrap();
        assert_eq!(atlas.format(), AtlasFormat::SpriteSheet);
        assert_eq!(atlas.warnings().len(), 1);
        assert!(atlas.get_region("5", None).unwrap().is_some());
        assert!(atlas.get_region("6", None).unwrap().is_none());
    }

    #[test]
    fn spritesheet_without_any_image_fails() {
        let desc = AtlasDescriptor::from_json(r#"{"framewidth":32,"frameheight":32}"#).unwrap();
        let err = TextureAtlas::new(vec![desc], &ImageLibrary::new(), None).unwrap_err();
        assert!(matches!(err, AtlasError::MissingSource(_)));
    }

    #[test]
    fn image_collection_has_one_source_per_tile() {
        let json = r#"{"tiles": [
            {"id": 0, "image": "tree.png"},
            {"id": 1, "image": "rock.png", "animation": [{"tileid": 0, "duration": 100}, {"tileid": 1, "duration": 100}]}
        ]}"#;
        let atlas = TextureAtlas::from_json(json, &library(&[("tree.png", 16, 32), ("rock.png", 8, 8)])).unwrap();
        assert_eq!(atlas.format(), AtlasFormat::ImageCollection);
        let rock = atlas.get_region("1", None).unwrap().unwrap();
        assert_eq!(rock.uvs, [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(atlas.texture(Some(rock)).unwrap().name(), "rock.png");
        let frames = atlas.animation_regions("1").unwrap();
        assert_eq!(frames.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["0", "1"]);
    }

    #[test]
    fn equal_sized_tiles_share_the_last_tiles_alias() {
        let json = r#"{"tiles": [
            {"id": 0, "image": "grass.png"},
            {"id": 1, "image": "water.png"}
        ]}"#;
        let atlas = TextureAtlas::from_json(json, &library(&[("grass.png", 32, 32), ("water.png", 32, 32)])).unwrap();

        let alias = atlas.get_region("0,0,32,32", None).unwrap().unwrap();
        assert_eq!(alias.name, "1");
        assert_eq!(atlas.texture(Some(alias)).unwrap().name(), "water.png");

        let grass = atlas.get_region("0", None).unwrap().unwrap();
        assert_eq!(atlas.texture(Some(grass)).unwrap().name(), "grass.png");
    }

    #[test]
    fn aseprite_tags_become_animations() {
        let json = r#"{
            "meta": {"app": "https://www.aseprite.org/", "image": "knight.png", "size": {"w": 32, "h": 16},
                     "frameTags": [{"name": "idle", "from": 0, "to": 1, "direction": "forward"}]},
            "frames": {
                "knight 0.aseprite": {"frame": {"x": 0, "y": 0, "w": 16, "h": 16}, "duration": 120},
                "knight 1.aseprite": {"frame": {"x": 16, "y": 0, "w": 16, "h": 16}, "duration": 80}
            }
        }"#;
        let atlas = TextureAtlas::from_json(json, &library(&[("knight.png", 32, 16)])).unwrap();
        assert_eq!(atlas.format(), AtlasFormat::Aseprite);
        let idle = atlas.animation("idle").unwrap();
        assert_eq!(idle.frames[1].region, "knight 1.aseprite");
        assert_eq!(idle.frames[1].duration, Some(80));
        assert!(matches!(atlas.animation_regions("run"), Err(AtlasError::UnknownAnimation(_))));
    }

    #[test]
    fn unsupported_descriptor_list_fails() {
        assert!(TextureAtlas::from_json("[]", &ImageLibrary::new()).is_err());
        assert!(TextureAtlas::from_json(r#"{"frames": []}"#, &ImageLibrary::new()).is_err());
    }
}
