//! Atlas descriptor JSON and format detection.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use super::AtlasError;
use crate::gfx::Repeat;

/// Which tool produced a descriptor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AtlasFormat {
    /// TexturePacker or free-tex-packer.
    TexturePacker,
    Aseprite,
    /// ShoeBox with the melonJS JSON exporter.
    ShoeBox,
    /// Generated internally, e.g. for a bare image.
    MelonJs,
    /// Fixed-grid spritesheet.
    SpriteSheet,
    /// One image per tile (Tiled image collection).
    ImageCollection,
}

impl AtlasFormat {
    /// Formats whose regions come from a frame list.
    pub fn is_packed(self) -> bool {
        matches!(
            self,
            AtlasFormat::TexturePacker | AtlasFormat::Aseprite | AtlasFormat::ShoeBox | AtlasFormat::MelonJs
        )
    }
}

impl fmt::Display for AtlasFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AtlasFormat::TexturePacker => "TexturePacker",
            AtlasFormat::Aseprite => "Aseprite",
            AtlasFormat::ShoeBox => "ShoeBox",
            AtlasFormat::MelonJs => "melonJS",
            AtlasFormat::SpriteSheet => "Spritesheet (fixed cell size)",
            AtlasFormat::ImageCollection => "Image collection",
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
pub struct FrameRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
pub struct FrameSize {
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
pub struct FramePoint {
    pub x: f32,
    pub y: f32,
}

/// One packed frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDescriptor {
    #[serde(default)]
    pub filename: Option<String>,
    pub frame: FrameRect,
    #[serde(default)]
    pub rotated: bool,
    #[serde(default)]
    pub trimmed: bool,
    #[serde(default)]
    pub sprite_source_size: Option<FrameRect>,
    #[serde(default)]
    pub source_size: Option<FrameSize>,
    #[serde(default)]
    pub pivot: Option<FramePoint>,
    /// Milliseconds; Aseprite only.
    #[serde(default)]
    pub duration: Option<u32>,
}

/// Frames as an array or as an object keyed by frame name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FrameList {
    List(Vec<FrameDescriptor>),
    Named(NamedFrames),
}

impl FrameList {
    /// `(name, frame)` pairs in document order; unnamed list entries are skipped.
    pub fn named(&self) -> Vec<(&str, &FrameDescriptor)> {
        match self {
            FrameList::List(frames) => frames
                .iter()
                .filter_map(|f| f.filename.as_deref().map(|name| (name, f)))
                .collect(),
            FrameList::Named(NamedFrames(frames)) => frames
                .iter()
                .map(|(key, f)| (f.filename.as_deref().unwrap_or(key), f))
                .collect(),
        }
    }
}

/// Keyed frames with their document order preserved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedFrames(pub Vec<(String, FrameDescriptor)>);

impl<'de> Deserialize<'de> for NamedFrames {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = NamedFrames;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of frame name to frame")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut frames = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, FrameDescriptor>()? {
                    frames.push(entry);
                }
                Ok(NamedFrames(frames))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Playback order of an Aseprite tag.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationDirection {
    #[default]
    Forward,
    Reverse,
    Pingpong,
    PingpongReverse,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameTag {
    pub name: String,
    pub from: usize,
    pub to: usize,
    #[serde(default)]
    pub direction: AnimationDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasMeta {
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub exporter: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub size: Option<FrameSize>,
    #[serde(default)]
    pub repeat: Option<Repeat>,
    #[serde(default)]
    pub frame_tags: Vec<FrameTag>,
}

/// One page of a TexturePacker multipack.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PackedTexture {
    pub image: String,
    pub size: FrameSize,
    pub frames: FrameList,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub struct TileFrame {
    pub tileid: u32,
    #[serde(default)]
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TileDescriptor {
    pub id: u32,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub animation: Vec<TileFrame>,
}

/// Any supported atlas descriptor; see [`AtlasDescriptor::classify`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AtlasDescriptor {
    #[serde(default)]
    pub meta: Option<AtlasMeta>,
    #[serde(default)]
    pub frames: Option<FrameList>,
    #[serde(default)]
    pub textures: Option<Vec<PackedTexture>>,

    #[serde(default)]
    pub framewidth: Option<u32>,
    #[serde(default)]
    pub frameheight: Option<u32>,
    #[serde(default)]
    pub margin: Option<u32>,
    #[serde(default)]
    pub spacing: Option<u32>,
    #[serde(default, rename = "anchorPoint")]
    pub anchor_point: Option<FramePoint>,
    /// Spritesheet image name.
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub tiles: Option<Vec<TileDescriptor>>,

    #[serde(default)]
    pub repeat: Option<Repeat>,
}

/// A single descriptor or a list of them (multipack).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AtlasInput {
    Many(Vec<AtlasDescriptor>),
    One(Box<AtlasDescriptor>),
}

impl AtlasInput {
    pub fn from_json(json: &str) -> Result<Self, AtlasError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn into_descriptors(self) -> Vec<AtlasDescriptor> {
        match self {
            AtlasInput::Many(list) => list,
            AtlasInput::One(desc) => vec![*desc],
        }
    }
}

impl AtlasDescriptor {
    pub fn from_json(json: &str) -> Result<Self, AtlasError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Detects the producing tool; the first structural match wins.
    pub fn classify(&self) -> Result<AtlasFormat, AtlasError> {
        if let Some(meta) = &self.meta {
            let app = meta.app.as_str();
            return if app.contains("texturepacker") || app.contains("free-tex-packer") {
                Ok(AtlasFormat::TexturePacker)
            } else if app.contains("aseprite") {
                Ok(AtlasFormat::Aseprite)
            } else if app.contains("ShoeBox") {
                match &meta.exporter {
                    Some(exporter) if exporter.contains("melonJS") => Ok(AtlasFormat::ShoeBox),
                    _ => Err(AtlasError::UnsupportedFormat(
                        "ShoeBox atlases need the melonJS JSON exporter".into(),
                    )),
                }
            } else if app.contains("melonJS") {
                Ok(AtlasFormat::MelonJs)
            } else {
                Err(AtlasError::UnsupportedFormat(format!("unknown exporter `{app}`")))
            };
        }

        if self.framewidth.is_some() && self.frameheight.is_some() {
            return Ok(AtlasFormat::SpriteSheet);
        }
        if self
            .tiles
            .as_ref()
            .is_some_and(|tiles| tiles.iter().any(|t| t.image.is_some()))
        {
            return Ok(AtlasFormat::ImageCollection);
        }
        Err(AtlasError::UnsupportedFormat(
            "descriptor has no meta block, frame size or tile images".into(),
        ))
    }

    pub(crate) fn effective_repeat(&self) -> Repeat {
        self.repeat
            .or_else(|| self.meta.as_ref().and_then(|m| m.repeat))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(json: &str) -> Result<AtlasFormat, AtlasError> {
        AtlasDescriptor::from_json(json).unwrap().classify()
    }

    #[test]
    fn packers_are_detected_from_meta_app() {
        let tp = r#"{"meta":{"app":"https://www.codeandweb.com/texturepacker"},"frames":[]}"#;
        assert_eq!(classify(tp).unwrap(), AtlasFormat::TexturePacker);
        let ftp = r#"{"meta":{"app":"http://github.com/odrick/free-tex-packer"},"frames":[]}"#;
        assert_eq!(classify(ftp).unwrap(), AtlasFormat::TexturePacker);
        let ase = r#"{"meta":{"app":"https://www.aseprite.org/"},"frames":{}}"#;
        assert_eq!(classify(ase).unwrap(), AtlasFormat::Aseprite);
        let internal = r#"{"meta":{"app":"melonJS"},"frames":[]}"#;
        assert_eq!(classify(internal).unwrap(), AtlasFormat::MelonJs);
    }

    #[test]
    fn shoebox_requires_the_melonjs_exporter() {
        let plain = r#"{"meta":{"app":"ShoeBox"}}"#;
        assert!(matches!(classify(plain), Err(AtlasError::UnsupportedFormat(_))));
        let ok = r#"{"meta":{"app":"ShoeBox","exporter":"melonJS"}}"#;
        assert_eq!(classify(ok).unwrap(), AtlasFormat::ShoeBox);
    }

    #[test]
    fn descriptors_without_meta() {
        assert_eq!(
            classify(r#"{"framewidth":16,"frameheight":16}"#).unwrap(),
            AtlasFormat::SpriteSheet
        );
        assert_eq!(
            classify(r#"{"tiles":[{"id":0,"image":"tree.png"}]}"#).unwrap(),
            AtlasFormat::ImageCollection
        );
        assert!(classify(r#"{"framewidth":16}"#).is_err());
        assert!(classify(r#"{"meta":{"app":"Unknown Tool"}}"#).is_err());
    }

    #[test]
    fn keyed_frames_keep_document_order() {
        let json = r#"{"meta":{"app":"aseprite"},"frames":{
            "z": {"frame":{"x":0,"y":0,"w":1,"h":1}},
            "a": {"frame":{"x":1,"y":0,"w":1,"h":1}}
        }}"#;
        let desc = AtlasDescriptor::from_json(json).unwrap();
        let names: Vec<_> = desc.frames.as_ref().unwrap().named().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["z", "a"]);
    }

    #[test]
    fn unnamed_list_frames_are_skipped() {
        let json = r#"{"meta":{"app":"texturepacker"},"frames":[
            {"frame":{"x":0,"y":0,"w":1,"h":1}},
            {"filename":"b","frame":{"x":1,"y":0,"w":1,"h":1}}
        ]}"#;
        let desc = AtlasDescriptor::from_json(json).unwrap();
        assert_eq!(desc.frames.unwrap().named().len(), 1);
    }

    #[test]
    fn input_accepts_object_or_list() {
        let one = AtlasInput::from_json(r#"{"framewidth":8,"frameheight":8}"#).unwrap();
        assert_eq!(one.into_descriptors().len(), 1);
        let many = AtlasInput::from_json(r#"[{"framewidth":8,"frameheight":8},{"tiles":[]}]"#).unwrap();
        assert_eq!(many.into_descriptors().len(), 2);
    }

    #[test]
    fn repeat_falls_back_to_meta() {
        let desc =
            AtlasDescriptor::from_json(r#"{"meta":{"app":"melonJS","repeat":"repeat-x"}}"#).unwrap();
        assert_eq!(desc.effective_repeat(), Repeat::RepeatX);
    }
}
