//! Texture atlases: named sprite regions mapped to normalized UVs.
//!
//! Supported descriptors: TexturePacker / free-tex-packer (including
//! multipack), Aseprite, ShoeBox (melonJS exporter), internally generated
//! atlases, fixed-grid spritesheets and Tiled image collections.

mod error;
mod format;
mod image;
mod parse;
mod region;
mod texture_atlas;

pub use error::AtlasError;
pub use format::{
    AnimationDirection, AtlasDescriptor, AtlasFormat, AtlasInput, AtlasMeta, FrameDescriptor,
    FrameList, FramePoint, FrameRect, FrameSize, FrameTag, NamedFrames, PackedTexture,
    TileDescriptor, TileFrame,
};
pub use image::{Image, ImageData, ImageId, ImageLibrary, ImageSource};
pub use region::{AtlasRegion, RegionTable, add_uvs, parse_region_key};
pub use texture_atlas::{DEFAULT_KEY, TextureAtlas};

/// A named sequence of regions.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub name: String,
    pub frames: Vec<AnimationFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationFrame {
    pub region: String,
    /// Milliseconds, when the descriptor specifies it.
    pub duration: Option<u32>,
}
