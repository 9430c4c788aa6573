use std::collections::HashMap;

use crate::coords::{Rect, Vec2};

/// A named sub-rectangle of an atlas source image.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasRegion {
    pub name: String,
    /// Key of the source image in the owning atlas.
    pub texture: String,
    /// Top-left corner in the source image, in pixels.
    pub offset: Vec2,
    pub width: f32,
    pub height: f32,
    /// `0` or `-PI/2` for frames the packer stored rotated.
    pub angle: f32,
    pub trimmed: bool,
    pub trim: Option<Rect>,
    /// Pivot in frame-relative units.
    pub anchor_point: Option<Vec2>,
    /// `[u0, v0, u1, v1]`.
    pub uvs: [f32; 4],
    sheet: Option<(f32, f32)>,
}

impl AtlasRegion {
    pub fn new(name: impl Into<String>, texture: impl Into<String>, offset: Vec2, width: f32, height: f32) -> Self {
        Self {
            name: name.into(),
            texture: texture.into(),
            offset,
            width,
            height,
            angle: 0.0,
            trimmed: false,
            trim: None,
            anchor_point: None,
            uvs: [0.0; 4],
            sheet: None,
        }
    }

    /// The `"x,y,w,h"` key this region is also indexed under.
    pub fn source_key(&self) -> String {
        format!("{},{},{},{}", self.offset.x, self.offset.y, self.width, self.height)
    }

    /// Source rectangle in pixels.
    pub fn source_rect(&self) -> Rect {
        Rect::new(self.offset.x, self.offset.y, self.width, self.height)
    }
}

/// Regions of one atlas page, keyed by name (plus `"x,y,w,h"` aliases).
pub type RegionTable = HashMap<String, AtlasRegion>;

/// Computes and caches the normalized UVs of `name` against a
/// `sheet_w x sheet_h` source, and indexes the region under its `"x,y,w,h"`
/// key. Calling again with the same sheet size returns the cached UVs.
pub fn add_uvs(table: &mut RegionTable, name: &str, sheet_w: f32, sheet_h: f32) -> Option<[f32; 4]> {
    let region = table.get_mut(name)?;
    if region.sheet == Some((sheet_w, sheet_h)) {
        return Some(region.uvs);
    }

    region.uvs = region.source_rect().uvs_in(sheet_w, sheet_h);
    region.sheet = Some((sheet_w, sheet_h));

    let uvs = region.uvs;
    let key = region.source_key();
    if key != name {
        let alias = region.clone();
        table.insert(key, alias);
    }
    Some(uvs)
}

/// Parses an `"x,y,w,h"` region key.
pub fn parse_region_key(key: &str) -> Option<Rect> {
    let mut parts = key.split(',').map(|p| p.trim().parse::<f32>());
    let mut next = || parts.next()?.ok();
    let rect = Rect::new(next()?, next()?, next()?, next()?);
    if parts.next().is_some() || !rect.is_finite() {
        return None;
    }
    Some(rect)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(name: &str, x: f32, y: f32, w: f32, h: f32) -> RegionTable {
        let mut table = RegionTable::new();
        table.insert(name.into(), AtlasRegion::new(name, "default", Vec2::new(x, y), w, h));
        table
    }

    #[test]
    fn uvs_are_normalized_to_the_sheet() {
        let mut table = table_with("b", 10.0, 0.0, 10.0, 10.0);
        assert_eq!(add_uvs(&mut table, "b", 20.0, 10.0), Some([0.5, 0.0, 1.0, 1.0]));
    }

    #[test]
    fn add_uvs_is_memoized() {
        let mut table = table_with("r", 3.0, 7.0, 11.0, 5.0);
        let first = add_uvs(&mut table, "r", 37.0, 29.0).unwrap();
        let second = add_uvs(&mut table, "r", 37.0, 29.0).unwrap();
        assert_eq!(first.map(f32::to_bits), second.map(f32::to_bits));
    }

    #[test]
    fn region_is_indexed_by_source_key() {
        let mut table = table_with("hero", 16.0, 32.0, 8.0, 8.0);
        add_uvs(&mut table, "hero", 64.0, 64.0);
        let alias = table.get("16,32,8,8").unwrap();
        assert_eq!(alias.name, "hero");
        assert_eq!(alias.uvs, table["hero"].uvs);
    }

    #[test]
    fn unknown_region_yields_none() {
        let mut table = RegionTable::new();
        assert_eq!(add_uvs(&mut table, "nope", 1.0, 1.0), None);
    }

    #[test]
    fn parses_region_keys() {
        assert_eq!(parse_region_key("1,2,3,4"), Some(Rect::new(1.0, 2.0, 3.0, 4.0)));
        assert_eq!(parse_region_key(" 0.5, 1 ,2,3"), Some(Rect::new(0.5, 1.0, 2.0, 3.0)));
        assert_eq!(parse_region_key("1,2,3"), None);
        assert_eq!(parse_region_key("1,2,3,4,5"), None);
        assert_eq!(parse_region_key("hero"), None);
    }
}
