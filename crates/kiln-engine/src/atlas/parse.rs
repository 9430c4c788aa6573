//! Descriptor to region-table conversion.

use std::f32::consts::FRAC_PI_2;

use super::format::{AnimationDirection, AtlasDescriptor, FrameList, FrameTag, TileDescriptor};
use super::region::{AtlasRegion, RegionTable, add_uvs};
use super::{Animation, AnimationFrame, AtlasError};
use crate::coords::{Rect, Vec2};

/// Builds regions from packed frames; UVs are computed against the sheet size.
pub(super) fn packed_frames(frames: &FrameList, texture: &str, sheet_w: f32, sheet_h: f32) -> RegionTable {
    let mut table = RegionTable::new();

    for (name, desc) in frames.named() {
        let f = desc.frame;
        let trim = if desc.trimmed {
            desc.sprite_source_size.map(|s| Rect::new(s.x, s.y, s.w, s.h))
        } else {
            None
        };

        let anchor_point = match (desc.source_size, desc.pivot) {
            (Some(source), Some(pivot)) => {
                let (tx, ty) = trim.map_or((0.0, 0.0), |t| (t.origin.x, t.origin.y));
                let origin_x = source.w * pivot.x - tx;
                let origin_y = source.h * pivot.y - ty;
                Some(Vec2::new(origin_x / f.w, origin_y / f.h))
            }
            _ => None,
        };

        let mut region = AtlasRegion::new(name, texture, Vec2::new(f.x, f.y), f.w, f.h);
        region.trimmed = desc.trimmed;
        region.trim = trim;
        region.anchor_point = anchor_point;
        region.angle = if desc.rotated { -FRAC_PI_2 } else { 0.0 };

        table.insert(name.to_string(), region);
        add_uvs(&mut table, name, sheet_w, sheet_h);
    }
    table
}

/// Result of slicing a fixed-grid spritesheet.
pub(super) struct SpriteSheet {
    pub regions: RegionTable,
    pub warning: Option<String>,
}

/// Slices a `width x height` image into `framewidth x frameheight` cells.
///
/// When the image is not a whole number of cells the effective size is
/// truncated to the grid, unless the overhang on either axis is exactly the
/// spacing (a trailing gutter).
pub(super) fn sprite_sheet(
    desc: &AtlasDescriptor,
    image_name: &str,
    width: u32,
    height: u32,
) -> Result<SpriteSheet, AtlasError> {
    let (Some(fw), Some(fh)) = (desc.framewidth, desc.frameheight) else {
        return Err(AtlasError::UnsupportedFormat("spritesheet needs framewidth and frameheight".into()));
    };
    if fw == 0 || fh == 0 {
        return Err(AtlasError::InvalidFrameSize { width: fw, height: fh });
    }
    let spacing = i64::from(desc.spacing.unwrap_or(0));
    let margin = i64::from(desc.margin.unwrap_or(0));
    let (fw, fh) = (i64::from(fw), i64::from(fh));
    let (mut width, mut height) = (i64::from(width), i64::from(height));

    let count_x = ((width - margin + spacing) / (fw + spacing)).max(0);
    let count_y = ((height - margin + spacing) / (fh + spacing)).max(0);

    let mut warning = None;
    if width % (fw + spacing) != 0 || height % (fh + spacing) != 0 {
        let computed_w = count_x * (fw + spacing);
        let computed_h = count_y * (fh + spacing);
        if computed_w - width != spacing && computed_h - height != spacing {
            width = computed_w;
            height = computed_h;
            let message = format!(
                "spritesheet texture for image `{image_name}` is not divisible by {}x{}, truncating effective size to {width}x{height}",
                fw + spacing,
                fh + spacing
            );
            log::warn!("{message}");
            warning = Some(message);
        }
    }

    let anchor = desc.anchor_point.map(|p| Vec2::new(p.x, p.y));
    let mut regions = RegionTable::new();
    for frame in 0..count_x * count_y {
        let name = frame.to_string();
        let offset = Vec2::new(
            (margin + (spacing + fw) * (frame % count_x)) as f32,
            (margin + (spacing + fh) * (frame / count_x)) as f32,
        );
        let mut region = AtlasRegion::new(name.clone(), "default", offset, fw as f32, fh as f32);
        region.anchor_point = anchor;
        regions.insert(name.clone(), region);
        add_uvs(&mut regions, &name, width as f32, height as f32);
    }

    Ok(SpriteSheet { regions, warning })
}

/// Expands Aseprite tags into frame name sequences.
pub(super) fn frame_tags(frames: &FrameList, tags: &[FrameTag]) -> Vec<Animation> {
    let named = frames.named();
    tags.iter()
        .map(|tag| {
            let last = tag.to.min(named.len().saturating_sub(1));
            let forward: Vec<usize> = (tag.from..=last).collect();
            let order: Vec<usize> = match tag.direction {
                AnimationDirection::Forward => forward,
                AnimationDirection::Reverse => forward.into_iter().rev().collect(),
                AnimationDirection::Pingpong => {
                    let back = forward.iter().rev().skip(1).take(forward.len().saturating_sub(2));
                    forward.iter().chain(back).copied().collect()
                }
                AnimationDirection::PingpongReverse => {
                    let reversed: Vec<usize> = forward.iter().rev().copied().collect();
                    let back = forward.iter().skip(1).take(forward.len().saturating_sub(2));
                    reversed.iter().chain(back).copied().collect()
                }
            };
            Animation {
                name: tag.name.clone(),
                frames: order
                    .into_iter()
                    .filter_map(|i| named.get(i))
                    .map(|(name, desc)| AnimationFrame {
                        region: name.to_string(),
                        duration: desc.duration,
                    })
                    .collect(),
            }
        })
        .collect()
}

/// Tile animations of an image collection, keyed by the animated tile id.
pub(super) fn tile_animations(tiles: &[TileDescriptor]) -> Vec<Animation> {
    tiles
        .iter()
        .filter(|t| !t.animation.is_empty())
        .map(|t| Animation {
            name: t.id.to_string(),
            frames: t
                .animation
                .iter()
                .map(|f| AnimationFrame {
                    region: f.tileid.to_string(),
                    duration: Some(f.duration),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(json: &str, w: u32, h: u32) -> SpriteSheet {
        let desc = AtlasDescriptor::from_json(json).unwrap();
        sprite_sheet(&desc, "sheet.png", w, h).unwrap()
    }

    #[test]
    fn exact_grid_has_no_warning() {
        let s = sheet(r#"{"framewidth":32,"frameheight":32}"#, 128, 64);
        assert!(s.warning.is_none());
        assert_eq!(s.regions.get("7").unwrap().offset, Vec2::new(96.0, 32.0));
        assert_eq!(s.regions.get("7").unwrap().uvs, [0.75, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn ragged_sheet_is_truncated_with_a_warning() {
        let s = sheet(r#"{"framewidth":32,"frameheight":32}"#, 100, 70);
        let warning = s.warning.expect("warning");
        assert!(warning.contains("96x64"));
        // 6 frames + one "x,y,w,h" alias each
        let frames = s.regions.keys().filter(|k| !k.contains(',')).count();
        assert_eq!(frames, (96 / 32) * (64 / 32));
        assert_eq!(s.regions["5"].uvs, [2.0 / 3.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn trailing_gutter_equal_to_spacing_is_not_truncated() {
        // 3 cells of 10 with 2px spacing: 10+2+10+2+10 = 34 wide
        let s = sheet(r#"{"framewidth":10,"frameheight":10,"spacing":2}"#, 34, 34);
        assert!(s.warning.is_none());
        assert_eq!(s.regions["1"].offset, Vec2::new(12.0, 0.0));
        assert_eq!(s.regions["1"].uvs[0], 12.0 / 34.0);
    }

    #[test]
    fn margin_and_anchor_are_applied() {
        let s = sheet(
            r#"{"framewidth":8,"frameheight":8,"margin":1,"anchorPoint":{"x":0.5,"y":1}}"#,
            17,
            9,
        );
        assert_eq!(s.regions["1"].offset, Vec2::new(9.0, 1.0));
        assert_eq!(s.regions["1"].anchor_point, Some(Vec2::new(0.5, 1.0)));
    }

    #[test]
    fn zero_frame_size_is_rejected() {
        let desc = AtlasDescriptor::from_json(r#"{"framewidth":0,"frameheight":8}"#).unwrap();
        assert!(sprite_sheet(&desc, "x", 8, 8).is_err());
    }

    #[test]
    fn packed_frames_compute_anchor_trim_and_rotation() {
        let frames: FrameList = serde_json::from_str(
            r#"[{"filename":"hero","frame":{"x":0,"y":0,"w":10,"h":20},"rotated":true,"trimmed":true,
                 "spriteSourceSize":{"x":2,"y":4,"w":10,"h":20},"sourceSize":{"w":16,"h":32},
                 "pivot":{"x":0.5,"y":0.5}}]"#,
        )
        .unwrap();
        let table = packed_frames(&frames, "hero.png", 20.0, 20.0);
        let hero = &table["hero"];
        assert_eq!(hero.angle, -FRAC_PI_2);
        assert_eq!(hero.trim, Some(Rect::new(2.0, 4.0, 10.0, 20.0)));
        // origin (16*0.5 - 2, 32*0.5 - 4) = (6, 12)
        assert_eq!(hero.anchor_point, Some(Vec2::new(0.6, 0.6)));
        assert_eq!(hero.texture, "hero.png");
    }

    #[test]
    fn pingpong_tags_bounce_without_repeating_ends() {
        let frames: FrameList = serde_json::from_str(
            r#"{"f0":{"frame":{"x":0,"y":0,"w":1,"h":1},"duration":100},
                "f1":{"frame":{"x":1,"y":0,"w":1,"h":1},"duration":100},
                "f2":{"frame":{"x":2,"y":0,"w":1,"h":1},"duration":50}}"#,
        )
        .unwrap();
        let tags: Vec<FrameTag> = serde_json::from_str(
            r#"[{"name":"walk","from":0,"to":2,"direction":"pingpong"},
                {"name":"back","from":0,"to":1,"direction":"reverse"}]"#,
        )
        .unwrap();
        let anims = frame_tags(&frames, &tags);
        let walk: Vec<_> = anims[0].frames.iter().map(|f| f.region.as_str()).collect();
        assert_eq!(walk, vec!["f0", "f1", "f2", "f1"]);
        let back: Vec<_> = anims[1].frames.iter().map(|f| f.region.as_str()).collect();
        assert_eq!(back, vec!["f1", "f0"]);
        assert_eq!(anims[0].frames[2].duration, Some(50));
    }
}
