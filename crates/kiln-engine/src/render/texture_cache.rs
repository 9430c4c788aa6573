use std::collections::HashMap;

use super::error::CompositorError;
use crate::atlas::{Image, ImageId, TextureAtlas};
use crate::gfx::Repeat;

/// Texture-unit assignment and per-image atlases.
///
/// Each image keeps the unit it was first given until it is freed; new
/// images take the lowest free unit.
#[derive(Debug, Clone)]
pub struct TextureCache {
    max_units: u32,
    units: HashMap<ImageId, u32>,
    used: Vec<bool>,
    atlases: HashMap<ImageId, TextureAtlas>,
}

impl TextureCache {
    pub fn new(max_units: u32) -> Self {
        Self {
            max_units,
            units: HashMap::new(),
            used: vec![false; max_units as usize],
            atlases: HashMap::new(),
        }
    }

    pub fn max_units(&self) -> u32 {
        self.max_units
    }

    /// The unit assigned to `image`, assigning one on first use.
    pub fn unit_for(&mut self, image: ImageId) -> Result<u32, CompositorError> {
        if let Some(&unit) = self.units.get(&image) {
            return Ok(unit);
        }
        let free = self
            .used
            .iter()
            .position(|used| !used)
            .ok_or(CompositorError::TextureCacheOverflow { max: self.max_units })?;
        self.used[free] = true;
        let unit = free as u32;
        self.units.insert(image, unit);
        Ok(unit)
    }

    pub fn unit(&self, image: ImageId) -> Option<u32> {
        self.units.get(&image).copied()
    }

    /// Releases the unit held by `image`.
    pub fn free_unit(&mut self, image: ImageId) -> Option<u32> {
        let unit = self.units.remove(&image)?;
        if let Some(used) = self.used.get_mut(unit as usize) {
            *used = false;
        }
        Some(unit)
    }

    pub fn units_in_use(&self) -> usize {
        self.units.len()
    }

    /// The whole-image atlas of `image`, created on first request.
    pub fn atlas_for(&mut self, image: &Image, repeat: Repeat) -> &mut TextureAtlas {
        self.atlases
            .entry(image.id())
            .or_insert_with(|| TextureAtlas::from_image(image, repeat))
    }

    /// Forgets every unit assignment and atlas.
    pub fn clear(&mut self) {
        self.units.clear();
        self.used.iter_mut().for_each(|u| *u = false);
        self.atlases.clear();
    }
}
