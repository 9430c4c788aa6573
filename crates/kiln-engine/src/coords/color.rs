/// Straight-alpha RGBA color with channels in `[0, 1]`.
///
/// Vertex tints travel as a single packed `0xAARRGGBB` word (see [`Color::to_argb`]);
/// the quad shader premultiplies after unpacking.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[inline]
    pub const fn black() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    #[inline]
    pub const fn white() -> Self {
        Self::new(1.0, 1.0, 1.0, 1.0)
    }

    #[inline]
    pub fn from_rgba_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Unpacks a `0xAARRGGBB` word.
    #[inline]
    pub fn from_argb(argb: u32) -> Self {
        let [b, g, r, a] = argb.to_le_bytes();
        Self::from_rgba_u8(r, g, b, a)
    }

    /// Packs into a `0xAARRGGBB` word, clamping each channel to `[0, 1]`.
    ///
    /// Stored little-endian, the word reads back as `unorm8x4` in `(b, g, r, a)`
    /// order, which is what the built-in shaders swizzle.
    #[inline]
    pub fn to_argb(self) -> u32 {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
        (q(self.a) << 24) | (q(self.r) << 16) | (q(self.g) << 8) | q(self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_packs_to_all_ones() {
        assert_eq!(Color::white().to_argb(), 0xFFFF_FFFF);
    }

    #[test]
    fn channels_land_in_argb_order() {
        let c = Color::from_rgba_u8(0x11, 0x22, 0x33, 0x44);
        assert_eq!(c.to_argb(), 0x4411_2233);
        assert_eq!(Color::from_argb(0x4411_2233), c);
    }

    #[test]
    fn out_of_range_channels_clamp() {
        let c = Color::new(2.0, -1.0, 0.0, 1.0);
        assert_eq!(c.to_argb(), 0xFFFF_0000);
    }
}
