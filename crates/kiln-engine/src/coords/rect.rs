use super::Vec2;

/// Axis-aligned rectangle in pixels (top-left origin).
///
/// Used both for quad destinations and for source rectangles inside an atlas
/// image.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    #[inline]
    pub fn min(self) -> Vec2 {
        self.origin
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.origin.x + self.size.x, self.origin.y + self.size.y)
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.origin.is_finite() && self.size.is_finite()
    }

    /// `[u0, v0, u1, v1]` of this rectangle inside a `sheet_w x sheet_h` image.
    ///
    /// No clamping: a rectangle hanging off the sheet yields UVs outside
    /// `[0, 1]`, which a repeating sampler wraps.
    #[inline]
    pub fn uvs_in(self, sheet_w: f32, sheet_h: f32) -> [f32; 4] {
        let (lo, hi) = (self.min(), self.max());
        [lo.x / sheet_w, lo.y / sheet_h, hi.x / sheet_w, hi.y / sheet_h]
    }

    /// Quad corners in strip order: top-left, top-right, bottom-left, bottom-right.
    ///
    /// This is the vertex order the compositor writes for every quad; the
    /// shared index pattern `[0, 1, 2, 2, 1, 3]` turns it into two triangles.
    #[inline]
    pub fn corners(self) -> [Vec2; 4] {
        let (lo, hi) = (self.min(), self.max());
        [
            lo,
            Vec2::new(hi.x, lo.y),
            Vec2::new(lo.x, hi.y),
            hi,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_follow_strip_order() {
        let c = Rect::new(2.0, 3.0, 10.0, 20.0).corners();
        assert_eq!(c, [
            Vec2::new(2.0, 3.0),
            Vec2::new(12.0, 3.0),
            Vec2::new(2.0, 23.0),
            Vec2::new(12.0, 23.0),
        ]);
    }

    #[test]
    fn uvs_are_relative_to_the_sheet() {
        assert_eq!(Rect::new(16.0, 0.0, 16.0, 8.0).uvs_in(64.0, 16.0), [0.25, 0.0, 0.5, 0.5]);
        assert_eq!(Rect::new(0.0, 0.0, 8.0, 8.0).uvs_in(4.0, 4.0), [0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn non_finite_parts_are_detected() {
        assert!(Rect::new(0.0, 0.0, 1.0, 1.0).is_finite());
        assert!(!Rect::new(f32::NAN, 0.0, 1.0, 1.0).is_finite());
        assert!(!Rect::new(0.0, 0.0, f32::INFINITY, 1.0).is_finite());
    }
}
