//! Pixel-space rectangles and points shared by every detector.

use serde::{Deserialize, Serialize};

/// A point in image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in image pixel coordinates.
///
/// `width` and `height` are always positive for rectangles produced by the
/// detectors; `Rect::new` returns `None` for empty extents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Builds a rectangle from inclusive min/max corners.
    pub fn from_corners(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x.saturating_sub(min_x) + 1,
            height: max_y.saturating_sub(min_y) + 1,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Center point using integer division, `(x + w/2, y + h/2)`.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// True when both axis projections share at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }

    /// Clips the rectangle to a `width` x `height` image.
    /// Returns `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        let x = self.x.min(width);
        let y = self.y.min(height);
        let right = self.right().min(width);
        let bottom = self.bottom().min(height);
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Moves the rectangle by a non-negative offset.
    pub fn offset(&self, dx: u32, dy: u32) -> Rect {
        Rect {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_rejects_empty() {
        assert!(Rect::new(0, 0, 0, 10).is_none());
        assert!(Rect::new(0, 0, 10, 0).is_none());
        assert!(Rect::new(5, 5, 1, 1).is_some());
    }

    #[test]
    fn test_center_and_area() {
        let r = Rect::new(10, 20, 30, 50).unwrap();
        assert_eq!(r.center(), Point::new(25, 45));
        assert_eq!(r.area(), 1500);
        assert_eq!(r.right(), 40);
        assert_eq!(r.bottom(), 70);
    }

    #[test]
    fn test_intersects_requires_shared_pixels() {
        let a = Rect::new(0, 0, 10, 10).unwrap();
        let touching = Rect::new(10, 0, 10, 10).unwrap();
        let overlapping = Rect::new(9, 9, 5, 5).unwrap();
        assert!(!a.intersects(&touching));
        assert!(a.intersects(&overlapping));
        assert!(overlapping.intersects(&a));
    }

    #[test]
    fn test_union_covers_both() {
        let a = Rect::new(0, 10, 10, 10).unwrap();
        let b = Rect::new(5, 0, 20, 5).unwrap();
        let u = a.union(&b);
        assert_eq!(u, Rect::new(0, 0, 25, 20).unwrap());
    }

    #[test]
    fn test_clamp_to_image() {
        let r = Rect::new(90, 90, 50, 50).unwrap();
        assert_eq!(r.clamp_to(100, 100), Rect::new(90, 90, 10, 10));
        assert_eq!(r.clamp_to(80, 80), None);
    }

    #[test]
    fn test_from_corners_is_inclusive() {
        let r = Rect::from_corners(2, 3, 4, 3);
        assert_eq!((r.width, r.height), (3, 1));
    }
}
