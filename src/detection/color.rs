//! Color-class region detection.
//!
//! Thresholds the image in HSV space, cleans the mask with a 3x3 closing and
//! opening, and turns each outer contour into a candidate rectangle.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::point::Point as ContourPoint;
use log::debug;
use palette::{FromColor, Hsv, Srgb};
use serde::{Deserialize, Serialize};

use super::dedup::{self, Region};
use crate::config::{ColorClass, ColorClassSpec};
use crate::geometry::Rect;

/// A colored region found in the image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorRegion {
    pub rect: Rect,
    /// Area enclosed by the traced contour, used for filtering and ranking
    pub area_px: f64,
    pub color_class: ColorClass,
}

impl Region for ColorRegion {
    fn bounds(&self) -> Rect {
        self.rect
    }

    fn score(&self) -> Option<f64> {
        Some(self.area_px)
    }
}

/// Converts a pixel to HSV on the 8-bit scale (H 0-180, S and V 0-255).
pub fn to_hsv8(pixel: &Rgb<u8>) -> [u8; 3] {
    let rgb = Srgb::new(pixel[0], pixel[1], pixel[2]).into_format::<f32>();
    let hsv: Hsv = Hsv::from_color(rgb);
    let h = (hsv.hue.into_positive_degrees() / 2.0).round().clamp(0.0, 180.0);
    let s = (hsv.saturation * 255.0).round().clamp(0.0, 255.0);
    let v = (hsv.value * 255.0).round().clamp(0.0, 255.0);
    [h as u8, s as u8, v as u8]
}

/// Area enclosed by a closed contour (shoelace formula).
fn contour_area(points: &[ContourPoint<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

fn bounding_rect(points: &[ContourPoint<i32>]) -> Option<Rect> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Rect::from_corners(
        min_x as u32,
        min_y as u32,
        max_x as u32,
        max_y as u32,
    ))
}

/// Detects regions of one color class.
pub struct ColorRegionDetector<'a> {
    spec: &'a ColorClassSpec,
}

impl<'a> ColorRegionDetector<'a> {
    pub fn new(spec: &'a ColorClassSpec) -> Self {
        Self { spec }
    }

    pub fn class(&self) -> ColorClass {
        self.spec.class
    }

    /// True when the pixel falls inside any configured HSV range.
    pub fn matches(&self, pixel: &Rgb<u8>) -> bool {
        let hsv = to_hsv8(pixel);
        self.spec.ranges.iter().any(|range| range.contains(hsv))
    }

    /// Raw binary mask (255 = in class), before morphology.
    pub fn mask(&self, image: &RgbImage) -> GrayImage {
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            if self.matches(image.get_pixel(x, y)) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// Fraction of image pixels that fall inside the class.
    pub fn mask_coverage(&self, image: &RgbImage) -> f32 {
        let total = image.width() as u64 * image.height() as u64;
        if total == 0 {
            return 0.0;
        }
        let hits = image.pixels().filter(|p| self.matches(p)).count() as u64;
        hits as f32 / total as f32
    }

    /// Finds, filters, sorts, and deduplicates regions of this class.
    pub fn detect(&self, image: &RgbImage) -> Vec<ColorRegion> {
        if image.width() == 0 || image.height() == 0 {
            return Vec::new();
        }

        let mask = self.mask(image);
        let closed = morphology::close(&mask, Norm::LInf, 1);
        let cleaned = morphology::open(&closed, Norm::LInf, 1);

        let min_center_x = self
            .spec
            .min_center_x_fraction
            .map(|f| (image.width() as f32 * f) as u32);

        let mut candidates: Vec<ColorRegion> = find_contours::<i32>(&cleaned)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| {
                let rect = bounding_rect(&c.points)?;
                let area_px = contour_area(&c.points);
                if area_px < self.spec.min_area
                    || rect.width < self.spec.min_width
                    || rect.height < self.spec.min_height
                {
                    return None;
                }
                if let Some(min_x) = min_center_x {
                    if rect.center().x <= min_x {
                        return None;
                    }
                }
                Some(ColorRegion {
                    rect,
                    area_px,
                    color_class: self.spec.class,
                })
            })
            .collect();

        candidates.sort_by_key(|r| r.rect.y);
        let found = candidates.len();
        let regions = dedup::by_center(candidates, self.spec.dedup_tolerance);

        debug!(
            "{:?}: {} candidates, {} after dedup",
            self.spec.class,
            found,
            regions.len()
        );

        regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColorClassSpec, HsvRange};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect as DrawRect;

    const RED: Rgb<u8> = Rgb([230, 30, 30]);
    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn canvas(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, WHITE)
    }

    fn fill(img: &mut RgbImage, x: i32, y: i32, w: u32, h: u32, color: Rgb<u8>) {
        draw_filled_rect_mut(img, DrawRect::at(x, y).of_size(w, h), color);
    }

    fn accent() -> ColorClassSpec {
        ColorClassSpec::preset(ColorClass::Accent)
    }

    #[test]
    fn test_to_hsv8_primary_colors() {
        assert_eq!(to_hsv8(&Rgb([255, 0, 0])), [0, 255, 255]);
        assert_eq!(to_hsv8(&Rgb([0, 255, 0])), [60, 255, 255]);
        assert_eq!(to_hsv8(&Rgb([0, 0, 255])), [120, 255, 255]);
        assert_eq!(to_hsv8(&Rgb([255, 255, 255]))[1], 0);
    }

    #[test]
    fn test_four_accent_buttons_in_reading_order() {
        let mut img = canvas(866, 2056);
        for y in [950, 200, 700, 450] {
            fill(&mut img, 600, y, 200, 50, RED);
        }

        let spec = accent();
        let regions = ColorRegionDetector::new(&spec).detect(&img);

        assert_eq!(regions.len(), 4);
        let ys: Vec<u32> = regions.iter().map(|r| r.rect.y).collect();
        assert_eq!(ys, vec![200, 450, 700, 950]);
        for r in &regions {
            assert_eq!((r.rect.x, r.rect.width, r.rect.height), (600, 200, 50));
            assert_eq!(r.color_class, ColorClass::Accent);
            assert!(r.area_px <= r.rect.area() as f64);
            assert!(r.area_px > 500.0);
        }
    }

    #[test]
    fn test_wrapped_hue_detected() {
        // Hue ~342 degrees lands in the upper red range only
        let mut img = canvas(300, 200);
        fill(&mut img, 50, 50, 100, 60, Rgb([200, 0, 60]));
        let spec = accent();
        let regions = ColorRegionDetector::new(&spec).detect(&img);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect, Rect::new(50, 50, 100, 60).unwrap());
    }

    #[test]
    fn test_small_and_speckle_regions_dropped() {
        let mut img = canvas(400, 300);
        fill(&mut img, 10, 10, 2, 2, RED); // speckle, removed by opening
        fill(&mut img, 100, 100, 20, 20, RED); // below min area and size
        fill(&mut img, 200, 50, 120, 10, RED); // too short
        let spec = accent();
        assert!(ColorRegionDetector::new(&spec).detect(&img).is_empty());
    }

    #[test]
    fn test_blank_image_yields_nothing() {
        let img = canvas(200, 200);
        let spec = accent();
        let detector = ColorRegionDetector::new(&spec);
        assert!(detector.detect(&img).is_empty());
        assert_eq!(detector.mask_coverage(&img), 0.0);
    }

    #[test]
    fn test_other_classes_ignored() {
        let mut img = canvas(300, 300);
        fill(&mut img, 50, 50, 100, 60, Rgb([30, 60, 220]));
        let spec = accent();
        assert!(ColorRegionDetector::new(&spec).detect(&img).is_empty());

        let link = ColorClassSpec::preset(ColorClass::Link);
        let regions = ColorRegionDetector::new(&link).detect(&img);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].color_class, ColorClass::Link);
    }

    #[test]
    fn test_nearby_duplicates_keep_larger() {
        let mut img = canvas(400, 300);
        // Two blobs whose centers are 60px apart; the wider one survives
        fill(&mut img, 100, 100, 40, 40, RED);
        fill(&mut img, 145, 100, 70, 40, RED);
        let mut spec = accent();
        spec.dedup_tolerance.x = 80;
        let regions = ColorRegionDetector::new(&spec).detect(&img);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect.x, 145);
    }

    #[test]
    fn test_min_center_x_fraction_keeps_right_side() {
        let mut img = canvas(1000, 400);
        fill(&mut img, 50, 100, 80, 40, RED);
        fill(&mut img, 800, 200, 80, 40, RED);
        let mut spec = accent();
        spec.min_center_x_fraction = Some(0.6);
        let regions = ColorRegionDetector::new(&spec).detect(&img);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect.x, 800);
    }

    #[test]
    fn test_region_pixels_cover_contour_fraction() {
        let mut img = canvas(500, 400);
        fill(&mut img, 40, 40, 120, 60, RED);
        fill(&mut img, 300, 200, 80, 80, Rgb([250, 10, 10]));
        // A notched region: bounding box larger than the colored area
        fill(&mut img, 100, 250, 100, 40, RED);
        fill(&mut img, 100, 290, 40, 40, RED);

        let spec = ColorClassSpec {
            ranges: vec![
                HsvRange::new([0, 100, 100], [10, 255, 255]),
                HsvRange::new([160, 100, 100], [180, 255, 255]),
            ],
            ..accent()
        };
        let detector = ColorRegionDetector::new(&spec);
        let regions = detector.detect(&img);
        assert_eq!(regions.len(), 3);

        for region in &regions {
            let r = region.rect;
            let mut inside = 0u64;
            for y in r.y..r.bottom() {
                for x in r.x..r.right() {
                    if detector.matches(img.get_pixel(x, y)) {
                        inside += 1;
                    }
                }
            }
            let coverage = inside as f64 / r.area() as f64;
            assert!(coverage >= region.area_px / r.area() as f64);
        }
    }

    #[test]
    fn test_contour_area_of_square() {
        let pts = vec![
            ContourPoint::new(0, 0),
            ContourPoint::new(10, 0),
            ContourPoint::new(10, 10),
            ContourPoint::new(0, 10),
        ];
        assert_eq!(contour_area(&pts), 100.0);
        assert_eq!(contour_area(&pts[..2]), 0.0);
    }
}
