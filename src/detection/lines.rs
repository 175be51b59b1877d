//! Horizontal separator detection and row-band partitioning.

use std::collections::VecDeque;

use image::{GrayImage, RgbImage};
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::LineConfig;

/// Hough candidates further than this from horizontal are ignored (degrees)
const MAX_TILT_DEGREES: u32 = 10;

/// A contiguous vertical slice of the image, `y_start..y_end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowBand {
    pub y_start: u32,
    pub y_end: u32,
}

impl RowBand {
    pub fn new(y_start: u32, y_end: u32) -> Option<Self> {
        (y_end > y_start).then_some(Self { y_start, y_end })
    }

    pub fn height(&self) -> u32 {
        self.y_end - self.y_start
    }

    pub fn contains_y(&self, y: u32) -> bool {
        y >= self.y_start && y < self.y_end
    }
}

/// A near-horizontal edge segment recovered from a Hough candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HorizontalSegment {
    pub x_start: u32,
    pub y_start: u32,
    pub x_end: u32,
    pub y_end: u32,
}

impl HorizontalSegment {
    pub fn length(&self) -> u32 {
        self.x_end - self.x_start + 1
    }

    /// Representative row of the segment.
    pub fn y(&self) -> u32 {
        (self.y_start + self.y_end) / 2
    }
}

/// Separator rows and the bands they delimit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineSegmentation {
    pub boundaries: Vec<u32>,
    pub bands: Vec<RowBand>,
}

impl LineSegmentation {
    /// Number of separators strictly inside `band`.
    pub fn separators_within(&self, band: &RowBand) -> usize {
        self.boundaries
            .iter()
            .filter(|&&y| y > band.y_start && y < band.y_end)
            .count()
    }
}

/// Running max (or min) over a centered window of `k` pixels.
/// Out-of-image positions are ignored, which matches neutral padding.
fn sliding_extreme(row: &[u8], k: usize, keep_max: bool) -> Vec<u8> {
    let before = k / 2;
    let after = k.saturating_sub(1) - before;
    let mut out = Vec::with_capacity(row.len());
    let mut window: VecDeque<usize> = VecDeque::new();
    let mut next = 0;

    for i in 0..row.len() {
        let right = (i + after).min(row.len() - 1);
        while next <= right {
            while let Some(&j) = window.back() {
                let dominated = if keep_max {
                    row[next] >= row[j]
                } else {
                    row[next] <= row[j]
                };
                if !dominated {
                    break;
                }
                window.pop_back();
            }
            window.push_back(next);
            next += 1;
        }
        while window.front().is_some_and(|&j| j + before < i) {
            window.pop_front();
        }
        out.push(window.front().map_or(row[i], |&j| row[j]));
    }
    out
}

/// Morphological closing with a `k`x1 horizontal element.
///
/// Dark runs shorter than `k` (text, icons) are filled in while long
/// horizontal rules survive.
pub fn close_horizontal(gray: &GrayImage, k: u32) -> GrayImage {
    let k = k.max(1) as usize;
    let width = gray.width() as usize;
    let mut out = GrayImage::new(gray.width(), gray.height());
    if width == 0 {
        return out;
    }
    for (src, dst) in gray
        .as_raw()
        .chunks_exact(width)
        .zip(out.chunks_exact_mut(width))
    {
        let dilated = sliding_extreme(src, k, true);
        let closed = sliding_extreme(&dilated, k, false);
        dst.copy_from_slice(&closed);
    }
    out
}

/// Collapses boundaries closer than `tolerance` to the last kept one.
/// Any two outputs are at least `tolerance` apart.
pub fn merge_boundaries(mut ys: Vec<u32>, tolerance: u32) -> Vec<u32> {
    ys.sort_unstable();
    let mut kept: Vec<u32> = Vec::with_capacity(ys.len());
    for y in ys {
        match kept.last() {
            Some(&last) if y - last < tolerance => {}
            _ => kept.push(y),
        }
    }
    kept
}

/// Splits `0..height` at `boundaries`, dropping bands shorter than
/// `min_band_height`. No boundaries means one band over the whole image.
pub fn bands_from_boundaries(boundaries: &[u32], height: u32, min_band_height: u32) -> Vec<RowBand> {
    if boundaries.is_empty() {
        return RowBand::new(0, height).into_iter().collect();
    }

    let mut edges = Vec::with_capacity(boundaries.len() + 2);
    edges.push(0);
    edges.extend(boundaries.iter().copied().filter(|&y| y > 0 && y < height));
    edges.push(height);

    edges
        .windows(2)
        .filter_map(|pair| RowBand::new(pair[0], pair[1]))
        .filter(|band| band.height() >= min_band_height)
        .collect()
}

/// Finds near-horizontal separators and the row bands between them.
pub struct LineSegmenter<'a> {
    config: &'a LineConfig,
}

impl<'a> LineSegmenter<'a> {
    pub fn new(config: &'a LineConfig) -> Self {
        Self { config }
    }

    fn min_length(&self, width: u32) -> u32 {
        ((width as f32 * self.config.min_length_fraction) as u32).max(1)
    }

    /// Edge map of the horizontally closed intensity image.
    pub fn edge_map(&self, image: &RgbImage) -> GrayImage {
        let gray = image::imageops::grayscale(image);
        let closed = close_horizontal(&gray, image.width() / 2);
        canny(&closed, self.config.canny_low, self.config.canny_high)
    }

    /// Walks one polar line across the edge map, splitting it wherever more
    /// than `max_gap` pixels in a row carry no edge.
    fn walk(&self, edges: &GrayImage, line: &PolarLine) -> Vec<HorizontalSegment> {
        let (width, height) = edges.dimensions();
        let theta = (line.angle_in_degrees as f32).to_radians();
        let (sin, cos) = theta.sin_cos();
        if sin.abs() < f32::EPSILON {
            return Vec::new();
        }

        let row_at = |x: u32| -> Option<u32> {
            let y = ((line.r - x as f32 * cos) / sin).round();
            (y >= 0.0 && y < height as f32).then_some(y as u32)
        };
        let edge_near = |x: u32, y: u32| -> bool {
            (y.saturating_sub(1)..=(y + 1).min(height - 1)).any(|yy| edges.get_pixel(x, yy)[0] > 0)
        };

        let min_length = self.min_length(width);
        let mut segments = Vec::new();
        let mut run: Option<(u32, u32, u32, u32)> = None; // (x0, y0, x1, y1)
        let mut gap = 0;

        for x in 0..width {
            let hit = row_at(x).filter(|&y| edge_near(x, y));
            match (hit, run.as_mut()) {
                (Some(y), Some(current)) => {
                    current.2 = x;
                    current.3 = y;
                    gap = 0;
                }
                (Some(y), None) => {
                    run = Some((x, y, x, y));
                    gap = 0;
                }
                (None, Some(_)) => {
                    gap += 1;
                    if gap > self.config.max_gap {
                        if let Some((x0, y0, x1, y1)) = run.take() {
                            segments.push(HorizontalSegment { x_start: x0, y_start: y0, x_end: x1, y_end: y1 });
                        }
                    }
                }
                (None, None) => {}
            }
        }
        if let Some((x0, y0, x1, y1)) = run {
            segments.push(HorizontalSegment { x_start: x0, y_start: y0, x_end: x1, y_end: y1 });
        }

        segments.retain(|s| s.length() >= min_length);
        segments
    }

    /// Near-horizontal separator segments, sorted top to bottom.
    pub fn segments(&self, image: &RgbImage) -> Vec<HorizontalSegment> {
        if image.width() == 0 || image.height() == 0 {
            return Vec::new();
        }
        let edges = self.edge_map(image);
        let options = LineDetectionOptions {
            vote_threshold: self.config.vote_threshold,
            suppression_radius: self.config.suppression_radius,
        };

        let mut segments: Vec<HorizontalSegment> = detect_lines(&edges, options)
            .iter()
            .filter(|line| line.angle_in_degrees.abs_diff(90) <= MAX_TILT_DEGREES)
            .flat_map(|line| self.walk(&edges, line))
            .filter(|s| s.y_start.abs_diff(s.y_end) < self.config.max_slope_px)
            .collect();

        segments.sort_by_key(|s| s.y());
        debug!("{} near-horizontal segments", segments.len());
        segments
    }

    /// Deduplicated separator rows, top to bottom.
    pub fn boundaries(&self, image: &RgbImage) -> Vec<u32> {
        let ys = self.segments(image).iter().map(HorizontalSegment::y).collect();
        merge_boundaries(ys, self.config.merge_tolerance)
    }

    /// Separators plus the row bands they delimit.
    pub fn segment(&self, image: &RgbImage) -> LineSegmentation {
        let boundaries = self.boundaries(image);
        let bands = bands_from_boundaries(&boundaries, image.height(), self.config.min_band_height);
        debug!(
            "{} separators, {} row bands",
            boundaries.len(),
            bands.len()
        );
        LineSegmentation { boundaries, bands }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect as DrawRect;

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
    }

    fn rule(img: &mut RgbImage, y: i32) {
        let width = img.width();
        draw_filled_rect_mut(img, DrawRect::at(0, y).of_size(width, 2), Rgb([40, 40, 40]));
    }

    #[test]
    fn test_blank_image_is_one_band() {
        let config = LineConfig::default();
        let result = LineSegmenter::new(&config).segment(&blank(400, 600));
        assert!(result.boundaries.is_empty());
        assert_eq!(result.bands, vec![RowBand { y_start: 0, y_end: 600 }]);
    }

    #[test]
    fn test_full_width_rules_split_bands() {
        let mut img = blank(400, 600);
        rule(&mut img, 200);
        rule(&mut img, 400);

        let config = LineConfig::default();
        let result = LineSegmenter::new(&config).segment(&img);

        assert_eq!(result.boundaries.len(), 2, "{:?}", result.boundaries);
        assert!(result.boundaries[0].abs_diff(200) <= 4);
        assert!(result.boundaries[1].abs_diff(400) <= 4);
        assert_eq!(result.bands.len(), 3);
        assert_eq!(result.bands[0].y_start, 0);
        assert_eq!(result.bands[2].y_end, 600);
    }

    #[test]
    fn test_short_marks_are_not_separators() {
        let mut img = blank(600, 400);
        // Text-like blocks well under half the width
        for x in [20, 150, 280] {
            draw_filled_rect_mut(&mut img, DrawRect::at(x, 180).of_size(60, 20), Rgb([0, 0, 0]));
        }
        let config = LineConfig::default();
        assert!(LineSegmenter::new(&config).boundaries(&img).is_empty());
    }

    #[test]
    fn test_merge_keeps_first_within_tolerance() {
        assert_eq!(merge_boundaries(vec![105, 100, 300, 309, 320], 10), vec![100, 300, 320]);
    }

    #[test]
    fn test_merge_law_close_pairs_never_both_survive() {
        let input = vec![10, 14, 19, 23, 50, 58, 61, 90];
        let out = merge_boundaries(input.clone(), 10);
        for (i, a) in input.iter().enumerate() {
            for b in input.iter().skip(i + 1) {
                if a.abs_diff(*b) < 10 {
                    assert!(!(out.contains(a) && out.contains(b)), "{} and {} both kept", a, b);
                }
            }
        }
    }

    #[test]
    fn test_short_bands_dropped() {
        let bands = bands_from_boundaries(&[20, 200, 210], 400, 30);
        assert_eq!(
            bands,
            vec![
                RowBand { y_start: 20, y_end: 200 },
                RowBand { y_start: 210, y_end: 400 },
            ]
        );
    }

    #[test]
    fn test_close_horizontal_removes_short_dark_runs_only() {
        let mut rule = GrayImage::from_pixel(20, 1, Luma([255]));
        for x in 2..18 {
            rule.put_pixel(x, 0, Luma([0]));
        }
        assert_eq!(close_horizontal(&rule, 5), rule);

        let mut text = GrayImage::from_pixel(20, 1, Luma([255]));
        text.put_pixel(5, 0, Luma([0]));
        text.put_pixel(6, 0, Luma([0]));
        let closed = close_horizontal(&text, 5);
        assert!(closed.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_separators_within_band() {
        let seg = LineSegmentation {
            boundaries: vec![100, 250, 400],
            bands: Vec::new(),
        };
        assert_eq!(seg.separators_within(&RowBand { y_start: 50, y_end: 300 }), 2);
        assert_eq!(seg.separators_within(&RowBand { y_start: 100, y_end: 250 }), 0);
    }
}
