//! Stable extremal regions (MSER-style proposals).
//!
//! The gray image is thresholded at evenly spaced levels for both
//! polarities. A connected component is a proposal when its area barely
//! grows by the next level, i.e. its border has strong contrast.

use std::collections::HashSet;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::geometry::Rect;

/// One stable component: its bounding box and pixel count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExtremalRegion {
    pub bounds: Rect,
    pub points: u32,
}

#[derive(Clone, Copy, Debug)]
struct ComponentStats {
    area: u32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    seed: (u32, u32),
}

type Labels = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Component labels at `level` plus per-label stats, indexed by label.
fn label_level(gray: &GrayImage, level: u8) -> (Labels, Vec<Option<ComponentStats>>) {
    let mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] <= level {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    let mut stats: Vec<Option<ComponentStats>> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if label >= stats.len() {
            stats.resize(label + 1, None);
        }
        let entry = &mut stats[label];
        if let Some(s) = entry {
            s.area += 1;
            s.min_x = s.min_x.min(x);
            s.min_y = s.min_y.min(y);
            s.max_x = s.max_x.max(x);
            s.max_y = s.max_y.max(y);
        } else {
            *entry = Some(ComponentStats {
                area: 1,
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
                seed: (x, y),
            });
        }
    }
    (labels, stats)
}

fn levels(step: u8) -> Vec<u8> {
    let step = step.max(1) as u32;
    (1..)
        .map(|i| i * step)
        .take_while(|&level| level <= 255)
        .map(|level| level as u8)
        .collect()
}

/// Stable regions of `gray`, dark-on-light and light-on-dark.
///
/// Regions covering more than `max_area_fraction` of the image are dropped.
/// Output is sorted top to bottom and contains no repeated boxes.
pub fn extremal_regions(
    gray: &GrayImage,
    level_step: u8,
    max_variation: f32,
    max_area_fraction: f32,
) -> Vec<ExtremalRegion> {
    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return Vec::new();
    }
    let max_area = (total as f64 * max_area_fraction as f64) as u64;

    let mut inverted = gray.clone();
    image::imageops::invert(&mut inverted);

    let levels = levels(level_step);
    let mut seen = HashSet::new();
    let mut regions = Vec::new();

    for source in [gray, &inverted] {
        let Some((&first, rest)) = levels.split_first() else {
            continue;
        };
        let mut current = label_level(source, first);

        for &level in rest {
            let next = label_level(source, level);
            for stats in current.1.iter().flatten() {
                if stats.area as u64 > max_area {
                    continue;
                }
                let (sx, sy) = stats.seed;
                let next_label = next.0.get_pixel(sx, sy)[0] as usize;
                let grown = next
                    .1
                    .get(next_label)
                    .copied()
                    .flatten()
                    .map_or(stats.area, |s| s.area);
                let variation = (grown - stats.area) as f32 / stats.area as f32;
                if variation > max_variation {
                    continue;
                }
                let region = ExtremalRegion {
                    bounds: Rect::from_corners(stats.min_x, stats.min_y, stats.max_x, stats.max_y),
                    points: stats.area,
                };
                if seen.insert(region) {
                    regions.push(region);
                }
            }
            current = next;
        }
    }

    regions.sort_by_key(|r| (r.bounds.y, r.bounds.x, r.bounds.width, r.bounds.height, r.points));
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect as DrawRect;

    #[test]
    fn test_levels_stay_in_range() {
        assert_eq!(levels(64), vec![64, 128, 192]);
        assert_eq!(levels(8).last(), Some(&248));
        assert_eq!(levels(255), vec![255]);
    }

    #[test]
    fn test_dark_block_is_stable() {
        let mut gray = GrayImage::from_pixel(200, 100, Luma([255]));
        draw_filled_rect_mut(&mut gray, DrawRect::at(20, 30).of_size(80, 20), Luma([10]));
        let regions = extremal_regions(&gray, 8, 0.25, 0.25);
        assert_eq!(
            regions,
            vec![ExtremalRegion {
                bounds: Rect::new(20, 30, 80, 20).unwrap(),
                points: 1600,
            }]
        );
    }

    #[test]
    fn test_light_on_dark_found() {
        let mut gray = GrayImage::from_pixel(200, 100, Luma([20]));
        draw_filled_rect_mut(&mut gray, DrawRect::at(50, 40).of_size(60, 18), Luma([240]));
        let regions = extremal_regions(&gray, 8, 0.25, 0.25);
        assert!(regions.iter().any(|r| r.bounds == Rect::new(50, 40, 60, 18).unwrap()));
    }

    #[test]
    fn test_gradient_is_unstable() {
        // Every level adds a new column, so nothing is stable
        let gray = GrayImage::from_fn(64, 10, |x, _| Luma([(x * 4) as u8]));
        assert!(extremal_regions(&gray, 4, 0.01, 0.9).is_empty());
    }

    #[test]
    fn test_uniform_image_has_no_regions() {
        let gray = GrayImage::from_pixel(50, 50, Luma([128]));
        assert!(extremal_regions(&gray, 8, 0.25, 0.25).is_empty());
        assert!(extremal_regions(&GrayImage::new(0, 0), 8, 0.25, 0.25).is_empty());
    }
}
