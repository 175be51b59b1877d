//! Color-independent text line localization.

use image::{GrayImage, RgbImage};
use log::debug;
use serde::{Deserialize, Serialize};

use super::dedup;
use super::extremal::{extremal_regions, ExtremalRegion};
use crate::config::{TextConfig, TextProfile};
use crate::geometry::Rect;

/// Which geometric filter to apply to proposals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextKind {
    /// Any single line of text
    General,
    /// Short progress labels
    Label,
    /// Whole leaf-item rows
    Row,
}

/// Regions whose `y` values cluster together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLine {
    pub bounds: Rect,
    pub region_count: usize,
}

fn fits(profile: &TextProfile, region: &ExtremalRegion) -> bool {
    let b = region.bounds;
    let aspect = b.aspect_ratio();
    region.points >= profile.min_points
        && b.height > profile.min_height
        && b.height < profile.max_height
        && aspect > profile.min_aspect
        && aspect < profile.max_aspect
        && b.width > profile.min_width
}

pub struct TextRegionLocator<'a> {
    config: &'a TextConfig,
}

impl<'a> TextRegionLocator<'a> {
    pub fn new(config: &'a TextConfig) -> Self {
        Self { config }
    }

    pub fn profile(&self, kind: TextKind) -> &TextProfile {
        match kind {
            TextKind::General => &self.config.general,
            TextKind::Label => &self.config.label,
            TextKind::Row => &self.config.row,
        }
    }

    /// Unfiltered stable-region proposals.
    pub fn proposals(&self, gray: &GrayImage) -> Vec<ExtremalRegion> {
        extremal_regions(
            gray,
            self.config.level_step,
            self.config.max_variation,
            self.config.max_area_fraction,
        )
    }

    /// Rectangles likely to bound one line of text, top to bottom, with
    /// overlapping proposals merged.
    pub fn locate(&self, image: &RgbImage, kind: TextKind) -> Vec<Rect> {
        let gray = image::imageops::grayscale(image);
        let profile = self.profile(kind);

        let proposals = self.proposals(&gray);
        let mut candidates: Vec<Rect> = proposals
            .iter()
            .filter(|r| fits(profile, r))
            .map(|r| r.bounds)
            .collect();
        candidates.sort_by_key(|r| r.y);

        let kept = candidates.len();
        let regions = dedup::by_overlap(candidates);
        debug!(
            "{:?} text: {} proposals, {} fit, {} after merge",
            kind,
            proposals.len(),
            kept,
            regions.len()
        );
        regions
    }

    /// Like [`locate`](Self::locate) on a sub-rectangle, with results in
    /// full-image coordinates.
    pub fn locate_in(&self, image: &RgbImage, area: Rect, kind: TextKind) -> Vec<Rect> {
        let Some(area) = area.clamp_to(image.width(), image.height()) else {
            return Vec::new();
        };
        let sub = image::imageops::crop_imm(image, area.x, area.y, area.width, area.height).to_image();
        self.locate(&sub, kind)
            .into_iter()
            .map(|r| r.offset(area.x, area.y))
            .collect()
    }

    /// Clusters regions whose consecutive `y` values are within
    /// `line_tolerance` of each other.
    pub fn group_lines(&self, regions: &[Rect]) -> Vec<TextLine> {
        let mut sorted = regions.to_vec();
        sorted.sort_by_key(|r| (r.y, r.x));

        let mut lines: Vec<TextLine> = Vec::new();
        let mut last_y: Option<u32> = None;
        for rect in sorted {
            match (lines.last_mut(), last_y) {
                (Some(line), Some(prev)) if rect.y - prev < self.config.line_tolerance => {
                    line.bounds = line.bounds.union(&rect);
                    line.region_count += 1;
                }
                _ => lines.push(TextLine {
                    bounds: rect,
                    region_count: 1,
                }),
            }
            last_y = Some(rect.y);
        }
        lines
    }
}
