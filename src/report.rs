//! The structure report handed to automation consumers.
//!
//! Built once per image by the hierarchy pass and read-only afterwards.
//! Serializes with camelCase keys.

use serde::Serialize;

use crate::config::ColorClass;
use crate::detection::ClassCoverage;
use crate::geometry::{Point, Rect};
use crate::hierarchy::InferenceMode;
use crate::ocr::Label;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// A color-flagged parent entry. `id` is 1-based in reading order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopLevelRegion {
    pub id: u32,
    pub rect: Rect,
    pub click_point: Point,
    pub color_class: ColorClass,
}

/// The band of one parent and what was found in it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRegion {
    /// Detected mode: the id of a top-level region. Forced equal split:
    /// the 1-based band ordinal, which need not match any detected region.
    pub parent_id: u32,
    pub band_start: u32,
    pub band_end: u32,
    pub estimated_item_count: u32,
    /// Text lines (row profile) found inside the band
    pub detected_text_rows: u32,
    /// Separator lines strictly inside the band
    pub separator_count: u32,
}

/// How a leaf slot is known to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotEvidence {
    /// Pure geometry
    Estimated,
    /// A text row lines up with the slot
    TextDetected,
    /// A label was read from the slot
    OcrConfirmed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafSlot {
    pub parent_id: u32,
    /// 1-based, top to bottom within the parent
    pub index: u32,
    pub click_point: Point,
    pub bounds: Rect,
    pub evidence: SlotEvidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

/// Outcome of the label pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSummary {
    /// Regions submitted to the extractor
    pub attempted: u32,
    pub labeled: u32,
    pub incomplete: u32,
    pub complete: u32,
    /// The pass stopped early on request
    pub cancelled: bool,
}

impl LabelSummary {
    pub fn from_items(items: &[LeafSlot], attempted: u32, cancelled: bool) -> Self {
        let labels = items.iter().filter_map(|item| item.label.as_ref());
        let (mut labeled, mut incomplete) = (0, 0);
        for label in labels {
            labeled += 1;
            if label.is_incomplete() {
                incomplete += 1;
            }
        }
        Self {
            attempted,
            labeled,
            incomplete,
            complete: labeled - incomplete,
            cancelled,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureReport {
    image: ImageSize,
    mode: InferenceMode,
    top_level_regions: Vec<TopLevelRegion>,
    sub_regions: Vec<SubRegion>,
    items: Vec<LeafSlot>,
    labels: LabelSummary,
    color_coverage: Vec<ClassCoverage>,
}

impl StructureReport {
    pub(crate) fn new(
        image: ImageSize,
        mode: InferenceMode,
        top_level_regions: Vec<TopLevelRegion>,
        sub_regions: Vec<SubRegion>,
        items: Vec<LeafSlot>,
        labels: LabelSummary,
        color_coverage: Vec<ClassCoverage>,
    ) -> Self {
        Self {
            image,
            mode,
            top_level_regions,
            sub_regions,
            items,
            labels,
            color_coverage,
        }
    }

    pub fn image(&self) -> ImageSize {
        self.image
    }

    pub fn mode(&self) -> InferenceMode {
        self.mode
    }

    pub fn top_level_regions(&self) -> &[TopLevelRegion] {
        &self.top_level_regions
    }

    pub fn sub_regions(&self) -> &[SubRegion] {
        &self.sub_regions
    }

    pub fn items(&self) -> &[LeafSlot] {
        &self.items
    }

    pub fn labels(&self) -> &LabelSummary {
        &self.labels
    }

    pub fn color_coverage(&self) -> &[ClassCoverage] {
        &self.color_coverage
    }

    /// The detected region behind a parent id, if there is one.
    pub fn parent(&self, id: u32) -> Option<&TopLevelRegion> {
        self.top_level_regions.iter().find(|region| region.id == id)
    }

    /// Items of one parent, top to bottom.
    pub fn items_of(&self, parent_id: u32) -> impl Iterator<Item = &LeafSlot> {
        self.items.iter().filter(move |item| item.parent_id == parent_id)
    }

    /// Items whose label says there is work left.
    pub fn incomplete_items(&self) -> impl Iterator<Item = &LeafSlot> {
        self.items
            .iter()
            .filter(|item| item.label.as_ref().is_some_and(Label::is_incomplete))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
