use anyhow::Result;
use image::RgbImage;
use log::{debug, info, warn};

use super::state::{CancelFlag, InferenceMode, InferenceStage, StageTracker};
use crate::config::{HierarchyConfig, LabelScope, RecognizerConfig};
use crate::detection::{self, ColorRegion, Detections, RowBand, TextRegionLocator};
use crate::geometry::{Point, Rect};
use crate::ocr::{LabelExtractor, OcrEngine};
use crate::report::{
    ImageSize, LabelSummary, LeafSlot, SlotEvidence, StructureReport, SubRegion, TopLevelRegion,
};

/// A band attributed to one parent id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParentBand {
    pub parent_id: u32,
    pub band: RowBand,
}

/// Bands below each detected region: from its bottom edge to the next
/// region's top (or the bottom margin). Degenerate bands are skipped.
pub fn assign_bands(regions: &[ColorRegion], height: u32, config: &HierarchyConfig) -> Vec<ParentBand> {
    regions
        .iter()
        .enumerate()
        .filter_map(|(i, region)| {
            let start = region.rect.bottom() + config.margin;
            let end = match regions.get(i + 1) {
                Some(next) => next.rect.y.saturating_sub(config.margin),
                None => height.saturating_sub(config.bottom_margin),
            };
            let parent_id = i as u32 + 1;
            let band = RowBand::new(start, end);
            if band.is_none() {
                debug!("Parent {}: degenerate band {}..{}, skipped", parent_id, start, end);
            }
            band.map(|band| ParentBand { parent_id, band })
        })
        .collect()
}

/// `regions` equal bands between `content_top` and the bottom margin.
/// Parent ids are the band ordinals `1..=regions`.
pub fn split_equal(height: u32, regions: u32, config: &HierarchyConfig) -> Vec<ParentBand> {
    let top = config.content_top;
    let bottom = height.saturating_sub(config.bottom_margin);
    if regions == 0 || bottom <= top {
        return Vec::new();
    }
    let band_height = (bottom - top) / regions;
    (0..regions)
        .filter_map(|i| {
            let start = top + i * band_height;
            RowBand::new(start, start + band_height).map(|band| ParentBand {
                parent_id: i + 1,
                band,
            })
        })
        .collect()
}

/// Fixed-height slots below the band header; a partial last slot is dropped.
pub fn estimate_slots(parent: &ParentBand, width: u32, config: &HierarchyConfig) -> Vec<LeafSlot> {
    let usable = parent.band.height().saturating_sub(config.header_padding);
    let count = usable / config.item_height.max(1);
    let first_top = parent.band.y_start + config.header_padding;

    (0..count)
        .filter_map(|k| {
            let top = first_top + k * config.item_height;
            let bounds = Rect::new(0, top, width, config.item_height)?;
            Some(LeafSlot {
                parent_id: parent.parent_id,
                index: k + 1,
                click_point: Point::new(config.click_x, top + config.item_height / 2),
                bounds,
                evidence: SlotEvidence::Estimated,
                label: None,
            })
        })
        .collect()
}

fn slot_span(slot: &LeafSlot) -> RowBand {
    RowBand {
        y_start: slot.bounds.y,
        y_end: slot.bounds.bottom(),
    }
}

/// Composes the detectors into a two-level structure report.
pub struct HierarchyInferencer<'a> {
    config: &'a RecognizerConfig,
    engine: Option<&'a dyn OcrEngine>,
    cancel: CancelFlag,
    tracker: StageTracker,
}

impl<'a> HierarchyInferencer<'a> {
    pub fn new(config: &'a RecognizerConfig, engine: Option<&'a dyn OcrEngine>) -> Self {
        Self {
            config,
            engine,
            cancel: CancelFlag::new(),
            tracker: StageTracker::default(),
        }
    }

    /// Uses `flag` to stop the label pass early.
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub fn stage(&self) -> InferenceStage {
        self.tracker.current()
    }

    /// Runs every detector, then infers the structure.
    pub fn infer(&mut self, image: &RgbImage, mode: InferenceMode) -> Result<StructureReport> {
        let detections = detection::detect_all(image, self.config);
        self.infer_from(image, mode, detections)
    }

    /// Infers the structure from detector output computed elsewhere.
    pub fn infer_from(
        &mut self,
        image: &RgbImage,
        mode: InferenceMode,
        detections: Detections,
    ) -> Result<StructureReport> {
        let config: &'a RecognizerConfig = self.config;
        let hierarchy = &config.hierarchy;
        let (width, height) = image.dimensions();
        self.tracker = StageTracker::default();

        let top_level: Vec<TopLevelRegion> = detections
            .top_level
            .iter()
            .enumerate()
            .map(|(i, region)| TopLevelRegion {
                id: i as u32 + 1,
                rect: region.rect,
                click_point: region.rect.center(),
                color_class: region.color_class,
            })
            .collect();
        self.tracker.advance(InferenceStage::TopLevelDetected);

        let bands = match mode {
            InferenceMode::Detected => assign_bands(&detections.top_level, height, hierarchy),
            InferenceMode::ForcedEqualSplit { regions } => split_equal(height, regions, hierarchy),
        };
        info!(
            "{} top-level regions, {} bands ({})",
            top_level.len(),
            bands.len(),
            mode
        );
        self.tracker.advance(InferenceStage::BandsAssigned);

        let locator = TextRegionLocator::new(&config.text);
        let mut sub_regions = Vec::with_capacity(bands.len());
        let mut items: Vec<LeafSlot> = Vec::new();

        for parent in &bands {
            let mut slots = estimate_slots(parent, width, hierarchy);

            let rows_in_band: Vec<Rect> = detections
                .text_rows
                .iter()
                .filter(|r| parent.band.contains_y(r.center().y))
                .copied()
                .collect();
            for slot in &mut slots {
                let span = slot_span(slot);
                if rows_in_band.iter().any(|r| span.contains_y(r.center().y)) {
                    slot.evidence = SlotEvidence::TextDetected;
                }
            }

            sub_regions.push(SubRegion {
                parent_id: parent.parent_id,
                band_start: parent.band.y_start,
                band_end: parent.band.y_end,
                estimated_item_count: slots.len() as u32,
                detected_text_rows: locator.group_lines(&rows_in_band).len() as u32,
                separator_count: detections.lines.separators_within(&parent.band) as u32,
            });
            items.extend(slots);
        }
        self.tracker.advance(InferenceStage::SlotsEstimated);

        let summary = match hierarchy.label_scope {
            LabelScope::None => LabelSummary::from_items(&items, 0, false),
            scope => {
                let summary = self.label_items(image, scope, &bands, &mut items)?;
                self.tracker.advance(InferenceStage::Labeled);
                summary
            }
        };

        let report = StructureReport::new(
            ImageSize { width, height },
            mode,
            top_level,
            sub_regions,
            items,
            summary,
            detections.coverage,
        );
        self.tracker.advance(InferenceStage::ReportReady);
        Ok(report)
    }

    fn label_items(
        &self,
        image: &RgbImage,
        scope: LabelScope,
        bands: &[ParentBand],
        items: &mut [LeafSlot],
    ) -> Result<LabelSummary> {
        let extractor = LabelExtractor::new(&self.config.label, self.engine)?;
        let width = image.width();
        let mut attempted = 0;
        let mut cancelled = false;

        match scope {
            LabelScope::None => {}
            LabelScope::PerSlot => {
                let column = self.config.hierarchy.label_column;
                for slot in items.iter_mut() {
                    if self.cancel.is_cancelled() {
                        cancelled = true;
                        break;
                    }
                    let (x, w) = column.map_or((0, width), |c| (c.x, c.width));
                    let Some(rect) = Rect::new(x, slot.bounds.y, w, slot.bounds.height) else {
                        continue;
                    };
                    attempted += 1;
                    if let Some(label) = extractor.extract(image, rect).into_iter().next() {
                        slot.label = Some(label);
                        slot.evidence = SlotEvidence::OcrConfirmed;
                    }
                }
            }
            LabelScope::PerBand => {
                for parent in bands {
                    if self.cancel.is_cancelled() {
                        cancelled = true;
                        break;
                    }
                    let Some(rect) = Rect::new(0, parent.band.y_start, width, parent.band.height())
                    else {
                        continue;
                    };
                    attempted += 1;
                    for located in extractor.extract_located(image, rect) {
                        let center_y = located.bounds.center().y;
                        let target = items.iter_mut().find(|slot| {
                            slot.parent_id == parent.parent_id
                                && slot.label.is_none()
                                && slot_span(slot).contains_y(center_y)
                        });
                        match target {
                            Some(slot) => {
                                slot.label = Some(located.label);
                                slot.evidence = SlotEvidence::OcrConfirmed;
                            }
                            None => debug!(
                                "Label {:?} at y={} matches no open slot",
                                located.label.raw_text(),
                                center_y
                            ),
                        }
                    }
                }
            }
        }

        if cancelled {
            warn!("Label pass cancelled after {} OCR calls", attempted);
        }
        let summary = LabelSummary::from_items(items, attempted, cancelled);
        info!(
            "Labels: {} of {} slots, {} incomplete",
            summary.labeled,
            items.len(),
            summary.incomplete
        );
        Ok(summary)
    }
}
