//! Image detectors: color regions, separator lines and text lines.
//!
//! Every detector is a pure function of the image and its thresholds, so
//! [`detect_all`] runs them side by side on the rayon pool.

pub mod color;
pub mod dedup;
pub mod extremal;
pub mod lines;
pub mod text;

pub use color::{ColorRegion, ColorRegionDetector};
pub use lines::{LineSegmentation, LineSegmenter, RowBand};
pub use text::{TextKind, TextLine, TextRegionLocator};

use image::RgbImage;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ColorClass, ColorConfig, RecognizerConfig};
use crate::geometry::Rect;

/// Share of image pixels falling inside one color class.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCoverage {
    pub class: ColorClass,
    pub fraction: f32,
}

/// Everything the hierarchy pass needs from the detectors.
#[derive(Clone, Debug, Default)]
pub struct Detections {
    pub top_level: Vec<ColorRegion>,
    pub lines: LineSegmentation,
    pub text_rows: Vec<Rect>,
    pub coverage: Vec<ClassCoverage>,
}

/// Mask coverage of every configured class.
pub fn class_coverage(image: &RgbImage, config: &ColorConfig) -> Vec<ClassCoverage> {
    config
        .classes
        .par_iter()
        .map(|spec| ClassCoverage {
            class: spec.class,
            fraction: ColorRegionDetector::new(spec).mask_coverage(image),
        })
        .collect()
}

/// Runs the color, line and text detectors concurrently.
pub fn detect_all(image: &RgbImage, config: &RecognizerConfig) -> Detections {
    let top_spec = config.color.top_level_spec();

    let ((top_level, coverage), (lines, text_rows)) = rayon::join(
        || {
            rayon::join(
                || ColorRegionDetector::new(&top_spec).detect(image),
                || class_coverage(image, &config.color),
            )
        },
        || {
            rayon::join(
                || LineSegmenter::new(&config.lines).segment(image),
                || TextRegionLocator::new(&config.text).locate(image, TextKind::Row),
            )
        },
    );

    info!(
        "Detected {} top-level regions, {} separators, {} text rows",
        top_level.len(),
        lines.boundaries.len(),
        text_rows.len()
    );

    Detections {
        top_level,
        lines,
        text_rows,
        coverage,
    }
}
