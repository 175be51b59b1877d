//! Recognizer configuration.
//!
//! Every threshold the pipeline uses lives here, grouped per component.
//! Settings load from `config.json`; missing fields take their defaults, and
//! an unreadable or invalid file falls back to the full default set.

use anyhow::{ensure, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Named hue class a detected region belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorClass {
    /// Red expander buttons of the top-level menu
    Accent,
    /// Orange buttons along the bottom bar
    Secondary,
    /// Blue links and hints
    Link,
    /// Green status markers
    Success,
}

/// Inclusive HSV bounds on the 8-bit scale (H 0-180, S and V 0-255).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }
}

/// Center-distance tolerance used when merging near-duplicate regions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub x: u32,
    pub y: u32,
}

/// Thresholds for one color class.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColorClassSpec {
    pub class: ColorClass,
    /// One range, or two when the hue wraps around zero
    pub ranges: Vec<HsvRange>,
    /// Minimum traced contour area in px²
    pub min_area: f64,
    pub min_width: u32,
    pub min_height: u32,
    pub dedup_tolerance: Tolerance,
    /// Keep only regions whose center lies right of this fraction of the width
    #[serde(default)]
    pub min_center_x_fraction: Option<f32>,
}

impl ColorClassSpec {
    /// Built-in thresholds for each class.
    pub fn preset(class: ColorClass) -> Self {
        match class {
            ColorClass::Accent => Self {
                class,
                ranges: vec![
                    HsvRange::new([0, 100, 100], [10, 255, 255]),
                    HsvRange::new([160, 100, 100], [180, 255, 255]),
                ],
                min_area: 500.0,
                min_width: 30,
                min_height: 30,
                dedup_tolerance: Tolerance { x: 30, y: 30 },
                min_center_x_fraction: None,
            },
            ColorClass::Secondary => Self {
                class,
                ranges: vec![HsvRange::new([10, 100, 100], [25, 255, 255])],
                min_area: 200.0,
                min_width: 20,
                min_height: 20,
                dedup_tolerance: Tolerance { x: 30, y: 30 },
                min_center_x_fraction: None,
            },
            ColorClass::Link => Self {
                class,
                ranges: vec![HsvRange::new([85, 100, 100], [125, 255, 255])],
                min_area: 200.0,
                min_width: 20,
                min_height: 20,
                dedup_tolerance: Tolerance { x: 20, y: 20 },
                min_center_x_fraction: None,
            },
            ColorClass::Success => Self {
                class,
                ranges: vec![HsvRange::new([40, 50, 50], [80, 255, 255])],
                min_area: 200.0,
                min_width: 30,
                min_height: 20,
                dedup_tolerance: Tolerance { x: 20, y: 20 },
                min_center_x_fraction: None,
            },
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            matches!(self.ranges.len(), 1 | 2),
            "{:?}: expected one or two HSV ranges, got {}",
            self.class,
            self.ranges.len()
        );
        for range in &self.ranges {
            ensure!(
                (0..3).all(|i| range.lower[i] <= range.upper[i]),
                "{:?}: HSV lower bound exceeds upper bound",
                self.class
            );
        }
        if let Some(fraction) = self.min_center_x_fraction {
            ensure!(
                (0.0..=1.0).contains(&fraction),
                "{:?}: min_center_x_fraction must be within 0..=1",
                self.class
            );
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Class whose regions become the top-level menu entries
    pub top_level_class: ColorClass,
    /// All classes known to the detector (also used for coverage stats)
    pub classes: Vec<ColorClassSpec>,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            top_level_class: ColorClass::Accent,
            classes: [
                ColorClass::Accent,
                ColorClass::Secondary,
                ColorClass::Link,
                ColorClass::Success,
            ]
            .into_iter()
            .map(ColorClassSpec::preset)
            .collect(),
        }
    }
}

impl ColorConfig {
    /// Thresholds for `class`, falling back to the preset when not configured.
    pub fn spec_for(&self, class: ColorClass) -> ColorClassSpec {
        self.classes
            .iter()
            .find(|spec| spec.class == class)
            .cloned()
            .unwrap_or_else(|| ColorClassSpec::preset(class))
    }

    pub fn top_level_spec(&self) -> ColorClassSpec {
        self.spec_for(self.top_level_class)
    }
}

/// Separator-line detection parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum Hough accumulator votes for a candidate line
    pub vote_threshold: u32,
    pub suppression_radius: u32,
    /// Minimum segment length as a fraction of image width
    pub min_length_fraction: f32,
    /// Largest gap bridged inside one segment (px)
    pub max_gap: u32,
    /// Endpoints must differ in y by less than this (px)
    pub max_slope_px: u32,
    /// Boundaries closer than this collapse into the first (px)
    pub merge_tolerance: u32,
    /// Bands shorter than this are noise (px)
    pub min_band_height: u32,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            vote_threshold: 100,
            suppression_radius: 8,
            min_length_fraction: 1.0 / 3.0,
            max_gap: 20,
            max_slope_px: 5,
            merge_tolerance: 10,
            min_band_height: 30,
        }
    }
}

/// Geometric filter for one kind of text proposal. Bounds are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextProfile {
    pub min_height: u32,
    pub max_height: u32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub min_width: u32,
    /// Proposals with fewer pixels than this are noise
    pub min_points: u32,
}

impl TextProfile {
    /// Any single line of rendered text.
    pub fn general() -> Self {
        Self {
            min_height: 15,
            max_height: 60,
            min_aspect: 2.0,
            max_aspect: 20.0,
            min_width: 0,
            min_points: 10,
        }
    }

    /// Progress labels such as `0.5/2.0学时`.
    pub fn label() -> Self {
        Self {
            min_height: 15,
            max_height: 25,
            min_aspect: 2.0,
            max_aspect: 20.0,
            min_width: 80,
            min_points: 10,
        }
    }

    /// Whole leaf-item rows (title plus label).
    pub fn row() -> Self {
        Self {
            min_height: 30,
            max_height: 70,
            min_aspect: 2.0,
            max_aspect: 60.0,
            min_width: 200,
            min_points: 20,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Gray-level step between extremal-region thresholds
    pub level_step: u8,
    /// Maximum relative area growth to the next level for a stable region
    pub max_variation: f32,
    /// Regions larger than this fraction of the image are background
    pub max_area_fraction: f32,
    pub general: TextProfile,
    pub label: TextProfile,
    pub row: TextProfile,
    /// Consecutive regions within this y distance share a line (px)
    pub line_tolerance: u32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            level_step: 8,
            max_variation: 0.25,
            max_area_fraction: 0.25,
            general: TextProfile::general(),
            label: TextProfile::label(),
            row: TextProfile::row(),
            line_tolerance: 20,
        }
    }
}

/// Label preprocessing and parsing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Unit token that terminates a progress fraction
    pub unit: String,
    /// Text height after rescaling (px)
    pub target_height: u32,
    pub clahe_clip_limit: f32,
    /// CLAHE grid size along each axis
    pub clahe_tiles: u32,
    /// Median filter radius for denoising
    pub denoise_radius: u32,
    /// Tokens at or below this OCR confidence (0-100) are rejected
    pub min_confidence: f32,
    /// Restrict the OCR alphabet to digits, '.', '/', and the unit
    pub restrict_alphabet: bool,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            unit: "学时".to_string(),
            target_height: 40,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            denoise_radius: 1,
            min_confidence: 30.0,
            restrict_alphabet: true,
        }
    }
}

/// Tesseract invocation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub language: String,
    /// Per-call timeout (milliseconds)
    pub timeout_ms: u64,
    /// Explicit executable path, skipping discovery
    pub executable: Option<PathBuf>,
    /// Explicit tessdata directory, skipping discovery
    pub tessdata_dir: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "chi_sim".to_string(),
            timeout_ms: 10_000,
            executable: None,
            tessdata_dir: None,
        }
    }
}

/// Where labels are read from during inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelScope {
    /// Estimate structure only
    None,
    /// One single-line OCR call per slot
    PerSlot,
    /// One block OCR call per band, labels assigned to slots by position
    PerBand,
}

/// Horizontal span OCR'd for per-slot labels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpan {
    pub x: u32,
    pub width: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Gap between a top-level region and its band edges (px)
    pub margin: u32,
    /// Space reserved at the image bottom for the persistent toolbar (px)
    pub bottom_margin: u32,
    /// Header space skipped at the top of each band (px)
    pub header_padding: u32,
    /// Estimated height of one leaf item (px)
    pub item_height: u32,
    /// X coordinate of leaf click points
    pub click_x: u32,
    pub label_scope: LabelScope,
    /// Span OCR'd per slot; full width when unset
    pub label_column: Option<ColumnSpan>,
    /// First content row for forced equal splitting (px)
    pub content_top: u32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            margin: 5,
            bottom_margin: 100,
            header_padding: 30,
            item_height: 55,
            click_x: 200,
            label_scope: LabelScope::PerSlot,
            label_column: None,
            content_top: 200,
        }
    }
}

/// Complete recognizer configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub color: ColorConfig,
    pub lines: LineConfig,
    pub text: TextConfig,
    pub label: LabelConfig,
    pub ocr: OcrConfig,
    pub hierarchy: HierarchyConfig,
}

impl RecognizerConfig {
    /// Checks values that would make a component misbehave.
    pub fn validate(&self) -> Result<()> {
        for spec in &self.color.classes {
            spec.validate()?;
        }
        ensure!(self.text.level_step > 0, "text.level_step must be positive");
        ensure!(
            self.text.max_variation >= 0.0,
            "text.max_variation must be non-negative"
        );
        ensure!(
            self.lines.min_length_fraction > 0.0 && self.lines.min_length_fraction <= 1.0,
            "lines.min_length_fraction must be within (0, 1]"
        );
        ensure!(self.label.target_height > 0, "label.target_height must be positive");
        ensure!(!self.label.unit.is_empty(), "label.unit must not be empty");
        ensure!(self.label.clahe_tiles > 0, "label.clahe_tiles must be positive");
        ensure!(
            self.hierarchy.item_height > 0,
            "hierarchy.item_height must be positive"
        );
        Ok(())
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads config from file, or returns defaults if it is missing or invalid.
    pub fn load(config_path: &Path) -> Self {
        if !config_path.exists() {
            info!(
                "{} not found. Using default config.",
                config_path.display()
            );
            return Self::default();
        }

        match fs::read_to_string(config_path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!("Config loaded from {}", config_path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to load {}: {:#}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Writes the default config to file (for reference).
    pub fn save_default(config_path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&Self::default())?;
        fs::write(config_path, json)
            .with_context(|| format!("Failed to write {}", config_path.display()))
    }
}
