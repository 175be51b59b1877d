use anyhow::Result;
use image::RgbImage;
use log::{debug, warn};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;

use super::preprocess::{self, PreparedRegion};
use super::{OcrEngine, OcrOutput, OcrRequest, OcrToken};
use crate::config::LabelConfig;
use crate::geometry::Rect;

/// Characters every progress label is made of, besides the unit
const LABEL_ALPHABET: &str = "0123456789./";

/// How much the OCR engine trusted the text a label was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Buckets a 0-100 engine score. Without a score the text was still
    /// confirmed by the pattern, so it counts as high.
    pub fn from_score(score: Option<f32>) -> Self {
        match score {
            None => Confidence::High,
            Some(s) if s >= 80.0 => Confidence::High,
            Some(s) if s >= 50.0 => Confidence::Medium,
            Some(_) => Confidence::Low,
        }
    }
}

/// A parsed `completed/total` progress pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    completed: f64,
    total: f64,
    is_incomplete: bool,
    raw_text: String,
    confidence: Confidence,
}

impl Label {
    /// Returns `None` unless both values are finite, non-negative and
    /// `total > 0`.
    pub fn new(completed: f64, total: f64, raw_text: impl Into<String>, confidence: Confidence) -> Option<Self> {
        if !completed.is_finite() || !total.is_finite() || completed < 0.0 || total <= 0.0 {
            return None;
        }
        Some(Self {
            completed,
            total,
            is_incomplete: completed < total,
            raw_text: raw_text.into(),
            confidence,
        })
    }

    pub fn completed(&self) -> f64 {
        self.completed
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn is_incomplete(&self) -> bool {
        self.is_incomplete
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }
}

/// A label with the image-space box of the text line it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct LocatedLabel {
    pub label: Label,
    pub bounds: Rect,
}

/// Folds full-width digits and punctuation to ASCII and drops whitespace
/// next to CJK characters, which Tesseract inserts between glyphs.
pub fn normalize_text(text: &str) -> String {
    let folded: Vec<char> = text
        .chars()
        .map(|c| match c {
            '\u{FF10}'..='\u{FF19}' | '\u{FF0E}' | '\u{FF0F}' => {
                char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
            }
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect();

    let mut out = String::with_capacity(text.len());
    for (i, &c) in folded.iter().enumerate() {
        if c.is_whitespace() && c != '\n' {
            let prev = folded[..i].iter().rev().find(|c| !c.is_whitespace());
            let next = folded[i + 1..].iter().find(|c| !c.is_whitespace());
            let touches_wide = |c: Option<&char>| c.is_some_and(|c| !c.is_ascii());
            if touches_wide(prev) || touches_wide(next) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Builds the label pattern for `unit`.
pub fn label_pattern(unit: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(
        r"(\d+\.?\d*)\s*/\s*(\d+\.?\d*)\s*{}",
        regex::escape(unit)
    ))?)
}

fn label_from_captures(caps: &Captures, confidence: Option<f32>) -> Option<Label> {
    let raw = caps.get(0)?.as_str();
    let (Ok(completed), Ok(total)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) else {
        debug!("Skipping unparseable label {:?}", raw);
        return None;
    };
    let label = Label::new(completed, total, raw, Confidence::from_score(confidence));
    if label.is_none() {
        debug!("Skipping invalid label {:?}", raw);
    }
    label
}

/// Every valid label in `text`. Matches with unparseable or invalid
/// numbers are skipped; the rest of the text is still scanned.
pub fn parse_labels(pattern: &Regex, text: &str, confidence: Option<f32>) -> Vec<Label> {
    let normalized = normalize_text(text);
    pattern
        .captures_iter(&normalized)
        .filter_map(|caps| label_from_captures(&caps, confidence))
        .collect()
}

/// Normalized word texts joined by spaces, with the byte span and
/// confidence of every word.
struct TokenText {
    text: String,
    spans: Vec<(usize, usize, f32)>,
}

impl TokenText {
    fn new(tokens: &[&OcrToken]) -> Self {
        let mut text = String::new();
        let mut spans = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !text.is_empty() {
                text.push(' ');
            }
            let start = text.len();
            text.push_str(&normalize_text(&token.text));
            spans.push((start, text.len(), token.confidence));
        }
        Self { text, spans }
    }

    /// Lowest confidence among the words overlapping `start..end`.
    fn confidence_of(&self, start: usize, end: usize) -> Option<f32> {
        self.spans
            .iter()
            .filter(|(s, e, _)| *s < end && start < *e)
            .map(|(_, _, c)| *c)
            .reduce(f32::min)
    }
}

/// Groups tokens by OCR line, in line order, with the union of their boxes.
fn token_lines(tokens: &[OcrToken]) -> Vec<(Vec<&OcrToken>, Rect)> {
    let mut lines: BTreeMap<u32, Vec<&OcrToken>> = BTreeMap::new();
    for token in tokens {
        lines.entry(token.line).or_default().push(token);
    }
    lines
        .into_values()
        .filter_map(|words| {
            let first = words.first()?;
            let bounds = words.iter().skip(1).fold(first.bounds, |acc, w| acc.union(&w.bounds));
            Some((words, bounds))
        })
        .collect()
}

/// Reads progress labels from image regions through an optional OCR engine.
pub struct LabelExtractor<'a> {
    config: &'a LabelConfig,
    engine: Option<&'a dyn OcrEngine>,
    pattern: Regex,
}

impl<'a> LabelExtractor<'a> {
    pub fn new(config: &'a LabelConfig, engine: Option<&'a dyn OcrEngine>) -> Result<Self> {
        Ok(Self {
            config,
            engine,
            pattern: label_pattern(&config.unit)?,
        })
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    fn request(&self, single_line: bool) -> OcrRequest {
        OcrRequest {
            alphabet: self
                .config
                .restrict_alphabet
                .then(|| format!("{}{}", LABEL_ALPHABET, self.config.unit)),
            single_line,
        }
    }

    fn passes_gate(&self, confidence: Option<f32>, text: &str) -> bool {
        match confidence {
            Some(c) if c <= self.config.min_confidence => {
                debug!("Rejecting {:?}: confidence {:.1}", text, c);
                false
            }
            _ => true,
        }
    }

    /// Labels in the words' text, each gated and bucketed by the lowest
    /// confidence among the words its match spans.
    fn labels_from_tokens(&self, tokens: &[&OcrToken]) -> Vec<Label> {
        let joined = TokenText::new(tokens);
        self.pattern
            .captures_iter(&joined.text)
            .filter_map(|caps| {
                let matched = caps.get(0)?;
                let confidence = joined.confidence_of(matched.start(), matched.end());
                if !self.passes_gate(confidence, matched.as_str()) {
                    return None;
                }
                label_from_captures(&caps, confidence)
            })
            .collect()
    }

    /// Preprocesses `rect` and runs the engine. `None` means no labels can
    /// come out of this region.
    fn recognize(&self, image: &RgbImage, rect: Rect, single_line: bool) -> Option<(PreparedRegion, OcrOutput)> {
        let engine = self.engine?;
        let prepared = if single_line {
            preprocess::prepare(image, rect, self.config)?
        } else {
            preprocess::prepare_block(image, rect, self.config)?
        };
        match engine.recognize(&prepared.image, &self.request(single_line)) {
            Ok(output) => {
                debug!(
                    "OCR {:?}: {:?} (mean confidence {:?})",
                    rect,
                    output.text,
                    output.mean_confidence()
                );
                Some((prepared, output))
            }
            Err(e) => {
                warn!("OCR failed for {:?}: {:#}", rect, e);
                None
            }
        }
    }

    /// Single-line mode: labels found anywhere in the region's text.
    pub fn extract(&self, image: &RgbImage, rect: Rect) -> Vec<Label> {
        let Some((_, output)) = self.recognize(image, rect, true) else {
            return Vec::new();
        };
        match &output.tokens {
            Some(tokens) => self.labels_from_tokens(&tokens.iter().collect::<Vec<_>>()),
            None => parse_labels(&self.pattern, &output.text, None),
        }
    }

    /// Block mode: labels with the source-image box of their text line.
    /// Without word boxes every label is attributed to the whole region.
    pub fn extract_located(&self, image: &RgbImage, rect: Rect) -> Vec<LocatedLabel> {
        let Some((prepared, output)) = self.recognize(image, rect, false) else {
            return Vec::new();
        };

        match &output.tokens {
            Some(tokens) => token_lines(tokens)
                .into_iter()
                .flat_map(|(words, bounds)| {
                    let bounds = prepared.to_image_rect(bounds);
                    self.labels_from_tokens(&words)
                        .into_iter()
                        .map(move |label| LocatedLabel { label, bounds })
                })
                .collect(),
            None => output
                .text
                .lines()
                .flat_map(|line| parse_labels(&self.pattern, line, None))
                .map(|label| LocatedLabel {
                    label,
                    bounds: prepared.origin,
                })
                .collect(),
        }
    }
}
