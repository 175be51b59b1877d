//! OCR collaborator and progress-label extraction.
//!
//! Recognition is abstracted behind [`OcrEngine`] so the pipeline runs the
//! same way with the Tesseract backend, a stub, or no engine at all.

pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod setup;

pub use engine::TesseractEngine;
pub use extract::{Confidence, Label, LabelExtractor, LocatedLabel};

use anyhow::Result;
use image::GrayImage;

use crate::geometry::Rect;

/// What to ask the engine for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OcrRequest {
    /// Restrict recognition to these characters
    pub alphabet: Option<String>,
    /// Treat the image as one text line instead of a block
    pub single_line: bool,
}

/// One recognized word with its box in the submitted image.
#[derive(Clone, Debug, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub bounds: Rect,
    /// 0-100
    pub confidence: f32,
    /// Index of the text line the word belongs to, in reading order
    pub line: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    /// Word-level data, when the engine provides it
    pub tokens: Option<Vec<OcrToken>>,
}

impl OcrOutput {
    /// Plain text without word-level data.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: None,
        }
    }

    /// Mean word confidence, or `None` when no word data is available.
    pub fn mean_confidence(&self) -> Option<f32> {
        let tokens = self.tokens.as_ref()?;
        if tokens.is_empty() {
            return None;
        }
        Some(tokens.iter().map(|t| t.confidence).sum::<f32>() / tokens.len() as f32)
    }
}

/// An external text recognizer.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &GrayImage, request: &OcrRequest) -> Result<OcrOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(confidence: f32) -> OcrToken {
        OcrToken {
            text: "x".to_string(),
            bounds: Rect::new(0, 0, 1, 1).unwrap(),
            confidence,
            line: 0,
        }
    }

    #[test]
    fn test_mean_confidence() {
        assert_eq!(OcrOutput::text_only("abc").mean_confidence(), None);

        let empty = OcrOutput {
            text: String::new(),
            tokens: Some(Vec::new()),
        };
        assert_eq!(empty.mean_confidence(), None);

        let out = OcrOutput {
            text: "x x".to_string(),
            tokens: Some(vec![token(80.0), token(40.0)]),
        };
        assert_eq!(out.mean_confidence(), Some(60.0));
    }
}
