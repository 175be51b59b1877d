//! Inference progress for one image, and cooperative cancellation.
//!
//! The stages run strictly in order: Raw → TopLevelDetected →
//! BandsAssigned → SlotsEstimated → (Labeled) → ReportReady.

use log::info;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How much structure is known so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InferenceStage {
    /// Nothing inferred yet (initial state)
    Raw,
    /// Top-level regions located
    TopLevelDetected,
    /// Each top-level region owns a vertical band
    BandsAssigned,
    /// Bands divided into leaf slots
    SlotsEstimated,
    /// Label pass finished (possibly cancelled part-way)
    Labeled,
    /// Report assembled (terminal)
    ReportReady,
}

impl std::fmt::Display for InferenceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceStage::Raw => write!(f, "Raw"),
            InferenceStage::TopLevelDetected => write!(f, "Top-level detected"),
            InferenceStage::BandsAssigned => write!(f, "Bands assigned"),
            InferenceStage::SlotsEstimated => write!(f, "Slots estimated"),
            InferenceStage::Labeled => write!(f, "Labeled"),
            InferenceStage::ReportReady => write!(f, "Report ready"),
        }
    }
}

/// How bands are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum InferenceMode {
    /// One band below each detected top-level region
    Detected,
    /// Content height split into `regions` equal bands, regardless of
    /// what was detected
    ForcedEqualSplit { regions: u32 },
}

impl std::fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceMode::Detected => write!(f, "detected"),
            InferenceMode::ForcedEqualSplit { regions } => {
                write!(f, "forced equal split ({} regions)", regions)
            }
        }
    }
}

/// Shared flag asking the inferencer to stop issuing OCR calls.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tracks the current stage and logs every transition.
#[derive(Debug)]
pub struct StageTracker {
    stage: InferenceStage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            stage: InferenceStage::Raw,
        }
    }
}

impl StageTracker {
    pub fn current(&self) -> InferenceStage {
        self.stage
    }

    /// Moves forward to `next`. Stages never move backwards.
    pub fn advance(&mut self, next: InferenceStage) {
        debug_assert!(next > self.stage, "{} -> {}", self.stage, next);
        if next > self.stage {
            info!("Inference: {} -> {}", self.stage, next);
            self.stage = next;
        }
    }
}
