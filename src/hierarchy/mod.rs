//! Two-level structure inference on top of the detectors.

pub mod inferencer;
pub mod state;

pub use inferencer::{assign_bands, estimate_slots, split_equal, HierarchyInferencer, ParentBand};
pub use state::{CancelFlag, InferenceMode, InferenceStage};
