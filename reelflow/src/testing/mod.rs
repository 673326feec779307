//! Testing utilities for reelflow pipelines.
//!
//! This module provides:
//! - Stage doubles that record, fail or panic
//! - A stage that produces a video and thumbnail in the run workspace
//! - A canvas factory that records draw calls instead of rendering

mod canvas;
mod mocks;

pub use canvas::{CanvasOp, RecordingCanvas, RecordingCanvasFactory};
pub use mocks::{ArtifactStage, FailingStage, PanickingStage, RecordedExecution, RecordingStage};
