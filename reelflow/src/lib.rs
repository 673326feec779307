//! # Reelflow
//!
//! A step-driven pipeline engine that turns live API data into short videos
//! and thumbnails.
//!
//! A run loads a declarative step definition, walks it through a fixed,
//! ordered table of stages (fetch, transform, store, images, thumbnail,
//! audio, sequence) and finally applies an output retention policy:
//!
//! - **Path resolution and templating**: `{a|b|0}` placeholders resolved
//!   against run data, keeping native types for single-placeholder patterns
//! - **Run-scoped data context**: configuration overrides, fetched payloads
//!   and a private workspace per run
//! - **Type-keyed dispatch**: blueprint nodes select their handler through
//!   immutable registries built once
//! - **Retention**: keep-N pruning or fixed-name slot rotation of finished
//!   outputs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reelflow::prelude::*;
//! use std::sync::Arc;
//!
//! let stages = StageTableBuilder::standard()
//!     .attach("Apis", Arc::new(FetchWeather::new()))?
//!     .attach("Sequence", Arc::new(AssembleVideo::new()))?
//!     .build()?;
//! let resources = Arc::new(FsResourceStore::new(ResourceConfig::from_env()));
//!
//! let mut pipeline = Pipeline::for_step("weather", run_config, Arc::new(stages), resources);
//! if pipeline.start().await {
//!     println!("video at {:?}", pipeline.outputs().video);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod errors;
pub mod observability;
pub mod pattern;
pub mod pipeline;
pub mod resources;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::StepData;
    pub use crate::errors::{
        raise_step_error, ReelflowError, StageKind, StepCause, StepError, StepKeyError,
        StepTypeError,
    };
    pub use crate::observability::{init_logging, LogFormat, LoggingConfig};
    pub use crate::pattern::StepPatternFormatter;
    pub use crate::pipeline::{CompletionNotifier, Pipeline, PipelineState, RetentionPolicy};
    pub use crate::resources::{FsResourceStore, ResourceConfig, ResourceKind, ResourceStore};
    pub use crate::stages::{
        Canvas, CanvasFactory, FnStage, ImageStage, Stage, StageTable, StageTableBuilder,
    };
    pub use crate::utils::{generate_run_id, iso_timestamp, Timestamp};
}
