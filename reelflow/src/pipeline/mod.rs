//! Pipeline execution.
//!
//! This module provides:
//! - The run state machine
//! - The pipeline controller that drives a step definition through the
//!   stage table
//! - Output retention applied after a successful run
//! - Best-effort completion notification

mod controller;
mod notify;
mod retention;
mod state;

pub use controller::Pipeline;
pub use notify::CompletionNotifier;
#[cfg(feature = "http-notifier")]
pub use notify::HttpNotifier;
pub use retention::{
    prune_keep_count, rotate_fixed_names, store_outputs, OutputDirectory, OutputFiles, RetentionPolicy,
};
pub use state::PipelineState;
