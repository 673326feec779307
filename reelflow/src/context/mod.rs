//! Run-scoped data context.
//!
//! This module provides:
//! - The mutable data bag threaded through every stage of one run
//! - Strict and graceful key access plus template formatting
//! - `option`/`compare` branch evaluation for blueprint nodes

mod branch;
#[cfg(test)]
mod context_tests;
mod step_data;

pub use branch::{is_truthy, CompareOp};
pub use step_data::{StepData, CONFIG_KEY, PIPE_ID_KEY, REQUEST_KEY};
