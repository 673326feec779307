//! The step-addressing sublanguage.
//!
//! This module provides:
//! - Key-path resolution and insertion into nested JSON data
//! - `{path}` template formatting that keeps native types for bare placeholders

mod formatter;
pub mod path;

pub use formatter::{display_value, StepPatternFormatter};
pub use path::{get, get_layered, get_with, insert, insert_with, remove, remove_with, KeyPath, Segment, DEFAULT_DELIMITER};
