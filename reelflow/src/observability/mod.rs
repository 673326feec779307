//! Logging setup and timing helpers.

mod logging;
mod timer;

pub use logging::{init_logging, LogFormat, LoggingConfig, DEFAULT_FILTER};
pub use timer::StageTimer;
