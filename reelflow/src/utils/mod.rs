//! Utility functions for run ids and timestamps.

mod ids;
pub mod timestamps;

pub use ids::generate_run_id;
pub use timestamps::{
    elapsed_secs, file_timestamp, format_local, iso_timestamp, now_utc, Timestamp, DEFAULT_TIME_FORMAT,
};
