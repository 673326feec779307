//! Timestamp helpers.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// The default strftime pattern for timestamps embedded in file names.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// # Examples
///
/// ```
/// use reelflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats `ts` in local time with a strftime `format`.
///
/// Returns `None` if the format contains an invalid specifier.
#[must_use]
pub fn format_local(ts: &Timestamp, format: &str) -> Option<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(ts.with_timezone(&Local).format_with_items(items.into_iter()).to_string())
}

/// Returns the current local time formatted for use in file names.
///
/// An invalid `format` falls back to [`DEFAULT_TIME_FORMAT`].
#[must_use]
pub fn file_timestamp(format: &str) -> String {
    let now = now_utc();
    format_local(&now, format)
        .or_else(|| format_local(&now, DEFAULT_TIME_FORMAT))
        .unwrap_or_default()
}

/// Seconds between two timestamps, rounded to hundredths.
#[must_use]
pub fn elapsed_secs(start: &Timestamp, end: &Timestamp) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let millis = (*end - *start).num_milliseconds() as f64;
    (millis / 10.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_local() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        assert_eq!(format_local(&ts, "%Y").as_deref(), Some("2024"));
        assert_eq!(format_local(&ts, "%Q"), None);
    }

    #[test]
    fn test_file_timestamp_falls_back() {
        let text = file_timestamp("%Q");
        assert_eq!(text.len(), "2024-01-05_12-00-00".len());
        assert!(!file_timestamp(DEFAULT_TIME_FORMAT).contains(':'));
    }

    #[test]
    fn test_elapsed_secs() {
        let start = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        let end = start + Duration::milliseconds(2_345);
        assert!((elapsed_secs(&start, &end) - 2.35).abs() < 1e-9);
    }
}
