//! Key-path lookup and insertion into nested JSON values.
//!
//! A path is either a string whose segments are separated by a delimiter
//! (`|` by default) or an explicit list of [`Segment`]s. Purely numeric
//! segments address sequence elements; everything else is a mapping key.

use crate::errors::PathError;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// The default segment delimiter.
pub const DEFAULT_DELIMITER: char = '|';

/// One step of a key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A mapping key (or a numeric string, which also indexes sequences).
    Key(String),
    /// A sequence index (or the stringified key on a mapping).
    Index(usize),
}

impl Segment {
    /// Returns the segment as a mapping key.
    #[must_use]
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            Self::Key(key) => Cow::Borrowed(key),
            Self::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// Returns the segment as a sequence index, if it is numeric.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Key(key) if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) => key.parse().ok(),
            Self::Key(_) => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A key path, either delimited text or explicit segments.
#[derive(Debug, Clone, Copy)]
pub enum KeyPath<'a> {
    /// A delimiter-joined string such as `_req|weather|0|temp`.
    Str(&'a str),
    /// An explicit segment list.
    Segments(&'a [Segment]),
}

impl<'a> KeyPath<'a> {
    /// Splits the path into segments.
    ///
    /// A string without the delimiter is a single atomic key.
    #[must_use]
    pub fn segments(&self, delimiter: char) -> Vec<Segment> {
        match self {
            Self::Str(text) if text.contains(delimiter) => {
                text.split(delimiter).map(Segment::from).collect()
            }
            Self::Str(text) => vec![Segment::from(*text)],
            Self::Segments(segments) => segments.to_vec(),
        }
    }

    /// Renders the path for diagnostics.
    #[must_use]
    pub fn render(&self, delimiter: char) -> String {
        match self {
            Self::Str(text) => (*text).to_string(),
            Self::Segments(segments) => segments
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(&delimiter.to_string()),
        }
    }
}

impl<'a> From<&'a str> for KeyPath<'a> {
    fn from(text: &'a str) -> Self {
        Self::Str(text)
    }
}

impl<'a> From<&'a String> for KeyPath<'a> {
    fn from(text: &'a String) -> Self {
        Self::Str(text)
    }
}

impl<'a> From<&'a [Segment]> for KeyPath<'a> {
    fn from(segments: &'a [Segment]) -> Self {
        Self::Segments(segments)
    }
}

impl<'a> From<&'a Vec<Segment>> for KeyPath<'a> {
    fn from(segments: &'a Vec<Segment>) -> Self {
        Self::Segments(segments)
    }
}

fn step<'v>(current: &'v Value, segment: &Segment, path: &str) -> Result<&'v Value, PathError> {
    match current {
        Value::Object(map) => map.get(segment.as_key().as_ref()).ok_or_else(|| key_not_found(segment, path)),
        Value::Array(items) => {
            let index = segment.as_index().ok_or_else(|| key_not_found(segment, path))?;
            items.get(index).ok_or(PathError::IndexOutOfRange {
                index,
                len: items.len(),
                path: path.to_string(),
            })
        }
        _ => Err(PathError::NotAContainer {
            segment: segment.to_string(),
            path: path.to_string(),
        }),
    }
}

fn step_mut<'v>(current: &'v mut Value, segment: &Segment, path: &str) -> Result<&'v mut Value, PathError> {
    match current {
        Value::Object(map) => map
            .get_mut(segment.as_key().as_ref())
            .ok_or_else(|| key_not_found(segment, path)),
        Value::Array(items) => {
            let index = segment.as_index().ok_or_else(|| key_not_found(segment, path))?;
            let len = items.len();
            items.get_mut(index).ok_or(PathError::IndexOutOfRange {
                index,
                len,
                path: path.to_string(),
            })
        }
        _ => Err(PathError::NotAContainer {
            segment: segment.to_string(),
            path: path.to_string(),
        }),
    }
}

fn key_not_found(segment: &Segment, path: &str) -> PathError {
    PathError::KeyNotFound {
        segment: segment.to_string(),
        path: path.to_string(),
    }
}

/// Resolves `path` against `root` using the default delimiter.
pub fn get<'v, 'p>(path: impl Into<KeyPath<'p>>, root: &'v Value) -> Result<&'v Value, PathError> {
    get_with(path, root, DEFAULT_DELIMITER)
}

/// Resolves `path` against `root` using a custom delimiter.
pub fn get_with<'v, 'p>(
    path: impl Into<KeyPath<'p>>,
    root: &'v Value,
    delimiter: char,
) -> Result<&'v Value, PathError> {
    let path = path.into();
    let rendered = path.render(delimiter);
    path.segments(delimiter)
        .iter()
        .try_fold(root, |current, segment| step(current, segment, &rendered))
}

/// Resolves `path` against the first root that contains its leading segment.
///
/// Earlier roots take precedence, mirroring a shallow merge in which later
/// layers are overwritten by earlier ones. When no root contains the leading
/// segment the first root is used so the error names the missing key.
pub fn get_layered<'v, 'p>(
    path: impl Into<KeyPath<'p>>,
    roots: &[&'v Value],
    delimiter: char,
) -> Result<&'v Value, PathError> {
    let path = path.into();
    let segments = path.segments(delimiter);
    let rendered = path.render(delimiter);

    let Some(first) = segments.first() else {
        return Err(PathError::KeyNotFound {
            segment: String::new(),
            path: rendered,
        });
    };
    let root = roots
        .iter()
        .copied()
        .find(|root| step(root, first, &rendered).is_ok())
        .or_else(|| roots.first().copied())
        .ok_or_else(|| key_not_found(first, &rendered))?;

    segments
        .iter()
        .try_fold(root, |current, segment| step(current, segment, &rendered))
}

/// Assigns `value` at `path` inside `root` using the default delimiter.
///
/// All but the last segment must already exist. The last segment creates
/// or overwrites a mapping entry, or overwrites an existing sequence slot.
pub fn insert<'p>(path: impl Into<KeyPath<'p>>, root: &mut Value, value: Value) -> Result<(), PathError> {
    insert_with(path, root, value, DEFAULT_DELIMITER)
}

/// Assigns `value` at `path` inside `root` using a custom delimiter.
pub fn insert_with<'p>(
    path: impl Into<KeyPath<'p>>,
    root: &mut Value,
    value: Value,
    delimiter: char,
) -> Result<(), PathError> {
    let path = path.into();
    let rendered = path.render(delimiter);
    let mut segments = path.segments(delimiter);
    let Some(last) = segments.pop() else {
        return Ok(());
    };

    let parent = segments
        .iter()
        .try_fold(root, |current, segment| step_mut(current, segment, &rendered))?;

    match parent {
        Value::Object(map) => {
            map.insert(last.as_key().into_owned(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = last.as_index().ok_or_else(|| key_not_found(&last, &rendered))?;
            let len = items.len();
            let slot = items.get_mut(index).ok_or(PathError::IndexOutOfRange {
                index,
                len,
                path: rendered.clone(),
            })?;
            *slot = value;
            Ok(())
        }
        _ => Err(PathError::NotAContainer {
            segment: last.to_string(),
            path: rendered,
        }),
    }
}

/// Removes and returns the value at `path` using the default delimiter.
pub fn remove<'p>(path: impl Into<KeyPath<'p>>, root: &mut Value) -> Result<Value, PathError> {
    remove_with(path, root, DEFAULT_DELIMITER)
}

/// Removes and returns the value at `path` using a custom delimiter.
pub fn remove_with<'p>(path: impl Into<KeyPath<'p>>, root: &mut Value, delimiter: char) -> Result<Value, PathError> {
    let path = path.into();
    let rendered = path.render(delimiter);
    let mut segments = path.segments(delimiter);
    let Some(last) = segments.pop() else {
        return Ok(Value::Null);
    };

    let parent = segments
        .iter()
        .try_fold(root, |current, segment| step_mut(current, segment, &rendered))?;

    match parent {
        Value::Object(map) => map
            .shift_remove(last.as_key().as_ref())
            .ok_or_else(|| key_not_found(&last, &rendered)),
        Value::Array(items) => {
            let index = last.as_index().ok_or_else(|| key_not_found(&last, &rendered))?;
            if index < items.len() {
                Ok(items.remove(index))
            } else {
                Err(PathError::IndexOutOfRange {
                    index,
                    len: items.len(),
                    path: rendered,
                })
            }
        }
        _ => Err(PathError::NotAContainer {
            segment: last.to_string(),
            path: rendered,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn weather() -> Value {
        json!({
            "_req": {
                "weather": [
                    {"temp": 21, "city": "Giessen"},
                    {"temp": 17, "city": "Marburg"}
                ],
                "7": "seven"
            }
        })
    }

    #[test]
    fn test_get_nested_with_index() {
        let data = weather();
        assert_eq!(get("_req|weather|1|city", &data).unwrap(), &json!("Marburg"));
        assert_eq!(get("_req|weather|0|temp", &data).unwrap(), &json!(21));
    }

    #[test]
    fn test_numeric_segment_on_mapping_is_a_key() {
        let data = weather();
        assert_eq!(get("_req|7", &data).unwrap(), &json!("seven"));
    }

    #[test]
    fn test_get_without_delimiter_is_atomic() {
        let data = json!({"a.b": 1, "plain": 2});
        assert_eq!(get("a.b", &data).unwrap(), &json!(1));
        assert_eq!(get("plain", &data).unwrap(), &json!(2));
    }

    #[test]
    fn test_get_custom_delimiter() {
        let data = weather();
        assert_eq!(get_with("_req/weather/0/city", &data, '/').unwrap(), &json!("Giessen"));
    }

    #[test]
    fn test_get_with_segments() {
        let data = weather();
        let path = vec![Segment::from("_req"), Segment::from("weather"), Segment::Index(1)];
        assert_eq!(get(&path, &data).unwrap()["temp"], json!(17));
    }

    #[test]
    fn test_get_missing_key_reports_segment_and_path() {
        let data = weather();
        let err = get("_req|rain|0", &data).unwrap_err();
        assert_eq!(
            err,
            PathError::KeyNotFound {
                segment: "rain".into(),
                path: "_req|rain|0".into()
            }
        );
    }

    #[test]
    fn test_get_index_out_of_range() {
        let data = weather();
        let err = get("_req|weather|5", &data).unwrap_err();
        assert!(matches!(err, PathError::IndexOutOfRange { index: 5, len: 2, .. }));
    }

    #[test]
    fn test_get_through_scalar_fails() {
        let data = weather();
        let err = get("_req|weather|0|temp|x", &data).unwrap_err();
        assert!(matches!(err, PathError::NotAContainer { .. }));
    }

    #[test]
    fn test_insert_then_get() {
        let mut data = json!({"a": {"b": {}}});
        insert("a|b|c", &mut data, json!(42)).unwrap();
        assert_eq!(get("a|b|c", &data).unwrap(), &json!(42));
    }

    #[test]
    fn test_insert_flat_key() {
        let mut data = json!({});
        insert("sequence", &mut data, json!("/out/video.mp4")).unwrap();
        assert_eq!(data, json!({"sequence": "/out/video.mp4"}));
    }

    #[test]
    fn test_insert_overwrites_sequence_slot() {
        let mut data = weather();
        insert("_req|weather|0", &mut data, json!(null)).unwrap();
        assert_eq!(get("_req|weather|0", &data).unwrap(), &Value::Null);
    }

    #[test]
    fn test_insert_does_not_extend_sequences() {
        let mut data = weather();
        let err = insert("_req|weather|2", &mut data, json!({})).unwrap_err();
        assert!(matches!(err, PathError::IndexOutOfRange { index: 2, .. }));
    }

    #[test]
    fn test_insert_requires_parents() {
        let mut data = json!({});
        assert!(insert("missing|child", &mut data, json!(1)).is_err());
    }

    #[test]
    fn test_roundtrip_for_alphanumeric_paths() {
        for path in ["a", "a|b", "x1|y2|z3", "job|Video01|name"] {
            let mut data = json!({});
            let segments: Vec<&str> = path.split('|').collect();
            for depth in 1..segments.len() {
                insert(segments[..depth].join("|").as_str(), &mut data, json!({})).unwrap();
            }
            insert(path, &mut data, json!("v")).unwrap();
            assert_eq!(get(path, &data).unwrap(), &json!("v"), "path {path}");
        }
    }

    #[test]
    fn test_get_layered_prefers_earlier_roots() {
        let data = json!({"name": "from data"});
        let values = json!({"name": "from values", "only": "values"});

        assert_eq!(get_layered("name", &[&data, &values], '|').unwrap(), &json!("from data"));
        assert_eq!(get_layered("only", &[&data, &values], '|').unwrap(), &json!("values"));
        assert!(get_layered("nowhere", &[&data, &values], '|').is_err());
    }

    #[test]
    fn test_remove() {
        let mut data = weather();
        let removed = remove("_req|weather|0", &mut data).unwrap();
        assert_eq!(removed["city"], json!("Giessen"));
        assert_eq!(get("_req|weather|0|city", &data).unwrap(), &json!("Marburg"));
        assert!(remove("_req|nothing", &mut data).is_err());
    }
}
