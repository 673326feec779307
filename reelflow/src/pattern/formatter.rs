//! `{path}` template interpolation over nested JSON values.

use super::path::{get_layered, DEFAULT_DELIMITER};
use crate::errors::FormatError;
use serde_json::Value;

/// A parsed piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece<'a> {
    Literal(String),
    Field(&'a str),
}

/// Substitutes `{path}` placeholders with values resolved from nested data.
///
/// A pattern that consists of exactly one placeholder evaluates to the
/// resolved value itself, keeping its JSON type:
///
/// ```
/// use reelflow::pattern::StepPatternFormatter;
/// use serde_json::json;
///
/// let data = json!({"_req": {"temp": 21, "city": "Giessen"}});
/// let formatter = StepPatternFormatter::default();
///
/// assert_eq!(formatter.format(&json!("{_req|temp}"), &[&data]).unwrap(), json!(21));
/// assert_eq!(
///     formatter.format(&json!("{_req|city}: {_req|temp} C"), &[&data]).unwrap(),
///     json!("Giessen: 21 C")
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPatternFormatter {
    delimiter: char,
}

impl Default for StepPatternFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl StepPatternFormatter {
    /// Creates a formatter splitting paths on `delimiter`.
    #[must_use]
    pub const fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    /// Returns the path delimiter.
    #[must_use]
    pub const fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Formats `pattern` against `roots` (earlier roots take precedence).
    ///
    /// Non-string patterns are returned unchanged.
    pub fn format(&self, pattern: &Value, roots: &[&Value]) -> Result<Value, FormatError> {
        match pattern {
            Value::String(text) => self.format_text(text, roots),
            other => Ok(other.clone()),
        }
    }

    /// Formats a string pattern.
    pub fn format_text(&self, pattern: &str, roots: &[&Value]) -> Result<Value, FormatError> {
        let pieces = parse(pattern)?;

        if let [Piece::Field(field)] = pieces.as_slice() {
            return self.resolve(pattern, field, roots).cloned();
        }

        let mut out = String::with_capacity(pattern.len());
        for piece in &pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Field(field) => out.push_str(&display_value(self.resolve(pattern, field, roots)?)),
            }
        }
        Ok(Value::String(out))
    }

    /// Formats every string nested inside `value`.
    pub fn format_deep(&self, value: &Value, roots: &[&Value]) -> Result<Value, FormatError> {
        match value {
            Value::String(text) => self.format_text(text, roots),
            Value::Array(items) => items
                .iter()
                .map(|item| self.format_deep(item, roots))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.format_deep(item, roots)?)))
                .collect::<Result<serde_json::Map<_, _>, FormatError>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    fn resolve<'v>(&self, pattern: &str, field: &str, roots: &[&'v Value]) -> Result<&'v Value, FormatError> {
        get_layered(field, roots, self.delimiter).map_err(|source| FormatError::Unresolved {
            pattern: pattern.to_string(),
            placeholder: field.to_string(),
            source,
        })
    }
}

/// Renders a value the way it is substituted into text.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn parse(pattern: &str) -> Result<Vec<Piece<'_>>, FormatError> {
    let unbalanced = || FormatError::Unbalanced {
        pattern: pattern.to_string(),
    };

    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut rest = pattern;

    while let Some(pos) = rest.find(['{', '}']) {
        literal.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            literal.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            literal.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            return Err(unbalanced());
        } else {
            let body = &tail[1..];
            let close = body
                .find(['{', '}'])
                .filter(|&idx| body[idx..].starts_with('}'))
                .ok_or_else(unbalanced)?;
            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(Piece::Field(&body[..close]));
            rest = &body[close + 1..];
        }
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PathError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data() -> Value {
        json!({
            "_req": {
                "temp": 21,
                "rain": 0.4,
                "city": "Giessen",
                "alert": true,
                "days": ["Mon", "Tue"]
            }
        })
    }

    #[test]
    fn test_single_placeholder_keeps_type() {
        let f = StepPatternFormatter::default();
        let data = data();

        assert_eq!(f.format(&json!("{_req|temp}"), &[&data]).unwrap(), json!(21));
        assert_eq!(f.format(&json!("{_req|rain}"), &[&data]).unwrap(), json!(0.4));
        assert_eq!(f.format(&json!("{_req|alert}"), &[&data]).unwrap(), json!(true));
        assert_eq!(f.format(&json!("{_req|days}"), &[&data]).unwrap(), json!(["Mon", "Tue"]));
    }

    #[test]
    fn test_embedded_placeholder_is_stringified() {
        let f = StepPatternFormatter::default();
        let data = data();

        assert_eq!(
            f.format(&json!("{_req|temp} degrees"), &[&data]).unwrap(),
            json!("21 degrees")
        );
        assert_eq!(
            f.format(&json!("{_req|city} on {_req|days|1}"), &[&data]).unwrap(),
            json!("Giessen on Tue")
        );
    }

    #[test]
    fn test_non_string_passes_through() {
        let f = StepPatternFormatter::default();
        assert_eq!(f.format(&json!(200), &[]).unwrap(), json!(200));
        assert_eq!(f.format(&json!({"x": "{y}"}), &[]).unwrap(), json!({"x": "{y}"}));
    }

    #[test]
    fn test_plain_text_and_escapes() {
        let f = StepPatternFormatter::default();
        let data = data();

        assert_eq!(f.format(&json!("no fields"), &[&data]).unwrap(), json!("no fields"));
        assert_eq!(
            f.format(&json!("{{literal}} {_req|temp}"), &[&data]).unwrap(),
            json!("{literal} 21")
        );
    }

    #[test]
    fn test_unresolved_placeholder() {
        let f = StepPatternFormatter::default();
        let data = data();

        let err = f.format(&json!("Temp: {_req|snow}"), &[&data]).unwrap_err();
        match err {
            FormatError::Unresolved { placeholder, source, .. } => {
                assert_eq!(placeholder, "_req|snow");
                assert!(matches!(source, PathError::KeyNotFound { segment, .. } if segment == "snow"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unbalanced_braces() {
        let f = StepPatternFormatter::default();
        assert!(matches!(
            f.format(&json!("open {brace"), &[]),
            Err(FormatError::Unbalanced { .. })
        ));
        assert!(matches!(
            f.format(&json!("close } brace"), &[]),
            Err(FormatError::Unbalanced { .. })
        ));
    }

    #[test]
    fn test_layered_roots() {
        let f = StepPatternFormatter::default();
        let data = data();
        let values = json!({"label": "Now", "_req": {"temp": -1}});

        assert_eq!(
            f.format(&json!("{label}: {_req|temp}"), &[&data, &values]).unwrap(),
            json!("Now: 21")
        );
    }

    #[test]
    fn test_custom_delimiter() {
        let f = StepPatternFormatter::new('.');
        let data = data();
        assert_eq!(f.format(&json!("{_req.city}"), &[&data]).unwrap(), json!("Giessen"));
    }

    #[test]
    fn test_format_deep() {
        let f = StepPatternFormatter::default();
        let data = data();
        let body = json!({"text": "{_req|city}", "values": ["{_req|temp}", 3], "fixed": null});

        assert_eq!(
            f.format_deep(&body, &[&data]).unwrap(),
            json!({"text": "Giessen", "values": [21, 3], "fixed": null})
        );
    }
}
