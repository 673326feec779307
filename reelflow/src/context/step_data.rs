//! The mutable data bag threaded through every stage of one run.

use crate::errors::{KeyErrorReason, StepKeyError};
use crate::pattern::{self, display_value, KeyPath, StepPatternFormatter};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Data key holding the per-run configuration overrides.
pub const CONFIG_KEY: &str = "_conf";
/// Data key holding the pipeline id.
pub const PIPE_ID_KEY: &str = "_pipe_id";
/// Data key under which fetched API payloads are stored.
pub const REQUEST_KEY: &str = "_req";

/// Run-scoped data context.
///
/// Holds everything one pipeline run produces: fetched payloads,
/// transformed values and the paths of generated files. Every lookup goes
/// through the step pattern formatter, so stages address values with
/// `|`-separated key paths.
#[derive(Debug, Clone)]
pub struct StepData {
    data: Value,
    pipe_id: String,
    workspace: PathBuf,
    formatter: StepPatternFormatter,
}

impl StepData {
    /// Creates a data context for one run.
    ///
    /// `workspace` is the run's private scratch directory.
    #[must_use]
    pub fn new(run_config: Map<String, Value>, pipe_id: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        let pipe_id = pipe_id.into();
        let mut data = Map::new();
        data.insert(CONFIG_KEY.to_string(), Value::Object(run_config));
        data.insert(PIPE_ID_KEY.to_string(), Value::String(pipe_id.clone()));

        Self {
            data: Value::Object(data),
            pipe_id,
            workspace: workspace.into(),
            formatter: StepPatternFormatter::default(),
        }
    }

    /// Sets the formatter (and with it the path delimiter).
    #[must_use]
    pub fn with_formatter(mut self, formatter: StepPatternFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Returns the pipeline id.
    #[must_use]
    pub fn pipe_id(&self) -> &str {
        &self.pipe_id
    }

    /// Returns the run workspace directory.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Returns the raw data.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Returns a path for `filename` inside this run's workspace.
    #[must_use]
    pub fn temp_path(&self, filename: &str) -> PathBuf {
        self.workspace.join(filename)
    }

    /// Looks up a run configuration option.
    ///
    /// Absence is not an error.
    #[must_use]
    pub fn get_config(&self, key: &str) -> Option<&Value> {
        self.data.get(CONFIG_KEY).and_then(|config| config.get(key))
    }

    /// Looks up a run configuration option, falling back to `default`.
    #[must_use]
    pub fn get_config_or(&self, key: &str, default: Value) -> Value {
        self.get_config(key).cloned().unwrap_or(default)
    }

    /// Stores a fetched payload under `_req`, or under `_req|<api_key_name>`.
    pub fn init_data(&mut self, value: Value, api_key_name: Option<&str>) {
        let Value::Object(root) = &mut self.data else {
            return;
        };
        match api_key_name {
            None => {
                root.insert(REQUEST_KEY.to_string(), value);
            }
            Some(name) => {
                let requests = root
                    .entry(REQUEST_KEY)
                    .or_insert_with(|| Value::Object(Map::new()));
                if !requests.is_object() {
                    *requests = Value::Object(Map::new());
                }
                if let Value::Object(requests) = requests {
                    requests.insert(name.to_string(), value);
                }
            }
        }
    }

    /// Resolves `keys` strictly against the run data, then `values`.
    pub fn get_data<'p>(&self, keys: impl Into<KeyPath<'p>>, values: &Value) -> Result<Value, StepKeyError> {
        let keys = keys.into();
        pattern::get_layered(keys, &[&self.data, values], self.formatter.delimiter())
            .cloned()
            .map_err(|err| StepKeyError::new("get_data", keys.render(self.formatter.delimiter()), err))
    }

    /// Resolves `keys` and converts the value to `T`.
    pub fn get_data_as<'p, T: DeserializeOwned>(
        &self,
        keys: impl Into<KeyPath<'p>>,
        values: &Value,
    ) -> Result<T, StepKeyError> {
        let keys = keys.into();
        let value = self.get_data(keys, values)?;
        serde_json::from_value(value)
            .map_err(|err| StepKeyError::new("get_data", keys.render(self.formatter.delimiter()), err))
    }

    /// Assigns `value` at `keys` in the run data.
    pub fn insert_data<'p>(&mut self, keys: impl Into<KeyPath<'p>>, value: Value) -> Result<(), StepKeyError> {
        let keys = keys.into();
        let delimiter = self.formatter.delimiter();
        pattern::insert_with(keys, &mut self.data, value, delimiter)
            .map_err(|err| StepKeyError::new("insert_data", keys.render(delimiter), err))
    }

    /// Removes and returns the value at `keys`.
    pub fn remove_data<'p>(&mut self, keys: impl Into<KeyPath<'p>>) -> Result<Value, StepKeyError> {
        let keys = keys.into();
        let delimiter = self.formatter.delimiter();
        pattern::remove_with(keys, &mut self.data, delimiter)
            .map_err(|err| StepKeyError::new("remove_data", keys.render(delimiter), err))
    }

    /// Formats `pattern` against the run data, then `values`.
    ///
    /// A bare `{path}` pattern keeps the resolved value's type; anything
    /// else yields a string. Non-string patterns pass through.
    pub fn format(&self, pattern: &Value, values: &Value) -> Result<Value, StepKeyError> {
        self.formatter
            .format(pattern, &[&self.data, values])
            .map_err(|err| StepKeyError::new("format", display_value(pattern), err))
    }

    /// Formats `pattern` and renders the result as text.
    pub fn format_str(&self, pattern: &Value, values: &Value) -> Result<String, StepKeyError> {
        self.format(pattern, values).map(|value| display_value(&value))
    }

    /// Formats `pattern` and converts the result to `T`.
    pub fn format_as<T: DeserializeOwned>(&self, pattern: &Value, values: &Value) -> Result<T, StepKeyError> {
        let value = self.format(pattern, values)?;
        serde_json::from_value(value).map_err(|err| StepKeyError::new("format", display_value(pattern), err))
    }

    /// Formats every string nested in `value`.
    pub fn format_deep(&self, value: &Value, values: &Value) -> Result<Value, StepKeyError> {
        self.formatter
            .format_deep(value, &[&self.data, values])
            .map_err(|err| StepKeyError::new("format_deep", display_value(value), err))
    }

    pub(crate) fn missing_entry(func_name: &str, key: &str) -> StepKeyError {
        StepKeyError::new(
            func_name,
            key,
            KeyErrorReason::Invalid(format!("Entry '{key}' is missing")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn step_data() -> StepData {
        let mut config = Map::new();
        config.insert("city".into(), json!("Giessen"));
        StepData::new(config, "run-1", "/tmp/reelflow/run-1")
    }

    #[test]
    fn test_new_seeds_config_and_id() {
        let data = step_data();
        assert_eq!(data.data()[CONFIG_KEY]["city"], json!("Giessen"));
        assert_eq!(data.data()[PIPE_ID_KEY], json!("run-1"));
        assert_eq!(data.pipe_id(), "run-1");
    }

    #[test]
    fn test_get_config_is_graceful() {
        let data = step_data();
        assert_eq!(data.get_config("city"), Some(&json!("Giessen")));
        assert_eq!(data.get_config("missing"), None);
        assert_eq!(data.get_config_or("missing", json!(3)), json!(3));
    }

    #[test]
    fn test_get_data_is_strict() {
        let data = step_data();
        let err = data.get_data("_req|temp", &json!({})).unwrap_err();
        assert_eq!(err.func_name, "get_data");
        assert_eq!(err.keys, "_req|temp");
    }

    #[test]
    fn test_init_data_with_api_name() {
        let mut data = step_data();
        data.init_data(json!({"temp": 21}), Some("weather"));
        data.init_data(json!({"pm10": 7}), Some("air"));

        assert_eq!(data.get_data("_req|weather|temp", &Value::Null).unwrap(), json!(21));
        assert_eq!(data.get_data("_req|air|pm10", &Value::Null).unwrap(), json!(7));
    }

    #[test]
    fn test_init_data_without_api_name() {
        let mut data = step_data();
        data.init_data(json!({"temp": 21}), None);
        assert_eq!(data.get_data_as::<i64>("_req|temp", &Value::Null).unwrap(), 21);
    }

    #[test]
    fn test_insert_and_remove_data() {
        let mut data = step_data();
        data.insert_data("images", json!({})).unwrap();
        data.insert_data("images|title", json!("/tmp/title.png")).unwrap();

        assert_eq!(data.get_data("images|title", &Value::Null).unwrap(), json!("/tmp/title.png"));
        assert_eq!(data.remove_data("images|title").unwrap(), json!("/tmp/title.png"));
        assert!(data.get_data("images|title", &Value::Null).is_err());
    }

    #[test]
    fn test_format_prefers_data_over_values() {
        let mut data = step_data();
        data.init_data(json!({"temp": 21}), None);
        let values = json!({"_req": {"temp": 99}, "unit": "C"});

        assert_eq!(data.format(&json!("{_req|temp}"), &values).unwrap(), json!(21));
        assert_eq!(data.format_str(&json!("{_req|temp} {unit}"), &values).unwrap(), "21 C");
    }

    #[test]
    fn test_format_as_converts() {
        let mut data = step_data();
        data.init_data(json!({"x": 120, "label": "abc"}), None);

        let x: i64 = data.format_as(&json!("{_req|x}"), &Value::Null).unwrap();
        assert_eq!(x, 120);

        let err = data.format_as::<i64>(&json!("{_req|label}"), &Value::Null).unwrap_err();
        assert!(matches!(err.source, KeyErrorReason::Convert(_)));
    }

    #[test]
    fn test_format_failure_names_accessor() {
        let data = step_data();
        let err = data.format(&json!("{_req|nothing}"), &Value::Null).unwrap_err();
        assert_eq!(err.func_name, "format");
        assert!(err.path_error().is_some());
    }

    #[test]
    fn test_temp_path_is_inside_workspace() {
        let data = step_data();
        assert_eq!(data.temp_path("a.png"), PathBuf::from("/tmp/reelflow/run-1/a.png"));
    }
}
