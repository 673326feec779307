//! Error types for the reelflow pipeline engine.
//!
//! Stage code reports failures through [`StepError`], which always names the
//! stage kind it was raised in plus the `type`/`description` of the blueprint
//! node being processed. Lower-level failures ([`PathError`],
//! [`FormatError`], [`StepKeyError`], [`StepTypeError`]) are kept as the
//! error source so the full cause chain can be logged with [`report`].

use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for reelflow operations.
#[derive(Debug, Error)]
pub enum ReelflowError {
    /// Loading a step definition or preparing a workspace failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A stage failed.
    #[error(transparent)]
    Step(#[from] StepError),

    /// Moving a produced artifact into its retention slot failed.
    #[error(transparent)]
    Retention(#[from] RetentionError),

    /// The stage dispatch table could not be built.
    #[error(transparent)]
    Table(#[from] TableError),

    /// A stage panicked.
    #[error("Stage '{stage}' panicked: {message}")]
    Panic {
        /// The stage that was running.
        stage: String,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised when a key path cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A mapping key (or a non-numeric segment on a sequence) is absent.
    #[error("Invalid Data Key '{segment}' in '{path}'")]
    KeyNotFound {
        /// The offending segment.
        segment: String,
        /// The full path being resolved.
        path: String,
    },

    /// A sequence index is past the end of the sequence.
    #[error("Index {index} out of range (length {len}) in '{path}'")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// The length of the sequence.
        len: usize,
        /// The full path being resolved.
        path: String,
    },

    /// A segment was applied to a scalar value.
    #[error("Cannot access '{segment}' in '{path}': value is neither a mapping nor a sequence")]
    NotAContainer {
        /// The offending segment.
        segment: String,
        /// The full path being resolved.
        path: String,
    },
}

/// Error raised by the template formatter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// A placeholder refers to a path that does not exist.
    #[error("Could not resolve placeholder '{{{placeholder}}}' in '{pattern}'")]
    Unresolved {
        /// The full pattern.
        pattern: String,
        /// The path inside the braces.
        placeholder: String,
        /// The resolution failure.
        #[source]
        source: PathError,
    },

    /// The pattern contains a `{` or `}` that is neither escaped nor part of a placeholder.
    #[error("Unbalanced braces in '{pattern}'")]
    Unbalanced {
        /// The full pattern.
        pattern: String,
    },
}

/// Why a data context access failed.
#[derive(Debug, Error)]
pub enum KeyErrorReason {
    /// The key path could not be resolved.
    #[error(transparent)]
    Path(#[from] PathError),

    /// A template could not be formatted.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The resolved value has the wrong type.
    #[error("Value has an unexpected type: {0}")]
    Convert(#[from] serde_json::Error),

    /// A required blueprint entry is missing or malformed.
    #[error("{0}")]
    Invalid(String),
}

/// Error raised when the data context cannot serve an access.
///
/// Carries the name of the accessor (`format`, `get_data`, ...) and the key
/// or pattern it was called with.
#[derive(Debug, Error)]
#[error("{func_name}: Could not access data '{keys}'")]
pub struct StepKeyError {
    /// The accessor that failed.
    pub func_name: String,
    /// The key path or pattern.
    pub keys: String,
    /// The underlying failure.
    #[source]
    pub source: KeyErrorReason,
}

impl StepKeyError {
    /// Creates a new key error.
    #[must_use]
    pub fn new(
        func_name: impl Into<String>,
        keys: impl Into<String>,
        source: impl Into<KeyErrorReason>,
    ) -> Self {
        Self {
            func_name: func_name.into(),
            keys: keys.into(),
            source: source.into(),
        }
    }

    /// Creates a key error for a missing or malformed blueprint entry.
    #[must_use]
    pub fn invalid(func_name: impl Into<String>, keys: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(func_name, keys, KeyErrorReason::Invalid(message.into()))
    }

    /// Returns the path error behind this key error, if any.
    #[must_use]
    pub fn path_error(&self) -> Option<&PathError> {
        match &self.source {
            KeyErrorReason::Path(err) => Some(err),
            KeyErrorReason::Format(FormatError::Unresolved { source, .. }) => Some(source),
            _ => None,
        }
    }
}

/// Error raised when a blueprint node's discriminator is missing or unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepTypeError {
    /// The discriminator entry is absent.
    #[error("Entry '{key}' is missing")]
    Missing {
        /// The discriminator key (usually `type`).
        key: String,
    },

    /// No handler is registered for the discriminator value.
    #[error("Type '{type_name}' does not exist")]
    Unknown {
        /// The discriminator value.
        type_name: String,
    },
}

/// The stage a [`StepError`] was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Fetching API data.
    Api,
    /// Transforming fetched data.
    Transform,
    /// Persisting data.
    Storing,
    /// Rendering images.
    Images,
    /// Rendering the thumbnail.
    Thumbnail,
    /// Rendering audio.
    Audios,
    /// Assembling the video sequence.
    Sequence,
}

impl StageKind {
    /// Returns the kind of a standard stage by its table name.
    #[must_use]
    pub fn from_stage_name(name: &str) -> Option<Self> {
        match name {
            "Apis" => Some(Self::Api),
            "Transform" => Some(Self::Transform),
            "Storing" => Some(Self::Storing),
            "Images" => Some(Self::Images),
            "Thumbnail" => Some(Self::Thumbnail),
            "Audios" => Some(Self::Audios),
            "Sequence" => Some(Self::Sequence),
            _ => None,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "API"),
            Self::Transform => write!(f, "Transform"),
            Self::Storing => write!(f, "Storing"),
            Self::Images => write!(f, "Image"),
            Self::Thumbnail => write!(f, "Thumbnail"),
            Self::Audios => write!(f, "Audio"),
            Self::Sequence => write!(f, "Sequence"),
        }
    }
}

/// The original failure wrapped by a [`StepError`].
#[derive(Debug, Error)]
pub enum StepCause {
    /// A data context access failed.
    #[error(transparent)]
    Key(#[from] StepKeyError),

    /// A discriminator was missing or unknown.
    #[error(transparent)]
    Type(#[from] StepTypeError),

    /// A required blueprint entry is missing.
    #[error("Entry '{0}' is missing")]
    MissingEntry(String),

    /// A stage error of another kind raised further down.
    #[error(transparent)]
    Nested(Box<StepError>),

    /// Any other failure raised by collaborator code.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StepError> for StepCause {
    fn from(err: StepError) -> Self {
        Self::Nested(Box::new(err))
    }
}

impl From<PathError> for StepCause {
    fn from(err: PathError) -> Self {
        let keys = match &err {
            PathError::KeyNotFound { path, .. }
            | PathError::IndexOutOfRange { path, .. }
            | PathError::NotAContainer { path, .. } => path.clone(),
        };
        Self::Key(StepKeyError::new("data_get", keys, err))
    }
}

impl From<std::io::Error> for StepCause {
    fn from(err: std::io::Error) -> Self {
        Self::Other(err.into())
    }
}

/// Error raised by a stage, carrying the blueprint context it failed on.
#[derive(Debug)]
pub struct StepError {
    /// The stage kind.
    pub kind: StageKind,
    /// The `type` entry of the blueprint node, if any.
    pub type_name: Option<String>,
    /// The `description` entry of the blueprint node, if any.
    pub description: Option<String>,
    /// The original failure.
    pub cause: StepCause,
}

impl StepError {
    /// Wraps a cause with the `type`/`description` of the given blueprint node.
    #[must_use]
    pub fn new(kind: StageKind, values: &Value, cause: impl Into<StepCause>) -> Self {
        let entry = |key: &str| values.get(key).and_then(Value::as_str).map(String::from);
        Self {
            kind,
            type_name: entry("type"),
            description: entry("description"),
            cause: cause.into(),
        }
    }

    /// Wraps a cause without any blueprint context.
    #[must_use]
    pub fn bare(kind: StageKind, cause: impl Into<StepCause>) -> Self {
        Self::new(kind, &Value::Null, cause)
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error", self.kind)?;
        match (&self.description, &self.type_name) {
            (Some(desc), Some(ty)) => write!(f, " on '{desc}' with type '{ty}'"),
            (Some(desc), None) => write!(f, " on '{desc}'"),
            (None, Some(ty)) => write!(f, " on type '{ty}'"),
            (None, None) => Ok(()),
        }
    }
}

impl StdError for StepError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.cause)
    }
}

/// Wraps the outcome of processing one blueprint node at a stage boundary.
///
/// A [`StepError`] of the same kind passes through untouched so nested
/// handlers do not wrap twice; every other failure is wrapped with the
/// node's `type` and `description`.
pub fn raise_step_error<T, E>(kind: StageKind, values: &Value, result: Result<T, E>) -> Result<T, StepError>
where
    E: Into<StepCause>,
{
    result.map_err(|err| match err.into() {
        StepCause::Nested(inner) if inner.kind == kind => *inner,
        cause => StepError::new(kind, values, cause),
    })
}

/// Errors raised by the resource store.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The step definition file does not exist.
    #[error("Step definition '{name}' not found at {}", .path.display())]
    StepDefinitionNotFound {
        /// The step definition name.
        name: String,
        /// The path that was tried.
        path: PathBuf,
    },

    /// The step definition file could not be read.
    #[error("Could not read step definition '{name}'")]
    Read {
        /// The step definition name.
        name: String,
        /// The IO failure.
        #[source]
        source: std::io::Error,
    },

    /// The step definition is not valid JSON.
    #[error("Step definition '{name}' is malformed")]
    Malformed {
        /// The step definition name.
        name: String,
        /// The parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The run workspace could not be created (for example because the id is in use).
    #[error("Could not create workspace {}", .path.display())]
    WorkspaceCreate {
        /// The workspace directory.
        path: PathBuf,
        /// The IO failure.
        #[source]
        source: std::io::Error,
    },

    /// The run workspace could not be removed.
    #[error("Could not remove workspace {}", .path.display())]
    WorkspaceRemove {
        /// The workspace directory.
        path: PathBuf,
        /// The IO failure.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the completion notifier. Never fatal for a run.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The request spec could not be resolved against the run data.
    #[error("Invalid completion request")]
    Spec(#[from] StepKeyError),

    /// The request method is not supported.
    #[error("Unsupported HTTP method '{0}'")]
    Method(String),

    /// `timeout_seconds` is negative, not a number or too large.
    #[error("Invalid completion timeout {0}")]
    Timeout(f64),

    /// The notifier panicked.
    #[error("Completion notifier panicked: {0}")]
    Panic(String),

    /// The request could not be sent.
    #[error("Completion request to '{url}' failed")]
    Request {
        /// The request URL.
        url: String,
        /// The transport failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The server answered with a non-success status.
    #[error("Completion request to '{url}' returned status {status}")]
    Status {
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
}

/// Filesystem error raised while pruning or rotating output files.
#[derive(Debug, Error)]
#[error("Could not {op} {}", .path.display())]
pub struct RetentionError {
    /// The operation that failed (`list`, `remove`, `rename`).
    pub op: &'static str,
    /// The file or directory involved.
    pub path: PathBuf,
    /// The IO failure.
    #[source]
    pub source: std::io::Error,
}

impl RetentionError {
    /// Creates a new retention error.
    #[must_use]
    pub fn new(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while building a stage dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// No stage with this name exists in the table.
    #[error("Unknown stage '{0}'")]
    UnknownStage(String),

    /// A stage with this name was already declared.
    #[error("Duplicate stage '{0}'")]
    DuplicateStage(String),
}

/// Formats an error together with its whole source chain.
pub struct Report<'a>(pub &'a (dyn StdError + 'static));

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}

/// Renders an error with its whole source chain.
#[must_use]
pub fn report(err: &(dyn StdError + 'static)) -> String {
    Report(err).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key_error() -> StepKeyError {
        StepKeyError::new(
            "get_data",
            "_req|temp",
            PathError::KeyNotFound {
                segment: "temp".to_string(),
                path: "_req|temp".to_string(),
            },
        )
    }

    #[test]
    fn test_step_error_display_with_context() {
        let values = json!({"type": "text", "description": "Headline"});
        let err = StepError::new(StageKind::Images, &values, key_error());

        assert_eq!(err.to_string(), "Image error on 'Headline' with type 'text'");
        assert_eq!(err.type_name.as_deref(), Some("text"));
    }

    #[test]
    fn test_step_error_display_without_description() {
        let err = StepError::new(StageKind::Transform, &json!({"type": "add"}), key_error());
        assert_eq!(err.to_string(), "Transform error on type 'add'");

        let bare = StepError::bare(StageKind::Audios, StepCause::MissingEntry("parts".into()));
        assert_eq!(bare.to_string(), "Audio error");
    }

    #[test]
    fn test_report_includes_cause_chain() {
        let err = StepError::new(StageKind::Images, &json!({"type": "text"}), key_error());
        let text = report(&err);

        assert!(text.starts_with("Image error on type 'text'"));
        assert!(text.contains("get_data: Could not access data '_req|temp'"));
        assert!(text.ends_with("Invalid Data Key 'temp' in '_req|temp'"));
    }

    #[test]
    fn test_raise_step_error_wraps_foreign_errors() {
        let values = json!({"type": "image", "description": "Logo"});
        let result: Result<(), StepCause> = Err(anyhow::anyhow!("decoder exploded").into());

        let err = raise_step_error(StageKind::Images, &values, result).unwrap_err();
        assert_eq!(err.kind, StageKind::Images);
        assert_eq!(err.description.as_deref(), Some("Logo"));
        assert!(matches!(err.cause, StepCause::Other(_)));
    }

    #[test]
    fn test_raise_step_error_does_not_wrap_same_kind_twice() {
        let inner = StepError::new(StageKind::Images, &json!({"type": "text"}), key_error());
        let outer_values = json!({"type": "option"});

        let err = raise_step_error(StageKind::Images, &outer_values, Err::<(), _>(inner)).unwrap_err();
        assert_eq!(err.type_name.as_deref(), Some("text"));
        assert!(matches!(err.cause, StepCause::Key(_)));
    }

    #[test]
    fn test_raise_step_error_nests_other_kinds() {
        let inner = StepError::bare(StageKind::Transform, key_error());
        let err = raise_step_error(StageKind::Images, &json!({}), Err::<(), _>(inner)).unwrap_err();

        assert_eq!(err.kind, StageKind::Images);
        match err.cause {
            StepCause::Nested(nested) => assert_eq!(nested.kind, StageKind::Transform),
            other => panic!("expected nested error, got {other:?}"),
        }
    }

    #[test]
    fn test_step_type_error_messages() {
        let missing = StepTypeError::Missing { key: "type".into() };
        let unknown = StepTypeError::Unknown { type_name: "sparkle".into() };

        assert_eq!(missing.to_string(), "Entry 'type' is missing");
        assert_eq!(unknown.to_string(), "Type 'sparkle' does not exist");
    }

    #[test]
    fn test_key_error_exposes_path_error() {
        let err = key_error();
        assert!(matches!(err.path_error(), Some(PathError::KeyNotFound { .. })));

        let invalid = StepKeyError::invalid("execute_option", "check", "Entry 'check' is missing");
        assert!(invalid.path_error().is_none());
    }
}
