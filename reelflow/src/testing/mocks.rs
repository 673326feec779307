//! Stage doubles for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;

use crate::context::StepData;
use crate::errors::{StageKind, StepCause, StepError};
use crate::stages::Stage;

/// A recorded execution.
#[derive(Debug, Clone)]
pub struct RecordedExecution {
    /// Pipeline id of the run.
    pub pipe_id: String,
    /// Workspace of the run.
    pub workspace: PathBuf,
    /// Whether the workspace existed while the stage ran.
    pub workspace_existed: bool,
    /// The declarative config as the stage saw it.
    pub values: Value,
}

/// A stage that records every call and optionally writes one data entry.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    output: Option<(String, Value)>,
    executions: Mutex<Vec<RecordedExecution>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: None,
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Inserts `value` at top-level data key `key` on every call.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.output = Some((key.into(), value));
        self
    }

    /// Returns all recorded executions.
    #[must_use]
    pub fn executions(&self) -> Vec<RecordedExecution> {
        self.executions.lock().clone()
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.lock().len()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, values: &mut Value, data: &mut StepData) -> Result<(), StepError> {
        self.executions.lock().push(RecordedExecution {
            pipe_id: data.pipe_id().to_string(),
            workspace: data.workspace().to_path_buf(),
            workspace_existed: data.workspace().is_dir(),
            values: values.clone(),
        });
        if let Some((key, value)) = &self.output {
            data.insert_data(key.as_str(), value.clone())
                .map_err(|err| StepError::new(StageKind::Transform, values, err))?;
        }
        Ok(())
    }
}

/// A stage that always fails with a stage error of the given kind.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    kind: StageKind,
    message: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, values: &mut Value, _data: &mut StepData) -> Result<(), StepError> {
        Err(StepError::new(
            self.kind,
            values,
            StepCause::Other(anyhow::anyhow!("{}", self.message)),
        ))
    }
}

/// A stage that panics.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates a new panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _values: &mut Value, _data: &mut StepData) -> Result<(), StepError> {
        panic!("{} exploded", self.name);
    }
}

/// A stage that writes a video and a thumbnail into the run workspace.
///
/// The files are named after the pipeline id and contain it, and their
/// paths are grafted into `values["sequence"]` and `values["thumbnail"]`.
#[derive(Debug)]
pub struct ArtifactStage {
    name: String,
}

impl ArtifactStage {
    /// Creates a new artifact stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for ArtifactStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, values: &mut Value, data: &mut StepData) -> Result<(), StepError> {
        let id = data.pipe_id().to_string();
        let video = data.temp_path(&format!("{id}.mp4"));
        let thumbnail = data.temp_path(&format!("{id}_thumbnail.png"));

        for path in [&video, &thumbnail] {
            std::fs::write(path, &id).map_err(|err| StepError::bare(StageKind::Sequence, err))?;
        }
        if let Value::Object(map) = values {
            map.insert("sequence".into(), Value::String(video.to_string_lossy().into_owned()));
            map.insert("thumbnail".into(), Value::String(thumbnail.to_string_lossy().into_owned()));
        }
        Ok(())
    }
}
