//! The ordered stage dispatch table.

use super::Stage;
use crate::errors::{StageKind, TableError};
use crate::pipeline::PipelineState;
use std::fmt;
use std::sync::Arc;

/// Display names of the standard stages, in execution order.
pub const STANDARD_STAGES: [&str; 7] = [
    "Apis",
    "Transform",
    "Storing",
    "Images",
    "Thumbnail",
    "Audios",
    "Sequence",
];

const NOT_STARTED: &str = "Not Started";
const ERROR: &str = "Error";
const READY: &str = "Ready";

/// One entry of the dispatch table.
#[derive(Clone)]
pub struct StageDescriptor {
    /// Position in the table.
    pub index: usize,
    /// Display name.
    pub name: String,
    /// Error kind stage failures are reported under, if any.
    pub kind: Option<StageKind>,
    /// The stage runner; `None` makes the entry a no-op.
    pub stage: Option<Arc<dyn Stage>>,
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("has_stage", &self.stage.is_some())
            .finish()
    }
}

/// Immutable, ordered list of stages shared by every run.
///
/// Built once with [`StageTableBuilder`] and passed around as
/// `Arc<StageTable>`.
#[derive(Debug, Clone, Default)]
pub struct StageTable {
    stages: Vec<StageDescriptor>,
}

impl StageTable {
    /// Returns the number of executable stages.
    #[must_use]
    pub fn steps_max(&self) -> usize {
        self.stages.len()
    }

    /// Returns the stage at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&StageDescriptor> {
        self.stages.get(index)
    }

    /// Iterates the stages in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.iter()
    }

    /// Returns the display name for a pipeline state.
    ///
    /// The sentinel states map to "Not Started", "Error" and "Ready".
    #[must_use]
    pub fn name_of(&self, state: PipelineState) -> &str {
        match state {
            PipelineState::NotStarted => NOT_STARTED,
            PipelineState::Error => ERROR,
            PipelineState::Ready => READY,
            PipelineState::Running(index) => self.get(index).map_or(ERROR, |stage| stage.name.as_str()),
        }
    }
}

/// Builder for [`StageTable`].
#[derive(Debug, Default)]
pub struct StageTableBuilder {
    stages: Vec<StageDescriptor>,
    duplicate: Option<String>,
}

impl StageTableBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder holding the standard stages without runners.
    #[must_use]
    pub fn standard() -> Self {
        STANDARD_STAGES
            .iter()
            .fold(Self::new(), |builder, name| builder.stage(*name, None))
    }

    /// Appends a stage.
    ///
    /// Standard stage names get their [`StageKind`]; use
    /// [`StageTableBuilder::kind`] for other names.
    #[must_use]
    pub fn stage(mut self, name: impl Into<String>, stage: Option<Arc<dyn Stage>>) -> Self {
        let name = name.into();
        let kind = StageKind::from_stage_name(&name);
        if self.duplicate.is_none() && self.stages.iter().any(|s| s.name == name) {
            self.duplicate = Some(name.clone());
        }
        self.stages.push(StageDescriptor {
            index: self.stages.len(),
            name,
            kind,
            stage,
        });
        self
    }

    /// Sets the runner of an already declared stage.
    pub fn attach(mut self, name: &str, stage: Arc<dyn Stage>) -> Result<Self, TableError> {
        let entry = self
            .stages
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| TableError::UnknownStage(name.to_string()))?;
        entry.stage = Some(stage);
        Ok(self)
    }

    /// Sets the error kind of an already declared stage.
    pub fn kind(mut self, name: &str, kind: StageKind) -> Result<Self, TableError> {
        let entry = self
            .stages
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| TableError::UnknownStage(name.to_string()))?;
        entry.kind = Some(kind);
        Ok(self)
    }

    /// Builds the table.
    pub fn build(self) -> Result<StageTable, TableError> {
        match self.duplicate {
            Some(name) => Err(TableError::DuplicateStage(name)),
            None => Ok(StageTable { stages: self.stages }),
        }
    }
}
