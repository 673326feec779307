//! Stage trait and implementations.
//!
//! Stages are the named phases of a run (fetch, transform, persist, render,
//! assemble). Each one reads the declarative step config and the run's
//! [`StepData`] and may write to both.

mod image;
pub mod overlay;
mod table;
mod types;

pub use image::{Canvas, CanvasFactory, ImageSpec, ImageStage, TextSpec};
pub use overlay::{overlay_types, render_overlay, OverlayContext, OverlayFn, OverlayTypes};
pub use table::{StageDescriptor, StageTable, StageTableBuilder, STANDARD_STAGES};
pub use types::{TypeRegistry, TypeRegistryBuilder, TYPE_KEY};

use crate::context::StepData;
use crate::errors::StepError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

/// Trait for pipeline stages.
///
/// A stage receives the declarative step config (`values`) and the run's
/// data context. It may graft values into either for downstream stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// Any error aborts the run.
    async fn execute(&self, values: &mut Value, data: &mut StepData) -> Result<(), StepError>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&mut Value, &mut StepData) -> Result<(), StepError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&mut Value, &mut StepData) -> Result<(), StepError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&mut Value, &mut StepData) -> Result<(), StepError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&mut Value, &mut StepData) -> Result<(), StepError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, values: &mut Value, data: &mut StepData) -> Result<(), StepError> {
        (self.func)(values, data)
    }
}
