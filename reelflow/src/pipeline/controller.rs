//! The pipeline controller.
//!
//! A [`Pipeline`] is one run of a step definition through the shared
//! [`StageTable`]. It owns the run state machine, the run workspace and the
//! finished output paths; every failure inside [`Pipeline::start`] ends in
//! [`PipelineState::Error`] plus a logged diagnostic.

use super::notify::CompletionNotifier;
use super::retention::{OutputDirectory, OutputFiles, RetentionPolicy};
use super::state::PipelineState;
use crate::context::StepData;
use crate::errors::{raise_step_error, report, NotificationError, ReelflowError};
use crate::observability::StageTimer;
use crate::resources::ResourceStore;
use crate::stages::{Stage, StageDescriptor, StageTable};
use crate::utils::{elapsed_secs, file_timestamp, generate_run_id, now_utc, Timestamp, DEFAULT_TIME_FORMAT};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

const CURRENT_TIME_KEY: &str = "current_time";
const TIME_FORMAT_KEY: &str = "time_format";
const ON_COMPLETION_KEY: &str = "on_completion";
const JOB_NAME_KEY: &str = "job_name";

/// One run of a step definition.
pub struct Pipeline {
    id: String,
    step_name: String,
    run_config: Map<String, Value>,
    stages: Arc<StageTable>,
    resources: Arc<dyn ResourceStore>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    state: PipelineState,
    started: bool,
    start_time: Option<Timestamp>,
    end_time: Option<Timestamp>,
    outputs: OutputFiles,
}

impl Pipeline {
    /// Creates a run of `step_name` with id `id`.
    ///
    /// `id` names the run workspace and must be unique among active runs.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        step_name: impl Into<String>,
        run_config: Map<String, Value>,
        stages: Arc<StageTable>,
        resources: Arc<dyn ResourceStore>,
    ) -> Self {
        Self {
            id: id.into(),
            step_name: step_name.into(),
            run_config,
            stages,
            resources,
            notifier: None,
            state: PipelineState::NotStarted,
            started: false,
            start_time: None,
            end_time: None,
            outputs: OutputFiles::default(),
        }
    }

    /// Creates a run with a freshly generated id.
    #[must_use]
    pub fn for_step(
        step_name: impl Into<String>,
        run_config: Map<String, Value>,
        stages: Arc<StageTable>,
        resources: Arc<dyn ResourceStore>,
    ) -> Self {
        Self::new(generate_run_id(), step_name, run_config, stages, resources)
    }

    /// Attaches the notifier called after a successful run.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Returns the run id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the name of the step definition.
    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Returns the signed index of the current stage.
    ///
    /// -1 before the run, the stage index while running, `steps_max` when
    /// ready and -2 after a failure.
    #[must_use]
    pub fn current_step(&self) -> i64 {
        self.state.index(self.stages.steps_max())
    }

    /// Returns the display name of the current stage or sentinel.
    #[must_use]
    pub fn current_step_name(&self) -> &str {
        self.stages.name_of(self.state)
    }

    /// Returns `(current_step + 1, steps_max + 1)`.
    #[must_use]
    pub fn progress(&self) -> (i64, i64) {
        let steps_max = PipelineState::Ready.index(self.stages.steps_max());
        (self.current_step() + 1, steps_max + 1)
    }

    /// Returns when the stages started running.
    #[must_use]
    pub fn start_time(&self) -> Option<Timestamp> {
        self.start_time
    }

    /// Returns when the run became ready.
    #[must_use]
    pub fn end_time(&self) -> Option<Timestamp> {
        self.end_time
    }

    /// Returns the finished video and thumbnail paths.
    ///
    /// Populated once the run is ready, after retention moved them.
    #[must_use]
    pub fn outputs(&self) -> &OutputFiles {
        &self.outputs
    }

    /// Runs every stage and finalizes the outputs.
    ///
    /// Returns `true` if the run reached [`PipelineState::Ready`]. Errors
    /// are logged, never returned. A pipeline runs at most once; later
    /// calls return `false` and leave the state untouched.
    pub async fn start(&mut self) -> bool {
        if self.started {
            warn!(pipeline_id = %self.id, state = %self.state, "Pipeline was already started");
            return false;
        }
        self.started = true;

        let span = info_span!("pipeline", id = %self.id, steps = self.stages.steps_max());
        self.run().instrument(span).await
    }

    async fn run(&mut self) -> bool {
        info!(step = %self.step_name, "Initializing Pipeline");

        let mut workspace_created = false;
        let outcome = self.execute(&mut workspace_created).await;
        let success = match outcome {
            Ok(()) => true,
            Err(err) => {
                let failed_at = self.current_step_name().to_string();
                self.state = PipelineState::Error;
                error!(step = %failed_at, error = %report(&err), "Pipeline failed");
                false
            }
        };

        if workspace_created {
            self.cleanup();
        }
        success
    }

    async fn execute(&mut self, workspace_created: &mut bool) -> Result<(), ReelflowError> {
        let mut values = self.resources.load_step_definition(&self.step_name)?;
        let workspace = self.resources.workspace_create(&self.id)?;
        *workspace_created = true;

        let mut data = StepData::new(self.run_config.clone(), self.id.clone(), workspace);
        graft_current_time(&mut values);
        self.start_time = Some(now_utc());

        let stages = Arc::clone(&self.stages);
        for descriptor in stages.iter() {
            self.state = PipelineState::Running(descriptor.index);
            info!(index = descriptor.index, step = %descriptor.name, "Next step");

            let timer = StageTimer::start(descriptor.name.as_str());
            if let Some(stage) = &descriptor.stage {
                run_stage(stage.as_ref(), descriptor, &mut values, &mut data).await?;
            }
            info!(
                index = descriptor.index,
                step = %timer.name(),
                elapsed_ms = timer.elapsed_ms(),
                "Step finished"
            );
        }

        self.finalize(&mut values)?;
        self.state = PipelineState::Ready;
        let end_time = now_utc();
        self.end_time = Some(end_time);
        if let Some(start_time) = &self.start_time {
            let seconds = elapsed_secs(start_time, &end_time);
            info!(seconds, "Pipeline finished in {seconds}s");
        }

        self.notify(&values, &data).await;
        Ok(())
    }

    fn finalize(&mut self, values: &mut Value) -> Result<(), ReelflowError> {
        let mut outputs = OutputFiles::from_values(values);
        let policy = RetentionPolicy::from_run_config(&self.run_config);
        let dir = OutputDirectory::new(self.resources.output_dir());
        let stamp = values
            .get(CURRENT_TIME_KEY)
            .and_then(Value::as_str)
            .map_or_else(|| file_timestamp(DEFAULT_TIME_FORMAT), str::to_string);

        debug!(policy = ?policy, dir = %dir.path().display(), "Applying retention policy");
        policy.apply(&dir, self.job_name(), &stamp, &mut outputs)?;

        outputs.write_to(values);
        self.outputs = outputs;
        Ok(())
    }

    async fn notify(&self, values: &Value, data: &StepData) {
        let (Some(notifier), Some(spec)) = (&self.notifier, values.get(ON_COMPLETION_KEY)) else {
            return;
        };
        let outcome = AssertUnwindSafe(async { notifier.notify(spec, values, data).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(NotificationError::Panic(panic_message(payload.as_ref()))));
        if let Err(err) = outcome {
            warn!(error = %report(&err), "Completion notification failed");
        }
    }

    fn cleanup(&self) {
        info!("Cleaning up");
        if let Err(err) = self.resources.workspace_remove(&self.id) {
            debug!(error = %report(&err), "Could not remove workspace");
        }
    }

    fn job_name(&self) -> &str {
        self.run_config
            .get(JOB_NAME_KEY)
            .and_then(Value::as_str)
            .unwrap_or(&self.step_name)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("step_name", &self.step_name)
            .field("state", &self.state)
            .field("steps_max", &self.stages.steps_max())
            .field("has_notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

/// Sets `current_time` in the step definition, formatted with its
/// `time_format` entry.
fn graft_current_time(values: &mut Value) {
    let Value::Object(map) = values else {
        return;
    };
    let format = map
        .get(TIME_FORMAT_KEY)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TIME_FORMAT);
    let now = file_timestamp(format);
    map.insert(CURRENT_TIME_KEY.to_string(), Value::String(now));
}

/// Runs one stage, reporting its failures under the slot's [`StageKind`].
///
/// [`StageKind`]: crate::errors::StageKind
async fn run_stage(
    stage: &dyn Stage,
    descriptor: &StageDescriptor,
    values: &mut Value,
    data: &mut StepData,
) -> Result<(), ReelflowError> {
    let outcome = AssertUnwindSafe(async { stage.execute(values, data).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(result) => match descriptor.kind {
            Some(kind) => raise_step_error(kind, values, result).map_err(ReelflowError::from),
            None => result.map_err(ReelflowError::from),
        },
        Err(payload) => Err(ReelflowError::Panic {
            stage: descriptor.name.clone(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{StageKind, StepCause};
    use crate::pipeline::notify::MockCompletionNotifier;
    use crate::resources::{FsResourceStore, ResourceConfig};
    use crate::stages::StageTableBuilder;
    use crate::testing::{FailingStage, PanickingStage, RecordingStage};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(definition: &Value) -> (TempDir, Arc<dyn ResourceStore>) {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("steps")).unwrap();
        fs::write(root.path().join("steps/weather.json"), definition.to_string()).unwrap();
        let resources: Arc<dyn ResourceStore> = Arc::new(FsResourceStore::new(ResourceConfig::new(root.path())));
        (root, resources)
    }

    fn table(stages: Vec<(&str, Arc<dyn Stage>)>) -> Arc<StageTable> {
        let mut builder = StageTableBuilder::standard();
        for (name, stage) in stages {
            builder = builder.attach(name, stage).unwrap();
        }
        Arc::new(builder.build().unwrap())
    }

    #[tokio::test]
    async fn test_successful_run() {
        let (root, resources) = fixture(&json!({"time_format": "%Y"}));
        let recorder = Arc::new(RecordingStage::new("Storing"));
        let mut pipeline = Pipeline::new(
            "run-1",
            "weather",
            Map::new(),
            table(vec![("Storing", recorder.clone() as Arc<dyn Stage>)]),
            resources,
        );

        assert_eq!(pipeline.current_step(), -1);
        assert_eq!(pipeline.current_step_name(), "Not Started");
        assert!(pipeline.start().await);

        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.current_step(), 7);
        assert_eq!(pipeline.current_step_name(), "Ready");
        assert_eq!(pipeline.progress(), (8, 8));
        assert!(pipeline.start_time().is_some());
        assert!(pipeline.end_time() >= pipeline.start_time());

        let executions = recorder.executions();
        assert_eq!(executions.len(), 1);
        assert!(executions[0].workspace_existed);
        assert_eq!(executions[0].values["current_time"].as_str().map(str::len), Some(4));
        assert!(!root.path().join("temp/run-1").exists());
    }

    #[tokio::test]
    async fn test_failing_stage_stops_the_run() {
        let (root, resources) = fixture(&json!({}));
        let later = Arc::new(RecordingStage::new("Sequence"));
        let mut pipeline = Pipeline::new(
            "run-2",
            "weather",
            Map::new(),
            table(vec![
                ("Images", Arc::new(FailingStage::new("Images", StageKind::Images, "no font")) as Arc<dyn Stage>),
                ("Sequence", later.clone() as Arc<dyn Stage>),
            ]),
            resources,
        );

        assert!(!pipeline.start().await);
        assert_eq!(pipeline.state(), PipelineState::Error);
        assert_eq!(pipeline.current_step(), -2);
        assert_eq!(pipeline.current_step_name(), "Error");
        assert_eq!(pipeline.progress(), (-1, 8));
        assert_eq!(later.execution_count(), 0);
        assert!(pipeline.end_time().is_none());
        assert!(!root.path().join("temp/run-2").exists());
    }

    #[tokio::test]
    async fn test_panicking_stage_is_an_error() {
        let (root, resources) = fixture(&json!({}));
        let mut pipeline = Pipeline::new(
            "run-3",
            "weather",
            Map::new(),
            table(vec![("Audios", Arc::new(PanickingStage::new("Audios")) as Arc<dyn Stage>)]),
            resources,
        );

        assert!(!pipeline.start().await);
        assert_eq!(pipeline.state(), PipelineState::Error);
        assert!(!root.path().join("temp/run-3").exists());
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let (_root, resources) = fixture(&json!({}));
        let recorder = Arc::new(RecordingStage::new("Apis"));
        let mut pipeline = Pipeline::new(
            "run-4",
            "weather",
            Map::new(),
            table(vec![("Apis", recorder.clone() as Arc<dyn Stage>)]),
            resources,
        );

        assert!(pipeline.start().await);
        assert!(!pipeline.start().await);
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(recorder.execution_count(), 1);
    }

    #[tokio::test]
    async fn test_notifier_receives_completion_spec() {
        let (_root, resources) = fixture(&json!({"on_completion": {"url": "http://localhost/{_pipe_id}"}}));
        let mut notifier = MockCompletionNotifier::new();
        notifier
            .expect_notify()
            .withf(|spec, _values, data| spec["url"] == "http://localhost/{_pipe_id}" && data.pipe_id() == "run-5")
            .times(1)
            .returning(|_, _, _| Err(crate::errors::NotificationError::Method("BAD".into())));

        let mut pipeline = Pipeline::new("run-5", "weather", Map::new(), table(Vec::new()), resources)
            .with_notifier(Arc::new(notifier));

        assert!(pipeline.start().await);
        assert_eq!(pipeline.state(), PipelineState::Ready);
    }

    #[tokio::test]
    async fn test_panicking_notifier_still_cleans_up() {
        let (root, resources) = fixture(&json!({"on_completion": {"url": "http://localhost/done"}}));
        let mut notifier = MockCompletionNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_, _, _| panic!("notifier exploded"));

        let mut pipeline = Pipeline::new("run-8", "weather", Map::new(), table(Vec::new()), resources)
            .with_notifier(Arc::new(notifier));

        assert!(pipeline.start().await);
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert!(!root.path().join("temp/run-8").exists());
    }

    #[tokio::test]
    async fn test_stage_error_takes_slot_kind() {
        let stages = table(vec![(
            "Images",
            Arc::new(FailingStage::new("Images", StageKind::Transform, "bad rule")) as Arc<dyn Stage>,
        )]);
        let descriptor = stages.get(3).unwrap();
        let stage = descriptor.stage.clone().unwrap();
        let mut values = json!({});
        let mut data = StepData::new(Map::new(), "run-9", "/tmp/run-9");

        let err = run_stage(stage.as_ref(), descriptor, &mut values, &mut data)
            .await
            .unwrap_err();
        let ReelflowError::Step(err) = err else {
            panic!("expected a stage error");
        };
        assert_eq!(err.kind, StageKind::Images);
        assert!(matches!(&err.cause, StepCause::Nested(inner) if inner.kind == StageKind::Transform));
    }

    #[tokio::test]
    async fn test_stage_error_of_slot_kind_passes_through() {
        let stages = table(vec![(
            "Images",
            Arc::new(FailingStage::new("Images", StageKind::Images, "no font")) as Arc<dyn Stage>,
        )]);
        let descriptor = stages.get(3).unwrap();
        let stage = descriptor.stage.clone().unwrap();
        let mut values = json!({});
        let mut data = StepData::new(Map::new(), "run-10", "/tmp/run-10");

        let err = run_stage(stage.as_ref(), descriptor, &mut values, &mut data)
            .await
            .unwrap_err();
        assert!(matches!(err, ReelflowError::Step(ref step) if matches!(step.cause, StepCause::Other(_))));
    }

    #[tokio::test]
    async fn test_notifier_skipped_without_spec() {
        let (_root, resources) = fixture(&json!({}));
        let mut notifier = MockCompletionNotifier::new();
        notifier.expect_notify().times(0);

        let mut pipeline = Pipeline::new("run-6", "weather", Map::new(), table(Vec::new()), resources)
            .with_notifier(Arc::new(notifier));

        assert!(pipeline.start().await);
    }

    #[test]
    fn test_job_name_defaults_to_step_name() {
        let (_root, resources) = fixture(&json!({}));
        let pipeline = Pipeline::for_step("weather", Map::new(), table(Vec::new()), Arc::clone(&resources));
        assert_eq!(pipeline.job_name(), "weather");
        assert_eq!(pipeline.id().len(), 36);

        let mut config = Map::new();
        config.insert("job_name".into(), json!("weather_giessen"));
        let pipeline = Pipeline::new("run-7", "weather", config, table(Vec::new()), resources);
        assert_eq!(pipeline.job_name(), "weather_giessen");
    }

    #[test]
    fn test_graft_current_time() {
        let mut values = json!({"time_format": "%Q"});
        graft_current_time(&mut values);
        assert_eq!(values["current_time"].as_str().map(str::len), Some(19));

        let mut values = json!([1]);
        graft_current_time(&mut values);
        assert_eq!(values, json!([1]));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
