//! Shared fixtures for integration tests.

#![allow(dead_code)]

use reelflow::resources::{FsResourceStore, ResourceConfig, ResourceStore};
use reelflow::stages::{Stage, StageTable, StageTableBuilder};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A resource root on disk with step definitions under `steps/`.
pub struct Fixture {
    pub root: TempDir,
    pub resources: Arc<dyn ResourceStore>,
}

impl Fixture {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("steps")).unwrap();
        let resources: Arc<dyn ResourceStore> = Arc::new(FsResourceStore::new(ResourceConfig::new(root.path())));
        Self { root, resources }
    }

    pub fn with_step(self, name: &str, definition: &Value) -> Self {
        fs::write(self.root.path().join(format!("steps/{name}.json")), definition.to_string()).unwrap();
        self
    }

    pub fn workspace(&self, run_id: &str) -> PathBuf {
        self.root.path().join("temp").join(run_id)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root.path().join("out")
    }

    /// Writes `content` to `out/<name>`.
    pub fn output(&self, name: &str, content: &str) {
        fs::create_dir_all(self.out_dir()).unwrap();
        fs::write(self.out_dir().join(name), content).unwrap();
    }

    pub fn read_output(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.out_dir().join(name)).ok()
    }

    pub fn outputs(&self) -> Vec<String> {
        list(&self.out_dir())
    }
}

pub fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// The standard table with `stages` attached.
pub fn table(stages: Vec<(&str, Arc<dyn Stage>)>) -> Arc<StageTable> {
    let mut builder = StageTableBuilder::standard();
    for (name, stage) in stages {
        builder = builder.attach(name, stage).unwrap();
    }
    Arc::new(builder.build().unwrap())
}

pub fn config(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
