//! Resource store: step definitions, run workspaces and named assets.
//!
//! Everything lives under one resource root:
//!
//! ```text
//! <root>/steps/<name>.json     step definitions
//! <root>/temp/<run_id>/        per-run workspaces
//! <root>/out/                  finished videos and thumbnails
//! <root>/images|fonts|audio/   named assets
//! ```

use crate::errors::ResourceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding the resource root.
pub const RESOURCES_ENV: &str = "REELFLOW_RESOURCES";

/// Directory layout of a resource root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// The resource root.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Step definitions, relative to the root.
    #[serde(default = "default_steps_dir")]
    pub steps_dir: PathBuf,
    /// Run workspaces, relative to the root.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Finished outputs, relative to the root.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Base images and icons, relative to the root.
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
    /// Fonts, relative to the root.
    #[serde(default = "default_fonts_dir")]
    pub fonts_dir: PathBuf,
    /// Audio assets, relative to the root.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from("resources")
}

fn default_steps_dir() -> PathBuf {
    PathBuf::from("steps")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_fonts_dir() -> PathBuf {
    PathBuf::from("fonts")
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("audio")
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            steps_dir: default_steps_dir(),
            temp_dir: default_temp_dir(),
            output_dir: default_output_dir(),
            images_dir: default_images_dir(),
            fonts_dir: default_fonts_dir(),
            audio_dir: default_audio_dir(),
        }
    }
}

impl ResourceConfig {
    /// Creates a configuration rooted at `root` with default subdirectories.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Reads the root from `REELFLOW_RESOURCES`, falling back to `resources`.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var_os(RESOURCES_ENV).map_or_else(Self::default, Self::new)
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the workspace directory.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }
}

/// Kind of named asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Base images and icons.
    Image,
    /// Fonts.
    Font,
    /// Audio files.
    Audio,
}

/// Storage for everything a run reads or produces outside its data context.
pub trait ResourceStore: Send + Sync + Debug {
    /// Loads and parses the step definition `name`.
    fn load_step_definition(&self, name: &str) -> Result<Value, ResourceError>;

    /// Creates the private workspace of `run_id` and returns its path.
    ///
    /// Fails if the workspace already exists.
    fn workspace_create(&self, run_id: &str) -> Result<PathBuf, ResourceError>;

    /// Removes the workspace of `run_id` and everything in it.
    fn workspace_remove(&self, run_id: &str) -> Result<(), ResourceError>;

    /// Returns the path of `filename` inside the workspace of `run_id`.
    fn resolve_temp_path(&self, run_id: &str, filename: &str) -> PathBuf;

    /// Returns the absolute path of a named asset.
    fn resolve_named_resource(&self, kind: ResourceKind, relative_path: &str) -> PathBuf;

    /// Returns the directory finished outputs are kept in.
    fn output_dir(&self) -> PathBuf;
}

/// Filesystem-backed resource store.
#[derive(Debug, Clone)]
pub struct FsResourceStore {
    config: ResourceConfig,
    root: PathBuf,
}

impl FsResourceStore {
    /// Creates a store over `config`.
    ///
    /// A relative root is made absolute against the current directory.
    #[must_use]
    pub fn new(config: ResourceConfig) -> Self {
        let root = std::path::absolute(&config.root).unwrap_or_else(|_| config.root.clone());
        Self { config, root }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Returns the absolute resource root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn step_path(&self, name: &str) -> PathBuf {
        self.root.join(&self.config.steps_dir).join(format!("{name}.json"))
    }

    fn workspace_path(&self, run_id: &str) -> PathBuf {
        self.root.join(&self.config.temp_dir).join(run_id)
    }
}

impl ResourceStore for FsResourceStore {
    fn load_step_definition(&self, name: &str) -> Result<Value, ResourceError> {
        let path = self.step_path(name);
        let text = fs::read_to_string(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                ResourceError::StepDefinitionNotFound {
                    name: name.to_string(),
                    path: path.clone(),
                }
            } else {
                ResourceError::Read {
                    name: name.to_string(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&text).map_err(|source| ResourceError::Malformed {
            name: name.to_string(),
            source,
        })
    }

    fn workspace_create(&self, run_id: &str) -> Result<PathBuf, ResourceError> {
        let path = self.workspace_path(run_id);
        let create = |path: &Path| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::create_dir(path)
        };

        create(&path).map_err(|source| ResourceError::WorkspaceCreate {
            path: path.clone(),
            source,
        })?;
        debug!(run_id, path = %path.display(), "Created workspace");
        Ok(path)
    }

    fn workspace_remove(&self, run_id: &str) -> Result<(), ResourceError> {
        let path = self.workspace_path(run_id);
        fs::remove_dir_all(&path).map_err(|source| ResourceError::WorkspaceRemove { path, source })
    }

    fn resolve_temp_path(&self, run_id: &str, filename: &str) -> PathBuf {
        self.workspace_path(run_id).join(filename)
    }

    fn resolve_named_resource(&self, kind: ResourceKind, relative_path: &str) -> PathBuf {
        let dir = match kind {
            ResourceKind::Image => &self.config.images_dir,
            ResourceKind::Font => &self.config.fonts_dir,
            ResourceKind::Audio => &self.config.audio_dir,
        };
        self.root.join(dir).join(relative_path)
    }

    fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.output_dir)
    }
}
