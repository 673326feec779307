//! The image rendering stage.
//!
//! Pixel work is delegated to a [`CanvasFactory`]; this stage only walks the
//! image blueprints, dispatches their overlays and records where each
//! finished image was written.

use super::overlay::{overlay_types, render_overlay, OverlayContext, OverlayTypes};
use super::Stage;
use crate::context::StepData;
use crate::errors::{raise_step_error, StageKind, StepCause, StepError, StepKeyError};
use crate::resources::{ResourceKind, ResourceStore};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A text draw request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpec {
    /// Anchor point name (`left`, `center`, ...).
    pub anchor: String,
    /// Horizontal position.
    pub x: i64,
    /// Vertical position.
    pub y: i64,
    /// The text to draw.
    pub content: String,
    /// Font size in points.
    pub font_size: i64,
    /// Color name or hex code.
    pub color: String,
    /// Absolute path of the font file.
    pub font: PathBuf,
}

/// An image paste request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    /// Absolute path of the image to paste.
    pub path: PathBuf,
    /// Horizontal position.
    pub x: i64,
    /// Vertical position.
    pub y: i64,
    /// Target size, if the image should be resized.
    pub size: Option<(u32, u32)>,
    /// Color mode to convert to; `None` keeps RGBA.
    pub color: Option<String>,
    /// Alpha-composite instead of pasting.
    pub transparency: bool,
}

/// A drawable image.
pub trait Canvas: Send {
    /// Draws text.
    fn draw_text(&mut self, text: &TextSpec) -> anyhow::Result<()>;

    /// Pastes another image.
    fn paste_image(&mut self, image: &ImageSpec) -> anyhow::Result<()>;
}

/// Opens and saves canvases.
pub trait CanvasFactory: Send + Sync + Debug {
    /// The canvas type produced.
    type Canvas: Canvas + 'static;

    /// Opens `base` as a new canvas.
    fn open(&self, base: &Path) -> anyhow::Result<Self::Canvas>;

    /// Writes a finished canvas to `path`.
    fn save(&self, canvas: Self::Canvas, path: &Path) -> anyhow::Result<()>;
}

/// Renders every entry of the step definition's `images` section.
///
/// Each entry names a base image (`path`) and a list of `overlay` nodes.
/// With `already_created` set, `path` names an image rendered earlier in
/// the same pass. The finished file is written to `<workspace>/<name>.png`
/// and its path replaces the blueprint in `values["images"]`.
#[derive(Debug)]
pub struct ImageStage<F> {
    factory: F,
    resources: Arc<dyn ResourceStore>,
    types: Arc<OverlayTypes>,
}

impl<F: CanvasFactory> ImageStage<F> {
    /// Creates an image stage with the standard overlay types.
    #[must_use]
    pub fn new(factory: F, resources: Arc<dyn ResourceStore>) -> Self {
        Self {
            factory,
            resources,
            types: Arc::new(overlay_types()),
        }
    }

    /// Replaces the overlay registry.
    #[must_use]
    pub fn with_types(mut self, types: Arc<OverlayTypes>) -> Self {
        self.types = types;
        self
    }

    fn render(&self, name: &str, node: &Value, images: &Map<String, Value>, presets: &Value, data: &StepData) -> Result<PathBuf, StepCause> {
        let path = node.get("path").ok_or_else(|| StepCause::MissingEntry("path".into()))?;
        let path = data.format_str(path, node)?;

        let already_created = node.get("already_created").and_then(Value::as_bool).unwrap_or(false);
        let base = if already_created {
            images
                .get(&path)
                .and_then(Value::as_str)
                .map(PathBuf::from)
                .ok_or_else(|| StepKeyError::invalid("images", path.clone(), format!("Image '{path}' was not created yet")))?
        } else {
            self.resources.resolve_named_resource(ResourceKind::Image, &path)
        };

        let mut canvas = self.factory.open(&base)?;
        let ctx = OverlayContext {
            presets,
            data,
            types: &self.types,
            resources: self.resources.as_ref(),
        };
        if let Some(overlays) = node.get("overlay").and_then(Value::as_array) {
            for overlay in overlays {
                render_overlay(overlay, &mut canvas, &ctx)?;
            }
        }

        let out = data.temp_path(&format!("{name}.png"));
        self.factory.save(canvas, &out)?;
        Ok(out)
    }
}

#[async_trait]
impl<F: CanvasFactory> Stage for ImageStage<F> {
    fn name(&self) -> &str {
        "Images"
    }

    async fn execute(&self, values: &mut Value, data: &mut StepData) -> Result<(), StepError> {
        let mut images = match values.get("images") {
            None => return Ok(()),
            Some(Value::Object(images)) => images.clone(),
            Some(_) => {
                let err = StepKeyError::invalid("images", "images", "Entry 'images' must be a mapping");
                return Err(StepError::bare(StageKind::Images, err));
            }
        };
        let presets = values.get("presets").cloned().unwrap_or_else(|| Value::Object(Map::new()));

        let names: Vec<String> = images.keys().cloned().collect();
        for name in names {
            let node = images.get(&name).cloned().unwrap_or(Value::Null);
            let path = raise_step_error(
                StageKind::Images,
                &node,
                self.render(&name, &node, &images, &presets, data),
            )?;
            debug!(image = %name, path = %path.display(), "Rendered image");
            images.insert(name, Value::String(path.to_string_lossy().into_owned()));
        }

        if let Some(slot) = values.get_mut("images") {
            *slot = Value::Object(images);
        }
        Ok(())
    }
}
