//! Canvas doubles.

use crate::stages::{Canvas, CanvasFactory, ImageSpec, TextSpec};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One recorded canvas operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasOp {
    /// A base image was opened.
    Open(PathBuf),
    /// Text was drawn.
    Text(TextSpec),
    /// An image was pasted.
    Image(ImageSpec),
    /// The canvas was saved.
    Save(PathBuf),
}

/// A canvas that records every operation.
#[derive(Debug, Default)]
pub struct RecordingCanvas {
    ops: Arc<Mutex<Vec<CanvasOp>>>,
    fail_text: bool,
}

impl RecordingCanvas {
    /// Returns the operations recorded so far.
    #[must_use]
    pub fn ops(&self) -> Vec<CanvasOp> {
        self.ops.lock().clone()
    }
}

impl Canvas for RecordingCanvas {
    fn draw_text(&mut self, text: &TextSpec) -> anyhow::Result<()> {
        if self.fail_text {
            anyhow::bail!("cannot draw '{}'", text.content);
        }
        self.ops.lock().push(CanvasOp::Text(text.clone()));
        Ok(())
    }

    fn paste_image(&mut self, image: &ImageSpec) -> anyhow::Result<()> {
        self.ops.lock().push(CanvasOp::Image(image.clone()));
        Ok(())
    }
}

/// A canvas factory sharing one operation log across all its canvases.
///
/// Saving writes an empty file so later steps can find it.
#[derive(Debug, Clone, Default)]
pub struct RecordingCanvasFactory {
    ops: Arc<Mutex<Vec<CanvasOp>>>,
    fail_text: bool,
}

impl RecordingCanvasFactory {
    /// Makes every text draw fail.
    #[must_use]
    pub fn failing_text(mut self) -> Self {
        self.fail_text = true;
        self
    }

    /// Returns all operations recorded so far.
    #[must_use]
    pub fn ops(&self) -> Vec<CanvasOp> {
        self.ops.lock().clone()
    }
}

impl CanvasFactory for RecordingCanvasFactory {
    type Canvas = RecordingCanvas;

    fn open(&self, base: &Path) -> anyhow::Result<RecordingCanvas> {
        self.ops.lock().push(CanvasOp::Open(base.to_path_buf()));
        Ok(RecordingCanvas {
            ops: Arc::clone(&self.ops),
            fail_text: self.fail_text,
        })
    }

    fn save(&self, _canvas: RecordingCanvas, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, [])?;
        self.ops.lock().push(CanvasOp::Save(path.to_path_buf()));
        Ok(())
    }
}
