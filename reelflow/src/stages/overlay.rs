//! Overlay dispatch for the image stages.
//!
//! An image blueprint carries a list of overlay nodes. Each node's `type`
//! selects a handler from [`OverlayTypes`]; `option` and `compare` nodes
//! pick a branch and dispatch its nodes through the same registry.

use super::image::{Canvas, ImageSpec, TextSpec};
use super::types::TypeRegistry;
use crate::context::StepData;
use crate::errors::{raise_step_error, StageKind, StepCause, StepError, StepKeyError};
use crate::resources::{ResourceKind, ResourceStore};
use serde_json::{json, Map, Value};

/// Signature of an overlay handler.
pub type OverlayFn = fn(&Value, &mut dyn Canvas, &OverlayContext<'_>) -> Result<(), StepError>;

/// Registry of overlay handlers keyed by node type.
pub type OverlayTypes = TypeRegistry<OverlayFn>;

/// Everything an overlay handler reads besides its own node.
#[derive(Debug, Clone, Copy)]
pub struct OverlayContext<'a> {
    /// The `presets` section of the step definition.
    pub presets: &'a Value,
    /// The run's data context.
    pub data: &'a StepData,
    /// The registry used for nested dispatch.
    pub types: &'a OverlayTypes,
    /// Resolves fonts and image assets.
    pub resources: &'a dyn ResourceStore,
}

/// Builds the standard overlay registry.
#[must_use]
pub fn overlay_types() -> OverlayTypes {
    TypeRegistry::builder()
        .register("text", text as OverlayFn)
        .register("text_array", text_array as OverlayFn)
        .register("option", option as OverlayFn)
        .register("compare", compare as OverlayFn)
        .register("image", image as OverlayFn)
        .register("image_array", image_array as OverlayFn)
        .build()
}

/// Looks up the handler for `overlay` and applies it to `canvas`.
pub fn render_overlay(overlay: &Value, canvas: &mut dyn Canvas, ctx: &OverlayContext<'_>) -> Result<(), StepError> {
    let handler = raise_step_error(StageKind::Images, overlay, ctx.types.lookup(overlay))?;
    handler(overlay, canvas, ctx)
}

fn entry<'v>(node: &'v Value, key: &str) -> Result<&'v Value, StepCause> {
    node.get(key).ok_or_else(|| StepCause::MissingEntry(key.to_string()))
}

/// Returns `node[key][idx]` for a list entry, or `node[key]` for a scalar.
fn pick<'v>(node: &'v Value, key: &str, idx: usize) -> Result<&'v Value, StepCause> {
    match entry(node, key)? {
        Value::Array(items) => items
            .get(idx)
            .ok_or_else(|| StepCause::MissingEntry(format!("{key}|{idx}"))),
        scalar => Ok(scalar),
    }
}

fn preset<'a>(overlay: &Value, ctx: &OverlayContext<'a>) -> Result<&'a Value, StepCause> {
    let name = ctx.data.format_str(entry(overlay, "preset")?, overlay)?;
    ctx.presets.get(&name).ok_or_else(|| {
        StepKeyError::invalid("preset", name.clone(), format!("Preset '{name}' does not exist")).into()
    })
}

fn text(overlay: &Value, canvas: &mut dyn Canvas, ctx: &OverlayContext<'_>) -> Result<(), StepError> {
    raise_step_error(StageKind::Images, overlay, draw_text(overlay, canvas, ctx))
}

fn draw_text(overlay: &Value, canvas: &mut dyn Canvas, ctx: &OverlayContext<'_>) -> Result<(), StepCause> {
    let data = ctx.data;
    let preset = preset(overlay, ctx)?;
    let anchor = match overlay.get("anchor_point") {
        Some(anchor) => data.format_str(anchor, overlay)?,
        None => "left".to_string(),
    };
    let font = data.format_str(entry(preset, "font")?, overlay)?;

    let spec = TextSpec {
        anchor,
        x: data.format_as(entry(overlay, "pos_x")?, overlay)?,
        y: data.format_as(entry(overlay, "pos_y")?, overlay)?,
        content: data.format_str(entry(overlay, "pattern")?, overlay)?,
        font_size: data.format_as(entry(preset, "font_size")?, overlay)?,
        color: data.format_str(entry(preset, "color")?, overlay)?,
        font: ctx.resources.resolve_named_resource(ResourceKind::Font, &font),
    };
    canvas.draw_text(&spec)?;
    Ok(())
}

fn text_array(overlay: &Value, canvas: &mut dyn Canvas, ctx: &OverlayContext<'_>) -> Result<(), StepError> {
    let count = raise_step_error(StageKind::Images, overlay, positions(overlay))?;
    for idx in 0..count {
        let node = raise_step_error(StageKind::Images, overlay, text_node(overlay, idx))?;
        text(&node, canvas, ctx)?;
    }
    Ok(())
}

fn text_node(overlay: &Value, idx: usize) -> Result<Value, StepCause> {
    let mut node = Map::new();
    if let Some(anchor) = overlay.get("anchor_point") {
        node.insert("anchor_point".into(), anchor.clone());
    }
    for key in ["pos_x", "pos_y", "pattern", "preset"] {
        node.insert(key.into(), pick(overlay, key, idx)?.clone());
    }
    Ok(Value::Object(node))
}

fn option(overlay: &Value, canvas: &mut dyn Canvas, ctx: &OverlayContext<'_>) -> Result<(), StepError> {
    let chosen = raise_step_error(StageKind::Images, overlay, ctx.data.execute_option(overlay))?;
    for node in chosen {
        render_overlay(node, canvas, ctx)?;
    }
    Ok(())
}

fn compare(overlay: &Value, canvas: &mut dyn Canvas, ctx: &OverlayContext<'_>) -> Result<(), StepError> {
    let chosen = raise_step_error(StageKind::Images, overlay, ctx.data.execute_compare(overlay))?;
    for node in chosen {
        render_overlay(node, canvas, ctx)?;
    }
    Ok(())
}

fn image(overlay: &Value, canvas: &mut dyn Canvas, ctx: &OverlayContext<'_>) -> Result<(), StepError> {
    raise_step_error(StageKind::Images, overlay, paste_image(overlay, canvas, ctx))
}

fn paste_image(overlay: &Value, canvas: &mut dyn Canvas, ctx: &OverlayContext<'_>) -> Result<(), StepCause> {
    let data = ctx.data;
    let path = data.format_str(entry(overlay, "path")?, overlay)?;

    let color = match overlay.get("color") {
        None | Some(Value::Null) => None,
        Some(color) => Some(data.format_str(color, overlay)?).filter(|c| c != "RGBA"),
    };
    let size = match (overlay.get("size_x"), overlay.get("size_y")) {
        (Some(w), Some(h)) if !w.is_null() && !h.is_null() => {
            Some((data.format_as(w, overlay)?, data.format_as(h, overlay)?))
        }
        _ => None,
    };

    let spec = ImageSpec {
        path: ctx.resources.resolve_named_resource(ResourceKind::Image, &path),
        x: data.format_as(entry(overlay, "pos_x")?, overlay)?,
        y: data.format_as(entry(overlay, "pos_y")?, overlay)?,
        size,
        color,
        transparency: overlay.get("transparency").and_then(Value::as_bool).unwrap_or(false),
    };
    canvas.paste_image(&spec)?;
    Ok(())
}

fn image_array(overlay: &Value, canvas: &mut dyn Canvas, ctx: &OverlayContext<'_>) -> Result<(), StepError> {
    let count = raise_step_error(StageKind::Images, overlay, positions(overlay))?;
    for idx in 0..count {
        let node = raise_step_error(StageKind::Images, overlay, image_node(overlay, idx))?;
        image(&node, canvas, ctx)?;
    }
    Ok(())
}

fn image_node(overlay: &Value, idx: usize) -> Result<Value, StepCause> {
    let mut node = json!({
        "size_x": overlay.get("size_x").cloned().unwrap_or(Value::Null),
        "size_y": overlay.get("size_y").cloned().unwrap_or(Value::Null),
        "transparency": overlay.get("transparency").cloned().unwrap_or(Value::Bool(false)),
    });
    for key in ["pos_x", "pos_y", "path"] {
        node[key] = pick(overlay, key, idx)?.clone();
    }
    if overlay.get("color").is_some() {
        node["color"] = pick(overlay, "color", idx)?.clone();
    }
    Ok(node)
}

/// Number of elements in an array overlay, taken from its `pos_x` list.
fn positions(overlay: &Value) -> Result<usize, StepCause> {
    entry(overlay, "pos_x")?
        .as_array()
        .map(Vec::len)
        .ok_or_else(|| StepKeyError::invalid("pos_x", "pos_x", "Entry 'pos_x' must be a list").into())
}
