//! Typed branch evaluation for `option` and `compare` blueprint nodes.
//!
//! Both helpers pick one of the node's labeled sub-blueprint lists. A
//! branch that is absent evaluates to an empty list so a node may declare
//! only the side it cares about.

use super::StepData;
use crate::errors::StepKeyError;
use serde_json::Value;
use std::cmp::Ordering;

/// A comparison operator accepted in a `compare` node's `operator` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Parses an operator symbol.
    #[must_use]
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    const fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are false.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Orders two scalars: numbers numerically, strings lexicographically.
///
/// Returns `None` for any other pairing.
fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
        },
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    order(left, right).map_or_else(|| left == right, Ordering::is_eq)
}

impl StepData {
    /// Selects `on_true` or `on_false` of an `option` node.
    ///
    /// `check` is either a boolean, a `{...}` pattern or a bare key path;
    /// the resolved value is tested for truthiness.
    pub fn execute_option<'n>(&self, node: &'n Value) -> Result<&'n [Value], StepKeyError> {
        let check = node
            .get("check")
            .ok_or_else(|| Self::missing_entry("execute_option", "check"))?;

        let resolved = match check {
            Value::String(text) if text.contains('{') => self.format(check, node)?,
            Value::String(text) => self.get_data(text, node)?,
            other => other.clone(),
        };

        let branch = if is_truthy(&resolved) { "on_true" } else { "on_false" };
        branch_of(node, branch, "execute_option")
    }

    /// Selects a branch of a `compare` node.
    ///
    /// `value_left` and `value_right` are formatted first. With an
    /// `operator` the outcome selects `on_true`/`on_false`; without one the
    /// node uses `on_equal`, `on_not_equal`, `on_higher` and `on_lower`,
    /// where the last two fall back to `on_not_equal`.
    pub fn execute_compare<'n>(&self, node: &'n Value) -> Result<&'n [Value], StepKeyError> {
        let operand = |key: &str| {
            node.get(key)
                .ok_or_else(|| Self::missing_entry("execute_compare", key))
                .and_then(|pattern| self.format(pattern, node))
        };
        let left = operand("value_left")?;
        let right = operand("value_right")?;

        if let Some(symbol) = node.get("operator") {
            let op = symbol.as_str().and_then(CompareOp::parse).ok_or_else(|| {
                StepKeyError::invalid(
                    "execute_compare",
                    "operator",
                    format!("Unknown operator {symbol}"),
                )
            })?;

            let outcome = if op.is_equality() {
                values_equal(&left, &right) == (op == CompareOp::Eq)
            } else {
                let ordering = order(&left, &right).ok_or_else(|| not_ordered(&left, &right))?;
                op.holds(ordering)
            };
            let branch = if outcome { "on_true" } else { "on_false" };
            return branch_of(node, branch, "execute_compare");
        }

        if values_equal(&left, &right) {
            return branch_of(node, "on_equal", "execute_compare");
        }

        let directional = match order(&left, &right) {
            Some(Ordering::Greater) => Some("on_higher"),
            Some(Ordering::Less) => Some("on_lower"),
            _ => None,
        };
        match directional.filter(|key| node.get(*key).is_some()) {
            Some(key) => branch_of(node, key, "execute_compare"),
            None => branch_of(node, "on_not_equal", "execute_compare"),
        }
    }
}

fn branch_of<'n>(node: &'n Value, key: &str, func_name: &str) -> Result<&'n [Value], StepKeyError> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(StepKeyError::invalid(
            func_name,
            key,
            format!("Entry '{key}' must be a list"),
        )),
    }
}

fn not_ordered(left: &Value, right: &Value) -> StepKeyError {
    StepKeyError::invalid(
        "execute_compare",
        "operator",
        format!("Cannot order {left} and {right}"),
    )
}
