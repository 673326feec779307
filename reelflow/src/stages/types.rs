//! Type-keyed handler registries for blueprint nodes.

use crate::errors::StepTypeError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// The default discriminator entry of a blueprint node.
pub const TYPE_KEY: &str = "type";

/// Immutable map from a node's discriminator to its handler.
///
/// Registries are built once with [`TypeRegistryBuilder`] and shared by
/// reference, so concurrent runs never see each other's registrations.
#[derive(Clone)]
pub struct TypeRegistry<H> {
    handlers: HashMap<String, H>,
}

impl<H> fmt::Debug for TypeRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

impl<H> TypeRegistry<H> {
    /// Starts a new registry.
    #[must_use]
    pub fn builder() -> TypeRegistryBuilder<H> {
        TypeRegistryBuilder::new()
    }

    /// Returns the handler selected by the node's `type` entry.
    pub fn lookup(&self, node: &Value) -> Result<&H, StepTypeError> {
        self.lookup_by(node, TYPE_KEY)
    }

    /// Returns the handler selected by the node's `key` entry.
    pub fn lookup_by(&self, node: &Value, key: &str) -> Result<&H, StepTypeError> {
        let type_name = node
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| StepTypeError::Missing { key: key.to_string() })?;

        self.handlers.get(type_name).ok_or_else(|| StepTypeError::Unknown {
            type_name: type_name.to_string(),
        })
    }

    /// Returns true if a handler is registered for `type_name`.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.handlers.contains_key(type_name)
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for [`TypeRegistry`].
pub struct TypeRegistryBuilder<H> {
    handlers: HashMap<String, H>,
}

impl<H> Default for TypeRegistryBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> TypeRegistryBuilder<H> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `type_name`, replacing any earlier one.
    #[must_use]
    pub fn register(mut self, type_name: impl Into<String>, handler: H) -> Self {
        self.handlers.insert(type_name.into(), handler);
        self
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> TypeRegistry<H> {
        TypeRegistry {
            handlers: self.handlers,
        }
    }
}
