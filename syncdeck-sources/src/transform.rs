//! Named data-shaping functions.
//!
//! Sources refer to transforms by name; the functions themselves are
//! registered once on the [`SourceRegistryBuilder`](crate::SourceRegistryBuilder).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::TransformError;

/// A transform takes the fetched (or, for computed sources, the params) value
/// and returns the shaped value.
pub type TransformFn = Arc<dyn Fn(Value) -> Result<Value, TransformError> + Send + Sync>;

/// Transforms keyed by name.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`, replacing any previous transform.
    pub fn insert<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        self.transforms.insert(name.into(), Arc::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// Run the named transform.
    pub fn apply(&self, name: &str, value: Value) -> Result<Value, TransformError> {
        let transform = self
            .transforms
            .get(name)
            .ok_or_else(|| TransformError::new(format!("unknown transform '{name}'")))?;
        transform(value)
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.transforms.keys().collect();
        names.sort();
        f.debug_struct("TransformRegistry")
            .field("transforms", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn applies_registered_transform() {
        let mut registry = TransformRegistry::new();
        registry.insert("count", |value: Value| {
            let len = value.as_array().map(Vec::len).unwrap_or(0);
            Ok(json!({ "count": len }))
        });

        assert!(registry.contains("count"));
        assert_eq!(
            registry.apply("count", json!([1, 2, 3])).unwrap(),
            json!({"count": 3})
        );
    }

    #[test]
    fn unknown_transform_is_an_error() {
        let registry = TransformRegistry::new();
        let err = registry.apply("missing", json!(null)).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
