//! Built-in named transforms available to configured sources.
//!
//! Sources loaded from a config file can only refer to transforms by name,
//! so the application registers a small standard set.

use serde_json::{Map, Value};
use syncdeck_sources::{SourceRegistryBuilder, TransformError};

/// Register the built-in transforms on a registry builder.
///
/// - `count`: length of an array or object, 0 for null
/// - `first` / `last`: first or last array element
/// - `keys`: object keys as an array
/// - `values`: object values as an array
/// - `sum`: sum of numeric values in an array, or of the params object for
///   computed sources
pub fn register_builtin(builder: SourceRegistryBuilder) -> SourceRegistryBuilder {
    builder
        .transform("count", count)
        .transform("first", |value| element(value, false))
        .transform("last", |value| element(value, true))
        .transform("keys", |value| {
            let object = as_object(value)?;
            Ok(Value::Array(object.into_iter().map(|(k, _)| Value::String(k)).collect()))
        })
        .transform("values", |value| {
            let object = as_object(value)?;
            Ok(Value::Array(object.into_iter().map(|(_, v)| v).collect()))
        })
        .transform("sum", sum)
}

fn count(value: Value) -> Result<Value, TransformError> {
    match value {
        Value::Array(items) => Ok(items.len().into()),
        Value::Object(map) => Ok(map.len().into()),
        Value::Null => Ok(0.into()),
        other => Err(TransformError::new(format!("cannot count {}", kind(&other)))),
    }
}

fn element(value: Value, last: bool) -> Result<Value, TransformError> {
    let Value::Array(mut items) = value else {
        return Err(TransformError::new("expected an array"));
    };
    let item = if last { items.pop() } else { items.into_iter().next() };
    Ok(item.unwrap_or(Value::Null))
}

fn sum(value: Value) -> Result<Value, TransformError> {
    let numbers: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => return Err(TransformError::new(format!("cannot sum {}", kind(&other)))),
    };

    let mut total = 0.0;
    for number in &numbers {
        total += number
            .as_f64()
            .ok_or_else(|| TransformError::new(format!("not a number: {number}")))?;
    }

    if total.fract() == 0.0 && total.abs() < i64::MAX as f64 {
        Ok((total as i64).into())
    } else {
        Ok(total.into())
    }
}

fn as_object(value: Value) -> Result<Map<String, Value>, TransformError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TransformError::new(format!("expected an object, got {}", kind(&other)))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncdeck_sources::SourceRegistry;
    use syncdeck_types::{FetchOptions, SourceConfig, SourceKind};

    #[test]
    fn count_handles_collections() {
        assert_eq!(count(json!([1, 2, 3])).unwrap(), json!(3));
        assert_eq!(count(json!({"a": 1})).unwrap(), json!(1));
        assert_eq!(count(Value::Null).unwrap(), json!(0));
        assert!(count(json!("text")).is_err());
    }

    #[test]
    fn first_and_last() {
        assert_eq!(element(json!([1, 2, 3]), false).unwrap(), json!(1));
        assert_eq!(element(json!([1, 2, 3]), true).unwrap(), json!(3));
        assert_eq!(element(json!([]), false).unwrap(), Value::Null);
        assert!(element(json!({}), false).is_err());
    }

    #[test]
    fn sum_keeps_integers_integral() {
        assert_eq!(sum(json!([1, 2, 3])).unwrap(), json!(6));
        assert_eq!(sum(json!([0.5, 1])).unwrap(), json!(1.5));
        assert!(sum(json!(["x"])).is_err());
    }

    #[tokio::test]
    async fn computed_source_uses_builtin_sum() {
        let registry = register_builtin(SourceRegistry::builder()).build();
        registry.register(
            SourceConfig::new("total", SourceKind::Computed)
                .param("q1", 10)
                .param("q2", 32)
                .transform("sum"),
        );

        let response = registry.fetch("total", FetchOptions::default()).await;
        assert_eq!(response.data, Some(json!(42)));
    }

    #[tokio::test]
    async fn static_source_shaped_by_keys() {
        let registry = register_builtin(SourceRegistry::builder()).build();
        registry.register(
            SourceConfig::new("teams", SourceKind::Static)
                .body(json!({"growth": 3, "platform": 5}))
                .transform("keys"),
        );

        let response = registry.fetch("teams", FetchOptions::default()).await;
        assert_eq!(response.data, Some(json!(["growth", "platform"])));
    }
}
