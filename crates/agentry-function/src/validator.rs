//! Schema checks applied to function inputs and outputs

use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Accepts a mapping of named values and returns the normalized mapping.
pub trait Validator: Send + Sync {
    fn validate(&self, value: Value) -> Result<Value, ValidationError>;

    fn schema(&self) -> Option<Value> {
        None
    }
}

fn require_object(value: Value) -> Result<Map<String, Value>, ValidationError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ValidationError::new(format!(
            "expected a mapping of named values, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Default validator: any mapping passes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyObject;

impl Validator for AnyObject {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        require_object(value).map(Value::Object)
    }
}

/// Validates against a JSON Schema compiled once at construction.
///
/// Missing properties that declare a `default` are filled in before the
/// check, so callables see the defaulted mapping.
#[derive(Clone)]
pub struct SchemaValidator {
    schema: Value,
    compiled: Result<Arc<jsonschema::Validator>, ValidationError>,
}

impl SchemaValidator {
    pub fn new(schema: Value) -> Self {
        let compiled = jsonschema::Validator::new(&schema)
            .map(Arc::new)
            .map_err(|e| {
                warn!("invalid schema: {}", e);
                ValidationError::new(format!("invalid schema: {}", e))
            });
        Self { schema, compiled }
    }

    fn fill_defaults(schema: &Value, map: &mut Map<String, Value>) {
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return;
        };
        for (name, prop_schema) in properties {
            match map.get_mut(name) {
                Some(Value::Object(nested)) => Self::fill_defaults(prop_schema, nested),
                Some(_) => {}
                None => {
                    if let Some(default) = prop_schema.get("default") {
                        map.insert(name.clone(), default.clone());
                    }
                }
            }
        }
    }
}

impl Validator for SchemaValidator {
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let validator = self.compiled.as_ref().map_err(Clone::clone)?;
        let mut map = require_object(value)?;
        Self::fill_defaults(&self.schema, &mut map);

        let value = Value::Object(map);
        let errors: Vec<String> = validator
            .iter_errors(&value)
            .map(|e| format!("${}: {}", e.instance_path, e))
            .collect();
        if errors.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError::new(errors.join("; ")))
        }
    }

    fn schema(&self) -> Option<Value> {
        Some(self.schema.clone())
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .field("compiled", &self.compiled.is_ok())
            .finish()
    }
}

/// Validates by round-tripping through a serde type, which also applies its
/// defaults and drops unknown fields.
pub struct TypedValidator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedValidator<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Validator for TypedValidator<T>
where
    T: DeserializeOwned + Serialize + JsonSchema,
{
    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let map = require_object(value)?;
        let typed: T = serde_json::from_value(Value::Object(map))
            .map_err(|e| ValidationError::new(e.to_string()))?;
        serde_json::to_value(typed).map_err(|e| ValidationError::new(e.to_string()))
    }

    fn schema(&self) -> Option<Value> {
        serde_json::to_value(schemars::schema_for!(T)).ok()
    }
}
