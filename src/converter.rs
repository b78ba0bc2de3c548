//! Type converter registry.
//!
//! Maps a column's [`TypeDescriptor`] to a function that turns the raw JSON
//! value into a [`Value`]. Scalars look up a per-kind transform and fall back
//! to a configurable default; arrays resolve their element transform
//! recursively and map it over the input.

use crate::error::{MonkError, MonkResult};
use crate::types::{DataType, TypeDescriptor};
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// A value transform. Cheap to clone and safe to share across tasks.
pub type ConverterFn = Arc<dyn Fn(&JsonValue) -> Value + Send + Sync>;

/// Wrap a closure as a [`ConverterFn`].
pub fn converter_fn<F>(f: F) -> ConverterFn
where
    F: Fn(&JsonValue) -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Registry of per-kind converters plus a fallback.
///
/// # Example
/// ```
/// use monkdb::{Converter, DataType, TypeDescriptor, Value};
/// use serde_json::json;
///
/// let converter = Converter::standard();
/// let ip = converter.resolve(&TypeDescriptor::Base(DataType::Ip)).unwrap();
/// assert_eq!(ip(&json!("not-an-ip")), Value::Null);
/// ```
#[derive(Clone)]
pub struct Converter {
    mappings: HashMap<DataType, ConverterFn>,
    fallback: ConverterFn,
}

impl Converter {
    /// Registry with no mappings: every kind goes through the identity transform.
    pub fn new() -> Self {
        Self::with_fallback(converter_fn(identity))
    }

    /// Registry with no mappings and a custom fallback.
    pub fn with_fallback(fallback: ConverterFn) -> Self {
        Self {
            mappings: HashMap::new(),
            fallback,
        }
    }

    /// The standard registry: IP validation and epoch-millisecond timestamps.
    pub fn standard() -> Self {
        let mut converter = Self::new();
        converter.set(DataType::Ip, converter_fn(convert_ip));
        let timestamp = converter_fn(convert_timestamp);
        converter.set(DataType::TimestampWithTz, timestamp.clone());
        converter.set(DataType::TimestampWithoutTz, timestamp);
        converter
    }

    /// The standard registry with some kinds replaced.
    pub fn standard_with(overrides: impl IntoIterator<Item = (DataType, ConverterFn)>) -> Self {
        let mut converter = Self::standard();
        for (kind, f) in overrides {
            converter.set(kind, f);
        }
        converter
    }

    /// Register (or replace) the transform for one kind.
    pub fn set(&mut self, kind: DataType, f: ConverterFn) {
        self.mappings.insert(kind, f);
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, kind: DataType, f: ConverterFn) -> Self {
        self.set(kind, f);
        self
    }

    /// Whether a kind has its own transform (as opposed to the fallback).
    pub fn has_mapping(&self, kind: DataType) -> bool {
        self.mappings.contains_key(&kind)
    }

    /// Resolve the transform for a descriptor.
    ///
    /// Unknown-but-valid kinds use the fallback. Only a structurally invalid
    /// descriptor (a bare array marker) is an error.
    pub fn resolve(&self, descriptor: &TypeDescriptor) -> MonkResult<ConverterFn> {
        match descriptor {
            TypeDescriptor::Base(DataType::Array) => Err(MonkError::UnsupportedType(
                "array marker without an element type".to_string(),
            )),
            TypeDescriptor::Base(kind) => Ok(self
                .mappings
                .get(kind)
                .cloned()
                .unwrap_or_else(|| self.fallback.clone())),
            TypeDescriptor::Array(element) => {
                let inner = self.resolve(element)?;
                Ok(converter_fn(move |raw| match raw {
                    JsonValue::Array(items) => {
                        Value::Array(items.iter().map(|item| inner(item)).collect())
                    }
                    _ => Value::Null,
                }))
            }
        }
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.mappings.keys().collect();
        kinds.sort();
        f.debug_struct("Converter").field("mappings", &kinds).finish()
    }
}

fn identity(raw: &JsonValue) -> Value {
    Value::from(raw)
}

fn convert_ip(raw: &JsonValue) -> Value {
    raw.as_str()
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .map(Value::Ip)
        .unwrap_or(Value::Null)
}

fn convert_timestamp(raw: &JsonValue) -> Value {
    raw.as_i64()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(Value::Timestamp)
        .unwrap_or(Value::Null)
}
