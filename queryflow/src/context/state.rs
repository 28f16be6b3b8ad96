//! The ordered execution context threaded through a workflow run.

use super::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Key under which components report a recoverable, step-local failure.
pub const ERROR_KEY: &str = "error";

/// Key a component sets to `true` to end the run after its step.
pub const STOP_KEY: &str = "workflow_stop";

/// Ordered, string-keyed state of one in-flight request.
///
/// Components read from a context and return a partial context; the executor
/// merges that partial result back with [`Context::merge`]. The executor never
/// removes keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: IndexMap<String, Value>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Creates a partial context holding only an `error` message.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new().with(ERROR_KEY, message.into())
    }

    /// Builds a context from a JSON object. Non-object values yield an empty
    /// context.
    #[must_use]
    pub fn from_json(json: JsonValue) -> Self {
        match Value::from(json) {
            Value::Map(values) => Self { values },
            _ => Self::new(),
        }
    }

    /// Inserts or overwrites a key, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Returns the value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the value for a key as a string slice.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns the value for a key as a boolean.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Returns the value for a key as an integer.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Returns the value for a key as a float.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Returns true if the key is present, even with a null value.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Shallow-merges `partial` into this context.
    ///
    /// Keys in `partial` replace existing values wholesale (nested maps are
    /// not merged); all other keys are left untouched. New keys keep the
    /// order in which `partial` lists them.
    pub fn merge(&mut self, partial: Self) {
        self.values.extend(partial.values);
    }

    /// Returns the `error` message if one is present and non-empty.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.get(ERROR_KEY)
            .filter(|v| !v.is_blank())
            .map(Value::to_message)
    }

    /// Returns true if the context carries a non-empty `error`.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error_message().is_some()
    }

    /// Returns true if a component asked to stop the run.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.get_bool(STOP_KEY).unwrap_or(false)
    }

    /// Returns the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Renders the context as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Consumes the context, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.values
    }
}

impl From<IndexMap<String, Value>> for Context {
    fn from(values: IndexMap<String, Value>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Context {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.values
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl IntoIterator for Context {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
