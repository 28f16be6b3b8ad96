//! Component configuration and declarative validation rules.

use crate::context::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Options for one component instance.
///
/// Every option a component recognizes has a documented default, so the
/// typed getters take the default alongside the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentConfig {
    options: IndexMap<String, Value>,
}

impl ComponentConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an option, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Builds a configuration from a JSON object. Non-object values yield an
    /// empty configuration.
    #[must_use]
    pub fn from_json(json: JsonValue) -> Self {
        match Value::from(json) {
            Value::Map(options) => Self { options },
            _ => Self::new(),
        }
    }

    /// Sets an option.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.options.insert(key.into(), value.into());
    }

    /// Returns the raw option value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Returns true if the option is set.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Returns an integer option or the default.
    #[must_use]
    pub fn int_or(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or(default)
    }

    /// Returns a float option or the default.
    #[must_use]
    pub fn float_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    /// Returns a string option or the default.
    #[must_use]
    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    /// Returns a boolean option or the default.
    #[must_use]
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Returns the string items of a list option. Non-string items are
    /// skipped.
    #[must_use]
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(Value::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns a map option.
    #[must_use]
    pub fn map(&self, key: &str) -> Option<&IndexMap<String, Value>> {
        self.get(key).and_then(Value::as_map)
    }

    /// Returns the number of options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Returns true if no options are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> JsonValue {
        JsonValue::Object(
            self.options
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ComponentConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            options: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A declarative constraint on one configuration option.
///
/// Rules only inspect options that are present; an absent option falls back
/// to its default, which is valid by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigRule {
    /// The option must be set.
    Required(String),
    /// Integer strictly greater than zero.
    PositiveInt(String),
    /// Integer greater than or equal to zero.
    NonNegativeInt(String),
    /// Number strictly greater than zero.
    PositiveFloat(String),
    /// Number within `[min, max]`, or `(min, max)` when `exclusive`.
    FloatRange {
        /// Option key.
        key: String,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// Whether the bounds themselves are rejected.
        exclusive: bool,
    },
    /// String from a fixed set.
    OneOf {
        /// Option key.
        key: String,
        /// Accepted values.
        allowed: Vec<String>,
    },
    /// Boolean.
    Bool(String),
    /// List with at least one item.
    NonEmptyList(String),
    /// Nested map.
    Map(String),
}

impl ConfigRule {
    /// The option must be set.
    pub fn required(key: impl Into<String>) -> Self {
        Self::Required(key.into())
    }

    /// Integer > 0.
    pub fn positive_int(key: impl Into<String>) -> Self {
        Self::PositiveInt(key.into())
    }

    /// Integer >= 0.
    pub fn non_negative_int(key: impl Into<String>) -> Self {
        Self::NonNegativeInt(key.into())
    }

    /// Number > 0.
    pub fn positive_float(key: impl Into<String>) -> Self {
        Self::PositiveFloat(key.into())
    }

    /// Number within `[min, max]`.
    pub fn float_range(key: impl Into<String>, min: f64, max: f64) -> Self {
        Self::FloatRange {
            key: key.into(),
            min,
            max,
            exclusive: false,
        }
    }

    /// Number within `(min, max)`.
    pub fn float_open_range(key: impl Into<String>, min: f64, max: f64) -> Self {
        Self::FloatRange {
            key: key.into(),
            min,
            max,
            exclusive: true,
        }
    }

    /// String from a fixed set.
    pub fn one_of(key: impl Into<String>, allowed: &[&str]) -> Self {
        Self::OneOf {
            key: key.into(),
            allowed: allowed.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Boolean.
    pub fn boolean(key: impl Into<String>) -> Self {
        Self::Bool(key.into())
    }

    /// List with at least one item.
    pub fn non_empty_list(key: impl Into<String>) -> Self {
        Self::NonEmptyList(key.into())
    }

    /// Nested map.
    pub fn map(key: impl Into<String>) -> Self {
        Self::Map(key.into())
    }

    /// Returns the option key this rule inspects.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Required(key)
            | Self::PositiveInt(key)
            | Self::NonNegativeInt(key)
            | Self::PositiveFloat(key)
            | Self::Bool(key)
            | Self::NonEmptyList(key)
            | Self::Map(key)
            | Self::FloatRange { key, .. }
            | Self::OneOf { key, .. } => key,
        }
    }

    /// Checks the rule, returning a description of the violation.
    pub fn check(&self, config: &ComponentConfig) -> Result<(), String> {
        let key = self.key();
        let Some(value) = config.get(key) else {
            return match self {
                Self::Required(_) => Err(format!("{key} is required")),
                _ => Ok(()),
            };
        };

        match self {
            Self::Required(_) => Ok(()),
            Self::PositiveInt(_) => match value {
                Value::Int(i) if *i > 0 => Ok(()),
                _ => Err(format!("{key} must be an integer > 0, got {}", value.to_message())),
            },
            Self::NonNegativeInt(_) => match value {
                Value::Int(i) if *i >= 0 => Ok(()),
                _ => Err(format!("{key} must be an integer >= 0, got {}", value.to_message())),
            },
            Self::PositiveFloat(_) => match value.as_f64() {
                Some(f) if f > 0.0 => Ok(()),
                _ => Err(format!("{key} must be a number > 0, got {}", value.to_message())),
            },
            Self::FloatRange {
                min,
                max,
                exclusive,
                ..
            } => {
                let in_range = value.as_f64().is_some_and(|f| {
                    if *exclusive {
                        f > *min && f < *max
                    } else {
                        f >= *min && f <= *max
                    }
                });
                if in_range {
                    Ok(())
                } else {
                    let (open, close) = if *exclusive { ('(', ')') } else { ('[', ']') };
                    Err(format!(
                        "{key} must be a number in {open}{min}, {max}{close}, got {}",
                        value.to_message()
                    ))
                }
            }
            Self::OneOf { allowed, .. } => match value.as_str() {
                Some(s) if allowed.iter().any(|a| a == s) => Ok(()),
                _ => Err(format!(
                    "{key} must be one of [{}], got {}",
                    allowed.join(", "),
                    value.to_message()
                )),
            },
            Self::Bool(_) => match value {
                Value::Bool(_) => Ok(()),
                _ => Err(format!("{key} must be a boolean, got {}", value.to_message())),
            },
            Self::NonEmptyList(_) => match value.as_list() {
                Some(items) if !items.is_empty() => Ok(()),
                _ => Err(format!("{key} must be a non-empty list")),
            },
            Self::Map(_) => match value {
                Value::Map(_) => Ok(()),
                _ => Err(format!("{key} must be a map, got {}", value.kind())),
            },
        }
    }
}

/// Checks rules in order and returns the first violation.
pub fn check_rules(config: &ComponentConfig, rules: &[ConfigRule]) -> Result<(), String> {
    rules.iter().try_for_each(|rule| rule.check(config))
}
