use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::SEPARATOR;
use crate::error::{Error, Result};

/// Statically configured fallback for one `(namespace, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl DefaultValue {
    /// Convert a loosely typed JSON value, rejecting anything that is not a
    /// string, integer, float or boolean.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::Bool(b) => Ok(DefaultValue::Bool(b)),
            Value::String(s) => Ok(DefaultValue::Str(s)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(DefaultValue::Int(i)),
                None => n
                    .as_f64()
                    .map(DefaultValue::Float)
                    .ok_or_else(|| Error::Config(format!("val {} is not int/float64/bool/string", n))),
            },
            other => Err(Error::Config(format!(
                "val {} is not int/float64/bool/string",
                other
            ))),
        }
    }
}

impl From<&str> for DefaultValue {
    fn from(v: &str) -> Self {
        DefaultValue::Str(v.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(v: String) -> Self {
        DefaultValue::Str(v)
    }
}

impl From<i64> for DefaultValue {
    fn from(v: i64) -> Self {
        DefaultValue::Int(v)
    }
}

impl From<i32> for DefaultValue {
    fn from(v: i32) -> Self {
        DefaultValue::Int(v.into())
    }
}

impl From<f64> for DefaultValue {
    fn from(v: f64) -> Self {
        DefaultValue::Float(v)
    }
}

impl From<bool> for DefaultValue {
    fn from(v: bool) -> Self {
        DefaultValue::Bool(v)
    }
}

/// A value type readable from the cache. Parsing follows the usual textual
/// forms; defaults only apply when registered with the same type.
pub trait ConfigValue: Sized + Default {
    const KIND: &'static str;

    fn parse(raw: &str) -> Option<Self>;

    fn from_default(value: &DefaultValue) -> Option<Self>;
}

impl ConfigValue for String {
    const KIND: &'static str = "string";

    fn parse(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn from_default(value: &DefaultValue) -> Option<Self> {
        match value {
            DefaultValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl ConfigValue for i64 {
    const KIND: &'static str = "int";

    fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }

    fn from_default(value: &DefaultValue) -> Option<Self> {
        match value {
            DefaultValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl ConfigValue for f64 {
    const KIND: &'static str = "float";

    fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }

    fn from_default(value: &DefaultValue) -> Option<Self> {
        match value {
            DefaultValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl ConfigValue for bool {
    const KIND: &'static str = "bool";

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
            _ => None,
        }
    }

    fn from_default(value: &DefaultValue) -> Option<Self> {
        match value {
            DefaultValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Registered defaults, keyed by `namespace.key` regardless of cache mode.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    values: HashMap<String, DefaultValue>,
}

impl Defaults {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(namespace: &str, key: &str) -> String {
        format!("{}{}{}", namespace, SEPARATOR, key)
    }

    pub fn insert(&mut self, namespace: &str, key: &str, value: impl Into<DefaultValue>) {
        self.values.insert(Self::key(namespace, key), value.into());
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&DefaultValue> {
        self.values.get(&Self::key(namespace, key))
    }

    /// The default registered for this type, or the type's zero value.
    pub fn resolve<T: ConfigValue>(&self, namespace: &str, key: &str) -> T {
        self.get(namespace, key)
            .and_then(T::from_default)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
