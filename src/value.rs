// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dynamic structured payload value.
//!
//! Mirrors the teacher's `DynamicValue` tagged variant, trimmed to the
//! shapes a YAML-encoded endpoint payload can actually take: scalar,
//! sequence, or mapping of string to value (spec.md §9 design notes).
//! Application code declares the shape it expects on read via the `as_*`
//! accessors rather than matching the full enum.

use std::collections::HashMap;

/// A decoded `yaml`-encoded endpoint payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(HashMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Self::Sequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    /// Index a sequence entry. Returns `None` for out-of-range or non-sequence
    /// values.
    pub fn index(&self, i: usize) -> Option<&Value> {
        self.as_sequence().and_then(|seq| seq.get(i))
    }
}

/// Encode a value as YAML bytes for the wire.
pub fn encode(value: &Value) -> crate::error::Result<Vec<u8>> {
    let yaml_value = to_yaml(value);
    serde_yaml::to_string(&yaml_value)
        .map(|s| s.into_bytes())
        .map_err(|err| crate::error::Error::Malformed(err.to_string()))
}

/// Decode YAML bytes from the wire into a [`Value`].
pub fn decode(bytes: &[u8]) -> crate::error::Result<Value> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| crate::error::Error::Malformed(err.to_string()))?;
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|err| crate::error::Error::Malformed(err.to_string()))?;
    Ok(from_yaml(&yaml_value))
}

fn to_yaml(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(v) => serde_yaml::Value::Bool(*v),
        Value::Int(v) => serde_yaml::Value::Number((*v).into()),
        Value::Float(v) => serde_yaml::Value::Number((*v).into()),
        Value::String(v) => serde_yaml::Value::String(v.clone()),
        Value::Sequence(items) => serde_yaml::Value::Sequence(items.iter().map(to_yaml).collect()),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (k, v) in map {
                out.insert(serde_yaml::Value::String(k.clone()), to_yaml(v));
            }
            serde_yaml::Value::Mapping(out)
        }
    }
}

fn from_yaml(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(v) => Value::Bool(*v),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_yaml::Value::String(v) => Value::String(v.clone()),
        serde_yaml::Value::Sequence(items) => Value::Sequence(items.iter().map(from_yaml).collect()),
        serde_yaml::Value::Mapping(map) => {
            let mut out = HashMap::with_capacity(map.len());
            for (k, v) in map {
                if let Some(key) = k.as_str() {
                    out.insert(key.to_string(), from_yaml(v));
                }
            }
            Value::Mapping(out)
        }
        serde_yaml::Value::Tagged(tagged) => from_yaml(&tagged.value),
    }
}
