use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A free-form bag of adapter parameters.
///
/// Parameters are deliberately untyped: unknown keys pass through untouched so
/// that adapter-specific options (sampling knobs, language tags, endpoint
/// overrides) can be added without changing the dispatcher. Typed accessors
/// are provided for the keys the shipped adapters care about.
///
/// Backed by a `BTreeMap` so key listings (`/models` `params_keys`) come out
/// sorted without extra work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(pub BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Sorted list of parameter keys.
    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Merge parameter layers, later layers overriding earlier ones.
    ///
    /// The dispatcher calls this with `[defaults.generation, model.params,
    /// request.params]` so that request-level values win over model
    /// configuration, which wins over global defaults. `null` values in an
    /// overriding layer are skipped rather than erasing a configured value.
    pub fn merged<'a>(layers: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut out = Self::new();
        for layer in layers {
            for (key, value) in &layer.0 {
                if value.is_null() {
                    continue;
                }
                out.0.insert(key.clone(), value.clone());
            }
        }
        out
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
