//! A complete binding of tuning parameters to values.

use crate::error::ConfigError;
use crate::param::Param;
use crate::value::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Mapping from parameter identity to a concrete value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    inner: HashMap<Param, Value>,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn insert(&mut self, param: Param, value: Value) {
        self.inner.insert(param, value);
    }

    pub fn get(&self, param: &Param) -> Option<&Value> {
        self.inner.get(param)
    }

    pub fn require(&self, param: &Param) -> Result<&Value, ConfigError> {
        self.inner
            .get(param)
            .ok_or_else(|| ConfigError::UnknownParameter(param.name().to_string()))
    }

    pub fn contains(&self, param: &Param) -> bool {
        self.inner.contains_key(param)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Param, &Value)> {
        self.inner.iter()
    }

    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.inner.keys()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (param, value) in &self.inner {
            object.insert(param.name().to_string(), value.to_json());
        }
        serde_json::Value::Object(object)
    }
}

impl Hash for Config {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // order-insensitive: combine independent per-entry hashes
        let mut combined = 0u64;
        for (param, value) in &self.inner {
            let mut entry = DefaultHasher::new();
            param.hash(&mut entry);
            value.hash(&mut entry);
            combined ^= entry.finish();
        }
        state.write_u64(combined);
        state.write_usize(self.inner.len());
    }
}
