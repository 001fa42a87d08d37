//! Cartesian configuration spaces with boolean restrictions.

use crate::config::Config;
use crate::error::ConfigError;
use crate::expr::{Expr, ParamExpr};
use crate::iter::ConfigIterator;
use crate::param::Param;
use crate::types::ValueType;
use crate::value::Value;
use std::collections::HashSet;

/// The Cartesian product of per-parameter domains, filtered by restrictions.
///
/// Parameters keep their declaration order; the order defines the mixed-radix
/// decomposition used by [`ConfigSpace::get`].
#[derive(Clone, Debug, Default)]
pub struct ConfigSpace {
    params: Vec<Param>,
    restrictions: Vec<Expr>,
}

impl ConfigSpace {
    pub fn new() -> ConfigSpace {
        ConfigSpace::default()
    }

    /// Create a tuning parameter whose default is the first domain entry.
    pub fn tune<V: Into<Value>>(
        &mut self,
        name: impl Into<String>,
        values: Vec<V>,
    ) -> Result<ParamExpr, ConfigError> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let default = values.first().copied();
        self.create_param(name.into(), values, default)
    }

    /// Create a tuning parameter with an explicit default value.
    pub fn tune_with_default<V: Into<Value>>(
        &mut self,
        name: impl Into<String>,
        values: Vec<V>,
        default: impl Into<Value>,
    ) -> Result<ParamExpr, ConfigError> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.create_param(name.into(), values, Some(default.into()))
    }

    fn create_param(
        &mut self,
        name: String,
        values: Vec<Value>,
        default: Option<Value>,
    ) -> Result<ParamExpr, ConfigError> {
        if self.params.iter().any(|p| p.name() == name) {
            return Err(ConfigError::DuplicateParameter(name));
        }

        let default = default.ok_or_else(|| ConfigError::EmptyDomain(name.clone()))?;
        let ty = ValueType::of_value(&default).unwrap_or(ValueType::Int);
        let param = Param::new(name, ty, values, default)?;
        self.params.push(param.clone());
        Ok(ParamExpr::new(param))
    }

    /// Install a boolean restriction; configurations violating it are invalid.
    pub fn restrict(&mut self, restriction: impl Into<Expr>) {
        self.restrictions.push(restriction.into());
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name() == name)
    }

    pub fn restrictions(&self) -> &[Expr] {
        &self.restrictions
    }

    /// Product of the domain cardinalities.
    pub fn size(&self) -> Result<u64, ConfigError> {
        let mut n: u64 = 1;
        for param in &self.params {
            let k = param.len() as u64;
            if k == 0 {
                return Ok(0);
            }
            n = n.checked_mul(k).ok_or(ConfigError::SpaceOverflow)?;
        }
        Ok(n)
    }

    /// Decode `index` into `config` by mixed-radix decomposition and report
    /// whether the decoded configuration is valid.
    ///
    /// The decoded binding is filled in even when it is invalid.
    pub fn get(&self, index: u64, config: &mut Config) -> bool {
        config.clear();

        let mut index = index;
        for param in &self.params {
            let k = param.len() as u64;
            let digit = (index % k) as usize;
            index /= k;
            config.insert(param.clone(), param.values()[digit]);
        }

        self.is_valid(config)
    }

    /// Whether `config` binds exactly this space's parameters to allowed
    /// values and satisfies every restriction.
    pub fn is_valid(&self, config: &Config) -> bool {
        if config.len() != self.params.len() {
            return false;
        }

        for param in &self.params {
            match config.get(param) {
                Some(value) if param.allows(value) => {}
                _ => return false,
            }
        }

        self.restrictions_hold(config)
    }

    fn restrictions_hold(&self, config: &Config) -> bool {
        self.restrictions.iter().all(|r| {
            r.eval(config)
                .and_then(|v| v.to_bool().map_err(Into::into))
                .unwrap_or(false)
        })
    }

    /// Bind every parameter to its default value.
    pub fn default_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::new();
        for param in &self.params {
            config.insert(param.clone(), *param.default_value());
        }

        for restriction in &self.restrictions {
            let holds = restriction
                .eval(&config)
                .and_then(|v| v.to_bool().map_err(Into::into))
                .unwrap_or(false);
            if !holds {
                return Err(ConfigError::InvalidDefault(restriction.name()));
            }
        }

        Ok(config)
    }

    /// Decode a configuration from a `{name: value}` JSON object.
    pub fn load_config(&self, node: &serde_json::Value) -> Result<Config, ConfigError> {
        let mut config = Config::new();

        for param in &self.params {
            let entry = node
                .get(param.name())
                .ok_or_else(|| ConfigError::MissingValue(param.name().to_string()))?;
            let value = Value::from_json(entry).map_err(|_| ConfigError::ValueNotAllowed {
                param: param.name().to_string(),
                value: entry.to_string(),
            })?;

            if !param.allows(&value) {
                return Err(ConfigError::ValueNotAllowed {
                    param: param.name().to_string(),
                    value: value.to_string(),
                });
            }

            config.insert(param.clone(), value);
        }

        for restriction in &self.restrictions {
            let holds = restriction
                .eval(&config)
                .and_then(|v| v.to_bool().map_err(Into::into))
                .unwrap_or(false);
            if !holds {
                return Err(ConfigError::RestrictionViolated(restriction.name()));
            }
        }

        Ok(config)
    }

    /// Uniformly sample a valid configuration.
    pub fn sample(&self) -> Result<Config, ConfigError> {
        let n = self.size()?;
        let mut attempted = HashSet::new();
        let mut config = Config::new();

        while (attempted.len() as u64) < n {
            let index = fastrand::u64(0..n);
            if attempted.insert(index) && self.get(index, &mut config) {
                return Ok(config);
            }
        }

        Err(ConfigError::NoValidConfig)
    }

    /// Enumerate the valid configurations in a pseudo-random order.
    pub fn iterate(&self) -> Result<ConfigIterator, ConfigError> {
        ConfigIterator::new(self.clone())
    }

    pub fn to_json(&self) -> serde_json::Value {
        let params: Vec<serde_json::Value> = self
            .params
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name(),
                    "type": p.ty().name(),
                    "values": p.values().iter().map(Value::to_json).collect::<Vec<_>>(),
                })
            })
            .collect();

        let restrictions: Vec<serde_json::Value> =
            self.restrictions.iter().map(Expr::to_json).collect();

        serde_json::json!({
            "parameters": params,
            "restrictions": restrictions,
        })
    }
}
