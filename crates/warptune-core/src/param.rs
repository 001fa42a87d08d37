//! Named tuning knobs with finite, ordered value domains.

use crate::error::ConfigError;
use crate::types::ValueType;
use crate::value::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug)]
struct ParamInner {
    name: String,
    ty: ValueType,
    values: Vec<Value>,
    default: Value,
}

/// A tuning parameter.
///
/// Parameters are cheap to clone and compare by identity: two parameters
/// created separately are distinct even if their name, type, and domain are
/// identical. The descriptor itself is immutable once created.
#[derive(Clone)]
pub struct Param {
    inner: Arc<ParamInner>,
}

impl Param {
    pub fn new(
        name: impl Into<String>,
        ty: ValueType,
        values: Vec<Value>,
        default: Value,
    ) -> Result<Param, ConfigError> {
        let name = name.into();
        if values.is_empty() {
            return Err(ConfigError::EmptyDomain(name));
        }

        Ok(Param {
            inner: Arc::new(ParamInner {
                name,
                ty,
                values,
                default,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ty(&self) -> ValueType {
        self.inner.ty
    }

    pub fn values(&self) -> &[Value] {
        &self.inner.values
    }

    pub fn default_value(&self) -> &Value {
        &self.inner.default
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.inner.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }

    /// Whether `value` is a member of the domain or equals the default.
    pub fn allows(&self, value: &Value) -> bool {
        self.inner.values.contains(value) || &self.inner.default == value
    }
}

impl PartialEq for Param {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Param {}

impl Hash for Param {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.inner.name)
            .field("ty", &self.inner.ty)
            .field("values", &self.inner.values)
            .field("default", &self.inner.default)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_param(name: &str) -> Param {
        Param::new(
            name,
            ValueType::Int,
            vec![Value::from(1), Value::from(2), Value::from(3)],
            Value::from(1),
        )
        .unwrap()
    }

    #[test]
    fn descriptor_accessors() {
        let param = int_param("foo");
        assert_eq!(param.name(), "foo");
        assert_eq!(param.ty(), ValueType::Int);
        assert_eq!(param.default_value(), &Value::from(1));
        assert_eq!(param.len(), 3);
        assert_eq!(param.get(1), Some(&Value::from(2)));
        assert_eq!(param.get(100), None);
    }

    #[test]
    fn identity_not_structure() {
        let a = int_param("foo");
        let b = int_param("foo");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn empty_domain_is_rejected() {
        let result = Param::new("empty", ValueType::Int, vec![], Value::from(1));
        assert!(matches!(result, Err(ConfigError::EmptyDomain(_))));
    }

    #[test]
    fn allows_domain_members_and_default() {
        let param = Param::new(
            "baz",
            ValueType::Int,
            vec![Value::from(2), Value::from(4)],
            Value::from(8),
        )
        .unwrap();
        assert!(param.allows(&Value::from(2)));
        assert!(param.allows(&Value::from(8)));
        assert!(!param.allows(&Value::from(3)));
    }
}
