//! Dynamically typed scalar values for tuning parameters.
//!
//! A [`Value`] is a small tagged union over the types a tuning knob can take:
//! a signed 64-bit integer, a double, a boolean, or an interned string.
//! Equality is strict on the tag, so `Value::from(1)` and `Value::from(true)`
//! never compare equal even though both convert to the other type.

use once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use thiserror::Error;

static INTERN_POOL: Lazy<Mutex<HashSet<&'static str>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Intern a string into the process-wide pool.
///
/// The returned reference is stable for the lifetime of the process, so two
/// interned strings are equal exactly when their pointers are equal.
pub fn intern(text: &str) -> InternedString {
    let mut pool = INTERN_POOL.lock().expect("intern pool poisoned");
    if let Some(existing) = pool.get(text) {
        return InternedString(existing);
    }

    let stable: &'static str = Box::leak(text.to_owned().into_boxed_str());
    pool.insert(stable);
    InternedString(stable)
}

/// Handle to a string in the process-wide intern pool.
#[derive(Clone, Copy)]
pub struct InternedString(&'static str);

impl InternedString {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl PartialEq for InternedString {
    fn eq(&self, other: &Self) -> bool {
        // pointer comparison is sufficient since both sides are interned
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for InternedString {}

impl PartialOrd for InternedString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternedString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(other.0)
    }
}

impl Hash for InternedString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl std::ops::Deref for InternedString {
    type Target = str;

    fn deref(&self) -> &str {
        self.0
    }
}

impl From<&str> for InternedString {
    fn from(text: &str) -> Self {
        intern(text)
    }
}

/// A value produced by a narrowing conversion that does not fit the target.
#[derive(Debug, Clone, Error)]
#[error("{value} cannot be cast to {target}")]
pub struct CastError {
    pub value: Value,
    pub target: &'static str,
}

/// Dynamically typed scalar.
#[derive(Clone, Copy, Debug, Default)]
pub enum Value {
    #[default]
    Empty,
    Int(i64),
    Double(f64),
    Str(InternedString),
    Bool(bool),
}

impl Value {
    fn tag(&self) -> u8 {
        match self {
            Value::Empty => 0,
            Value::Int(_) => 1,
            Value::Double(_) => 2,
            Value::Str(_) => 3,
            Value::Bool(_) => 4,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
        }
    }

    pub fn is_bool(&self) -> bool {
        match self {
            Value::Bool(_) => true,
            Value::Int(v) => *v == 0 || *v == 1,
            _ => false,
        }
    }

    pub fn to_bool(&self) -> Result<bool, CastError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            _ => Err(CastError {
                value: *self,
                target: "bool",
            }),
        }
    }

    pub fn is_double(&self) -> bool {
        matches!(self, Value::Double(_))
    }

    pub fn to_f64(&self) -> Result<f64, CastError> {
        match self {
            Value::Double(v) => Ok(*v),
            _ => Err(CastError {
                value: *self,
                target: "double",
            }),
        }
    }

    pub fn to_f32(&self) -> Result<f32, CastError> {
        self.to_f64().map(|v| v as f32)
    }

    /// Every non-empty value has a string form.
    pub fn is_string(&self) -> bool {
        !self.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Empty => serde_json::Value::Null,
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Double(v) => serde_json::Value::from(*v),
            Value::Str(s) => serde_json::Value::from(s.as_str()),
            Value::Bool(b) => serde_json::Value::from(*b),
        }
    }

    pub fn from_json(node: &serde_json::Value) -> Result<Value, CastError> {
        match node {
            serde_json::Value::Null => Ok(Value::Empty),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(Value::Int(v))
                } else if let Some(v) = n.as_f64() {
                    Ok(Value::Double(v))
                } else {
                    Err(CastError {
                        value: Value::Empty,
                        target: "int",
                    })
                }
            }
            serde_json::Value::String(s) => Ok(Value::Str(intern(s))),
            _ => Err(CastError {
                value: Value::Empty,
                target: "value",
            }),
        }
    }
}

macro_rules! integer_conversions {
    ($($ty:ty => $is_name:ident, $to_name:ident;)*) => {
        impl Value {
            $(
                pub fn $is_name(&self) -> bool {
                    match self {
                        Value::Bool(_) => true,
                        Value::Int(v) => <$ty>::try_from(*v).is_ok(),
                        _ => false,
                    }
                }

                pub fn $to_name(&self) -> Result<$ty, CastError> {
                    match self {
                        Value::Bool(b) => Ok(*b as $ty),
                        Value::Int(v) => <$ty>::try_from(*v).map_err(|_| CastError {
                            value: *self,
                            target: stringify!($ty),
                        }),
                        _ => Err(CastError {
                            value: *self,
                            target: stringify!($ty),
                        }),
                    }
                }
            )*
        }
    };
}

integer_conversions! {
    i8 => is_i8, to_i8;
    i16 => is_i16, to_i16;
    i32 => is_i32, to_i32;
    i64 => is_i64, to_i64;
    u8 => is_u8, to_u8;
    u16 => is_u16, to_u16;
    u32 => is_u32, to_u32;
    u64 => is_u64, to_u64;
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => self.tag().cmp(&other.tag()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.tag());
        match self {
            Value::Empty => {}
            Value::Int(v) => v.hash(state),
            Value::Double(v) => {
                // normalize -0.0 so equal doubles hash equally
                let v = if *v == 0.0 { 0.0 } else { *v };
                v.to_bits().hash(state);
            }
            Value::Str(s) => s.hash(state),
            Value::Bool(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s.as_str()),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Value {
                    Value::Int(v as i64)
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Double(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::Double(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(intern(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Str(intern(&v))
    }
}

impl From<InternedString> for Value {
    fn from(v: InternedString) -> Value {
        Value::Str(v)
    }
}

impl TryFrom<u64> for Value {
    type Error = CastError;

    fn try_from(v: u64) -> Result<Value, CastError> {
        i64::try_from(v).map(Value::Int).map_err(|_| CastError {
            value: Value::Empty,
            target: "int",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn interned_strings_share_storage() {
        let a = intern("block_size_x");
        let b = intern(&"block_size_x".to_string());
        assert_eq!(a, b);
        assert!(std::ptr::eq(a.as_str(), b.as_str()));
        assert_ne!(a, intern("block_size_y"));
    }

    #[test]
    fn empty_value() {
        let v = Value::Empty;
        assert!(v.is_empty());
        assert!(!v.is_i32());
        assert!(!v.is_bool());
        assert!(!v.is_double());
        assert!(!v.is_string());
        assert_eq!(v.to_string(), "");
        assert_eq!(v.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn int_value_conversions() {
        let v = Value::from(1);
        assert!(v.is_u32() && v.is_i32() && v.is_bool() && v.is_i8());
        assert!(!v.is_double());
        assert_eq!(v.to_bool().unwrap(), true);
        assert_eq!(v.to_i64().unwrap(), 1);
        assert_eq!(v.to_string(), "1");
        assert!(v.to_f64().is_err());

        let v = Value::from(-1);
        assert!(!v.is_u32());
        assert!(!v.is_bool());
        assert!(v.is_i8());
        assert_eq!(v.to_i32().unwrap(), -1);

        let v = Value::from(300);
        assert!(!v.is_i8() && !v.is_u8() && !v.is_bool());
        assert!(v.is_i16());
        assert!(v.to_u8().is_err());
        assert_eq!(v.to_u16().unwrap(), 300);
    }

    #[test]
    fn bool_widens_to_integers() {
        assert_eq!(Value::from(true).to_i32().unwrap(), 1);
        assert_eq!(Value::from(false).to_i32().unwrap(), 0);
        assert_eq!(Value::from(true).to_u64().unwrap(), 1);
    }

    #[test]
    fn int_and_bool_are_distinct() {
        assert_ne!(Value::from(1), Value::from(true));
        assert_ne!(Value::from(0), Value::from(false));
        assert_ne!(hash_of(&Value::from(1)), hash_of(&Value::from(true)));
    }

    #[test]
    fn double_never_converts_to_int() {
        let v = Value::from(1.0);
        assert!(!v.is_i64());
        assert!(v.to_i64().is_err());
        assert_ne!(v, Value::from(1));
        assert_eq!(v.to_f64().unwrap(), 1.0);
    }

    #[test]
    fn total_order_is_consistent() {
        let mut values = vec![
            Value::from("b"),
            Value::from(2),
            Value::from(true),
            Value::from(1.5),
            Value::from("a"),
            Value::from(1),
        ];
        values.sort();
        let round_trip = values.clone();
        values.sort();
        assert_eq!(values, round_trip);
        assert!(Value::from(1) < Value::from(2));
        assert!(Value::from("a") < Value::from("b"));
    }

    #[test]
    fn json_round_trip() {
        for value in [
            Value::from(42),
            Value::from(-3),
            Value::from(2.5),
            Value::from(true),
            Value::from("hello"),
            Value::Empty,
        ] {
            let json = value.to_json();
            assert_eq!(Value::from_json(&json).unwrap(), value);
        }
    }

    #[test]
    fn equal_doubles_hash_equally() {
        assert_eq!(hash_of(&Value::from(0.0)), hash_of(&Value::from(-0.0)));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
    }
}
