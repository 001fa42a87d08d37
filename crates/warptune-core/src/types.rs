//! Declared value types, kernel-side type names, and template arguments.

use crate::value::{intern, CastError, InternedString, Value};
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Declared type of a tuning parameter or expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Double,
    Bool,
    String,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::Bool => "bool",
            ValueType::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Option<ValueType> {
        match name {
            "int" => Some(ValueType::Int),
            "double" => Some(ValueType::Double),
            "bool" => Some(ValueType::Bool),
            "string" => Some(ValueType::String),
            _ => None,
        }
    }

    /// The declared type of a value, if it has one.
    pub fn of_value(value: &Value) -> Option<ValueType> {
        match value {
            Value::Empty => None,
            Value::Int(_) => Some(ValueType::Int),
            Value::Double(_) => Some(ValueType::Double),
            Value::Str(_) => Some(ValueType::String),
            Value::Bool(_) => Some(ValueType::Bool),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rust types that have a spelling in GPU kernel source.
pub trait DeviceRepr {
    fn device_type_name() -> String;
}

macro_rules! device_repr {
    ($($ty:ty => $name:expr;)*) => {
        $(
            impl DeviceRepr for $ty {
                fn device_type_name() -> String {
                    $name.to_string()
                }
            }
        )*
    };
}

device_repr! {
    bool => "bool";
    i8 => "signed char";
    u8 => "unsigned char";
    i16 => "short";
    u16 => "unsigned short";
    i32 => "int";
    u32 => "unsigned int";
    i64 => "long long";
    u64 => "unsigned long long";
    f32 => "float";
    f64 => "double";
}

impl<T: DeviceRepr> DeviceRepr for *mut T {
    fn device_type_name() -> String {
        format!("{}*", T::device_type_name())
    }
}

impl<T: DeviceRepr> DeviceRepr for *const T {
    fn device_type_name() -> String {
        format!("const {}*", T::device_type_name())
    }
}

static TYPE_NAMES: Lazy<Mutex<HashMap<TypeId, InternedString>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Kernel-side type used for symbol construction.
///
/// Names are interned process-wide so repeated lookups for the same Rust type
/// are cheap and compare by pointer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelType {
    name: InternedString,
}

impl KernelType {
    pub fn of<T: DeviceRepr + 'static>() -> KernelType {
        let mut cache = TYPE_NAMES.lock().expect("type name cache poisoned");
        let name = *cache
            .entry(TypeId::of::<T>())
            .or_insert_with(|| intern(&T::device_type_name()));
        KernelType { name }
    }

    pub fn from_name(name: &str) -> KernelType {
        KernelType { name: intern(name) }
    }

    pub fn name(&self) -> &'static str {
        self.name.as_str()
    }
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KernelType({})", self.name())
    }
}

/// A formatted token substituted into the kernel's template argument list.
///
/// Numeric tokens carry an explicit cast so the compiler does not have to
/// deduce the argument type from the literal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TemplateArg {
    token: String,
}

impl TemplateArg {
    pub fn from_token(token: impl Into<String>) -> TemplateArg {
        TemplateArg {
            token: token.into(),
        }
    }

    pub fn from_type(ty: KernelType) -> TemplateArg {
        TemplateArg {
            token: ty.name().to_string(),
        }
    }

    pub fn from_value(value: &Value) -> Result<TemplateArg, CastError> {
        let token = match value {
            Value::Int(v) => format!("(long long){v}"),
            Value::Double(v) => format!("(double){v}"),
            Value::Bool(b) => format!("(bool){b}"),
            Value::Str(s) => s.as_str().to_string(),
            Value::Empty => {
                return Err(CastError {
                    value: *value,
                    target: "template argument",
                })
            }
        };
        Ok(TemplateArg { token })
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for TemplateArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl From<KernelType> for TemplateArg {
    fn from(ty: KernelType) -> TemplateArg {
        TemplateArg::from_type(ty)
    }
}
