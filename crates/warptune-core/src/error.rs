//! Error types shared by the core data model.

use thiserror::Error;

/// Failures while building or querying a configuration space.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("duplicate parameter: {0}")]
    DuplicateParameter(String),

    #[error("parameter {0} has an empty value domain")]
    EmptyDomain(String),

    #[error("configuration space size overflows 64 bits")]
    SpaceOverflow,

    #[error("default configuration violates restriction {0}")]
    InvalidDefault(String),

    #[error("no configuration satisfies the restrictions")]
    NoValidConfig,

    #[error("missing value for parameter {0}")]
    MissingValue(String),

    #[error("value {value} is not allowed for parameter {param}")]
    ValueNotAllowed { param: String, value: String },

    #[error("configuration violates restriction {0}")]
    RestrictionViolated(String),
}

/// Failures while evaluating an expression against a configuration.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("division by zero in {0}")]
    DivideByZero(String),

    #[error("integer overflow in {0}")]
    Overflow(String),

    #[error("type mismatch in {expr}: {detail}")]
    TypeMismatch { expr: String, detail: String },

    #[error(transparent)]
    Cast(#[from] crate::value::CastError),
}
