//! Errors raised while building or launching kernels.

use thiserror::Error;
use warptune_backend::DriverError;
use warptune_compile::CompileError;
use warptune_core::{CastError, ConfigError, EvalError};

/// A kernel description could not be compiled for a configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("{dim} evaluates to zero")]
    ZeroDim { dim: &'static str },

    #[error("macro already defined: {0}")]
    DuplicateDefine(String),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Value(#[from] CastError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// A compiled kernel could not be resolved or launched.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}
