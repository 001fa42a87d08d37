//! Tuning errors.

use thiserror::Error;
use warptune_backend::DriverError;
use warptune_core::ConfigError;
use warptune_kernel::{BuildError, KernelError};

/// Failures of the tuning cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("error while opening {path}: {reason}")]
    Incompatible { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failures of a tuning session.
#[derive(Debug, Error)]
pub enum TuneError {
    #[error("search strategy produced no valid configuration")]
    NoValidConfig,

    #[error("kernel tuner is not initialized")]
    Uninitialized,

    #[error("tuning finished without a usable kernel")]
    NoUsableKernel,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}
