//! Compilation errors.

use thiserror::Error;
use warptune_backend::DriverError;

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("failed to read kernel source {path}: {message}")]
    SourceIo { path: String, message: String },

    #[error("compilation of kernel '{kernel}' failed:\n{log}")]
    Rejected { kernel: String, log: String },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("compilation worker disappeared before producing a module")]
    WorkerLost,
}
