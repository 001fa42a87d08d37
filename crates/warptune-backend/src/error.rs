//! Driver error reporting.

use thiserror::Error;

/// A failed driver call, carrying the backend's status code and message.
#[derive(Debug, Clone, Error)]
#[error("driver error {code}: {message}")]
pub struct DriverError {
    pub code: i32,
    pub message: String,
}

impl DriverError {
    pub fn new(code: i32, message: impl Into<String>) -> DriverError {
        DriverError {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_value(message: impl Into<String>) -> DriverError {
        DriverError::new(1, message)
    }

    pub fn invalid_handle(message: impl Into<String>) -> DriverError {
        DriverError::new(400, message)
    }
}
