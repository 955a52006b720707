//! Error types and handling for the AC system supervisor
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for acsystem operations
pub type Result<T> = std::result::Result<T, AcSystemError>;

/// Main error type for the supervisor
#[derive(Debug, Error)]
pub enum AcSystemError {
    /// CLI / startup configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// D-Bus communication errors (connection, registration, method calls)
    #[error("D-Bus error: {message}")]
    DBus { message: String },

    /// Errors talking to the persisted-settings service
    #[error("Settings error: {message}")]
    Settings { message: String },

    /// Validation errors on a control write
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout waiting on a bus RPC or collaborator
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl AcSystemError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        AcSystemError::Config {
            message: message.into(),
        }
    }

    pub fn dbus<S: Into<String>>(message: S) -> Self {
        AcSystemError::DBus {
            message: message.into(),
        }
    }

    pub fn settings<S: Into<String>>(message: S) -> Self {
        AcSystemError::Settings {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        AcSystemError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        AcSystemError::Timeout {
            message: message.into(),
        }
    }

    pub fn generic<S: Into<String>>(message: S) -> Self {
        AcSystemError::Generic {
            message: message.into(),
        }
    }
}

impl From<zbus::Error> for AcSystemError {
    fn from(err: zbus::Error) -> Self {
        AcSystemError::dbus(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AcSystemError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AcSystemError::timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AcSystemError::config("test config error");
        assert!(matches!(err, AcSystemError::Config { .. }));

        let err = AcSystemError::validation("field", "test validation error");
        assert!(matches!(err, AcSystemError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = AcSystemError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = AcSystemError::validation("test_field", "invalid value");
        assert_eq!(
            format!("{}", err),
            "Validation error: test_field - invalid value"
        );
    }
}
