//! Configuration errors

use super::GroundworkError;

/// Creates an invalid config error
pub fn invalid(message: impl Into<String>) -> GroundworkError {
    GroundworkError::ConfigInvalid {
        message: message.into(),
    }
}

/// Creates a config read failed error
pub fn read_failed(path: impl Into<String>, reason: impl Into<String>) -> GroundworkError {
    GroundworkError::ConfigReadFailed {
        path: path.into(),
        reason: reason.into(),
    }
}

/// Creates a config parse failed error
pub fn parse_failed(path: impl Into<String>, reason: impl Into<String>) -> GroundworkError {
    GroundworkError::ConfigParseFailed {
        path: path.into(),
        reason: reason.into(),
    }
}

/// Creates an unsupported provider error
pub fn unsupported_provider(name: impl Into<String>) -> GroundworkError {
    GroundworkError::UnsupportedProvider { name: name.into() }
}
