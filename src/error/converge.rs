//! Convergence and health errors

use std::time::Duration;

use super::GroundworkError;

pub fn suspended(kind: impl Into<String>, name: impl Into<String>) -> GroundworkError {
    GroundworkError::Suspended {
        kind: kind.into(),
        name: name.into(),
    }
}

pub fn readiness_failed(
    kind: impl Into<String>,
    name: impl Into<String>,
    message: impl Into<String>,
) -> GroundworkError {
    GroundworkError::ReadinessFailed {
        kind: kind.into(),
        name: name.into(),
        message: message.into(),
    }
}

pub fn timeout(what: impl Into<String>, after: Duration) -> GroundworkError {
    GroundworkError::Timeout {
        what: what.into(),
        after: format!("{after:?}"),
    }
}

pub fn workloads_unhealthy(namespace: impl Into<String>, failures: Vec<String>) -> GroundworkError {
    GroundworkError::WorkloadsUnhealthy {
        namespace: namespace.into(),
        failures,
    }
}

/// Joins several errors into one; a single error is returned unchanged.
pub fn combined(mut errors: Vec<GroundworkError>) -> GroundworkError {
    if errors.len() == 1 {
        if let Some(err) = errors.pop() {
            return err;
        }
    }
    GroundworkError::Combined { errors }
}

/// Wraps an error with the name of the stage it aborted
pub fn stage(stage: impl Into<String>, source: GroundworkError) -> GroundworkError {
    GroundworkError::Stage {
        stage: stage.into(),
        source: Box::new(source),
    }
}
