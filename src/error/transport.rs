//! Registry, git hosting and cluster transport errors

use super::GroundworkError;

pub fn http(url: impl Into<String>, reason: impl Into<String>) -> GroundworkError {
    GroundworkError::Http {
        url: url.into(),
        reason: reason.into(),
    }
}

pub fn registry(reference: impl Into<String>, reason: impl Into<String>) -> GroundworkError {
    GroundworkError::Registry {
        reference: reference.into(),
        reason: reason.into(),
    }
}

pub fn provider_request(
    provider: impl Into<String>,
    status: u16,
    message: impl Into<String>,
) -> GroundworkError {
    GroundworkError::ProviderRequest {
        provider: provider.into(),
        status,
        message: message.into(),
    }
}

pub fn conflict(resource: impl Into<String>) -> GroundworkError {
    GroundworkError::Conflict {
        resource: resource.into(),
    }
}

pub fn git_operation_failed(message: impl Into<String>) -> GroundworkError {
    GroundworkError::GitOperationFailed {
        message: message.into(),
    }
}

pub fn clone_failed(url: impl Into<String>, reason: impl Into<String>) -> GroundworkError {
    GroundworkError::GitCloneFailed {
        url: url.into(),
        reason: reason.into(),
    }
}

pub fn cluster(resource: impl Into<String>, reason: impl Into<String>) -> GroundworkError {
    GroundworkError::Cluster {
        resource: resource.into(),
        reason: reason.into(),
    }
}

pub fn cancelled(operation: impl Into<String>) -> GroundworkError {
    GroundworkError::Cancelled {
        operation: operation.into(),
    }
}
