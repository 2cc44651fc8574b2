//! Localization and overlay rendering errors

use super::GroundworkError;

/// Creates an error for a localization rule naming an image the bundle does not carry
pub fn unresolved_image(
    component: impl Into<String>,
    resource: impl Into<String>,
) -> GroundworkError {
    GroundworkError::UnresolvedImage {
        component: component.into(),
        resource: resource.into(),
    }
}

pub fn invalid_image_reference(reference: impl Into<String>) -> GroundworkError {
    GroundworkError::InvalidImageReference {
        reference: reference.into(),
    }
}

pub fn overlay_build_failed(reason: impl Into<String>) -> GroundworkError {
    GroundworkError::OverlayBuildFailed {
        reason: reason.into(),
    }
}

pub fn manifest_parse_failed(reason: impl Into<String>) -> GroundworkError {
    GroundworkError::ManifestParseFailed {
        reason: reason.into(),
    }
}
