//! Component, version and resource resolution errors

use super::GroundworkError;

pub fn component_not_found(
    component: impl Into<String>,
    reason: impl Into<String>,
) -> GroundworkError {
    GroundworkError::ComponentNotFound {
        component: component.into(),
        reason: reason.into(),
    }
}

pub fn no_matching_version(
    component: impl Into<String>,
    constraint: impl Into<String>,
) -> GroundworkError {
    GroundworkError::NoMatchingVersion {
        component: component.into(),
        constraint: constraint.into(),
    }
}

pub fn invalid_version(
    component: impl Into<String>,
    version: impl Into<String>,
    reason: impl Into<String>,
) -> GroundworkError {
    GroundworkError::InvalidVersion {
        component: component.into(),
        version: version.into(),
        reason: reason.into(),
    }
}

pub fn invalid_constraint(
    constraint: impl Into<String>,
    reason: impl Into<String>,
) -> GroundworkError {
    GroundworkError::InvalidConstraint {
        constraint: constraint.into(),
        reason: reason.into(),
    }
}

pub fn reference_not_found(
    component: impl Into<String>,
    reference: impl Into<String>,
) -> GroundworkError {
    GroundworkError::ReferenceNotFound {
        component: component.into(),
        reference: reference.into(),
    }
}

pub fn resource_not_found(
    component: impl Into<String>,
    resource: impl Into<String>,
) -> GroundworkError {
    GroundworkError::ResourceNotFound {
        component: component.into(),
        resource: resource.into(),
    }
}

pub fn unknown_component(name: impl Into<String>) -> GroundworkError {
    GroundworkError::UnknownComponent { name: name.into() }
}
