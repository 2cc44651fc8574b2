//! Error types and handling for Groundwork
//!
//! Uses `thiserror` for error definitions and `miette` for pretty diagnostics.
//!
//! This module is organized into sub-modules by error domain:
//! - [`config`]: Configuration errors
//! - [`resolve`]: Component and resource resolution errors
//! - [`localize`]: Image localization and overlay rendering errors
//! - [`transport`]: Registry, git, provider and cluster call errors
//! - [`converge`]: Health and convergence errors
//! - [`fs`]: File system errors

pub mod config;
pub mod converge;
pub mod fs;
pub mod localize;
pub mod resolve;
pub mod transport;

use miette::Diagnostic;
use thiserror::Error;

/// Main error type for Groundwork operations
#[derive(Error, Diagnostic, Debug)]
pub enum GroundworkError {
    // Configuration errors
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(groundwork::config::invalid))]
    ConfigInvalid { message: String },

    #[error("Failed to read configuration file: {path}")]
    #[diagnostic(code(groundwork::config::read_failed))]
    ConfigReadFailed { path: String, reason: String },

    #[error("Failed to parse configuration file: {path}: {reason}")]
    #[diagnostic(
        code(groundwork::config::parse_failed),
        help("Check the YAML syntax in the file")
    )]
    ConfigParseFailed { path: String, reason: String },

    #[error("Unsupported git provider: {name}")]
    #[diagnostic(
        code(groundwork::config::unsupported_provider),
        help("Supported providers: github, gitea, gitlab")
    )]
    UnsupportedProvider { name: String },

    // Resolution errors
    #[error("Component not found: {component}: {reason}")]
    #[diagnostic(
        code(groundwork::resolve::component_not_found),
        help("Check the registry location and that the component has been published")
    )]
    ComponentNotFound { component: String, reason: String },

    #[error("No version of {component} matches {constraint}")]
    #[diagnostic(code(groundwork::resolve::no_matching_version))]
    NoMatchingVersion {
        component: String,
        constraint: String,
    },

    #[error("Invalid version '{version}' of {component}: {reason}")]
    #[diagnostic(
        code(groundwork::resolve::invalid_version),
        help("Every published tag must be a semantic version")
    )]
    InvalidVersion {
        component: String,
        version: String,
        reason: String,
    },

    #[error("Invalid version constraint '{constraint}': {reason}")]
    #[diagnostic(code(groundwork::resolve::invalid_constraint))]
    InvalidConstraint { constraint: String, reason: String },

    #[error("Component {component} does not reference {reference}")]
    #[diagnostic(
        code(groundwork::resolve::reference_not_found),
        help("Check the --components list against the bootstrap component")
    )]
    ReferenceNotFound { component: String, reference: String },

    #[error("Resource {resource} not found in component {component}")]
    #[diagnostic(code(groundwork::resolve::resource_not_found))]
    ResourceNotFound { component: String, resource: String },

    #[error("Unknown component: {name}")]
    #[diagnostic(
        code(groundwork::resolve::unknown_component),
        help("Known components are installed into a fixed namespace; check the component name")
    )]
    UnknownComponent { name: String },

    // Localization errors
    #[error("Localization of {component} references unknown image resource {resource}")]
    #[diagnostic(code(groundwork::localize::unresolved_image))]
    UnresolvedImage { component: String, resource: String },

    #[error("Invalid image reference: {reference}")]
    #[diagnostic(
        code(groundwork::localize::invalid_image_reference),
        help("Image references must have the form repository:tag")
    )]
    InvalidImageReference { reference: String },

    #[error("Failed to build overlay: {reason}")]
    #[diagnostic(code(groundwork::localize::overlay_build_failed))]
    OverlayBuildFailed { reason: String },

    #[error("Failed to parse manifests: {reason}")]
    #[diagnostic(code(groundwork::localize::manifest_parse_failed))]
    ManifestParseFailed { reason: String },

    // Transport errors
    #[error("HTTP request to {url} failed: {reason}")]
    #[diagnostic(code(groundwork::transport::http))]
    Http { url: String, reason: String },

    #[error("Registry operation on {reference} failed: {reason}")]
    #[diagnostic(code(groundwork::transport::registry))]
    Registry { reference: String, reason: String },

    #[error("{provider} API returned {status}: {message}")]
    #[diagnostic(
        code(groundwork::transport::provider_request),
        help("Check the token permissions and the repository owner")
    )]
    ProviderRequest {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Conflicting update of {resource}")]
    #[diagnostic(code(groundwork::transport::conflict))]
    Conflict { resource: String },

    #[error("Git operation failed: {message}")]
    #[diagnostic(code(groundwork::git::operation_failed))]
    GitOperationFailed { message: String },

    #[error("Failed to clone repository: {url}: {reason}")]
    #[diagnostic(
        code(groundwork::git::clone_failed),
        help("Check that the token can read and write the management repository")
    )]
    GitCloneFailed { url: String, reason: String },

    #[error("Cluster request for {resource} failed: {reason}")]
    #[diagnostic(code(groundwork::transport::cluster))]
    Cluster { resource: String, reason: String },

    #[error("Operation cancelled: {operation} exceeded the run timeout")]
    #[diagnostic(
        code(groundwork::transport::cancelled),
        help("Increase --timeout")
    )]
    Cancelled { operation: String },

    // Convergence errors
    #[error("{kind} {name} is suspended")]
    #[diagnostic(
        code(groundwork::converge::suspended),
        help("Resume the object before bootstrapping")
    )]
    Suspended { kind: String, name: String },

    #[error("{kind} {name} is not ready: {message}")]
    #[diagnostic(code(groundwork::converge::readiness_failed))]
    ReadinessFailed {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Timed out after {after} waiting for {what}")]
    #[diagnostic(code(groundwork::converge::timeout))]
    Timeout { what: String, after: String },

    #[error("Workloads in namespace {namespace} are not healthy: {}", .failures.join("; "))]
    #[diagnostic(code(groundwork::converge::workloads_unhealthy))]
    WorkloadsUnhealthy {
        namespace: String,
        failures: Vec<String>,
    },

    #[error("{}", .errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    #[diagnostic(code(groundwork::converge::combined))]
    Combined { errors: Vec<GroundworkError> },

    // Orchestration errors
    #[error("{stage} failed: {source}")]
    #[diagnostic(code(groundwork::bootstrap::stage_failed))]
    Stage {
        stage: String,
        #[source]
        source: Box<GroundworkError>,
    },

    // File system errors
    #[error("IO error: {message}")]
    #[diagnostic(code(groundwork::fs::io_error))]
    IoError { message: String },

    #[error("Failed to read file: {path}: {reason}")]
    #[diagnostic(code(groundwork::fs::read_failed))]
    FileReadFailed { path: String, reason: String },

    #[error("Failed to write file: {path}: {reason}")]
    #[diagnostic(code(groundwork::fs::write_failed))]
    FileWriteFailed { path: String, reason: String },
}

impl GroundworkError {
    /// The innermost error, looking through stage wrappers.
    pub fn root(&self) -> &GroundworkError {
        match self {
            GroundworkError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// A request that never got an answer, as opposed to one the other side rejected.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self.root(),
            GroundworkError::Cancelled { .. } | GroundworkError::Http { .. }
        )
    }
}

impl From<std::io::Error> for GroundworkError {
    fn from(err: std::io::Error) -> Self {
        GroundworkError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GroundworkError {
    fn from(err: serde_yaml::Error) -> Self {
        GroundworkError::ConfigParseFailed {
            path: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GroundworkError {
    fn from(err: serde_json::Error) -> Self {
        GroundworkError::ConfigParseFailed {
            path: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<git2::Error> for GroundworkError {
    fn from(err: git2::Error) -> Self {
        GroundworkError::GitOperationFailed {
            message: err.message().to_string(),
        }
    }
}

impl From<reqwest::Error> for GroundworkError {
    fn from(err: reqwest::Error) -> Self {
        GroundworkError::Http {
            url: err.url().map(ToString::to_string).unwrap_or_default(),
            reason: err.to_string(),
        }
    }
}

impl From<inquire::InquireError> for GroundworkError {
    fn from(err: inquire::InquireError) -> Self {
        GroundworkError::IoError {
            message: err.to_string(),
        }
    }
}

/// Result type alias using miette for error handling
pub type Result<T> = miette::Result<T, GroundworkError>;

#[cfg(test)]
mod tests;
