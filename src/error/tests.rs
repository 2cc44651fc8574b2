//! Error type tests
//!
//! Tests for GroundworkError and its conversions.

#![allow(clippy::expect_used)]

use std::time::Duration;

use crate::error::GroundworkError;
use crate::error::config::{invalid as config_invalid, unsupported_provider};
use crate::error::converge::{combined, readiness_failed, stage, suspended, timeout, workloads_unhealthy};
use crate::error::localize::unresolved_image;
use crate::error::resolve::{invalid_version, no_matching_version, reference_not_found};
use crate::error::transport::{self, provider_request};
use miette::Diagnostic;

macro_rules! test_error_contains {
    ($test_name:ident, $err:expr, $($contains:expr),+ $(,)?) => {
        #[test]
        fn $test_name() {
            let err = $err;
            let error_string = err.to_string();
            $(
                assert!(error_string.contains($contains),
                    "Error message should contain '{}', got: {}",
                    $contains,
                    error_string
                );
            )+
        }
    };
}

test_error_contains!(
    test_config_invalid,
    config_invalid("repository name must be set"),
    "Invalid configuration",
    "repository name must be set"
);

test_error_contains!(
    test_unsupported_provider,
    unsupported_provider("bitbucket"),
    "Unsupported git provider",
    "bitbucket"
);

test_error_contains!(
    test_no_matching_version,
    no_matching_version("ocm.software/ocm-controller", ">=2.0.0"),
    "ocm.software/ocm-controller",
    ">=2.0.0"
);

test_error_contains!(
    test_invalid_version,
    invalid_version("ocm.software/mpas/bootstrap", "latest", "unexpected character"),
    "latest",
    "ocm.software/mpas/bootstrap"
);

test_error_contains!(
    test_reference_not_found,
    reference_not_found("ocm.software/mpas/bootstrap", "flux"),
    "does not reference flux"
);

test_error_contains!(
    test_unresolved_image,
    unresolved_image("ocm-controller", "manager"),
    "unknown image resource manager"
);

test_error_contains!(
    test_provider_request,
    provider_request("gitea", 422, "branch does not exist"),
    "gitea API returned 422",
    "branch does not exist"
);

test_error_contains!(
    test_suspended,
    suspended("Kustomization", "flux-system/flux-system"),
    "Kustomization flux-system/flux-system is suspended"
);

test_error_contains!(
    test_readiness_failed,
    readiness_failed("GitRepository", "flux-system", "authentication required"),
    "authentication required"
);

test_error_contains!(
    test_timeout,
    timeout("Kustomization flux-system", Duration::from_secs(5)),
    "Timed out after 5s"
);

#[test]
fn test_workloads_unhealthy_joins_all_failures() {
    let err = workloads_unhealthy(
        "ocm-system",
        vec![
            "ocm-controller: 0/1 replicas ready".to_string(),
            "git-controller: not found".to_string(),
        ],
    );
    let message = err.to_string();
    assert!(message.contains("ocm-controller: 0/1 replicas ready"));
    assert!(message.contains("git-controller: not found"));
}

#[test]
fn test_combined_single_error_is_unwrapped() {
    let err = combined(vec![suspended("Kustomization", "flux-system")]);
    assert!(matches!(err, GroundworkError::Suspended { .. }));
}

#[test]
fn test_combined_keeps_every_message() {
    let err = combined(vec![
        suspended("Kustomization", "flux-system"),
        timeout("deployments", Duration::from_secs(1)),
    ]);
    let message = err.to_string();
    assert!(message.contains("suspended"));
    assert!(message.contains("Timed out"));
}

#[test]
fn test_stage_wraps_and_exposes_root() {
    let err = stage("InstallCA", no_matching_version("cert-manager", "1.x"));
    assert!(err.to_string().starts_with("InstallCA failed:"));
    assert!(matches!(err.root(), GroundworkError::NoMatchingVersion { .. }));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_is_interrupted() {
    assert!(transport::http("https://cluster/api", "operation timed out").is_interrupted());
    assert!(transport::cancelled("sync status").is_interrupted());
    assert!(stage("wait for reconciliation", transport::cancelled("apply")).is_interrupted());
    assert!(!transport::cluster("Deployment a/b", "403 Forbidden").is_interrupted());
}

#[test]
fn test_diagnostic_codes() {
    let err = unsupported_provider("svn");
    let code = err.code().map(|c| c.to_string());
    assert_eq!(
        code.as_deref(),
        Some("groundwork::config::unsupported_provider")
    );
}

#[test]
fn test_from_io_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: GroundworkError = io_err.into();
    assert!(matches!(err, GroundworkError::IoError { .. }));
}

#[test]
fn test_from_yaml_error() {
    let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [").expect_err("invalid yaml");
    let err: GroundworkError = yaml_err.into();
    assert!(matches!(err, GroundworkError::ConfigParseFailed { .. }));
}
