//! Cluster access for the reconciliation agent
//!
//! This module handles:
//! - Reading the status of the agent's `GitRepository` and `Kustomization` objects
//! - Requesting an immediate reconcile through the `requestedAt` annotation
//! - Reading workload (Deployment) health
//! - Applying objects the agent cannot apply itself (its own manifests, the
//!   source secret)
//!
//! [`ClusterClient`] is the seam; [`kube::KubeClient`] talks to a real API
//! server.

pub mod kube;
pub mod kubeconfig;

use std::fmt;

use serde_json::Value;

use crate::deadline::Deadline;
use crate::error::Result;

/// Annotation the agent watches for manual reconcile requests.
pub const RECONCILE_REQUEST_ANNOTATION: &str = "reconcile.fluxcd.io/requestedAt";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Agent object kinds that are polled for convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedKind {
    /// The source object fetching the management repository.
    GitRepository,
    /// The sync object applying it.
    Kustomization,
}

impl WatchedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WatchedKind::GitRepository => "GitRepository",
            WatchedKind::Kustomization => "Kustomization",
        }
    }

    pub fn api_version(self) -> &'static str {
        match self {
            WatchedKind::GitRepository => "source.toolkit.fluxcd.io/v1",
            WatchedKind::Kustomization => "kustomize.toolkit.fluxcd.io/v1",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            WatchedKind::GitRepository => "gitrepositories",
            WatchedKind::Kustomization => "kustomizations",
        }
    }
}

impl fmt::Display for WatchedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// What the poller needs from a watched object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub suspended: bool,
    pub generation: i64,
    pub observed_generation: i64,
    /// Last attempted revision (`Kustomization`) or artifact revision (`GitRepository`).
    pub revision: Option<String>,
    /// Last successfully applied revision; only set on `Kustomization`.
    pub applied_revision: Option<String>,
    pub ready: Option<Condition>,
}

impl SyncStatus {
    /// Reads the status of an object of `kind` as returned by the API server.
    pub fn from_object(kind: WatchedKind, object: &Value) -> Self {
        let status = &object["status"];
        let revision = match kind {
            WatchedKind::GitRepository => status["artifact"]["revision"].as_str(),
            WatchedKind::Kustomization => status["lastAttemptedRevision"].as_str(),
        };
        Self {
            suspended: object["spec"]["suspend"].as_bool().unwrap_or(false),
            generation: object["metadata"]["generation"].as_i64().unwrap_or(0),
            observed_generation: status["observedGeneration"].as_i64().unwrap_or(-1),
            revision: revision.map(str::to_string),
            applied_revision: status["lastAppliedRevision"].as_str().map(str::to_string),
            ready: find_condition(status, "Ready"),
        }
    }
}

fn find_condition(status: &Value, condition_type: &str) -> Option<Condition> {
    status["conditions"]
        .as_array()?
        .iter()
        .find(|c| c["type"].as_str() == Some(condition_type))
        .map(|c| Condition {
            status: c["status"].as_str().unwrap_or("Unknown").to_string(),
            reason: c["reason"].as_str().map(str::to_string),
            message: c["message"].as_str().map(str::to_string),
        })
}

/// Health of a workload as the agent's health checks judge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadStatus {
    Current,
    InProgress(String),
    Failed(String),
    NotFound,
}

impl WorkloadStatus {
    pub fn is_current(&self) -> bool {
        matches!(self, WorkloadStatus::Current)
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadStatus::Current => f.write_str("Current"),
            WorkloadStatus::InProgress(reason) => write!(f, "InProgress: {reason}"),
            WorkloadStatus::Failed(reason) => write!(f, "Failed: {reason}"),
            WorkloadStatus::NotFound => f.write_str("NotFound"),
        }
    }
}

/// Computes a Deployment's status from its `metadata`, `spec` and `status`.
pub fn deployment_status(deployment: &Value) -> WorkloadStatus {
    let status = &deployment["status"];
    let generation = deployment["metadata"]["generation"].as_i64().unwrap_or(0);
    let observed = status["observedGeneration"].as_i64().unwrap_or(0);
    if generation > observed {
        return WorkloadStatus::InProgress("Deployment generation not yet observed".into());
    }

    if let Some(progressing) = find_condition(status, "Progressing") {
        if progressing.reason.as_deref() == Some("ProgressDeadlineExceeded") {
            return WorkloadStatus::Failed(
                progressing
                    .message
                    .unwrap_or_else(|| "progress deadline exceeded".into()),
            );
        }
    }

    let wanted = deployment["spec"]["replicas"].as_i64().unwrap_or(1);
    let count = |field: &str| status[field].as_i64().unwrap_or(0);
    if count("updatedReplicas") < wanted {
        return WorkloadStatus::InProgress(format!(
            "Updated: {}/{wanted}",
            count("updatedReplicas")
        ));
    }
    if count("replicas") > count("updatedReplicas") {
        return WorkloadStatus::InProgress(format!(
            "Pending termination: {}",
            count("replicas") - count("updatedReplicas")
        ));
    }
    if count("availableReplicas") < wanted {
        return WorkloadStatus::InProgress(format!(
            "Available: {}/{wanted}",
            count("availableReplicas")
        ));
    }
    if count("readyReplicas") < wanted {
        return WorkloadStatus::InProgress(format!("Ready: {}/{wanted}", count("readyReplicas")));
    }
    WorkloadStatus::Current
}

/// Operations run against the cluster.
pub trait ClusterClient: Send + Sync {
    /// Status of a watched object, `None` when it does not exist.
    fn sync_status(
        &self,
        deadline: &Deadline,
        kind: WatchedKind,
        key: &ObjectKey,
    ) -> Result<Option<SyncStatus>>;

    /// Sets the reconcile request annotation to `requested_at` with an
    /// optimistic-concurrency update. A lost race fails with `Conflict`.
    fn request_reconcile(
        &self,
        deadline: &Deadline,
        kind: WatchedKind,
        key: &ObjectKey,
        requested_at: &str,
    ) -> Result<()>;

    /// Health of the Deployment at `key`.
    fn workload_status(&self, deadline: &Deadline, key: &ObjectKey) -> Result<WorkloadStatus>;

    /// Server-side applies `objects`.
    fn apply(&self, deadline: &Deadline, objects: &[serde_yaml::Value]) -> Result<()>;
}
