//! Convergence polling
//!
//! Two independent waits:
//! - a watched agent object converges when it is not suspended, has observed
//!   its current generation, reports the expected revision and is `Ready`;
//! - workloads converge when every Deployment is `Current`.
//!
//! Each wait carries its own timeout, separate from the run's deadline.

use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::cluster::{ClusterClient, ObjectKey, SyncStatus, WatchedKind, WorkloadStatus};
use crate::deadline::Deadline;
use crate::error::{GroundworkError, Result, converge, transport};

/// Exponential backoff for conflicting metadata updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    /// Fraction of each delay added at random.
    pub jitter: f64,
    /// Total attempts.
    pub steps: u32,
}

impl Backoff {
    pub const CONFLICT: Backoff = Backoff {
        initial: Duration::from_millis(10),
        factor: 5.0,
        jitter: 0.1,
        steps: 4,
    };

    fn delay(&self, retry: u32) -> Duration {
        let base = self.initial.mul_f64(self.factor.powi(retry as i32));
        if self.jitter <= 0.0 {
            return base;
        }
        base + base.mul_f64(rand::thread_rng().gen_range(0.0..self.jitter))
    }
}

/// Runs `op`, retrying while it fails with `Conflict`.
pub fn retry_on_conflict<T>(backoff: &Backoff, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut retry = 0;
    loop {
        match op() {
            Err(GroundworkError::Conflict { resource }) if retry + 1 < backoff.steps => {
                tracing::debug!(%resource, attempt = retry + 1, "update conflict, retrying");
                thread::sleep(backoff.delay(retry));
                retry += 1;
            }
            other => return other,
        }
    }
}

/// The revision string the agent reports once it has fetched `sha`.
pub fn expected_revision(branch: &str, sha: &str) -> String {
    format!("{branch}@sha1:{sha}")
}

/// `Ok(true)` once converged, `Ok(false)` to keep polling.
pub fn assess_sync(
    kind: WatchedKind,
    key: &ObjectKey,
    expected_revision: &str,
    status: &SyncStatus,
) -> Result<bool> {
    if status.suspended {
        return Err(converge::suspended(kind.as_str(), key.to_string()));
    }
    if status.generation != status.observed_generation {
        return Ok(false);
    }
    if status.revision.as_deref() != Some(expected_revision) {
        return Ok(false);
    }
    match &status.ready {
        Some(ready) if ready.status == "True" => Ok(true),
        Some(ready) if ready.status == "False" => Err(converge::readiness_failed(
            kind.as_str(),
            key.to_string(),
            ready.message.clone().unwrap_or_default(),
        )),
        _ => Ok(false),
    }
}

pub struct Poller<'a> {
    cluster: &'a dyn ClusterClient,
    interval: Duration,
}

impl<'a> Poller<'a> {
    pub fn new(cluster: &'a dyn ClusterClient, interval: Duration) -> Self {
        Self { cluster, interval }
    }

    /// Annotates the object so the agent reconciles it now.
    pub fn request_reconcile(&self, deadline: &Deadline, kind: WatchedKind, key: &ObjectKey) -> Result<()> {
        retry_on_conflict(&Backoff::CONFLICT, || {
            let requested_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
            self.cluster.request_reconcile(deadline, kind, key, &requested_at)
        })?;
        tracing::debug!(%kind, %key, "requested reconcile");
        Ok(())
    }

    /// Polls `kind` `key` until it converges on `expected_revision`.
    pub fn wait_for_sync(
        &self,
        kind: WatchedKind,
        key: &ObjectKey,
        expected_revision: &str,
        timeout: Duration,
    ) -> Result<()> {
        let what = format!("{kind} {key} to reconcile {expected_revision}");
        let converged = self.poll(timeout, |deadline| {
            let status = self
                .cluster
                .sync_status(deadline, kind, key)?
                .ok_or_else(|| transport::cluster(format!("{kind} {key}"), "not found"))?;
            Ok(assess_sync(kind, key, expected_revision, &status)?.then_some(()))
        })?;
        match converged {
            Some(()) => {
                tracing::info!(%kind, %key, revision = expected_revision, "reconciled");
                Ok(())
            }
            None => Err(converge::timeout(what, timeout)),
        }
    }

    /// Reconciles the source object, then the sync object, waiting for each
    /// to reach `branch@sha1:<sha>`.
    pub fn sync(&self, deadline: &Deadline, key: &ObjectKey, branch: &str, sha: &str, timeout: Duration) -> Result<()> {
        let revision = expected_revision(branch, sha);
        for kind in [WatchedKind::GitRepository, WatchedKind::Kustomization] {
            self.request_reconcile(deadline, kind, key)?;
            self.wait_for_sync(kind, key, &revision, timeout)?;
        }
        Ok(())
    }

    /// Polls the Deployments `names` in `namespace` until all are current.
    ///
    /// On timeout every workload that is still not current is reported.
    pub fn wait_for_workloads(&self, namespace: &str, names: &[String], timeout: Duration) -> Result<()> {
        let mut failures = Vec::new();
        let converged = self.poll(timeout, |deadline| {
            let mut pending = Vec::new();
            for name in names {
                let key = ObjectKey::new(namespace, name.as_str());
                match self.cluster.workload_status(deadline, &key)? {
                    WorkloadStatus::Current => {}
                    status => pending.push(format!("Deployment {key}: {status}")),
                }
            }
            // Only a complete pass replaces what gets reported.
            failures = pending;
            Ok(failures.is_empty().then_some(()))
        })?;
        match converged {
            Some(()) => {
                tracing::info!(namespace, workloads = names.len(), "workloads ready");
                Ok(())
            }
            None if failures.is_empty() => Err(converge::timeout(
                format!("workloads in {namespace}"),
                timeout,
            )),
            None => Err(converge::workloads_unhealthy(namespace, failures)),
        }
    }

    /// Calls `check` now and then every interval; `Ok(None)` on timeout.
    fn poll<T>(
        &self,
        timeout: Duration,
        mut check: impl FnMut(&Deadline) -> Result<Option<T>>,
    ) -> Result<Option<T>> {
        let deadline = Deadline::after(timeout);
        loop {
            match check(&deadline) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(err) if deadline.is_expired() && err.is_interrupted() => {
                    tracing::debug!(error = %err, "request cut off by the poll deadline");
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }
            match deadline.remaining() {
                Some(left) if left.is_zero() => return Ok(None),
                Some(left) => thread::sleep(self.interval.min(left)),
                None => thread::sleep(self.interval),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Condition;
    use crate::testing::FakeCluster;
    use std::cell::Cell;

    const INTERVAL: Duration = Duration::from_millis(1);
    const SHORT: Duration = Duration::from_millis(50);

    fn key() -> ObjectKey {
        ObjectKey::new("flux-system", "flux-system")
    }

    fn ready(revision: &str) -> SyncStatus {
        SyncStatus {
            suspended: false,
            generation: 2,
            observed_generation: 2,
            revision: Some(revision.to_string()),
            applied_revision: Some(revision.to_string()),
            ready: Some(Condition {
                status: "True".into(),
                reason: Some("ReconciliationSucceeded".into()),
                message: None,
            }),
        }
    }

    #[test]
    fn test_expected_revision() {
        assert_eq!(expected_revision("main", "abc123"), "main@sha1:abc123");
    }

    #[test]
    fn test_assess_ready() {
        assert!(assess_sync(WatchedKind::Kustomization, &key(), "main@sha1:a", &ready("main@sha1:a")).unwrap());
    }

    #[test]
    fn test_assess_suspended_is_fatal() {
        let mut status = ready("main@sha1:a");
        status.suspended = true;
        let err = assess_sync(WatchedKind::Kustomization, &key(), "main@sha1:a", &status).unwrap_err();
        assert!(matches!(err, GroundworkError::Suspended { .. }));
        assert!(err.to_string().contains("suspended"));
    }

    #[test]
    fn test_assess_keeps_polling() {
        let mut lagging = ready("main@sha1:a");
        lagging.observed_generation = 1;
        assert!(!assess_sync(WatchedKind::Kustomization, &key(), "main@sha1:a", &lagging).unwrap());

        let old_revision = ready("main@sha1:old");
        assert!(!assess_sync(WatchedKind::Kustomization, &key(), "main@sha1:a", &old_revision).unwrap());

        let mut unknown = ready("main@sha1:a");
        unknown.ready = None;
        assert!(!assess_sync(WatchedKind::Kustomization, &key(), "main@sha1:a", &unknown).unwrap());
    }

    #[test]
    fn test_assess_ready_false_surfaces_message() {
        let mut status = ready("main@sha1:a");
        status.ready = Some(Condition {
            status: "False".into(),
            reason: Some("BuildFailed".into()),
            message: Some("kustomize build failed: missing resource".into()),
        });
        let err = assess_sync(WatchedKind::Kustomization, &key(), "main@sha1:a", &status).unwrap_err();
        assert!(matches!(
            err,
            GroundworkError::ReadinessFailed { ref message, .. } if message == "kustomize build failed: missing resource"
        ));
    }

    #[test]
    fn test_wait_for_sync_suspended_fails_before_timeout() {
        let cluster = FakeCluster::default();
        let mut status = ready("main@sha1:a");
        status.suspended = true;
        cluster.set_sync_status(WatchedKind::GitRepository, &key(), status);

        let poller = Poller::new(&cluster, INTERVAL);
        let err = poller
            .wait_for_sync(WatchedKind::GitRepository, &key(), "main@sha1:a", Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, GroundworkError::Suspended { .. }));
    }

    #[test]
    fn test_wait_for_sync_generation_lag_times_out() {
        let cluster = FakeCluster::default();
        let mut status = ready("main@sha1:a");
        status.observed_generation = 1;
        cluster.set_sync_status(WatchedKind::Kustomization, &key(), status);

        let poller = Poller::new(&cluster, INTERVAL);
        let err = poller
            .wait_for_sync(WatchedKind::Kustomization, &key(), "main@sha1:a", SHORT)
            .unwrap_err();
        assert!(matches!(err, GroundworkError::Timeout { .. }));
        assert!(cluster.status_reads() > 1);
    }

    #[test]
    fn test_wait_for_sync_request_cut_off_at_deadline_times_out() {
        let cluster = FakeCluster::default();
        cluster.stall_status_reads();

        let poller = Poller::new(&cluster, INTERVAL);
        let err = poller
            .wait_for_sync(WatchedKind::Kustomization, &key(), "main@sha1:a", SHORT)
            .unwrap_err();
        assert!(matches!(err, GroundworkError::Timeout { .. }), "{err}");
    }

    #[test]
    fn test_poll_transport_error_before_deadline_is_fatal() {
        let cluster = FakeCluster::default();
        let poller = Poller::new(&cluster, INTERVAL);
        let result: Result<Option<()>> = poller.poll(Duration::from_secs(60), |_| {
            Err(transport::http("https://cluster/api", "connection refused"))
        });
        assert!(matches!(result, Err(GroundworkError::Http { .. })));
    }

    #[test]
    fn test_poll_answer_after_deadline_is_not_swallowed() {
        let cluster = FakeCluster::default();
        let poller = Poller::new(&cluster, INTERVAL);
        let result: Result<Option<()>> = poller.poll(SHORT, |deadline| {
            thread::sleep(deadline.cap(Duration::from_secs(5)));
            Err(converge::suspended("Kustomization", "flux-system/flux-system"))
        });
        assert!(matches!(result, Err(GroundworkError::Suspended { .. })));
    }

    #[test]
    fn test_wait_for_sync_missing_object_is_fatal() {
        let cluster = FakeCluster::default();
        let poller = Poller::new(&cluster, INTERVAL);
        let err = poller
            .wait_for_sync(WatchedKind::Kustomization, &key(), "main@sha1:a", Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, GroundworkError::Cluster { .. }));
    }

    #[test]
    fn test_wait_for_sync_succeeds() {
        let cluster = FakeCluster::default();
        cluster.set_sync_status(WatchedKind::Kustomization, &key(), ready("main@sha1:a"));
        let poller = Poller::new(&cluster, INTERVAL);
        poller
            .wait_for_sync(WatchedKind::Kustomization, &key(), "main@sha1:a", SHORT)
            .unwrap();
    }

    #[test]
    fn test_retry_on_conflict_retries_then_succeeds() {
        let calls = Cell::new(0);
        let backoff = Backoff {
            jitter: 0.0,
            initial: Duration::from_millis(1),
            ..Backoff::CONFLICT
        };
        let result = retry_on_conflict(&backoff, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(transport::conflict("Kustomization flux-system/flux-system"))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_retry_on_conflict_gives_up_after_steps() {
        let calls = Cell::new(0);
        let backoff = Backoff {
            initial: Duration::from_millis(1),
            ..Backoff::CONFLICT
        };
        let result: Result<()> = retry_on_conflict(&backoff, || {
            calls.set(calls.get() + 1);
            Err(transport::conflict("x"))
        });
        assert!(matches!(result, Err(GroundworkError::Conflict { .. })));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_retry_on_conflict_ignores_other_errors() {
        let calls = Cell::new(0);
        let result: Result<()> = retry_on_conflict(&Backoff::CONFLICT, || {
            calls.set(calls.get() + 1);
            Err(transport::cluster("x", "forbidden"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_request_reconcile_retries_conflicts() {
        let cluster = FakeCluster::default();
        cluster.set_sync_status(WatchedKind::Kustomization, &key(), ready("main@sha1:a"));
        cluster.fail_reconcile_with_conflicts(2);
        let poller = Poller::new(&cluster, INTERVAL);
        poller
            .request_reconcile(&Deadline::none(), WatchedKind::Kustomization, &key())
            .unwrap();
        assert_eq!(cluster.reconcile_requests(), 1);
    }

    #[test]
    fn test_wait_for_workloads_aggregates_failures() {
        let cluster = FakeCluster::default();
        cluster.set_workload_status(
            &ObjectKey::new("ocm-system", "ocm-controller"),
            WorkloadStatus::InProgress("Available: 0/1".into()),
        );
        cluster.set_workload_status(
            &ObjectKey::new("ocm-system", "git-controller"),
            WorkloadStatus::Failed("ImagePullBackOff".into()),
        );
        let poller = Poller::new(&cluster, INTERVAL);
        let names = vec![
            "ocm-controller".to_string(),
            "git-controller".to_string(),
            "replication-controller".to_string(),
        ];
        let err = poller.wait_for_workloads("ocm-system", &names, SHORT).unwrap_err();
        match err {
            GroundworkError::WorkloadsUnhealthy { namespace, failures } => {
                assert_eq!(namespace, "ocm-system");
                assert_eq!(failures.len(), 2);
                assert!(failures[0].contains("ocm-controller"));
                assert!(failures[1].contains("ImagePullBackOff"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wait_for_workloads_current() {
        let cluster = FakeCluster::default();
        let poller = Poller::new(&cluster, INTERVAL);
        poller
            .wait_for_workloads("cert-manager", &["cert-manager".to_string()], SHORT)
            .unwrap();
    }
}
