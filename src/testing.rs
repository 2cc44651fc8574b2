//! In-memory collaborators for tests
//!
//! [`FakeProvider`], [`FakeRegistry`], [`FakeCluster`] and [`FakeCheckout`]
//! stand in for the hosting API, the component registry, the API server and
//! the local clone. They share state through `Arc<Mutex<_>>` so a test can
//! keep a handle while the code under test owns a clone.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::cluster::{
    ClusterClient, Condition, ObjectKey, SyncStatus, WatchedKind, WorkloadStatus,
};
use crate::converge::expected_revision;
use crate::deadline::Deadline;
use crate::defaults::{IMAGE_RESOURCE_TYPE, LOCALIZATION_RESOURCE};
use crate::error::{Result, resolve, transport};
use crate::git::Checkout;
use crate::manifest;
use crate::provider::{
    CommitFile, CommitOutcome, GitProvider, ManagementRepository, ProviderKind, RepositorySpec,
};
use crate::registry::archive::digest_of;
use crate::registry::descriptor::{ComponentSpec, Meta, OciManifest, descriptor_from_manifest};
use crate::registry::{
    AccessSpec, ArtifactStore, ComponentDescriptor, ComponentReferenceSpec, ComponentRepository,
    Resource, descriptor_repository,
};

fn fake_sha(seed: usize) -> String {
    digest_of(format!("commit-{seed}").as_bytes())
        .trim_start_matches("sha256:")
        .chars()
        .take(40)
        .collect()
}

#[derive(Default)]
struct Branch {
    head: String,
    /// Path to content as sent by the caller (already encoded).
    files: BTreeMap<String, String>,
}

#[derive(Default)]
struct ProviderState {
    repository: Option<ManagementRepository>,
    branches: BTreeMap<String, Branch>,
    messages: Vec<String>,
    deleted: bool,
    created: usize,
    shas: usize,
}

/// A hosting backend holding one repository in memory.
#[derive(Clone)]
pub struct FakeProvider {
    kind: ProviderKind,
    state: Arc<Mutex<ProviderState>>,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap()
    }

    pub fn head(&self, branch: &str) -> String {
        self.state().branches.get(branch).map(|b| b.head.clone()).unwrap_or_default()
    }

    /// Decoded content of `path` at the head of `branch`.
    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        self.raw_file(branch, path)
            .map(|raw| String::from_utf8_lossy(&self.kind.decode_content(&raw)).into_owned())
    }

    pub fn raw_file(&self, branch: &str, path: &str) -> Option<String> {
        self.state().branches.get(branch)?.files.get(path).cloned()
    }

    pub fn paths(&self, branch: &str) -> Vec<String> {
        self.state()
            .branches
            .get(branch)
            .map(|b| b.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.state().messages.clone()
    }

    pub fn last_message(&self) -> Option<String> {
        self.state().messages.last().cloned()
    }

    /// Commits made after the repository was created.
    pub fn commit_count(&self) -> usize {
        self.state().messages.len()
    }

    pub fn repositories_created(&self) -> usize {
        self.state().created
    }

    pub fn is_deleted(&self) -> bool {
        self.state().deleted
    }

    pub fn repository(&self) -> Option<ManagementRepository> {
        self.state().repository.clone()
    }

    fn next_sha(state: &mut ProviderState) -> String {
        state.shas += 1;
        fake_sha(state.shas)
    }
}

impl GitProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn find_repository(
        &self,
        deadline: &Deadline,
        spec: &RepositorySpec,
    ) -> Result<Option<ManagementRepository>> {
        deadline.check("find repository")?;
        let full_path = format!("{}/{}", spec.owner, spec.name);
        Ok(self
            .state()
            .repository
            .clone()
            .filter(|r| r.full_path == full_path))
    }

    fn create_repository(
        &self,
        deadline: &Deadline,
        spec: &RepositorySpec,
    ) -> Result<ManagementRepository> {
        deadline.check("create repository")?;
        let full_path = format!("{}/{}", spec.owner, spec.name);
        let repository = ManagementRepository {
            provider: self.kind,
            id: full_path.clone(),
            full_path: full_path.clone(),
            clone_url: format!("https://git.example.com/{full_path}.git"),
            default_branch: spec.default_branch.clone(),
        };
        let mut state = self.state();
        let head = Self::next_sha(&mut state);
        state.branches.insert(
            spec.default_branch.clone(),
            Branch {
                head,
                files: BTreeMap::new(),
            },
        );
        state.repository = Some(repository.clone());
        state.created += 1;
        Ok(repository)
    }

    fn branch_head(
        &self,
        deadline: &Deadline,
        _repo: &ManagementRepository,
        branch: &str,
    ) -> Result<String> {
        deadline.check("branch head")?;
        self.state()
            .branches
            .get(branch)
            .map(|b| b.head.clone())
            .ok_or_else(|| transport::provider_request(self.kind.as_str(), 404, "branch not found"))
    }

    fn create_commit(
        &self,
        deadline: &Deadline,
        _repo: &ManagementRepository,
        branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> Result<CommitOutcome> {
        deadline.check("create commit")?;
        let mut state = self.state();
        let unchanged = state.branches.get(branch).is_some_and(|b| {
            files
                .iter()
                .all(|f| b.files.get(&f.path) == Some(&f.content))
        });
        if unchanged {
            let head = state.branches[branch].head.clone();
            return Ok(CommitOutcome::Unchanged { head });
        }

        let sha = Self::next_sha(&mut state);
        let entry = state.branches.entry(branch.to_string()).or_default();
        for file in files {
            entry.files.insert(file.path.clone(), file.content.clone());
        }
        entry.head = sha.clone();
        state.messages.push(message.to_string());
        Ok(CommitOutcome::Created { sha })
    }

    fn delete_repository(&self, deadline: &Deadline, _repo: &ManagementRepository) -> Result<()> {
        deadline.check("delete repository")?;
        let mut state = self.state();
        state.repository = None;
        state.deleted = true;
        Ok(())
    }
}

/// A working copy that commits straight into a [`FakeProvider`].
pub struct FakeCheckout {
    provider: FakeProvider,
}

impl FakeCheckout {
    pub fn new(provider: FakeProvider) -> Self {
        Self { provider }
    }
}

impl Checkout for FakeCheckout {
    fn commit_and_push(
        &mut self,
        deadline: &Deadline,
        branch: &str,
        message: &str,
        files: &[(String, Vec<u8>)],
    ) -> Result<CommitOutcome> {
        let repository = self
            .provider
            .repository()
            .ok_or_else(|| transport::clone_failed("fake", "repository does not exist"))?;
        let files: Vec<CommitFile> = files
            .iter()
            .map(|(path, content)| CommitFile {
                path: path.clone(),
                content: self.provider.kind().encode_content(content),
            })
            .collect();
        self.provider
            .create_commit(deadline, &repository, branch, message, &files)
    }
}

#[derive(Default)]
struct RegistryState {
    descriptors: Vec<ComponentDescriptor>,
    blobs: BTreeMap<String, Vec<u8>>,
    manifests: BTreeMap<(String, String), Vec<u8>>,
    lookups: Vec<(String, String)>,
}

/// A registry holding descriptors, blobs and pushed manifests.
#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<RegistryState>,
}

impl FakeRegistry {
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap()
    }

    /// Publishes a descriptor; versions list in publication order.
    pub fn publish(&self, descriptor: ComponentDescriptor) {
        self.state().descriptors.push(descriptor);
    }

    pub fn add_blob(&self, data: &[u8]) -> String {
        let digest = digest_of(data);
        self.state().blobs.insert(digest.clone(), data.to_vec());
        digest
    }

    /// `(component, version)` pairs looked up so far.
    pub fn lookups(&self) -> Vec<(String, String)> {
        self.state().lookups.clone()
    }
}

impl ComponentRepository for FakeRegistry {
    fn list_versions(&self, deadline: &Deadline, component: &str) -> Result<Vec<String>> {
        deadline.check("list versions")?;
        let state = self.state();
        let repository = descriptor_repository(component);
        let mut versions: Vec<String> = state
            .descriptors
            .iter()
            .filter(|d| d.name() == component)
            .map(|d| d.version().to_string())
            .collect();
        for (repo, reference) in state.manifests.keys() {
            if *repo == repository && !versions.contains(reference) {
                versions.push(reference.clone());
            }
        }
        if versions.is_empty() {
            return Err(resolve::component_not_found(component, "no versions published"));
        }
        Ok(versions)
    }

    fn lookup(&self, deadline: &Deadline, component: &str, version: &str) -> Result<ComponentDescriptor> {
        deadline.check("lookup component")?;
        let mut state = self.state();
        state.lookups.push((component.to_string(), version.to_string()));
        if let Some(found) = state
            .descriptors
            .iter()
            .find(|d| d.name() == component && d.version() == version)
        {
            return Ok(found.clone());
        }
        let key = (descriptor_repository(component), version.to_string());
        let Some(data) = state.manifests.get(&key) else {
            return Err(resolve::component_not_found(component, format!("version {version} not found")));
        };
        let manifest: OciManifest = serde_json::from_slice(data)?;
        descriptor_from_manifest(&manifest, |digest| {
            state
                .blobs
                .get(digest)
                .cloned()
                .ok_or_else(|| transport::registry(digest, "blob not found"))
        })
    }

    fn fetch_blob(&self, deadline: &Deadline, _component: &str, digest: &str) -> Result<Vec<u8>> {
        deadline.check("fetch blob")?;
        self.state()
            .blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| transport::registry(digest, "blob not found"))
    }
}

impl ArtifactStore for FakeRegistry {
    fn has_blob(&self, deadline: &Deadline, _repository: &str, digest: &str) -> Result<bool> {
        deadline.check("check blob")?;
        Ok(self.state().blobs.contains_key(digest))
    }

    fn push_blob(&self, deadline: &Deadline, _repository: &str, digest: &str, data: Vec<u8>) -> Result<()> {
        deadline.check("push blob")?;
        self.state().blobs.insert(digest.to_string(), data);
        Ok(())
    }

    fn push_manifest(
        &self,
        deadline: &Deadline,
        repository: &str,
        reference: &str,
        _media_type: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        deadline.check("push manifest")?;
        self.state()
            .manifests
            .insert((repository.to_string(), reference.to_string()), data);
        Ok(())
    }
}

/// A descriptor with only component references.
pub fn descriptor_with_references(
    name: &str,
    version: &str,
    references: &[(&str, &str, &str)],
) -> ComponentDescriptor {
    ComponentDescriptor {
        meta: Meta {
            schema_version: "v2".into(),
        },
        component: ComponentSpec {
            name: name.into(),
            version: version.into(),
            provider: serde_yaml::Value::Null,
            resources: vec![],
            component_references: references
                .iter()
                .map(|(ref_name, component_name, version)| ComponentReferenceSpec {
                    name: ref_name.to_string(),
                    component_name: component_name.to_string(),
                    version: version.to_string(),
                })
                .collect(),
        },
    }
}

/// Stores the manifest and localization blobs, publishes a descriptor
/// carrying them plus `images` (resource name, image reference), and
/// returns it.
pub fn component_with_resources(
    registry: &FakeRegistry,
    name: &str,
    version: &str,
    manifest_resource: &str,
    manifest: &[u8],
    localization: &[u8],
    images: &[(&str, &str)],
) -> ComponentDescriptor {
    let local_blob = |data: &[u8]| AccessSpec::LocalBlob {
        local_reference: registry.add_blob(data),
        media_type: "application/x-yaml".into(),
    };
    let mut resources = vec![
        Resource {
            name: manifest_resource.into(),
            version: Some(version.into()),
            resource_type: "file".into(),
            relation: Some("local".into()),
            access: local_blob(manifest),
        },
        Resource {
            name: LOCALIZATION_RESOURCE.into(),
            version: Some(version.into()),
            resource_type: "file".into(),
            relation: Some("local".into()),
            access: local_blob(localization),
        },
    ];
    for (image_name, reference) in images {
        resources.push(Resource {
            name: image_name.to_string(),
            version: Some(version.into()),
            resource_type: IMAGE_RESOURCE_TYPE.into(),
            relation: Some("external".into()),
            access: AccessSpec::OciArtifact {
                image_reference: reference.to_string(),
            },
        });
    }

    let mut descriptor = descriptor_with_references(name, version, &[]);
    descriptor.component.resources = resources;
    registry.publish(descriptor.clone());
    descriptor
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[derive(Default)]
struct ClusterState {
    statuses: HashMap<(WatchedKind, ObjectKey), SyncStatus>,
    workloads: HashMap<ObjectKey, WorkloadStatus>,
    /// Watched objects created by `apply`.
    existing: BTreeSet<(&'static str, ObjectKey)>,
    follow: Option<(FakeProvider, String)>,
    conflicts: u32,
    stalled_status_reads: bool,
    reconcile_requests: u32,
    status_reads: u32,
    workload_queries: Vec<ObjectKey>,
    applied: Vec<serde_yaml::Value>,
}

/// An API server whose agent objects and workloads report what the test
/// configured.
///
/// In following mode, applied `GitRepository`/`Kustomization` objects report
/// `Ready` at the current head of a [`FakeProvider`] branch, like an agent
/// that always catches up.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    pub fn following(provider: &FakeProvider, branch: &str) -> Self {
        let cluster = Self::default();
        cluster.state().follow = Some((provider.clone(), branch.to_string()));
        cluster
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap()
    }

    pub fn set_sync_status(&self, kind: WatchedKind, key: &ObjectKey, status: SyncStatus) {
        self.state().statuses.insert((kind, key.clone()), status);
    }

    pub fn set_workload_status(&self, key: &ObjectKey, status: WorkloadStatus) {
        self.state().workloads.insert(key.clone(), status);
    }

    /// The next `count` reconcile requests fail with `Conflict`.
    pub fn fail_reconcile_with_conflicts(&self, count: u32) {
        self.state().conflicts = count;
    }

    /// Status reads hang until the request timeout and then fail in transit.
    pub fn stall_status_reads(&self) {
        self.state().stalled_status_reads = true;
    }

    pub fn reconcile_requests(&self) -> u32 {
        self.state().reconcile_requests
    }

    pub fn status_reads(&self) -> u32 {
        self.state().status_reads
    }

    pub fn workload_queries(&self) -> Vec<ObjectKey> {
        self.state().workload_queries.clone()
    }

    pub fn applied(&self) -> Vec<serde_yaml::Value> {
        self.state().applied.clone()
    }

    fn lookup(state: &ClusterState, kind: WatchedKind, key: &ObjectKey) -> Option<SyncStatus> {
        if let Some(status) = state.statuses.get(&(kind, key.clone())) {
            return Some(status.clone());
        }
        let (provider, branch) = state.follow.as_ref()?;
        if !state.existing.contains(&(kind.as_str(), key.clone())) {
            return None;
        }
        let revision = expected_revision(branch, &provider.head(branch));
        Some(SyncStatus {
            suspended: false,
            generation: 1,
            observed_generation: 1,
            revision: Some(revision.clone()),
            applied_revision: Some(revision),
            ready: Some(Condition {
                status: "True".into(),
                reason: Some("ReconciliationSucceeded".into()),
                message: None,
            }),
        })
    }
}

impl ClusterClient for FakeCluster {
    fn sync_status(
        &self,
        deadline: &Deadline,
        kind: WatchedKind,
        key: &ObjectKey,
    ) -> Result<Option<SyncStatus>> {
        deadline.check("sync status")?;
        if self.state().stalled_status_reads {
            std::thread::sleep(deadline.cap(Duration::from_secs(5)));
            return Err(transport::http(format!("https://cluster/{kind}/{key}"), "operation timed out"));
        }
        let mut state = self.state();
        state.status_reads += 1;
        Ok(Self::lookup(&state, kind, key))
    }

    fn request_reconcile(
        &self,
        deadline: &Deadline,
        kind: WatchedKind,
        key: &ObjectKey,
        _requested_at: &str,
    ) -> Result<()> {
        deadline.check("request reconcile")?;
        let mut state = self.state();
        if Self::lookup(&state, kind, key).is_none() {
            return Err(transport::cluster(format!("{kind} {key}"), "not found"));
        }
        if state.conflicts > 0 {
            state.conflicts -= 1;
            return Err(transport::conflict(format!("{kind} {key}")));
        }
        state.reconcile_requests += 1;
        Ok(())
    }

    fn workload_status(&self, deadline: &Deadline, key: &ObjectKey) -> Result<WorkloadStatus> {
        deadline.check("workload status")?;
        let mut state = self.state();
        state.workload_queries.push(key.clone());
        Ok(state
            .workloads
            .get(key)
            .cloned()
            .unwrap_or(WorkloadStatus::Current))
    }

    fn apply(&self, deadline: &Deadline, objects: &[serde_yaml::Value]) -> Result<()> {
        deadline.check("apply")?;
        let mut state = self.state();
        for object in objects {
            let kind = match manifest::kind(object) {
                Some("GitRepository") => Some(WatchedKind::GitRepository.as_str()),
                Some("Kustomization") => Some(WatchedKind::Kustomization.as_str()),
                _ => None,
            };
            if let (Some(kind), Some(name)) = (kind, manifest::name(object)) {
                let namespace = manifest::namespace(object).unwrap_or("default");
                state.existing.insert((kind, ObjectKey::new(namespace, name)));
            }
            state.applied.push(object.clone());
        }
        Ok(())
    }
}
