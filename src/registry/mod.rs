//! Component registries
//!
//! This module handles:
//! - Listing and looking up component versions in an OCI registry
//! - Fetching blobs referenced by component resources
//! - Reading common-transport-format archives
//! - Copying archive contents into a registry
//!
//! Component descriptors are stored under
//! `<base>/component-descriptors/<component-name>:<version>`.

pub mod archive;
pub mod credentials;
pub mod descriptor;
pub mod oci;
pub mod transfer;

pub use descriptor::{AccessSpec, ComponentDescriptor, ComponentReferenceSpec, Resource};

use crate::deadline::Deadline;
use crate::error::Result;

/// Read access to published component versions.
pub trait ComponentRepository: Send + Sync {
    /// Every published version of `component`, in registry listing order.
    fn list_versions(&self, deadline: &Deadline, component: &str) -> Result<Vec<String>>;

    fn lookup(&self, deadline: &Deadline, component: &str, version: &str)
    -> Result<ComponentDescriptor>;

    /// A blob stored alongside `component`'s descriptors.
    fn fetch_blob(&self, deadline: &Deadline, component: &str, digest: &str) -> Result<Vec<u8>>;
}

/// Write access for copying artifacts in.
pub trait ArtifactStore: Send + Sync {
    fn has_blob(&self, deadline: &Deadline, repository: &str, digest: &str) -> Result<bool>;

    fn push_blob(&self, deadline: &Deadline, repository: &str, digest: &str, data: Vec<u8>)
    -> Result<()>;

    fn push_manifest(
        &self,
        deadline: &Deadline,
        repository: &str,
        reference: &str,
        media_type: &str,
        data: Vec<u8>,
    ) -> Result<()>;
}

/// A registry that can be both read and written.
pub trait Registry: ComponentRepository + ArtifactStore {
    fn as_repository(&self) -> &dyn ComponentRepository;
    fn as_store(&self) -> &dyn ArtifactStore;
}

impl<T: ComponentRepository + ArtifactStore> Registry for T {
    fn as_repository(&self) -> &dyn ComponentRepository {
        self
    }

    fn as_store(&self) -> &dyn ArtifactStore {
        self
    }
}

/// Repository path holding a component's descriptors.
pub fn descriptor_repository(component: &str) -> String {
    format!("component-descriptors/{component}")
}
