//! Copy a transport archive into a registry

use crate::deadline::Deadline;
use crate::error::Result;

use super::ArtifactStore;
use super::archive::TransportArchive;
use super::descriptor::OCI_MANIFEST_MEDIA_TYPE;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub artifacts: usize,
    pub blobs_pushed: usize,
    pub blobs_skipped: usize,
}

/// Pushes every artifact in `archive` to `target`.
///
/// Blobs go first so each manifest only references content that is already
/// present; blobs the target already holds are skipped.
pub fn transfer(
    deadline: &Deadline,
    archive: &TransportArchive,
    target: &dyn ArtifactStore,
) -> Result<TransferSummary> {
    let mut summary = TransferSummary::default();
    for entry in archive.artifacts() {
        let manifest = archive.manifest(entry)?;
        for blob in manifest.blobs() {
            if target.has_blob(deadline, &entry.repository, &blob.digest)? {
                summary.blobs_skipped += 1;
                continue;
            }
            target.push_blob(
                deadline,
                &entry.repository,
                &blob.digest,
                archive.read_blob(&blob.digest)?,
            )?;
            summary.blobs_pushed += 1;
        }

        let reference = entry.tag.as_deref().unwrap_or(&entry.digest);
        let media_type = entry
            .media_type
            .as_deref()
            .or(manifest.media_type.as_deref())
            .unwrap_or(OCI_MANIFEST_MEDIA_TYPE);
        target.push_manifest(
            deadline,
            &entry.repository,
            reference,
            media_type,
            archive.read_blob(&entry.digest)?,
        )?;
        tracing::info!(repository = %entry.repository, reference, "transferred artifact");
        summary.artifacts += 1;
    }
    Ok(summary)
}
