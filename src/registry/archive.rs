//! Common transport format archives
//!
//! An archive is a directory (or a `.tar`/`.tar.gz` of one) holding an
//! `artifact-index.json` and content-addressed blobs under
//! `blobs/sha256.<hex>`. Each index entry names an OCI manifest blob and the
//! repository and tag it belongs to.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::deadline::Deadline;
use crate::error::{Result, fs, resolve, transport};
use crate::temp::temp_dir_base;

use super::descriptor::{OCI_MANIFEST_MEDIA_TYPE, OciDescriptor, OciManifest, descriptor_from_manifest};
use super::{ComponentDescriptor, ComponentRepository, descriptor_repository};

pub const INDEX_FILE: &str = "artifact-index.json";
pub const BLOBS_DIR: &str = "blobs";
const LOCAL_BLOB_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactIndex {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: u32,
    #[serde(default)]
    pub artifacts: Vec<ArtifactEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub digest: String,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

pub struct TransportArchive {
    root: PathBuf,
    index: ArtifactIndex,
    // Keeps an unpacked tarball alive for as long as the archive is open.
    _unpacked: Option<TempDir>,
}

impl TransportArchive {
    /// Opens a directory archive, or unpacks a tarball (gzip detected by magic bytes).
    pub fn open(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Self::from_dir(path.to_path_buf(), None);
        }

        let mut magic = [0u8; 2];
        let read = File::open(path)
            .and_then(|mut f| f.read(&mut magic))
            .map_err(|e| fs::read_failed(path, e))?;
        let file = File::open(path).map_err(|e| fs::read_failed(path, e))?;
        let stream: Box<dyn Read> = if read == 2 && magic == [0x1f, 0x8b] {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let unpacked = tempfile::Builder::new()
            .prefix("groundwork-archive-")
            .tempdir_in(temp_dir_base())?;
        tar::Archive::new(stream)
            .unpack(unpacked.path())
            .map_err(|e| fs::read_failed(path, e))?;
        tracing::debug!(archive = %path.display(), "unpacked transport archive");
        Self::from_dir(unpacked.path().to_path_buf(), Some(unpacked))
    }

    fn from_dir(root: PathBuf, unpacked: Option<TempDir>) -> Result<Self> {
        let index_path = root.join(INDEX_FILE);
        let content = std::fs::read(&index_path).map_err(|e| fs::read_failed(&index_path, e))?;
        let index = serde_json::from_slice(&content).map_err(|e| {
            crate::error::config::parse_failed(index_path.display().to_string(), e.to_string())
        })?;
        Ok(Self {
            root,
            index,
            _unpacked: unpacked,
        })
    }

    pub fn artifacts(&self) -> &[ArtifactEntry] {
        &self.index.artifacts
    }

    pub fn blob_path(&self, digest: &str) -> PathBuf {
        self.root.join(BLOBS_DIR).join(digest.replace(':', "."))
    }

    pub fn read_blob(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(digest);
        std::fs::read(&path).map_err(|e| fs::read_failed(&path, e))
    }

    pub fn manifest(&self, entry: &ArtifactEntry) -> Result<OciManifest> {
        serde_json::from_slice(&self.read_blob(&entry.digest)?)
            .map_err(|e| transport::registry(&entry.repository, e.to_string()))
    }
}

impl ComponentRepository for TransportArchive {
    fn list_versions(&self, _deadline: &Deadline, component: &str) -> Result<Vec<String>> {
        let repository = descriptor_repository(component);
        let versions: Vec<String> = self
            .artifacts()
            .iter()
            .filter(|a| a.repository == repository)
            .filter_map(|a| a.tag.clone())
            .collect();
        if versions.is_empty() {
            return Err(resolve::component_not_found(component, "not contained in archive"));
        }
        Ok(versions)
    }

    fn lookup(
        &self,
        _deadline: &Deadline,
        component: &str,
        version: &str,
    ) -> Result<ComponentDescriptor> {
        let repository = descriptor_repository(component);
        let entry = self
            .artifacts()
            .iter()
            .find(|a| a.repository == repository && a.tag.as_deref() == Some(version))
            .ok_or_else(|| {
                resolve::component_not_found(component, format!("version {version} not in archive"))
            })?;
        descriptor_from_manifest(&self.manifest(entry)?, |digest| self.read_blob(digest))
    }

    fn fetch_blob(&self, _deadline: &Deadline, _component: &str, digest: &str) -> Result<Vec<u8>> {
        self.read_blob(digest)
    }
}

/// `sha256:<hex>` of `data`.
pub fn digest_of(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Writes archives in the layout [`TransportArchive`] reads.
pub struct ArchiveWriter {
    root: PathBuf,
    index: ArtifactIndex,
}

impl ArchiveWriter {
    pub fn create(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root.join(BLOBS_DIR)).map_err(|e| fs::write_failed(root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
            index: ArtifactIndex {
                schema_version: 1,
                artifacts: Vec::new(),
            },
        })
    }

    /// Stores `data` and returns its digest.
    pub fn add_blob(&mut self, data: &[u8]) -> Result<String> {
        let digest = digest_of(data);
        let path = self.root.join(BLOBS_DIR).join(digest.replace(':', "."));
        std::fs::write(&path, data).map_err(|e| fs::write_failed(&path, e))?;
        Ok(digest)
    }

    /// Stores a component version: descriptor layer, config and manifest.
    ///
    /// `local_blobs` become further layers so copying the manifest copies them too.
    pub fn add_component(
        &mut self,
        descriptor: &ComponentDescriptor,
        local_blobs: &[&[u8]],
    ) -> Result<()> {
        let mut blob_layers = Vec::with_capacity(local_blobs.len());
        for blob in local_blobs {
            blob_layers.push(OciDescriptor {
                media_type: LOCAL_BLOB_MEDIA_TYPE.to_string(),
                digest: self.add_blob(blob)?,
                size: blob.len() as u64,
            });
        }
        let layer = serde_yaml::to_string(descriptor)?.into_bytes();
        let layer_digest = self.add_blob(&layer)?;
        let layer_descriptor = OciDescriptor {
            media_type: "application/vnd.ocm.software.component-descriptor.v2+yaml".to_string(),
            digest: layer_digest,
            size: layer.len() as u64,
        };
        let config = serde_json::to_vec(&serde_json::json!({
            "componentDescriptorLayer": layer_descriptor,
        }))?;
        let config_digest = self.add_blob(&config)?;
        let manifest = OciManifest {
            schema_version: 2,
            media_type: Some(OCI_MANIFEST_MEDIA_TYPE.to_string()),
            config: OciDescriptor {
                media_type: "application/vnd.ocm.software.component.config.v1+json".to_string(),
                digest: config_digest,
                size: config.len() as u64,
            },
            layers: std::iter::once(layer_descriptor).chain(blob_layers).collect(),
        };
        let manifest_digest = self.add_blob(&serde_json::to_vec(&manifest)?)?;
        self.index.artifacts.push(ArtifactEntry {
            repository: descriptor_repository(descriptor.name()),
            tag: Some(descriptor.version().to_string()),
            digest: manifest_digest,
            media_type: manifest.media_type.clone(),
        });
        Ok(())
    }

    pub fn finish(self) -> Result<PathBuf> {
        let path = self.root.join(INDEX_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(&self.index)?)
            .map_err(|e| fs::write_failed(&path, e))?;
        Ok(self.root)
    }
}
