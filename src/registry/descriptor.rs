//! Component descriptors and the OCI manifests that carry them

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{GroundworkError, Result, transport};

pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DESCRIPTOR_FILE: &str = "component-descriptor.yaml";

/// A component version as published to a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    #[serde(default)]
    pub meta: Meta,
    pub component: ComponentSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "schemaVersion", default)]
    pub schema_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "serde_yaml::Value::is_null")]
    pub provider: serde_yaml::Value,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(rename = "componentReferences", default)]
    pub component_references: Vec<ComponentReferenceSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    pub access: AccessSpec,
}

/// How a resource's content is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccessSpec {
    /// Blob stored next to the descriptor, addressed by digest.
    #[serde(rename = "localBlob", alias = "localBlob/v1")]
    LocalBlob {
        #[serde(rename = "localReference")]
        local_reference: String,
        #[serde(rename = "mediaType", default)]
        media_type: String,
    },
    #[serde(rename = "ociArtifact", alias = "ociArtifact/v1", alias = "ociRegistry")]
    OciArtifact {
        #[serde(rename = "imageReference")]
        image_reference: String,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentReferenceSpec {
    pub name: String,
    #[serde(rename = "componentName")]
    pub component_name: String,
    pub version: String,
}

impl ComponentDescriptor {
    pub fn name(&self) -> &str {
        &self.component.name
    }

    pub fn version(&self) -> &str {
        &self.component.version
    }

    /// Parses a descriptor from YAML, JSON, or a tar holding `component-descriptor.yaml`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if is_tar(data) {
            let mut archive = tar::Archive::new(data);
            for entry in archive.entries()? {
                let mut entry = entry?;
                let is_descriptor = entry
                    .path()?
                    .file_name()
                    .is_some_and(|n| n == DESCRIPTOR_FILE);
                if is_descriptor {
                    let mut content = Vec::new();
                    entry.read_to_end(&mut content)?;
                    return Ok(serde_yaml::from_slice(&content)?);
                }
            }
            return Err(transport::registry(
                DESCRIPTOR_FILE,
                "descriptor layer does not contain a component descriptor",
            ));
        }
        Ok(serde_yaml::from_slice(data)?)
    }
}

fn is_tar(data: &[u8]) -> bool {
    data.len() > 262 && &data[257..262] == b"ustar"
}

/// OCI image manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: OciDescriptor,
    #[serde(default)]
    pub layers: Vec<OciDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciDescriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

impl OciManifest {
    /// Config first, then layers.
    pub fn blobs(&self) -> impl Iterator<Item = &OciDescriptor> {
        std::iter::once(&self.config).chain(self.layers.iter())
    }
}

#[derive(Deserialize)]
struct ComponentConfig {
    #[serde(rename = "componentDescriptorLayer")]
    component_descriptor_layer: Option<OciDescriptor>,
}

/// Reads the descriptor a component manifest points at.
///
/// The config blob names the descriptor layer; older artifacts leave it out
/// and keep the descriptor in the first layer.
pub fn descriptor_from_manifest<F>(manifest: &OciManifest, mut fetch: F) -> Result<ComponentDescriptor>
where
    F: FnMut(&str) -> Result<Vec<u8>>,
{
    let config: Option<ComponentConfig> = serde_json::from_slice(&fetch(&manifest.config.digest)?).ok();
    let layer = config
        .and_then(|c| c.component_descriptor_layer)
        .or_else(|| manifest.layers.first().cloned())
        .ok_or_else(|| no_layer(&manifest.config.digest))?;
    ComponentDescriptor::from_bytes(&fetch(&layer.digest)?)
}

fn no_layer(reference: &str) -> GroundworkError {
    transport::registry(reference, "component manifest has no descriptor layer")
}
