//! Resource extraction
//!
//! Splits a component version's resources into the manifest bundle, the
//! localization descriptor, and the container images the manifests refer to.

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;

use crate::deadline::Deadline;
use crate::defaults::{IMAGE_RESOURCE_TYPE, LOCALIZATION_RESOURCE};
use crate::error::{Result, localize, resolve, transport};
use crate::registry::{AccessSpec, ComponentDescriptor, ComponentRepository, Resource};

/// Where a container image lives, split at its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

/// Everything needed to localize one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBundle {
    /// Registry identity of the component.
    pub component: String,
    pub version: String,
    pub manifest: Vec<u8>,
    pub localization: Vec<u8>,
    /// Image resource name to image location.
    pub images: BTreeMap<String, ImageRef>,
    /// Image resource names in descriptor order.
    pub image_names: Vec<String>,
}

impl ResourceBundle {
    /// Last path segment of the component identity (`ocm.software/ocm-controller` -> `ocm-controller`).
    pub fn short_name(&self) -> &str {
        self.component.rsplit('/').next().unwrap_or(&self.component)
    }
}

/// Builds the bundle for `descriptor`, taking the resource named
/// `manifest_resource` as the manifest.
pub fn extract(
    deadline: &Deadline,
    repository: &dyn ComponentRepository,
    descriptor: &ComponentDescriptor,
    manifest_resource: &str,
) -> Result<ResourceBundle> {
    let mut manifest = None;
    let mut localization = None;
    let mut images = BTreeMap::new();
    let mut image_names = Vec::new();

    for resource in &descriptor.component.resources {
        if resource.name == manifest_resource {
            manifest = Some(read_content(deadline, repository, descriptor, resource)?);
        } else if resource.name == LOCALIZATION_RESOURCE {
            localization = Some(read_content(deadline, repository, descriptor, resource)?);
        } else if resource.resource_type == IMAGE_RESOURCE_TYPE {
            let AccessSpec::OciArtifact { image_reference } = &resource.access else {
                return Err(transport::registry(
                    &resource.name,
                    "image resource is not accessible as an OCI artifact",
                ));
            };
            images.insert(resource.name.clone(), parse_image_reference(image_reference)?);
            image_names.push(resource.name.clone());
        }
    }

    let manifest =
        manifest.ok_or_else(|| resolve::resource_not_found(descriptor.name(), manifest_resource))?;
    let localization = localization
        .ok_or_else(|| resolve::resource_not_found(descriptor.name(), LOCALIZATION_RESOURCE))?;

    tracing::debug!(
        component = descriptor.name(),
        version = descriptor.version(),
        images = image_names.len(),
        "extracted resources"
    );
    Ok(ResourceBundle {
        component: descriptor.name().to_string(),
        version: descriptor.version().to_string(),
        manifest,
        localization,
        images,
        image_names,
    })
}

fn read_content(
    deadline: &Deadline,
    repository: &dyn ComponentRepository,
    descriptor: &ComponentDescriptor,
    resource: &Resource,
) -> Result<Vec<u8>> {
    match &resource.access {
        AccessSpec::LocalBlob {
            local_reference, ..
        } => decompress(repository.fetch_blob(deadline, descriptor.name(), local_reference)?),
        AccessSpec::OciArtifact { image_reference } => Err(transport::registry(
            image_reference,
            format!("content of resource {} cannot be read from an image", resource.name),
        )),
        AccessSpec::Unsupported => Err(transport::registry(
            &resource.name,
            "resource uses an unsupported access method",
        )),
    }
}

/// Returns `data` unchanged, or gunzipped when it starts with the gzip magic.
pub fn decompress(data: Vec<u8>) -> Result<Vec<u8>> {
    if data.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        GzDecoder::new(data.as_slice()).read_to_end(&mut out)?;
        return Ok(out);
    }
    Ok(data)
}

/// Splits `host[:port]/path:tag` at the tag separator.
pub fn parse_image_reference(reference: &str) -> Result<ImageRef> {
    let name_end = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[name_end..].rfind(':') {
        Some(idx) if !reference.contains('@') => {
            let split = name_end + idx;
            let (repository, tag) = (&reference[..split], &reference[split + 1..]);
            if repository.is_empty() || tag.is_empty() {
                return Err(localize::invalid_image_reference(reference));
            }
            Ok(ImageRef {
                repository: repository.to_string(),
                tag: tag.to_string(),
            })
        }
        _ => Err(localize::invalid_image_reference(reference)),
    }
}
