//! Manifest localization
//!
//! A component ships its manifests with upstream image references and an
//! `ocm-config` localization descriptor. Localizing writes the manifests to
//! the install's scratch directory, adds one image rule per descriptor entry
//! pointing at the image the component actually carries, and renders the
//! result.
//!
//! Every install owns its [`ScratchDir`], so two localizations never share a
//! directory and nothing needs locking.

pub mod images;
pub mod overlay;

use serde::Deserialize;

use crate::error::{Result, config, localize};
use crate::extract::ResourceBundle;
use crate::temp::ScratchDir;

pub use images::ImageRule;
pub use overlay::Kustomization;

/// The `ocm-config` resource of a component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LocalizationDescriptor {
    #[serde(default)]
    pub localization: Vec<LocalizationRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalizationRule {
    pub name: String,
    #[serde(default)]
    pub file: Option<String>,
    /// Path of the image field inside `file`.
    #[serde(default)]
    pub image: Option<String>,
    pub resource: ResourceSelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceSelector {
    pub name: String,
}

impl LocalizationDescriptor {
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(data)
            .map_err(|e| config::parse_failed(crate::defaults::LOCALIZATION_RESOURCE, e.to_string()))
    }
}

/// Rewrites component images to the copies under `host`.
#[derive(Debug, Clone)]
pub struct Localizer {
    host: String,
}

impl Localizer {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Renders `bundle` with its images localized.
    ///
    /// `scratch` is consumed; its directory is removed when this returns.
    pub fn localize(&self, bundle: &ResourceBundle, scratch: ScratchDir) -> Result<String> {
        let descriptor = LocalizationDescriptor::parse(&bundle.localization)?;
        let file = format!("{}.yaml", bundle.short_name());
        let mut kustomization = overlay::generate(scratch.path(), &file, &bundle.manifest)?;

        kustomization.images.extend(self.image_rules(bundle, &descriptor)?);
        overlay::write(scratch.path(), &kustomization)?;

        let rendered = overlay::build(scratch.path())?;
        tracing::debug!(
            component = %bundle.component,
            version = %bundle.version,
            rules = kustomization.images.len(),
            "localized manifests"
        );
        Ok(rendered)
    }

    /// One rule per descriptor entry; an entry naming an image the bundle
    /// does not carry fails the whole localization.
    pub fn image_rules(
        &self,
        bundle: &ResourceBundle,
        descriptor: &LocalizationDescriptor,
    ) -> Result<Vec<ImageRule>> {
        descriptor
            .localization
            .iter()
            .map(|rule| {
                let image = bundle
                    .images
                    .get(&rule.resource.name)
                    .ok_or_else(|| localize::unresolved_image(&bundle.component, &rule.resource.name))?;
                Ok(ImageRule {
                    name: format!("{}/{}", self.host, rule.resource.name),
                    new_name: Some(image.repository.clone()),
                    new_tag: Some(image.tag.clone()),
                    digest: None,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GroundworkError;
    use crate::extract::ImageRef;
    use std::collections::BTreeMap;

    const MANIFEST: &str = r"apiVersion: v1
kind: Namespace
metadata:
  name: ocm-system
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: ocm-controller
  namespace: ocm-system
spec:
  template:
    spec:
      containers:
      - name: manager
        image: ghcr.io/open-component-model/ocm-controller:latest
";

    const LOCALIZATION: &str = r"localization:
- name: manager
  file: ocm-controller.yaml
  image: spec.template.spec.containers[0].image
  resource:
    name: ocm-controller
";

    fn bundle(images: &[(&str, &str, &str)]) -> ResourceBundle {
        ResourceBundle {
            component: "ocm.software/ocm-controller".into(),
            version: "v0.5.0".into(),
            manifest: MANIFEST.as_bytes().to_vec(),
            localization: LOCALIZATION.as_bytes().to_vec(),
            images: images
                .iter()
                .map(|(name, repository, tag)| {
                    (
                        name.to_string(),
                        ImageRef {
                            repository: repository.to_string(),
                            tag: tag.to_string(),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
            image_names: images.iter().map(|(n, _, _)| n.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_descriptor() {
        let descriptor = LocalizationDescriptor::parse(LOCALIZATION.as_bytes()).unwrap();
        assert_eq!(descriptor.localization.len(), 1);
        assert_eq!(descriptor.localization[0].resource.name, "ocm-controller");
        assert_eq!(descriptor.localization[0].file.as_deref(), Some("ocm-controller.yaml"));
    }

    #[test]
    fn test_localize_rewrites_image() {
        let localizer = Localizer::new("ghcr.io/open-component-model");
        let bundle = bundle(&[("ocm-controller", "registry.local/ocm-controller", "v0.5.0")]);
        let rendered = localizer
            .localize(&bundle, ScratchDir::new("ocm-controller").unwrap())
            .unwrap();
        assert!(rendered.contains("image: registry.local/ocm-controller:v0.5.0"));
        assert!(rendered.contains("kind: Namespace"));
    }

    #[test]
    fn test_image_rule_names_host_and_resource() {
        let localizer = Localizer::new("ghcr.io/open-component-model");
        let bundle = bundle(&[("ocm-controller", "registry.local/ocm-controller", "v0.5.0")]);
        let descriptor = LocalizationDescriptor::parse(LOCALIZATION.as_bytes()).unwrap();
        let rules = localizer.image_rules(&bundle, &descriptor).unwrap();
        assert_eq!(rules[0].name, "ghcr.io/open-component-model/ocm-controller");
        assert_eq!(rules[0].new_name.as_deref(), Some("registry.local/ocm-controller"));
        assert_eq!(rules[0].new_tag.as_deref(), Some("v0.5.0"));
    }

    #[test]
    fn test_unresolved_image_fails_without_output() {
        let localizer = Localizer::new("ghcr.io/open-component-model");
        let bundle = bundle(&[("other", "registry.local/other", "v1")]);
        let result = localizer.localize(&bundle, ScratchDir::new("ocm-controller").unwrap());
        assert!(matches!(
            result,
            Err(GroundworkError::UnresolvedImage { ref resource, .. }) if resource == "ocm-controller"
        ));
    }

    #[test]
    fn test_empty_descriptor_renders_unchanged_images() {
        let localizer = Localizer::new("ghcr.io/open-component-model");
        let mut bundle = bundle(&[]);
        bundle.localization = b"localization: []\n".to_vec();
        let rendered = localizer
            .localize(&bundle, ScratchDir::new("ocm-controller").unwrap())
            .unwrap();
        assert!(rendered.contains("ghcr.io/open-component-model/ocm-controller:latest"));
    }
}
