//! Overlay descriptors
//!
//! An overlay is a directory holding `kustomization.yaml` plus the manifest
//! files it lists under `resources`. Building one reads every resource,
//! applies the descriptor's image rules and optional namespace, and emits a
//! single YAML stream.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::images::{self, ImageRule};
use crate::error::{Result, fs, localize};
use crate::manifest;

pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";
pub const API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";
pub const KIND: &str = "Kustomization";

/// Kinds left untouched by a namespace override.
const CLUSTER_SCOPED: &[&str] = &[
    "Namespace",
    "ClusterRole",
    "ClusterRoleBinding",
    "ClusterIssuer",
    "CustomResourceDefinition",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRule>,
}

impl Kustomization {
    pub fn new(resources: Vec<String>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            namespace: None,
            resources,
            images: Vec::new(),
        }
    }
}

/// Writes `content` as `dir/<file>` next to a descriptor listing only that
/// file, and returns the descriptor as read back from disk.
pub fn generate(dir: &Path, file: &str, content: &[u8]) -> Result<Kustomization> {
    let path = dir.join(file);
    std::fs::write(&path, content).map_err(|e| fs::write_failed(&path, e))?;
    write(dir, &Kustomization::new(vec![format!("./{file}")]))?;
    read(dir)
}

pub fn write(dir: &Path, kustomization: &Kustomization) -> Result<()> {
    let path = dir.join(KUSTOMIZATION_FILE);
    let content = serde_yaml::to_string(kustomization)?;
    std::fs::write(&path, content).map_err(|e| fs::write_failed(&path, e))
}

pub fn read(dir: &Path) -> Result<Kustomization> {
    let path = dir.join(KUSTOMIZATION_FILE);
    let content = std::fs::read(&path).map_err(|e| fs::read_failed(&path, e))?;
    serde_yaml::from_slice(&content)
        .map_err(|e| localize::overlay_build_failed(format!("{}: {e}", path.display())))
}

/// Renders the overlay in `dir`. Any failure is reported as `OverlayBuildFailed`.
pub fn build(dir: &Path) -> Result<String> {
    let kustomization = read(dir)?;
    let mut objects: Vec<Value> = Vec::new();
    for resource in &kustomization.resources {
        let path = resource_path(dir, resource)?;
        let content = std::fs::read(&path)
            .map_err(|e| localize::overlay_build_failed(format!("{resource}: {e}")))?;
        let parsed = manifest::parse_documents(&content)
            .map_err(|e| localize::overlay_build_failed(format!("{resource}: {e}")))?;
        objects.extend(parsed);
    }

    let rewritten = images::apply(&mut objects, &kustomization.images);
    tracing::debug!(
        resources = kustomization.resources.len(),
        objects = objects.len(),
        rewritten,
        "built overlay"
    );

    if let Some(namespace) = &kustomization.namespace {
        for object in &mut objects {
            set_namespace(object, namespace);
        }
    }

    manifest::to_yaml(&objects).map_err(|e| localize::overlay_build_failed(e.to_string()))
}

/// Resources must stay inside the overlay directory.
fn resource_path(dir: &Path, resource: &str) -> Result<std::path::PathBuf> {
    let relative = Path::new(resource);
    let escapes = relative
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(localize::overlay_build_failed(format!(
            "resource {resource} is outside the overlay directory"
        )));
    }
    Ok(dir.join(relative))
}

fn set_namespace(object: &mut Value, namespace: &str) {
    if manifest::kind(object).is_some_and(|kind| CLUSTER_SCOPED.contains(&kind)) {
        return;
    }
    if let Some(Value::Mapping(metadata)) = object.get_mut("metadata") {
        metadata.insert(
            Value::String("namespace".into()),
            Value::String(namespace.to_string()),
        );
    }
}
