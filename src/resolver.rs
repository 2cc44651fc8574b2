//! Component reference resolution
//!
//! Two selection policies are deliberately kept apart:
//! - the root component resolves to the highest published version, and every
//!   tag must parse as a semantic version;
//! - a referenced component resolves to the *first* version, in registry
//!   listing order, that satisfies its constraint.
//!
//! Picking the maximum for referenced components would change which version
//! gets installed whenever a registry lists versions out of order.

use std::collections::BTreeMap;

use semver::{Version, VersionReq};

use crate::deadline::Deadline;
use crate::error::{Result, resolve};
use crate::registry::{ComponentDescriptor, ComponentRepository};

/// A component the root component points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentReference {
    /// Logical name, e.g. `ocm-controller`.
    pub name: String,
    /// Version or constraint declared by the root component.
    pub version: String,
    /// Registry identity, e.g. `ocm.software/ocm-controller`.
    pub component_name: String,
}

/// Looks up the latest `root` and returns its references for `wanted`.
///
/// A wanted name the root does not reference fails the whole resolution.
pub fn resolve(
    deadline: &Deadline,
    repository: &dyn ComponentRepository,
    root: &str,
    wanted: &[String],
) -> Result<BTreeMap<String, ComponentReference>> {
    let descriptor = lookup_latest(deadline, repository, root)?;
    tracing::info!(component = root, version = descriptor.version(), "resolved root component");
    references(&descriptor, wanted)
}

/// Picks the wanted references out of a resolved root descriptor.
pub fn references(
    descriptor: &ComponentDescriptor,
    wanted: &[String],
) -> Result<BTreeMap<String, ComponentReference>> {
    let mut refs = BTreeMap::new();
    for name in wanted {
        let reference = descriptor
            .component
            .component_references
            .iter()
            .find(|r| &r.name == name)
            .ok_or_else(|| resolve::reference_not_found(descriptor.name(), name))?;
        refs.insert(
            name.clone(),
            ComponentReference {
                name: reference.name.clone(),
                version: reference.version.clone(),
                component_name: reference.component_name.clone(),
            },
        );
    }
    Ok(refs)
}

/// Resolves `component` at its highest published version.
pub fn lookup_latest(
    deadline: &Deadline,
    repository: &dyn ComponentRepository,
    component: &str,
) -> Result<ComponentDescriptor> {
    let versions = repository.list_versions(deadline, component)?;
    let latest = latest_version(component, &versions)?;
    repository.lookup(deadline, component, &latest)
}

/// Resolves `component` at the first listed version matching `constraint`.
pub fn lookup_matching(
    deadline: &Deadline,
    repository: &dyn ComponentRepository,
    component: &str,
    constraint: &str,
) -> Result<ComponentDescriptor> {
    let versions = repository.list_versions(deadline, component)?;
    let version = first_matching_version(component, &versions, constraint)?;
    tracing::debug!(component, constraint, version = %version, "selected component version");
    repository.lookup(deadline, component, &version)
}

/// The highest version in `versions`, returned as listed (including any `v`).
pub fn latest_version(component: &str, versions: &[String]) -> Result<String> {
    let mut best: Option<(Version, &String)> = None;
    for raw in versions {
        let parsed = parse_version(component, raw)?;
        if best.as_ref().is_none_or(|(current, _)| parsed > *current) {
            best = Some((parsed, raw));
        }
    }
    best.map(|(_, raw)| raw.clone())
        .ok_or_else(|| resolve::no_matching_version(component, "latest"))
}

/// The first entry of `versions`, in order, satisfying `constraint`.
///
/// Every entry up to the match must parse; a bare version means exactly
/// that version.
pub fn first_matching_version(
    component: &str,
    versions: &[String],
    constraint: &str,
) -> Result<String> {
    let requirement = parse_constraint(constraint)?;
    for raw in versions {
        if requirement.matches(&parse_version(component, raw)?) {
            return Ok(raw.clone());
        }
    }
    Err(resolve::no_matching_version(component, constraint))
}

fn parse_version(component: &str, raw: &str) -> Result<Version> {
    Version::parse(raw.trim().trim_start_matches('v'))
        .map_err(|e| resolve::invalid_version(component, raw, e.to_string()))
}

fn parse_constraint(constraint: &str) -> Result<VersionReq> {
    let trimmed = constraint.trim();
    if let Ok(exact) = Version::parse(trimmed.trim_start_matches('v')) {
        return VersionReq::parse(&format!("={exact}"))
            .map_err(|e| resolve::invalid_constraint(constraint, e.to_string()));
    }
    let normalized: String = trimmed
        .split(',')
        .map(|part| strip_v_prefix(part.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    VersionReq::parse(&normalized).map_err(|e| resolve::invalid_constraint(constraint, e.to_string()))
}

/// `>=v1.2.0` becomes `>=1.2.0`.
fn strip_v_prefix(part: &str) -> String {
    let op_len = part
        .find(|c: char| c.is_ascii_digit() || c == 'v' || c == '*')
        .unwrap_or(part.len());
    let (op, rest) = part.split_at(op_len);
    format!("{}{}", op, rest.strip_prefix('v').unwrap_or(rest))
}
