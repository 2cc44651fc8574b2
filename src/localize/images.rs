//! Container image substitution

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Container lists whose `image` fields are rewritten.
const CONTAINER_FIELDS: &[&str] = &["containers", "initContainers", "ephemeralContainers"];

/// Replaces images named `name` with `new_name`, `new_tag` or `digest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ImageRule {
    /// The replacement for `image`, or `None` when the rule does not match.
    pub fn rewrite(&self, image: &str) -> Option<String> {
        let (name, suffix) = split_image(image);
        if name != self.name {
            return None;
        }
        let new_name = self.new_name.as_deref().unwrap_or(name);
        Some(match (&self.digest, &self.new_tag) {
            (Some(digest), _) => format!("{new_name}@{digest}"),
            (None, Some(tag)) => format!("{new_name}:{tag}"),
            (None, None) => format!("{new_name}{suffix}"),
        })
    }
}

/// Splits an image into its name and the `:tag` / `@digest` suffix.
pub fn split_image(image: &str) -> (&str, &str) {
    if let Some(at) = image.find('@') {
        return image.split_at(at);
    }
    let name_end = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_end..].rfind(':') {
        Some(idx) => image.split_at(name_end + idx),
        None => (image, ""),
    }
}

/// Rewrites every container image in `objects` with the first rule, in
/// name order, that matches the image as written. Each image is rewritten
/// at most once. Returns the number of fields rewritten.
pub fn apply(objects: &mut [Value], rules: &[ImageRule]) -> usize {
    let mut sorted: Vec<&ImageRule> = rules.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    objects.iter_mut().map(|object| walk(object, &sorted)).sum()
}

fn walk(value: &mut Value, rules: &[&ImageRule]) -> usize {
    let mut rewritten = 0;
    match value {
        Value::Mapping(map) => {
            for (key, child) in map.iter_mut() {
                let is_container_list = key
                    .as_str()
                    .is_some_and(|k| CONTAINER_FIELDS.contains(&k));
                if is_container_list {
                    if let Value::Sequence(containers) = child {
                        for container in containers.iter_mut() {
                            rewritten += rewrite_container(container, rules);
                        }
                    }
                }
                rewritten += walk(child, rules);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                rewritten += walk(item, rules);
            }
        }
        _ => {}
    }
    rewritten
}

fn rewrite_container(container: &mut Value, rules: &[&ImageRule]) -> usize {
    let Some(image) = container.get_mut("image") else {
        return 0;
    };
    let Some(replacement) = image
        .as_str()
        .and_then(|current| rules.iter().find_map(|rule| rule.rewrite(current)))
    else {
        return 0;
    };
    *image = Value::String(replacement);
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, new_name: &str, new_tag: &str) -> ImageRule {
        ImageRule {
            name: name.into(),
            new_name: Some(new_name.into()),
            new_tag: Some(new_tag.into()),
            digest: None,
        }
    }

    #[test]
    fn test_split_image() {
        assert_eq!(split_image("nginx"), ("nginx", ""));
        assert_eq!(split_image("nginx:1.25"), ("nginx", ":1.25"));
        assert_eq!(split_image("localhost:5000/app:v1"), ("localhost:5000/app", ":v1"));
        assert_eq!(split_image("localhost:5000/app"), ("localhost:5000/app", ""));
        assert_eq!(split_image("ghcr.io/app@sha256:abc"), ("ghcr.io/app", "@sha256:abc"));
    }

    #[test]
    fn test_rewrite() {
        let r = rule("ghcr.io/open-component-model/manager", "registry.local/ocm-controller", "v0.5.0");
        assert_eq!(
            r.rewrite("ghcr.io/open-component-model/manager:latest").as_deref(),
            Some("registry.local/ocm-controller:v0.5.0")
        );
        assert_eq!(r.rewrite("ghcr.io/open-component-model/other:latest"), None);

        let keep_tag = ImageRule {
            name: "nginx".into(),
            new_name: Some("mirror/nginx".into()),
            new_tag: None,
            digest: None,
        };
        assert_eq!(keep_tag.rewrite("nginx:1.25").as_deref(), Some("mirror/nginx:1.25"));
    }

    #[test]
    fn test_apply_rewrites_nested_containers() {
        let mut objects: Vec<Value> = vec![
            serde_yaml::from_str(
                r"
kind: Deployment
spec:
  template:
    spec:
      initContainers:
      - name: init
        image: ghcr.io/open-component-model/init:dev
      containers:
      - name: manager
        image: ghcr.io/open-component-model/manager:dev
      - name: sidecar
        image: busybox:1
",
            )
            .unwrap(),
        ];
        let rules = vec![
            rule("ghcr.io/open-component-model/manager", "registry.local/manager", "v1"),
            rule("ghcr.io/open-component-model/init", "registry.local/init", "v1"),
        ];
        assert_eq!(apply(&mut objects, &rules), 2);
        let spec = &objects[0]["spec"]["template"]["spec"];
        assert_eq!(spec["initContainers"][0]["image"].as_str(), Some("registry.local/init:v1"));
        assert_eq!(spec["containers"][0]["image"].as_str(), Some("registry.local/manager:v1"));
        assert_eq!(spec["containers"][1]["image"].as_str(), Some("busybox:1"));
    }

    #[test]
    fn test_apply_ignores_image_outside_containers() {
        let mut objects: Vec<Value> =
            vec![serde_yaml::from_str("kind: ConfigMap\ndata:\n  image: nginx:1\n").unwrap()];
        assert_eq!(apply(&mut objects, &[rule("nginx", "mirror/nginx", "2")]), 0);
    }

    #[test]
    fn test_apply_rewrites_each_image_once() {
        let mut objects: Vec<Value> = vec![
            serde_yaml::from_str(
                r"
kind: Deployment
spec:
  template:
    spec:
      containers:
      - name: manager
        image: ghcr.io/open-component-model/manager:dev
      - name: proxy
        image: ghcr.io/open-component-model/proxy:dev
",
            )
            .unwrap(),
        ];
        // The first rule's output is the second rule's input name.
        let rules = vec![
            rule("ghcr.io/open-component-model/manager", "ghcr.io/open-component-model/proxy", "v1"),
            rule("ghcr.io/open-component-model/proxy", "registry.local/proxy", "v2"),
        ];
        assert_eq!(apply(&mut objects, &rules), 2);
        let containers = &objects[0]["spec"]["template"]["spec"]["containers"];
        assert_eq!(
            containers[0]["image"].as_str(),
            Some("ghcr.io/open-component-model/proxy:v1")
        );
        assert_eq!(containers[1]["image"].as_str(), Some("registry.local/proxy:v2"));
    }
}
