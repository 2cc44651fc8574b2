//! Kubernetes API client
//!
//! A small blocking client over `reqwest` covering the calls the agent
//! install and the poller make. Objects are applied with server-side apply;
//! the REST path of each kind is found through API discovery.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Identity, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use super::kubeconfig::{ClusterAuth, Connection, Kubeconfig};
use super::{
    ClusterClient, ObjectKey, RECONCILE_REQUEST_ANNOTATION, SyncStatus, WatchedKind,
    WorkloadStatus, deployment_status,
};
use crate::deadline::Deadline;
use crate::error::{Result, config, transport};
use crate::manifest;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FIELD_MANAGER: &str = "groundwork";
/// Newly applied CRDs take a moment to be served.
const DISCOVERY_ATTEMPTS: u32 = 30;
const DISCOVERY_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Deserialize)]
struct ApiResource {
    name: String,
    kind: String,
    namespaced: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResourceList {
    #[serde(default)]
    resources: Vec<ApiResource>,
}

pub struct KubeClient {
    server: String,
    auth: ClusterAuth,
    client: Client,
    discovery: Mutex<HashMap<String, Vec<ApiResource>>>,
}

impl KubeClient {
    pub fn new(connection: Connection) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(concat!("groundwork/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(connection.insecure);
        if let Some(ca) = &connection.ca_pem {
            let certificate = Certificate::from_pem(ca)
                .map_err(|e| config::invalid(format!("invalid cluster CA certificate: {e}")))?;
            builder = builder.add_root_certificate(certificate);
        }
        if let ClusterAuth::ClientCertificate { certificate, key } = &connection.auth {
            let identity = Identity::from_pem(&[certificate.as_slice(), b"\n", key.as_slice()].concat())
                .map_err(|e| config::invalid(format!("invalid client certificate: {e}")))?;
            builder = builder.identity(identity);
        }

        Ok(Self {
            server: connection.server,
            auth: connection.auth,
            client: builder.build()?,
            discovery: Mutex::new(HashMap::new()),
        })
    }

    /// Connects with the kubeconfig found by [`Kubeconfig::locate`].
    pub fn from_kubeconfig(path: Option<&Path>, context: Option<&str>) -> Result<Self> {
        let path = Kubeconfig::locate(path)
            .ok_or_else(|| config::invalid("no kubeconfig found, pass --kubeconfig"))?;
        let connection = Kubeconfig::load(&path)?.connection(context)?;
        tracing::debug!(server = %connection.server, kubeconfig = %path.display(), "connecting to cluster");
        Self::new(connection)
    }

    fn request(&self, deadline: &Deadline, method: Method, path: &str) -> Result<RequestBuilder> {
        deadline.check(&format!("{method} {path}"))?;
        tracing::debug!(%method, path, "cluster request");
        let builder = self
            .client
            .request(method, format!("{}{path}", self.server))
            .timeout(deadline.cap(REQUEST_TIMEOUT));
        Ok(match &self.auth {
            ClusterAuth::Token(token) => builder.bearer_auth(token),
            ClusterAuth::Basic { username, password } => builder.basic_auth(username, Some(password)),
            ClusterAuth::Anonymous | ClusterAuth::ClientCertificate { .. } => builder,
        })
    }

    fn get(&self, deadline: &Deadline, path: &str) -> Result<Option<Value>> {
        let response = self.request(deadline, Method::GET, path)?.send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(path, response)?.json()?))
    }

    fn resource_for(&self, deadline: &Deadline, api_version: &str, kind: &str) -> Result<ApiResource> {
        for attempt in 0..DISCOVERY_ATTEMPTS {
            if let Some(resource) = self.cached_resource(api_version, kind) {
                return Ok(resource);
            }
            if attempt > 0 {
                thread::sleep(DISCOVERY_WAIT);
            }
            let list = match self.get(deadline, &api_prefix(api_version))? {
                Some(value) => serde_json::from_value::<ApiResourceList>(value)?.resources,
                None => Vec::new(),
            };
            if let Ok(mut cache) = self.discovery.lock() {
                cache.insert(api_version.to_string(), list);
            }
        }
        Err(transport::cluster(
            format!("{api_version}/{kind}"),
            "resource type is not served by the API server",
        ))
    }

    fn cached_resource(&self, api_version: &str, kind: &str) -> Option<ApiResource> {
        let cache = self.discovery.lock().ok()?;
        cache
            .get(api_version)?
            .iter()
            // Subresources (`deployments/status`) share the kind.
            .find(|r| r.kind == kind && !r.name.contains('/'))
            .cloned()
    }

    fn apply_one(&self, deadline: &Deadline, object: &serde_yaml::Value) -> Result<()> {
        let (Some(api_version), Some(kind), Some(name)) = (
            manifest::api_version(object),
            manifest::kind(object),
            manifest::name(object),
        ) else {
            return Err(transport::cluster(
                "object",
                "apiVersion, kind and metadata.name are required",
            ));
        };
        let resource = self.resource_for(deadline, api_version, kind)?;
        let mut path = api_prefix(api_version);
        if resource.namespaced {
            let namespace = manifest::namespace(object).unwrap_or("default");
            path.push_str(&format!("/namespaces/{namespace}"));
        }
        path.push_str(&format!(
            "/{}/{name}?fieldManager={FIELD_MANAGER}&force=true",
            resource.name
        ));

        let body = serde_json::to_vec(object)?;
        let response = self
            .request(deadline, Method::PATCH, &path)?
            .header(CONTENT_TYPE, "application/apply-patch+yaml")
            .body(body)
            .send()?;
        check(&format!("{kind}/{name}"), response)?;
        tracing::debug!(kind, name, "applied object");
        Ok(())
    }
}

impl ClusterClient for KubeClient {
    fn sync_status(
        &self,
        deadline: &Deadline,
        kind: WatchedKind,
        key: &ObjectKey,
    ) -> Result<Option<SyncStatus>> {
        Ok(self
            .get(deadline, &watched_path(kind, key))?
            .map(|object| SyncStatus::from_object(kind, &object)))
    }

    fn request_reconcile(
        &self,
        deadline: &Deadline,
        kind: WatchedKind,
        key: &ObjectKey,
        requested_at: &str,
    ) -> Result<()> {
        let path = watched_path(kind, key);
        let resource = format!("{kind} {key}");
        let object = self
            .get(deadline, &path)?
            .ok_or_else(|| transport::cluster(&resource, "not found"))?;

        let patch = json!({
            "metadata": {
                "resourceVersion": object["metadata"]["resourceVersion"],
                "annotations": { RECONCILE_REQUEST_ANNOTATION: requested_at },
            }
        });
        let response = self
            .request(deadline, Method::PATCH, &path)?
            .header(CONTENT_TYPE, "application/merge-patch+json")
            .body(serde_json::to_vec(&patch)?)
            .send()?;
        if response.status() == StatusCode::CONFLICT {
            return Err(transport::conflict(resource));
        }
        check(&resource, response)?;
        Ok(())
    }

    fn workload_status(&self, deadline: &Deadline, key: &ObjectKey) -> Result<WorkloadStatus> {
        let path = format!(
            "/apis/apps/v1/namespaces/{}/deployments/{}",
            key.namespace, key.name
        );
        Ok(match self.get(deadline, &path)? {
            Some(deployment) => deployment_status(&deployment),
            None => WorkloadStatus::NotFound,
        })
    }

    fn apply(&self, deadline: &Deadline, objects: &[serde_yaml::Value]) -> Result<()> {
        let mut ordered: Vec<&serde_yaml::Value> = objects.iter().collect();
        ordered.sort_by_key(|object| apply_order(manifest::kind(object)));
        for object in ordered {
            self.apply_one(deadline, object)?;
        }
        Ok(())
    }
}

/// Definitions and namespaces go before the objects that need them.
fn apply_order(kind: Option<&str>) -> u8 {
    match kind {
        Some("CustomResourceDefinition") => 0,
        Some("Namespace") => 1,
        _ => 2,
    }
}

fn api_prefix(api_version: &str) -> String {
    if api_version.contains('/') {
        format!("/apis/{api_version}")
    } else {
        format!("/api/{api_version}")
    }
}

fn watched_path(kind: WatchedKind, key: &ObjectKey) -> String {
    format!(
        "/apis/{}/namespaces/{}/{}/{}",
        kind.api_version(),
        key.namespace,
        kind.plural(),
        key.name
    )
}

fn check(resource: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(transport::cluster(resource, format!("{status}: {message}")))
}
