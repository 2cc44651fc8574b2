//! OCI distribution client
//!
//! Speaks just enough of the distribution API to read component versions and
//! push archive contents: tag listing, manifest and blob fetch, blob upload
//! and manifest push. Authentication follows the registry's challenge: basic
//! credentials are sent as-is, bearer challenges are exchanged for a token
//! (anonymously when no credentials are configured).

use std::sync::Mutex;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LINK, LOCATION, WWW_AUTHENTICATE};
use serde::Deserialize;

use crate::deadline::Deadline;
use crate::error::{Result, config, resolve, transport};

use super::credentials::Credentials;
use super::descriptor::{OCI_MANIFEST_MEDIA_TYPE, OciManifest, descriptor_from_manifest};
use super::{ArtifactStore, ComponentDescriptor, ComponentRepository, descriptor_repository};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const TAG_PAGE_SIZE: u32 = 1000;
const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
                               application/vnd.docker.distribution.manifest.v2+json";

/// Where a registry's repositories live: `ghcr.io/org/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryLocation {
    pub scheme: String,
    pub host: String,
    pub prefix: String,
}

impl RegistryLocation {
    /// Parses `[scheme://]host[/prefix]`; `plain_http` picks `http` when no scheme is given.
    pub fn parse(location: &str, plain_http: bool) -> Result<Self> {
        let (scheme, rest) = match location.split_once("://") {
            Some((scheme @ ("http" | "https"), rest)) => (scheme.to_string(), rest),
            Some((other, _)) => {
                return Err(config::invalid(format!(
                    "unsupported registry scheme {other} in {location}"
                )));
            }
            None if plain_http => ("http".to_string(), location),
            None => ("https".to_string(), location),
        };
        let rest = rest.trim_matches('/');
        let (host, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if host.is_empty() {
            return Err(config::invalid(format!("registry location {location} has no host")));
        }
        Ok(Self {
            scheme,
            host: host.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// `<scheme>://<host>/v2/<prefix>/<repository>`
    pub fn repository_url(&self, repository: &str) -> String {
        let path = if self.prefix.is_empty() {
            repository.to_string()
        } else {
            format!("{}/{}", self.prefix, repository)
        };
        format!("{}://{}/v2/{}", self.scheme, self.host, path)
    }
}

pub struct OciRegistry {
    location: RegistryLocation,
    client: Client,
    credentials: Option<Credentials>,
    token: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// A parsed `WWW-Authenticate` header.
#[derive(Debug, PartialEq, Eq)]
enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl OciRegistry {
    pub fn new(location: RegistryLocation, credentials: Option<Credentials>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("groundwork/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            location,
            client,
            credentials,
            token: Mutex::new(None),
        })
    }

    pub fn location(&self) -> &RegistryLocation {
        &self.location
    }

    /// Sends the request built by `build`, answering one auth challenge.
    fn execute<F>(&self, deadline: &Deadline, reference: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        deadline.check(&format!("registry request for {reference}"))?;
        let timeout = deadline.cap(REQUEST_TIMEOUT);

        let cached = self.cached_token();
        let mut request = build(&self.client).timeout(timeout);
        if let Some(token) = &cached {
            request = request.bearer_auth(token);
        } else if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request.send()?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_challenge);
        tracing::debug!(reference, ?challenge, "registry requested authentication");
        let retry = match challenge {
            Some(Challenge::Bearer { realm, service, scope }) => {
                let token = self.fetch_token(deadline, &realm, service.as_deref(), scope.as_deref())?;
                let retry = build(&self.client).timeout(timeout).bearer_auth(&token);
                if let Ok(mut slot) = self.token.lock() {
                    *slot = Some(token);
                }
                retry
            }
            Some(Challenge::Basic) => match &self.credentials {
                Some(creds) => build(&self.client)
                    .timeout(timeout)
                    .basic_auth(&creds.username, Some(&creds.password)),
                None => return Ok(response),
            },
            None => return Ok(response),
        };
        Ok(retry.send()?)
    }

    fn cached_token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn fetch_token(
        &self,
        deadline: &Deadline,
        realm: &str,
        service: Option<&str>,
        scope: Option<&str>,
    ) -> Result<String> {
        let mut query = Vec::new();
        if let Some(service) = service {
            query.push(("service", service));
        }
        if let Some(scope) = scope {
            query.push(("scope", scope));
        }
        let mut request = self
            .client
            .get(realm)
            .query(&query)
            .timeout(deadline.cap(REQUEST_TIMEOUT));
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response: TokenResponse = request.send()?.error_for_status()?.json()?;
        response
            .token
            .or(response.access_token)
            .ok_or_else(|| transport::registry(realm, "token response carries no token"))
    }

    fn fail(reference: &str, response: Response) -> crate::error::GroundworkError {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        transport::registry(reference, format!("{status}: {}", body.trim()))
    }

    fn get_blob(&self, deadline: &Deadline, repository: &str, digest: &str) -> Result<Vec<u8>> {
        let url = format!("{}/blobs/{}", self.location.repository_url(repository), digest);
        let reference = format!("{repository}@{digest}");
        let response = self.execute(deadline, &reference, |c| c.get(&url))?;
        if !response.status().is_success() {
            return Err(Self::fail(&reference, response));
        }
        Ok(response.bytes()?.to_vec())
    }

    /// Resolves a possibly relative upload `Location` against the registry.
    fn absolute_location(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            location.to_string()
        } else {
            format!("{}://{}{}", self.location.scheme, self.location.host, location)
        }
    }
}

impl ComponentRepository for OciRegistry {
    fn list_versions(&self, deadline: &Deadline, component: &str) -> Result<Vec<String>> {
        let repository = descriptor_repository(component);
        let mut url = format!(
            "{}/tags/list?n={TAG_PAGE_SIZE}",
            self.location.repository_url(&repository)
        );
        let mut tags = Vec::new();
        loop {
            let response = self.execute(deadline, component, |c| c.get(&url))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(resolve::component_not_found(
                    component,
                    format!("no descriptors under {}", self.location.repository_url(&repository)),
                ));
            }
            if !response.status().is_success() {
                return Err(Self::fail(component, response));
            }
            let next = response
                .headers()
                .get(LINK)
                .and_then(|h| h.to_str().ok())
                .and_then(next_link)
                .map(|link| self.absolute_location(&link));
            let page: TagList = response.json()?;
            tags.extend(page.tags.unwrap_or_default());
            match next {
                Some(next) if next != url => {
                    tracing::debug!(component, listed = tags.len(), "following tag list page");
                    url = next;
                }
                _ => return Ok(tags),
            }
        }
    }

    fn lookup(
        &self,
        deadline: &Deadline,
        component: &str,
        version: &str,
    ) -> Result<ComponentDescriptor> {
        let repository = descriptor_repository(component);
        let reference = format!("{component}:{version}");
        let url = format!("{}/manifests/{}", self.location.repository_url(&repository), version);
        let response = self.execute(deadline, &reference, |c| c.get(&url).header(ACCEPT, MANIFEST_ACCEPT))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(resolve::component_not_found(
                component,
                format!("version {version} is not published"),
            ));
        }
        if !response.status().is_success() {
            return Err(Self::fail(&reference, response));
        }
        let manifest: OciManifest = serde_json::from_slice(&response.bytes()?)
            .map_err(|e| transport::registry(&reference, e.to_string()))?;
        descriptor_from_manifest(&manifest, |digest| self.get_blob(deadline, &repository, digest))
    }

    fn fetch_blob(&self, deadline: &Deadline, component: &str, digest: &str) -> Result<Vec<u8>> {
        self.get_blob(deadline, &descriptor_repository(component), digest)
    }
}

impl ArtifactStore for OciRegistry {
    fn has_blob(&self, deadline: &Deadline, repository: &str, digest: &str) -> Result<bool> {
        let url = format!("{}/blobs/{}", self.location.repository_url(repository), digest);
        let response = self.execute(deadline, repository, |c| c.head(&url))?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::fail(repository, response)),
        }
    }

    fn push_blob(
        &self,
        deadline: &Deadline,
        repository: &str,
        digest: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let reference = format!("{repository}@{digest}");
        let url = format!("{}/blobs/uploads/", self.location.repository_url(repository));
        let response = self.execute(deadline, &reference, |c| c.post(&url))?;
        if response.status() != StatusCode::ACCEPTED {
            return Err(Self::fail(&reference, response));
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|h| h.to_str().ok())
            .map(|l| self.absolute_location(l))
            .ok_or_else(|| transport::registry(&reference, "upload has no location"))?;
        let separator = if location.contains('?') { '&' } else { '?' };
        let upload = format!("{location}{separator}digest={digest}");

        let response = self.execute(deadline, &reference, |c| {
            c.put(&upload)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(data.clone())
        })?;
        if !response.status().is_success() {
            return Err(Self::fail(&reference, response));
        }
        Ok(())
    }

    fn push_manifest(
        &self,
        deadline: &Deadline,
        repository: &str,
        reference: &str,
        media_type: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let target = format!("{repository}:{reference}");
        let url = format!("{}/manifests/{}", self.location.repository_url(repository), reference);
        let media_type = if media_type.is_empty() {
            OCI_MANIFEST_MEDIA_TYPE
        } else {
            media_type
        };
        let response = self.execute(deadline, &target, |c| {
            c.put(&url).header(CONTENT_TYPE, media_type).body(data.clone())
        })?;
        if !response.status().is_success() {
            return Err(Self::fail(&target, response));
        }
        Ok(())
    }
}

/// Parses `Basic realm=...` or `Bearer realm="...",service="...",scope="..."`.
fn parse_challenge(header: &str) -> Option<Challenge> {
    let (scheme, params) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut realm = None;
    let mut service = None;
    let mut scope = None;
    for (key, value) in split_params(params) {
        match key.as_str() {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            "scope" => scope = Some(value),
            _ => {}
        }
    }
    Some(Challenge::Bearer {
        realm: realm?,
        service,
        scope,
    })
}

/// Target of the `rel="next"` entry in a `Link` header.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params
            .split(';')
            .filter_map(|param| param.split_once('='))
            .any(|(key, value)| key.trim() == "rel" && value.trim().trim_matches('"') == "next");
        is_next.then(|| {
            target
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        })
    })
}

/// Splits `k="v",k2="v,2"` honouring quotes.
fn split_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = params.trim();
    while let Some((key, after)) = rest.split_once('=') {
        let key = key.trim().trim_start_matches(',').trim().to_string();
        let after = after.trim_start();
        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (quoted[..end].to_string(), &quoted[end + 1..]),
                None => (quoted.to_string(), ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (after[..end].to_string(), &after[end..]),
                None => (after.to_string(), ""),
            }
        };
        pairs.push((key, value));
        rest = remaining.trim_start_matches(',').trim();
    }
    pairs
}
