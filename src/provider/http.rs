//! Blocking JSON client shared by the provider backends

use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::deadline::Deadline;
use crate::error::{Result, config, transport};

use super::ProviderKind;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) struct ApiClient {
    provider: ProviderKind,
    base: String,
    client: Client,
}

impl ApiClient {
    pub fn new(provider: ProviderKind, base: String, auth: (HeaderName, String)) -> Result<Self> {
        let (name, value) = auth;
        let mut auth_value = HeaderValue::from_str(&value)
            .map_err(|_| config::invalid(format!("{provider} token contains invalid characters")))?;
        auth_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(name, auth_value);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(concat!("groundwork/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            provider,
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// GET returning `None` on 404.
    pub fn get<T: DeserializeOwned>(&self, deadline: &Deadline, path: &str) -> Result<Option<T>> {
        let response = self.request(deadline, Method::GET, path)?.send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(self.check(response)?.json()?))
    }

    pub fn send<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        deadline: &Deadline,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.request(deadline, method, path)?.json(body).send()?;
        Ok(self.check(response)?.json()?)
    }

    pub fn delete(&self, deadline: &Deadline, path: &str) -> Result<()> {
        let response = self.request(deadline, Method::DELETE, path)?.send()?;
        self.check(response)?;
        Ok(())
    }

    fn request(&self, deadline: &Deadline, method: Method, path: &str) -> Result<RequestBuilder> {
        deadline.check(&format!("{} {method} {path}", self.provider))?;
        tracing::debug!(provider = %self.provider, %method, path, "api request");
        Ok(self
            .client
            .request(method, format!("{}{}", self.base, path))
            .timeout(deadline.cap(REQUEST_TIMEOUT)))
    }

    fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(transport::provider_request(
            self.provider.as_str(),
            status.as_u16(),
            error_message(&body),
        ))
    }
}

/// Pulls `message` out of a JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").map(|m| match m {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Percent-encodes a single path segment (slashes included).
pub(crate) fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
