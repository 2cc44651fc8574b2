//! Kubeconfig loading
//!
//! Only what is needed to reach one API server is read: the context's
//! cluster (server, CA) and user (token, basic auth, or client certificate).

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::error::{Result, config};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
    /// Directory relative file references resolve against.
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    token: Option<String>,
    token_file: Option<PathBuf>,
    username: Option<String>,
    password: Option<String>,
    client_certificate: Option<PathBuf>,
    client_certificate_data: Option<String>,
    client_key: Option<PathBuf>,
    client_key_data: Option<String>,
}

/// How requests authenticate against the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterAuth {
    Anonymous,
    Token(String),
    Basic { username: String, password: String },
    /// PEM certificate and key.
    ClientCertificate { certificate: Vec<u8>, key: Vec<u8> },
}

/// A resolved API server endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub server: String,
    pub ca_pem: Option<Vec<u8>>,
    pub insecure: bool,
    pub auth: ClusterAuth,
}

impl Kubeconfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| config::read_failed(path.display().to_string(), e.to_string()))?;
        let mut kubeconfig: Kubeconfig = serde_yaml::from_str(&content)
            .map_err(|e| config::parse_failed(path.display().to_string(), e.to_string()))?;
        kubeconfig.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(kubeconfig)
    }

    /// `explicit`, else the first `$KUBECONFIG` entry, else `~/.kube/config`.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(first) = std::env::var_os("KUBECONFIG")
            .as_deref()
            .and_then(|paths| std::env::split_paths(paths).find(|p| !p.as_os_str().is_empty()))
        {
            return Some(first);
        }
        dirs::home_dir().map(|home| home.join(".kube").join("config"))
    }

    /// The connection for `context`, or the current context when `None`.
    pub fn connection(&self, context: Option<&str>) -> Result<Connection> {
        let context_name = context
            .or(self.current_context.as_deref())
            .ok_or_else(|| config::invalid("kubeconfig has no current context"))?;
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .ok_or_else(|| config::invalid(format!("kubeconfig context {context_name} not found")))?;
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .ok_or_else(|| {
                config::invalid(format!("kubeconfig cluster {} not found", context.context.cluster))
            })?;
        let user = context
            .context
            .user
            .as_deref()
            .and_then(|name| self.users.iter().find(|u| u.name == name));

        let ca_pem = self.material(
            cluster.cluster.certificate_authority_data.as_deref(),
            cluster.cluster.certificate_authority.as_deref(),
        )?;
        let auth = match user {
            Some(user) => self.auth(&user.user)?,
            None => ClusterAuth::Anonymous,
        };

        Ok(Connection {
            server: cluster.cluster.server.trim_end_matches('/').to_string(),
            ca_pem,
            insecure: cluster.cluster.insecure_skip_tls_verify,
            auth,
        })
    }

    fn auth(&self, user: &UserEntry) -> Result<ClusterAuth> {
        if let Some(token) = &user.token {
            return Ok(ClusterAuth::Token(token.clone()));
        }
        if let Some(file) = &user.token_file {
            let path = self.base_dir.join(file);
            let token = std::fs::read_to_string(&path)
                .map_err(|e| config::read_failed(path.display().to_string(), e.to_string()))?;
            return Ok(ClusterAuth::Token(token.trim().to_string()));
        }
        let certificate = self.material(
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
        )?;
        let key = self.material(user.client_key_data.as_deref(), user.client_key.as_deref())?;
        if let (Some(certificate), Some(key)) = (certificate, key) {
            return Ok(ClusterAuth::ClientCertificate { certificate, key });
        }
        if let (Some(username), Some(password)) = (&user.username, &user.password) {
            return Ok(ClusterAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            });
        }
        Ok(ClusterAuth::Anonymous)
    }

    /// Inline base64 data wins over a file reference.
    fn material(&self, data: Option<&str>, file: Option<&Path>) -> Result<Option<Vec<u8>>> {
        if let Some(data) = data {
            return STANDARD
                .decode(data.trim())
                .map(Some)
                .map_err(|e| config::invalid(format!("kubeconfig contains invalid base64: {e}")));
        }
        match file {
            Some(file) => {
                let path = self.base_dir.join(file);
                std::fs::read(&path)
                    .map(Some)
                    .map_err(|e| config::read_failed(path.display().to_string(), e.to_string()))
            }
            None => Ok(None),
        }
    }
}
