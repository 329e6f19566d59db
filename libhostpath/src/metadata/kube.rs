//! Kubernetes API server client for PersistentVolume / PersistentVolumeClaim
//! lookups.
//!
//! Only the two GET endpoints the resolver needs are implemented, using
//! `reqwest` with rustls. Authentication is a bearer token, re-read from the
//! service-account token file on every request so rotated tokens are picked
//! up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::{ClaimRef, ClusterMetadata, MetadataError, PersistentVolume, PersistentVolumeClaim};

/// Directory holding the mounted service-account credentials.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Connection settings for [`KubeApiMetadata`].
#[derive(Debug, Clone, Default)]
pub struct KubeApiConfig {
    /// Base URL, e.g. `https://10.96.0.1:443`.
    pub server: String,
    /// Static bearer token.
    pub token: Option<String>,
    /// File to read the bearer token from before each request. Takes
    /// precedence over `token`.
    pub token_file: Option<PathBuf>,
    /// PEM bundle trusted in addition to the system roots.
    pub ca_cert_pem: Option<Vec<u8>>,
    /// Skip server certificate verification.
    pub accept_invalid_certs: bool,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
}

impl KubeApiConfig {
    /// Settings for a pod running inside the cluster: API server address from
    /// `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT`, credentials from
    /// the mounted service account.
    pub fn in_cluster() -> Result<Self, MetadataError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").ok();
        let port = std::env::var("KUBERNETES_SERVICE_PORT").ok();
        Self::from_service_account(host, port, Path::new(SERVICE_ACCOUNT_DIR))
    }

    /// Build in-cluster settings from explicit values.
    pub fn from_service_account(
        host: Option<String>,
        port: Option<String>,
        account_dir: &Path,
    ) -> Result<Self, MetadataError> {
        let host = host.filter(|h| !h.is_empty()).ok_or_else(|| {
            MetadataError::Config("KUBERNETES_SERVICE_HOST is not set".into())
        })?;
        let port = port.filter(|p| !p.is_empty()).ok_or_else(|| {
            MetadataError::Config("KUBERNETES_SERVICE_PORT is not set".into())
        })?;

        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };

        let token_file = account_dir.join("token");
        if !token_file.exists() {
            return Err(MetadataError::Config(format!(
                "service account token {} not found",
                token_file.display()
            )));
        }

        let ca_path = account_dir.join("ca.crt");
        let ca_cert_pem = std::fs::read(&ca_path)
            .map_err(|e| MetadataError::Config(format!("read {}: {e}", ca_path.display())))?;

        Ok(Self {
            server: format!("https://{host}:{port}"),
            token: None,
            token_file: Some(token_file),
            ca_cert_pem: Some(ca_cert_pem),
            accept_invalid_certs: false,
            timeout: Some(Duration::from_secs(30)),
        })
    }
}

/// [`ClusterMetadata`] served by a Kubernetes API server.
#[derive(Debug, Clone)]
pub struct KubeApiMetadata {
    client: reqwest::Client,
    server: String,
    token: Option<String>,
    token_file: Option<PathBuf>,
}

impl KubeApiMetadata {
    pub fn new(config: KubeApiConfig) -> Result<Self, MetadataError> {
        if config.server.is_empty() {
            return Err(MetadataError::Config("API server URL is empty".into()));
        }

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(pem) = &config.ca_cert_pem {
            for cert in reqwest::Certificate::from_pem_bundle(pem)
                .map_err(|e| MetadataError::Config(format!("invalid CA bundle: {e}")))?
            {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| MetadataError::Config(format!("build HTTP client: {e}")))?;

        Ok(Self {
            client,
            server: config.server.trim_end_matches('/').to_owned(),
            token: config.token,
            token_file: config.token_file,
        })
    }

    async fn bearer_token(&self) -> Result<Option<String>, MetadataError> {
        match &self.token_file {
            Some(path) => {
                let token = tokio::fs::read_to_string(path).await.map_err(|e| {
                    MetadataError::Config(format!("read token {}: {e}", path.display()))
                })?;
                Ok(Some(token.trim().to_owned()))
            }
            None => Ok(self.token.clone()),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        kind: &'static str,
        name: &str,
    ) -> Result<T, MetadataError> {
        let url = format!("{}{path}", self.server);
        let mut request = self.client.get(&url).header(ACCEPT, "application/json");
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let request_err = |e: reqwest::Error| MetadataError::Request {
            kind,
            name: name.to_owned(),
            reason: e.to_string(),
        };

        let response = request.send().await.map_err(request_err)?;
        let status = response.status();
        debug!(%url, %status, "metadata lookup");

        if status == StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound {
                kind,
                name: name.to_owned(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetadataError::Status {
                kind,
                name: name.to_owned(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(request_err)?;
        serde_json::from_slice(&bytes).map_err(|e| MetadataError::Decode {
            kind,
            name: name.to_owned(),
            reason: e.to_string(),
        })
    }
}

/// Reject names that would escape their URL path segment.
fn path_segment<'a>(kind: &'static str, name: &'a str) -> Result<&'a str, MetadataError> {
    if name.is_empty() || name.contains(['/', '?', '#', '%']) || name == "." || name == ".." {
        return Err(MetadataError::Request {
            kind,
            name: name.to_owned(),
            reason: "invalid object name".into(),
        });
    }
    Ok(name)
}

#[async_trait]
impl ClusterMetadata for KubeApiMetadata {
    #[instrument(skip(self))]
    async fn get_persistent_volume(&self, name: &str) -> Result<PersistentVolume, MetadataError> {
        let kind = "persistentvolume";
        let seg = path_segment(kind, name)?;
        let object: PvObject = self
            .get(&format!("/api/v1/persistentvolumes/{seg}"), kind, name)
            .await?;
        Ok(object.into())
    }

    #[instrument(skip(self))]
    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PersistentVolumeClaim, MetadataError> {
        let kind = "persistentvolumeclaim";
        let qualified = format!("{namespace}/{name}");
        let ns = path_segment(kind, namespace)?;
        let seg = path_segment(kind, name)?;
        let object: PvcObject = self
            .get(
                &format!("/api/v1/namespaces/{ns}/persistentvolumeclaims/{seg}"),
                kind,
                &qualified,
            )
            .await?;
        Ok(object.into())
    }
}

// ---------------------------------------------------------------------------
// Wire format (subset of the Kubernetes object schema)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    annotations: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ObjectReference {
    #[serde(default)]
    namespace: Option<String>,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PvSpec {
    #[serde(default)]
    claim_ref: Option<ObjectReference>,
}

#[derive(Debug, Deserialize)]
struct PvObject {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: PvSpec,
}

#[derive(Debug, Deserialize)]
struct PvcObject {
    metadata: ObjectMeta,
}

impl From<PvObject> for PersistentVolume {
    fn from(o: PvObject) -> Self {
        Self {
            name: o.metadata.name,
            claim_ref: o.spec.claim_ref.map(|r| ClaimRef {
                namespace: r.namespace.unwrap_or_default(),
                name: r.name,
            }),
        }
    }
}

impl From<PvcObject> for PersistentVolumeClaim {
    fn from(o: PvcObject) -> Self {
        Self {
            namespace: o.metadata.namespace.unwrap_or_default(),
            name: o.metadata.name,
            annotations: o.metadata.annotations.unwrap_or_default(),
        }
    }
}
