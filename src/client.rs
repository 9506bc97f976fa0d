//! Default Nomad client over the HTTP API.
//!
//! Implements every backend trait against `/v1/...` with `reqwest`. Region
//! and namespace go out as query parameters, the ACL token as the
//! `X-Nomad-Token` header.
//!
//! # Quick Start
//!
//! ```ignore
//! use nomad_reconcile::{AclPolicyAdapter, AclPolicySpec, ClientConfig, NomadClient, Reconciler};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = NomadClient::new(&ClientConfig::from_env())?;
//! let reconciler = Reconciler::new(AclPolicyAdapter::new(&client), Default::default());
//!
//! let spec = AclPolicySpec::new("readonly", r#"namespace "*" { policy = "read" }"#);
//! let mut tracked = reconciler.track(spec)?;
//! reconciler.reconcile(&mut tracked).await?;
//! # Ok(())
//! # }
//! ```

use crate::backend::{AclPolicyApi, AclTokenApi, DeploymentApi, JobApi, QuotaApi};
use crate::config::ClientConfig;
use crate::error::{ClientError, ReconcileError};
use crate::types::*;
use reqwest::{Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

const TOKEN_HEADER: &str = "X-Nomad-Token";

/// HTTP client for the Nomad API.
#[derive(Clone)]
pub struct NomadClient {
    http: reqwest::Client,
    base: Url,
    region: Option<String>,
    namespace: Option<String>,
    token: Option<String>,
}

impl NomadClient {
    /// Build a client. Reads TLS material from disk when configured.
    pub fn new(config: &ClientConfig) -> Result<Self, ReconcileError> {
        config.validate()?;

        let base = Url::parse(config.base_url())
            .map_err(|e| ReconcileError::Config(format!("invalid address {:?}: {}", config.address, e)))?;
        if base.cannot_be_a_base() {
            return Err(ReconcileError::Config(format!(
                "invalid address {:?}",
                config.address
            )));
        }

        let mut builder = reqwest::Client::builder().timeout(config.timeout);

        if let Some(ca_file) = &config.ca_file {
            let ca_pem = read_pem(ca_file)?;
            builder = builder.add_root_certificate(parse_ca(&ca_pem)?);
        }
        if let (Some(cert_file), Some(key_file)) = (&config.cert_file, &config.key_file) {
            let cert_pem = read_pem(cert_file)?;
            let key_pem = read_pem(key_file)?;
            builder = builder.identity(create_identity(&cert_pem, &key_pem)?);
        }

        let http = builder
            .build()
            .map_err(|e| ReconcileError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base,
            region: config.region.clone(),
            namespace: config.namespace.clone(),
            token: config.secret_id.clone(),
        })
    }

    /// `{base}/v1/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Transport(format!("invalid base URL {}", self.base)))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    fn request(
        &self,
        method: Method,
        segments: &[&str],
        namespace: Option<&str>,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        let url = self.url(segments)?;
        debug!(%method, %url, "nomad request");

        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.header(TOKEN_HEADER, token);
        }
        if let Some(region) = &self.region {
            req = req.query(&[("region", region.as_str())]);
        }
        if let Some(ns) = namespace.or(self.namespace.as_deref()) {
            req = req.query(&[("namespace", ns)]);
        }
        Ok(req)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        namespace: Option<&str>,
    ) -> Result<T, ClientError> {
        let response = execute(self.request(Method::GET, segments, namespace)?).await?;
        decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        let response = execute(self.request(Method::POST, segments, None)?.json(body)).await?;
        decode(response).await
    }

    /// POST where the response body carries nothing we need.
    async fn post_unit<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<(), ClientError> {
        execute(self.request(Method::POST, segments, None)?.json(body)).await?;
        Ok(())
    }

    async fn delete(&self, segments: &[&str]) -> Result<(), ClientError> {
        execute(self.request(Method::DELETE, segments, None)?).await?;
        Ok(())
    }
}

/// Send, classifying transport failures and non-2xx statuses.
async fn execute(req: reqwest::RequestBuilder) -> Result<Response, ClientError> {
    let response = req
        .send()
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response".to_string());
    Err(ClientError::from_status(status.as_u16(), body.trim()))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ClientError::Transport(format!("failed to read response: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

fn read_pem(path: &std::path::Path) -> Result<Vec<u8>, ReconcileError> {
    std::fs::read(path)
        .map_err(|e| ReconcileError::Config(format!("failed to read {}: {}", path.display(), e)))
}

fn parse_ca(ca_pem: &[u8]) -> Result<reqwest::Certificate, ReconcileError> {
    let count = rustls_pemfile::certs(&mut Cursor::new(ca_pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ReconcileError::Config(format!("failed to parse CA certificate: {}", e)))?
        .len();
    if count == 0 {
        return Err(ReconcileError::Config("no certificates found in CA PEM".into()));
    }
    reqwest::Certificate::from_pem(ca_pem)
        .map_err(|e| ReconcileError::Config(format!("failed to load CA certificate: {}", e)))
}

/// Client identity for mTLS, after checking both PEMs actually hold something.
fn create_identity(cert_pem: &[u8], key_pem: &[u8]) -> Result<reqwest::Identity, ReconcileError> {
    let certs = rustls_pemfile::certs(&mut Cursor::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ReconcileError::Config(format!("failed to parse client certificate: {}", e)))?;
    if certs.is_empty() {
        return Err(ReconcileError::Config(
            "no certificates found in client certificate PEM".into(),
        ));
    }

    let key = rustls_pemfile::private_key(&mut Cursor::new(key_pem))
        .map_err(|e| ReconcileError::Config(format!("failed to parse client key: {}", e)))?;
    if key.is_none() {
        return Err(ReconcileError::Config("no private key found in client key PEM".into()));
    }

    reqwest::Identity::from_pem(&[cert_pem, &b"\n"[..], key_pem].concat())
        .map_err(|e| ReconcileError::Config(format!("failed to create client identity: {}", e)))
}

// ═══════════════════════════════════════════════════════════════════
// BACKEND IMPLEMENTATIONS
// ═══════════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeploymentFailRequest<'a> {
    #[serde(rename = "DeploymentID")]
    deployment_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeploymentPauseRequest<'a> {
    #[serde(rename = "DeploymentID")]
    deployment_id: &'a str,
    pause: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeploymentPromoteRequest<'a> {
    #[serde(rename = "DeploymentID")]
    deployment_id: &'a str,
    all: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct JobRegisterRequest<'a> {
    job: &'a Job,
}

impl DeploymentApi for NomadClient {
    async fn deployment_info(&self, id: &str) -> Result<Deployment, ClientError> {
        self.get(&["deployment", id], None).await
    }

    async fn deployment_fail(&self, id: &str) -> Result<DeploymentUpdateResponse, ClientError> {
        self.post(
            &["deployment", "fail", id],
            &DeploymentFailRequest { deployment_id: id },
        )
        .await
    }

    async fn deployment_pause(
        &self,
        id: &str,
        pause: bool,
    ) -> Result<DeploymentUpdateResponse, ClientError> {
        self.post(
            &["deployment", "pause", id],
            &DeploymentPauseRequest {
                deployment_id: id,
                pause,
            },
        )
        .await
    }

    async fn deployment_promote_all(
        &self,
        id: &str,
    ) -> Result<DeploymentUpdateResponse, ClientError> {
        self.post(
            &["deployment", "promote", id],
            &DeploymentPromoteRequest {
                deployment_id: id,
                all: true,
            },
        )
        .await
    }
}

impl AclPolicyApi for NomadClient {
    async fn acl_policy_info(&self, name: &str) -> Result<AclPolicy, ClientError> {
        self.get(&["acl", "policy", name], None).await
    }

    async fn acl_policy_upsert(&self, policy: &AclPolicy) -> Result<(), ClientError> {
        self.post_unit(&["acl", "policy", &policy.name], policy).await
    }

    async fn acl_policy_delete(&self, name: &str) -> Result<(), ClientError> {
        self.delete(&["acl", "policy", name]).await
    }
}

impl AclTokenApi for NomadClient {
    async fn acl_token_info(&self, accessor_id: &str) -> Result<AclToken, ClientError> {
        self.get(&["acl", "token", accessor_id], None).await
    }

    async fn acl_token_create(&self, token: &AclToken) -> Result<AclToken, ClientError> {
        self.post(&["acl", "token"], token).await
    }

    async fn acl_token_update(&self, token: &AclToken) -> Result<AclToken, ClientError> {
        self.post(&["acl", "token", &token.accessor_id], token).await
    }

    async fn acl_token_delete(&self, accessor_id: &str) -> Result<(), ClientError> {
        self.delete(&["acl", "token", accessor_id]).await
    }
}

impl QuotaApi for NomadClient {
    async fn quota_info(&self, name: &str) -> Result<QuotaSpecification, ClientError> {
        self.get(&["quota", name], None).await
    }

    async fn quota_upsert(&self, spec: &QuotaSpecification) -> Result<(), ClientError> {
        self.post_unit(&["quota"], spec).await
    }

    async fn quota_delete(&self, name: &str) -> Result<(), ClientError> {
        self.delete(&["quota", name]).await
    }
}

impl JobApi for NomadClient {
    async fn job_info(&self, id: &str, namespace: &str) -> Result<Job, ClientError> {
        self.get(&["job", id], Some(namespace)).await
    }

    async fn job_register(&self, job: &Job) -> Result<JobRegisterResponse, ClientError> {
        let req = self
            .request(Method::POST, &["jobs"], Some(job.namespace.as_str()))?
            .json(&JobRegisterRequest { job });
        decode(execute(req).await?).await
    }

    async fn job_deregister(&self, id: &str, namespace: &str, purge: bool) -> Result<(), ClientError> {
        let req = self
            .request(Method::DELETE, &["job", id], Some(namespace))?
            .query(&[("purge", purge)]);
        execute(req).await?;
        Ok(())
    }
}
