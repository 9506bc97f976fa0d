//! Configuration.
//!
//! [`ClientConfig`] describes how to reach the Nomad HTTP API. Every field
//! has an environment default, using the variable names the Nomad CLI reads.
//! [`ReconcileConfig`] tunes the driver.

use crate::error::ReconcileError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:4646";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the Nomad HTTP API.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. `https://nomad.example.com:4646`.
    pub address: String,
    pub region: Option<String>,
    pub namespace: Option<String>,
    /// ACL token secret, sent as `X-Nomad-Token`.
    pub secret_id: Option<String>,
    /// PEM CA bundle for verifying the server.
    pub ca_file: Option<PathBuf>,
    /// PEM client certificate for mTLS. Requires `key_file`.
    pub cert_file: Option<PathBuf>,
    /// PEM client key for mTLS. Requires `cert_file`.
    pub key_file: Option<PathBuf>,
    /// Vault token passed along with job registrations.
    pub vault_token: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            region: None,
            namespace: None,
            secret_id: None,
            ca_file: None,
            cert_file: None,
            key_file: None,
            vault_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

// Tokens stay out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("address", &self.address)
            .field("region", &self.region)
            .field("namespace", &self.namespace)
            .field("secret_id", &self.secret_id.as_ref().map(|_| "<redacted>"))
            .field("ca_file", &self.ca_file)
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .field("vault_token", &self.vault_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Read settings from the process environment.
    ///
    /// `NOMAD_ADDR`, `NOMAD_REGION`, `NOMAD_NAMESPACE`, `NOMAD_TOKEN`,
    /// `NOMAD_CACERT`, `NOMAD_CLIENT_CERT`, `NOMAD_CLIENT_KEY` and
    /// `VAULT_TOKEN`. Without `VAULT_TOKEN`, `~/.vault-token` is used if
    /// present.
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        if config.vault_token.is_none() {
            config.vault_token = dirs::home_dir().and_then(|home| read_token_file(&home.join(".vault-token")));
        }
        config
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`
    /// and skipping the token file.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            address: get("NOMAD_ADDR").unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            region: get("NOMAD_REGION"),
            namespace: get("NOMAD_NAMESPACE"),
            secret_id: get("NOMAD_TOKEN"),
            ca_file: get("NOMAD_CACERT").map(PathBuf::from),
            cert_file: get("NOMAD_CLIENT_CERT").map(PathBuf::from),
            key_file: get("NOMAD_CLIENT_KEY").map(PathBuf::from),
            vault_token: get("VAULT_TOKEN"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_secret_id(mut self, secret_id: impl Into<String>) -> Self {
        self.secret_id = Some(secret_id.into());
        self
    }

    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    pub fn with_client_cert(mut self, cert_file: impl Into<PathBuf>, key_file: impl Into<PathBuf>) -> Self {
        self.cert_file = Some(cert_file.into());
        self.key_file = Some(key_file.into());
        self
    }

    pub fn with_vault_token(mut self, token: impl Into<String>) -> Self {
        self.vault_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the settings without touching the network or the filesystem.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(ReconcileError::Config("address must not be empty".into()));
        }
        if !address.starts_with("http://") && !address.starts_with("https://") {
            return Err(ReconcileError::Config(format!(
                "address {:?} must start with http:// or https://",
                address
            )));
        }
        match (&self.cert_file, &self.key_file) {
            (Some(_), None) => Err(ReconcileError::Config(
                "client certificate given without a key".into(),
            )),
            (None, Some(_)) => Err(ReconcileError::Config(
                "client key given without a certificate".into(),
            )),
            _ => Ok(()),
        }?;
        if self.timeout.is_zero() {
            return Err(ReconcileError::Config("timeout must be positive".into()));
        }
        Ok(())
    }

    /// Address without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.address.trim().trim_end_matches('/')
    }
}

fn read_token_file(path: &std::path::Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Recreate a bound entity that disappeared out of band. When false the
    /// tracked record is marked absent instead.
    pub recreate_missing: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            recreate_missing: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert!(config.secret_id.is_none());
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.validate().is_ok());

        assert!(ReconcileConfig::default().recreate_missing);
    }

    #[test]
    fn test_env_variables() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("NOMAD_ADDR", "https://nomad.example.com:4646/"),
            ("NOMAD_REGION", "eu"),
            ("NOMAD_NAMESPACE", "prod"),
            ("NOMAD_TOKEN", "s3cr3t"),
            ("NOMAD_CACERT", "/etc/nomad/ca.pem"),
            ("NOMAD_CLIENT_CERT", "/etc/nomad/cli.pem"),
            ("NOMAD_CLIENT_KEY", "/etc/nomad/cli-key.pem"),
            ("VAULT_TOKEN", "s.vault"),
        ]));

        assert_eq!(config.base_url(), "https://nomad.example.com:4646");
        assert_eq!(config.region.as_deref(), Some("eu"));
        assert_eq!(config.namespace.as_deref(), Some("prod"));
        assert_eq!(config.secret_id.as_deref(), Some("s3cr3t"));
        assert_eq!(config.ca_file, Some(PathBuf::from("/etc/nomad/ca.pem")));
        assert_eq!(config.vault_token.as_deref(), Some("s.vault"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_variables_are_unset() {
        let config = ClientConfig::from_lookup(lookup(&[("NOMAD_TOKEN", "  "), ("NOMAD_ADDR", "")]));
        assert!(config.secret_id.is_none());
        assert_eq!(config.address, DEFAULT_ADDRESS);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::new("nomad:4646").validate().is_err());

        let mut half_tls = ClientConfig::new("https://nomad:4646");
        half_tls.cert_file = Some("/tmp/cert.pem".into());
        let err = half_tls.validate().unwrap_err();
        assert!(matches!(err, ReconcileError::Config(_)));

        let zero = ClientConfig::default().with_timeout(Duration::ZERO);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let config = ClientConfig::default()
            .with_secret_id("s3cr3t")
            .with_vault_token("s.vault");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains("s.vault"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_token_file() {
        let path = std::env::temp_dir().join(format!("vault-token-{}", rand::random::<u32>()));
        std::fs::write(&path, "s.fromfile\n").unwrap();
        assert_eq!(read_token_file(&path).as_deref(), Some("s.fromfile"));
        std::fs::remove_file(&path).unwrap();
        assert!(read_token_file(&path).is_none());
    }
}
