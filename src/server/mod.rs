// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Contract for the server hosting the admission webhook endpoints.
//!
//! The orchestrator only configures and runs a [`ServerBootstrapper`]; configuration
//! failures are fatal and reported before anything is started. TLS material is parsed
//! into a rustls config here so a bad certificate or key fails configuration.

pub mod auth;
pub mod webhook;

use crate::config::default_bind_address;
use crate::constants::{serving, webhooks};
use crate::error::{AdmissionError, Result};
use kube::config::Kubeconfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use webhook::WebhookServer;

/// Parameters of the secure serving endpoint and its delegation targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub bind_address: IpAddr,
    pub bind_port: u16,
    pub tls_cert_file: Option<PathBuf>,
    pub tls_key_file: Option<PathBuf>,
    /// Kubeconfig used for delegated authentication (TokenReview)
    pub authentication_kubeconfig: Option<PathBuf>,
    /// Kubeconfig used for delegated authorization (SubjectAccessReview)
    pub authorization_kubeconfig: Option<PathBuf>,
    pub enable_rbac: bool,
    pub enable_validating_webhook: bool,
    pub enable_mutating_webhook: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: serving::SECURE_PORT,
            tls_cert_file: None,
            tls_key_file: None,
            authentication_kubeconfig: None,
            authorization_kubeconfig: None,
            enable_rbac: true,
            enable_validating_webhook: true,
            enable_mutating_webhook: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookRoute {
    Validating,
    Mutating,
}

impl WebhookRoute {
    pub fn path(&self) -> &'static str {
        match self {
            WebhookRoute::Validating => webhooks::VALIDATING_PATH,
            WebhookRoute::Mutating => webhooks::MUTATING_PATH,
        }
    }
}

/// Parsed serving certificate chain and key, ready to terminate TLS
#[derive(Clone)]
pub struct TlsMaterial {
    config: Arc<rustls::ServerConfig>,
    chain_len: usize,
}

impl TlsMaterial {
    /// Parse a PEM certificate chain and private key.
    ///
    /// Fails when either side holds no usable PEM block or the key does not match the leaf
    /// certificate.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certs = CertificateDer::pem_slice_iter(cert_pem)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| invalid_tls(format!("Failed to parse certificate: {}", e)))?;
        if certs.is_empty() {
            return Err(invalid_tls("no certificate found".to_string()));
        }
        let chain_len = certs.len();
        let key = PrivateKeyDer::from_pem_slice(key_pem)
            .map_err(|e| invalid_tls(format!("Failed to parse private key: {}", e)))?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| invalid_tls(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| invalid_tls(format!("Certificate and key do not form a pair: {}", e)))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            config: Arc::new(config),
            chain_len,
        })
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.config.clone())
    }
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("chain_len", &self.chain_len)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn invalid_tls(message: String) -> AdmissionError {
    AdmissionError::InvalidTlsMaterial(message)
}

/// Validated, ready-to-run server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub routes: Vec<WebhookRoute>,
    pub tls: Option<TlsMaterial>,
    pub enable_rbac: bool,
    pub authentication: Option<Kubeconfig>,
    pub authorization: Option<Kubeconfig>,
}

impl ServerConfig {
    /// The enabled webhook served at `path`, if any
    pub fn route(&self, path: &str) -> Option<WebhookRoute> {
        self.routes.iter().copied().find(|r| r.path() == path)
    }

    pub fn serves(&self, path: &str) -> bool {
        self.route(path).is_some()
    }
}

impl ServerOptions {
    /// Resolve and validate the options.
    ///
    /// Fails on a partial or unreadable TLS pair, unreadable delegation kubeconfigs, and a
    /// delegated authorizer configured while RBAC is disabled.
    pub fn complete(&self) -> Result<ServerConfig> {
        let tls = match (&self.tls_cert_file, &self.tls_key_file) {
            (Some(cert), Some(key)) => Some(TlsMaterial::from_pem(
                &read_pem(cert)?,
                &read_pem(key)?,
            )?),
            (None, None) => None,
            _ => {
                return Err(AdmissionError::InvalidTlsMaterial(
                    "both a certificate and a key file are required".to_string(),
                ))
            }
        };

        if !self.enable_rbac && self.authorization_kubeconfig.is_some() {
            return Err(AdmissionError::InvalidServerOptions(
                "an authorization kubeconfig requires RBAC to be enabled".to_string(),
            ));
        }

        let authentication = self
            .authentication_kubeconfig
            .as_deref()
            .map(read_kubeconfig)
            .transpose()?;
        let authorization = self
            .authorization_kubeconfig
            .as_deref()
            .map(read_kubeconfig)
            .transpose()?;

        let mut routes = Vec::new();
        if self.enable_validating_webhook {
            routes.push(WebhookRoute::Validating);
        }
        if self.enable_mutating_webhook {
            routes.push(WebhookRoute::Mutating);
        }
        if routes.is_empty() {
            warn!("Both admission webhooks are disabled; only health endpoints will be served");
        }

        Ok(ServerConfig {
            addr: SocketAddr::new(self.bind_address, self.bind_port),
            routes,
            tls,
            enable_rbac: self.enable_rbac,
            authentication,
            authorization,
        })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| invalid_tls(format!("Failed to read {}: {}", path.display(), e)))
}

fn read_kubeconfig(path: &Path) -> Result<Kubeconfig> {
    Kubeconfig::read_from(path).map_err(|e| {
        AdmissionError::InvalidServerOptions(format!(
            "Failed to load kubeconfig {}: {}",
            path.display(),
            e
        ))
    })
}

/// Builds and runs the process hosting the webhook endpoints
pub trait ServerBootstrapper: Send + Sync + 'static {
    /// Validate options into a runnable configuration. Errors here abort startup.
    fn configure(&self, options: &ServerOptions) -> Result<ServerConfig>;

    /// Serve until `stop` fires or an unrecoverable error occurs
    fn run(
        &self,
        config: ServerConfig,
        stop: CancellationToken,
    ) -> impl Future<Output = Result<()>> + Send;
}
