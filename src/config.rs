// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{annotations, apiservice, labels, serving, timing};
use crate::kubernetes::poll::PollSchedule;
use crate::kubernetes::selector::LabelSelector;
use crate::server::ServerOptions;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace of the service backing the aggregated API
    pub namespace: String,
    pub service_name: String,
    /// Selects every admission object owned by the operator
    pub label_selector: LabelSelector,
    /// APIServices gated on; the first one must carry the marker annotation
    pub api_services: Vec<String>,
    pub marker_key: String,
    pub readiness: PollSchedule,
    pub settle_delay: Duration,
    pub teardown_grace: Duration,
    pub crd_established: PollSchedule,
    /// Extra CRD manifests registered alongside the built-in ones
    pub crd_manifest_dir: Option<PathBuf>,
    pub server: ServerOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            namespace: apiservice::SERVICE_NAMESPACE.to_string(),
            service_name: apiservice::SERVICE_NAME.to_string(),
            label_selector: default_selector(),
            api_services: vec![
                apiservice::VALIDATORS.to_string(),
                apiservice::MUTATORS.to_string(),
            ],
            marker_key: annotations::ADMISSION_WEBHOOK_ACTIVE.to_string(),
            readiness: PollSchedule::from_secs(
                timing::READINESS_TIMEOUT_SECS,
                timing::READINESS_POLL_INTERVAL_SECS,
            ),
            settle_delay: Duration::from_secs(timing::READINESS_SETTLE_DELAY_SECS),
            teardown_grace: Duration::from_secs(timing::TEARDOWN_GRACE_SECS),
            crd_established: PollSchedule::from_secs(
                timing::CRD_ESTABLISHED_TIMEOUT_SECS,
                timing::CRD_ESTABLISHED_POLL_INTERVAL_SECS,
            ),
            crd_manifest_dir: None,
            server: ServerOptions::default(),
        }
    }
}

fn default_selector() -> LabelSelector {
    LabelSelector::eq(labels::APP_KEY, labels::APP_VALUE).expect("app label selector is valid")
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let label_selector = match get("ADMISSION_LABEL_SELECTOR") {
            Some(raw) => LabelSelector::from_str(&raw)
                .with_context(|| format!("ADMISSION_LABEL_SELECTOR is invalid: {}", raw))?,
            None => defaults.label_selector,
        };
        if label_selector.is_empty() {
            return Err(anyhow!("ADMISSION_LABEL_SELECTOR must not be empty"));
        }

        let api_services = match get("ADMISSION_API_SERVICES") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.api_services,
        };
        if api_services.is_empty() {
            return Err(anyhow!("ADMISSION_API_SERVICES must name at least one APIService"));
        }

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{} must be a number of seconds, got {}", key, raw)),
                None => Ok(default),
            }
        };
        let flag = |key: &str, default: bool| -> Result<bool> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<bool>()
                    .with_context(|| format!("{} must be true or false, got {}", key, raw)),
                None => Ok(default),
            }
        };

        let readiness = PollSchedule::new(
            secs("READINESS_TIMEOUT_SECS", defaults.readiness.timeout)?,
            secs("READINESS_POLL_INTERVAL_SECS", defaults.readiness.interval)?,
        );

        let server_defaults = defaults.server;
        let bind_address = match get("SECURE_BIND_ADDRESS") {
            Some(raw) => IpAddr::from_str(raw.trim())
                .with_context(|| format!("SECURE_BIND_ADDRESS is not an IP address: {}", raw))?,
            None => server_defaults.bind_address,
        };
        let bind_port = match get("SECURE_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("SECURE_PORT must be a port number, got {}", raw))?,
            None => server_defaults.bind_port,
        };

        let server = ServerOptions {
            bind_address,
            bind_port,
            tls_cert_file: get("TLS_CERT_FILE").map(PathBuf::from),
            tls_key_file: get("TLS_KEY_FILE").map(PathBuf::from),
            authentication_kubeconfig: get("AUTHENTICATION_KUBECONFIG").map(PathBuf::from),
            authorization_kubeconfig: get("AUTHORIZATION_KUBECONFIG").map(PathBuf::from),
            enable_rbac: flag("ENABLE_RBAC", server_defaults.enable_rbac)?,
            enable_validating_webhook: flag(
                "ENABLE_VALIDATING_WEBHOOK",
                server_defaults.enable_validating_webhook,
            )?,
            enable_mutating_webhook: flag(
                "ENABLE_MUTATING_WEBHOOK",
                server_defaults.enable_mutating_webhook,
            )?,
        };

        Ok(Config {
            namespace: get("ADMISSION_NAMESPACE").unwrap_or(defaults.namespace),
            service_name: get("ADMISSION_SERVICE_NAME").unwrap_or(defaults.service_name),
            label_selector,
            api_services,
            marker_key: get("ADMISSION_MARKER_ANNOTATION").unwrap_or(defaults.marker_key),
            readiness,
            settle_delay: secs("READINESS_SETTLE_DELAY_SECS", defaults.settle_delay)?,
            teardown_grace: secs("TEARDOWN_GRACE_SECS", defaults.teardown_grace)?,
            crd_established: defaults.crd_established,
            crd_manifest_dir: get("CRD_MANIFEST_DIR").map(PathBuf::from),
            server,
        })
    }
}

/// Default secure serving address
pub(crate) fn default_bind_address() -> IpAddr {
    IpAddr::from_str(serving::BIND_ADDRESS).unwrap_or(IpAddr::from([127, 0, 0, 1]))
}
