// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to register CRD {name}: {source}")]
    CrdRegistration {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("CRD not established: {0}")]
    CrdNotEstablished(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Timed out after {waited:?} waiting for admission webhooks: {cause}")]
    Timeout {
        waited: Duration,
        cause: ReadinessCause,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid readiness request: {0}")]
    InvalidReadinessRequest(String),

    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid server options: {0}")]
    InvalidServerOptions(String),

    #[error("Invalid TLS material: {0}")]
    InvalidTlsMaterial(String),

    #[error("Webhook server failed: {0}")]
    Server(String),
}

/// Why the last readiness pass did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessCause {
    #[error("APIService {name} is not available: {reason}")]
    NotAvailable { name: String, reason: String },

    #[error("APIService {name} is missing annotation {key}")]
    MarkerMissing { name: String, key: String },

    #[error("failed to read APIService {name}: {message}")]
    Transient { name: String, message: String },

    #[error("no readiness check completed before the deadline")]
    NotObserved,
}

pub type Result<T> = std::result::Result<T, AdmissionError>;
