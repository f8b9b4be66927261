// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD registration and establishment checks

use crate::error::{AdmissionError, Result};
use crate::kubernetes::poll::{poll_until, PollOutcome, PollSchedule};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{api::PostParams, Api, Client, CustomResourceExt, ResourceExt};
use serde::Deserialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// A CRD submitted for idempotent creation
#[derive(Debug, Clone)]
pub struct ResourceTypeDefinition {
    crd: CustomResourceDefinition,
}

impl ResourceTypeDefinition {
    /// Definition generated from a `#[derive(CustomResource)]` type
    pub fn of<K: CustomResourceExt>() -> Self {
        Self { crd: K::crd() }
    }

    /// Parse every CRD document in a (possibly multi-document) YAML manifest
    pub fn from_yaml(manifest: &str) -> Result<Vec<Self>> {
        let mut defs = Vec::new();
        for document in serde_yaml::Deserializer::from_str(manifest) {
            let value = serde_yaml::Value::deserialize(document)
                .map_err(|e| AdmissionError::InvalidManifest(format!("Malformed YAML: {}", e)))?;
            if value.is_null() {
                continue;
            }

            let crd: CustomResourceDefinition = serde_yaml::from_value(value).map_err(|e| {
                AdmissionError::InvalidManifest(format!("Not a CustomResourceDefinition: {}", e))
            })?;
            if crd.metadata.name.is_none() {
                return Err(AdmissionError::InvalidManifest(
                    "CustomResourceDefinition without metadata.name".to_string(),
                ));
            }
            defs.push(Self { crd });
        }
        Ok(defs)
    }

    /// Load all `*.yaml` / `*.yml` manifests in a directory, in file name order
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            AdmissionError::InvalidManifest(format!("Failed to read {}: {}", dir.display(), e))
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();

        let mut defs = Vec::new();
        for path in paths {
            let manifest = std::fs::read_to_string(&path).map_err(|e| {
                AdmissionError::InvalidManifest(format!("Failed to read {}: {}", path.display(), e))
            })?;
            debug!("Loading CRD manifest {}", path.display());
            defs.extend(Self::from_yaml(&manifest)?);
        }
        Ok(defs)
    }

    pub fn name(&self) -> String {
        self.crd.name_any()
    }

    pub fn crd(&self) -> &CustomResourceDefinition {
        &self.crd
    }
}

/// Create every definition that does not exist yet.
///
/// An existing definition is left untouched. Any other failure aborts immediately.
#[instrument(skip(client, defs), fields(count = defs.len()))]
pub async fn ensure_types(client: &Client, defs: &[ResourceTypeDefinition]) -> Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());

    for def in defs {
        let name = def.name();
        match crds.create(&PostParams::default(), def.crd()).await {
            Ok(_) => info!("Created CRD {}", name),
            Err(kube::Error::Api(err)) if err.code == 409 => {
                debug!("CRD {} already exists", name);
            }
            Err(source) => return Err(AdmissionError::CrdRegistration { name, source }),
        }
    }

    Ok(())
}

/// Wait until every named CRD reports `Established=True`
#[instrument(skip(client, names, cancel))]
pub async fn wait_for_established(
    client: &Client,
    names: &[String],
    schedule: &PollSchedule,
    cancel: &CancellationToken,
) -> Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());

    let outcome = poll_until(schedule, cancel, || {
        let crds = crds.clone();
        async move {
            for name in names {
                let crd = crds
                    .get(name)
                    .await
                    .map_err(|e| format!("failed to read CRD {}: {}", name, e))?;
                if !is_established(&crd) {
                    return Err(format!("CRD {} is not established yet", name));
                }
            }
            Ok(())
        }
    })
    .await;

    match outcome {
        PollOutcome::Ready(()) => {
            info!("All {} CRDs established", names.len());
            Ok(())
        }
        PollOutcome::TimedOut(cause) => Err(AdmissionError::CrdNotEstablished(
            cause.unwrap_or_else(|| format!("no check completed within {:?}", schedule.timeout)),
        )),
        PollOutcome::Cancelled => Err(AdmissionError::Cancelled),
    }
}

fn is_established(crd: &CustomResourceDefinition) -> bool {
    crd.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Established" && c.status == "True")
        })
}
