// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Catalog entry describing a supported Postgres release and its images
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(group = "catalog.kubedb.com", version = "v1alpha1", kind = "PostgresVersion")]
#[kube(shortname = "pgversion")]
#[serde(rename_all = "camelCase")]
pub struct PostgresVersionSpec {
    pub version: String,
    pub db: ImageRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exporter: Option<ImageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ImageRef>,
    #[serde(default)]
    pub deprecated: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
pub struct ImageRef {
    pub image: String,
}

impl PostgresVersion {
    pub fn is_deprecated(&self) -> bool {
        self.spec.deprecated
    }
}
