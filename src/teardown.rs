// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Best-effort removal of every admission-related object.
//!
//! Each target is attempted exactly once with foreground propagation. A missing object
//! counts as success, and a failure on one target never stops the others: outcomes are
//! collected into a [`TeardownReport`] and the caller decides what to escalate.

use crate::kubernetes::poll::sleep_or_cancel;
use crate::kubernetes::selector::LabelSelector;
use crate::orchestrator::Context;
use crate::types::APIService;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::core::v1::{Endpoints, Service};
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{
    api::{DeleteParams, ListParams},
    Api, Client, Resource,
};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    ValidatingWebhookConfiguration,
    MutatingWebhookConfiguration,
    APIService,
    Service,
    Endpoints,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the objects of a target are found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// Collection delete of everything matching the selector
    Labels(LabelSelector),
    /// Single delete by name
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownTarget {
    pub kind: TargetKind,
    pub namespace: Option<String>,
    pub selector: TargetSelector,
}

impl TeardownTarget {
    /// The fixed, ordered target list covering every admission kind
    pub fn admission_defaults(
        namespace: &str,
        service_name: &str,
        selector: &LabelSelector,
    ) -> Vec<TeardownTarget> {
        let by_labels = |kind, namespace: Option<&str>| TeardownTarget {
            kind,
            namespace: namespace.map(str::to_string),
            selector: TargetSelector::Labels(selector.clone()),
        };

        vec![
            by_labels(TargetKind::ValidatingWebhookConfiguration, None),
            by_labels(TargetKind::MutatingWebhookConfiguration, None),
            by_labels(TargetKind::APIService, None),
            TeardownTarget {
                kind: TargetKind::Service,
                namespace: Some(namespace.to_string()),
                selector: TargetSelector::Name(service_name.to_string()),
            },
            by_labels(TargetKind::Endpoints, Some(namespace)),
        ]
    }
}

impl fmt::Display for TeardownTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ns) = &self.namespace {
            write!(f, " in {}", ns)?;
        }
        match &self.selector {
            TargetSelector::Labels(selector) => write!(f, " matching {}", selector),
            TargetSelector::Name(name) => write!(f, " named {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Deleted,
    /// Nothing to delete; already absent
    NotFound,
    Failed(String),
    /// Not attempted because teardown was cancelled
    Skipped,
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TargetOutcome::Deleted | TargetOutcome::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: TeardownTarget,
    pub outcome: TargetOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub entries: Vec<TargetReport>,
    pub cancelled: bool,
}

impl TeardownReport {
    /// True when every target was attempted and none failed
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.entries.iter().all(|e| e.outcome.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, TargetOutcome::Failed(_)))
    }

    pub fn outcome_of(&self, kind: TargetKind) -> Option<&TargetOutcome> {
        self.entries
            .iter()
            .find(|e| e.target.kind == kind)
            .map(|e| &e.outcome)
    }
}

pub struct TeardownCoordinator {
    ctx: Arc<Context>,
    grace: Duration,
}

impl TeardownCoordinator {
    pub fn new(ctx: Arc<Context>) -> Self {
        let grace = ctx.config.teardown_grace;
        Self { ctx, grace }
    }

    /// Delete every target in order, then wait the grace interval.
    ///
    /// Cancellation is checked between targets; remaining targets are reported as skipped.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub async fn tear_down(
        &self,
        targets: &[TeardownTarget],
        cancel: &CancellationToken,
    ) -> TeardownReport {
        let mut report = TeardownReport::default();

        for target in targets {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.entries.push(TargetReport {
                    target: target.clone(),
                    outcome: TargetOutcome::Skipped,
                });
                continue;
            }

            let outcome = delete_target(&self.ctx.client, target).await;
            match &outcome {
                TargetOutcome::Deleted => info!("Deleted {}", target),
                TargetOutcome::NotFound => info!("{} already absent", target),
                TargetOutcome::Failed(e) => error!("Error deleting {}: {}", target, e),
                TargetOutcome::Skipped => {}
            }
            report.entries.push(TargetReport {
                target: target.clone(),
                outcome,
            });
        }

        if report.cancelled {
            warn!("Teardown cancelled before all targets were attempted");
        } else if !sleep_or_cancel(self.grace, cancel).await {
            report.cancelled = true;
        }

        report
    }
}

async fn delete_target(client: &Client, target: &TeardownTarget) -> TargetOutcome {
    let ns = target.namespace.as_deref();
    let selector = &target.selector;
    let result = match target.kind {
        TargetKind::ValidatingWebhookConfiguration => {
            delete_with(cluster_api::<ValidatingWebhookConfiguration>(client), selector).await
        }
        TargetKind::MutatingWebhookConfiguration => {
            delete_with(cluster_api::<MutatingWebhookConfiguration>(client), selector).await
        }
        TargetKind::APIService => delete_with(cluster_api::<APIService>(client), selector).await,
        TargetKind::Service => delete_with(namespaced_api::<Service>(client, ns), selector).await,
        TargetKind::Endpoints => {
            delete_with(namespaced_api::<Endpoints>(client, ns), selector).await
        }
    };

    match result {
        Ok(true) => TargetOutcome::Deleted,
        Ok(false) => TargetOutcome::NotFound,
        Err(kube::Error::Api(err)) if err.code == 404 => TargetOutcome::NotFound,
        Err(e) => TargetOutcome::Failed(e.to_string()),
    }
}

/// Cluster-scoped kinds ignore any namespace on the target
fn cluster_api<K>(client: &Client) -> Api<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
{
    Api::all(client.clone())
}

/// Without a namespace the client's default namespace is used
fn namespaced_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::default_namespaced(client.clone()),
    }
}

/// Returns whether anything was deleted
async fn delete_with<K>(api: Api<K>, selector: &TargetSelector) -> Result<bool, kube::Error>
where
    K: Resource + Clone + DeserializeOwned + fmt::Debug,
{
    let dp = DeleteParams::foreground();
    match selector {
        TargetSelector::Labels(labels) => {
            let lp = ListParams::default().labels(&labels.to_string());
            let res = api.delete_collection(&dp, &lp).await?;
            Ok(res.left().map_or(true, |list| !list.items.is_empty()))
        }
        TargetSelector::Name(name) => {
            api.delete(name, &dp).await?;
            Ok(true)
        }
    }
}
