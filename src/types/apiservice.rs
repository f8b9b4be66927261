// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::apiservice::{AVAILABLE_CONDITION, CONDITION_TRUE};
pub use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1::{
    APIService, APIServiceCondition,
};

/// Status helpers for aggregated API registrations
pub trait APIServiceExt {
    /// True iff an `Available` condition reports status `True`
    fn is_available(&self) -> bool;

    /// Human-readable reason the service is not available, for diagnostics
    fn unavailable_reason(&self) -> String;

    /// Presence check only; the annotation value is not inspected
    fn has_annotation(&self, key: &str) -> bool;
}

fn condition<'a>(svc: &'a APIService, condition_type: &str) -> Option<&'a APIServiceCondition> {
    svc.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == condition_type))
}

impl APIServiceExt for APIService {
    fn is_available(&self) -> bool {
        condition(self, AVAILABLE_CONDITION).is_some_and(|c| c.status == CONDITION_TRUE)
    }

    fn unavailable_reason(&self) -> String {
        match condition(self, AVAILABLE_CONDITION) {
            Some(c) => {
                let detail = c
                    .message
                    .as_deref()
                    .or(c.reason.as_deref())
                    .unwrap_or("no reason given");
                format!("{}={} ({})", c.type_, c.status, detail)
            }
            None => format!("no {} condition reported", AVAILABLE_CONDITION),
        }
    }

    fn has_annotation(&self, key: &str) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(key))
    }
}
