// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Gate startup on the aggregated admission API becoming available and annotated.
//!
//! Availability and the marker annotation are written by two different control loops at
//! different times, so every pass re-checks both and only a pass that observes both
//! counts as ready. Read failures are absorbed by the poll loop; only the overall
//! deadline is terminal.

use crate::error::{AdmissionError, ReadinessCause, Result};
use crate::kubernetes::poll::{poll_until, PollOutcome, PollSchedule};
use crate::orchestrator::Context;
use crate::types::{APIService, APIServiceExt};
use kube::Api;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What to wait for and how long
#[derive(Debug, Clone)]
pub struct ReadinessRequest {
    /// APIService names; the first one is the primary that must carry the marker
    pub names: Vec<String>,
    pub marker_key: String,
    pub schedule: PollSchedule,
    /// One-time pause after all names report available, before the marker check
    pub settle_delay: Duration,
}

impl ReadinessRequest {
    pub fn primary(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }
}

pub struct ReadinessGate {
    ctx: Arc<Context>,
}

impl ReadinessGate {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Block until every APIService is `Available=True` and the primary carries the marker.
    #[instrument(skip(self, request, cancel), fields(names = ?request.names))]
    pub async fn await_ready(
        &self,
        request: &ReadinessRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if request.primary().is_none() {
            return Err(AdmissionError::InvalidReadinessRequest(
                "at least one APIService name is required".to_string(),
            ));
        }

        let api: Api<APIService> = Api::all(self.ctx.client.clone());
        let outcome = poll_until(&request.schedule, cancel, || {
            let api = api.clone();
            async move { check_once(&api, request).await }
        })
        .await;

        match outcome {
            PollOutcome::Ready(()) => {
                info!("Admission webhooks are available and active");
                Ok(())
            }
            PollOutcome::TimedOut(cause) => {
                let cause = cause.unwrap_or(ReadinessCause::NotObserved);
                warn!("Gave up waiting for admission webhooks: {}", cause);
                Err(AdmissionError::Timeout {
                    waited: request.schedule.timeout,
                    cause,
                })
            }
            PollOutcome::Cancelled => Err(AdmissionError::Cancelled),
        }
    }
}

/// One pass: availability of every name, settle, then the marker on the primary
async fn check_once(
    api: &Api<APIService>,
    request: &ReadinessRequest,
) -> std::result::Result<(), ReadinessCause> {
    for name in &request.names {
        let svc = api.get(name).await.map_err(|e| ReadinessCause::Transient {
            name: name.clone(),
            message: e.to_string(),
        })?;

        if !svc.is_available() {
            return Err(ReadinessCause::NotAvailable {
                name: name.clone(),
                reason: svc.unavailable_reason(),
            });
        }
        debug!("APIService {} is available", name);
    }

    sleep(request.settle_delay).await;

    // Non-empty names is checked by the caller
    let primary = request.names[0].as_str();
    let svc = api.get(primary).await.map_err(|e| ReadinessCause::Transient {
        name: primary.to_string(),
        message: e.to_string(),
    })?;

    if !svc.has_annotation(&request.marker_key) {
        return Err(ReadinessCause::MarkerMissing {
            name: primary.to_string(),
            key: request.marker_key.clone(),
        });
    }
    Ok(())
}
