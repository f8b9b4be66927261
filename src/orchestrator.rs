// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Startup and shutdown sequencing for the admission webhook server.

use crate::config::Config;
use crate::error::{AdmissionError, Result};
use crate::kubernetes::cache::ResourceCache;
use crate::kubernetes::crd::{ensure_types, wait_for_established, ResourceTypeDefinition};
use crate::readiness::{ReadinessGate, ReadinessRequest};
use crate::server::{ServerBootstrapper, ServerConfig};
use crate::teardown::{TeardownCoordinator, TeardownReport, TeardownTarget};
use crate::types::PostgresVersion;
use futures::Future;
use kube::{Api, Client};
use kube_runtime::watcher;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Shared state handed to every component
pub struct Context {
    pub client: Client,
    pub config: Config,
}

/// A running webhook server
pub struct ServerHandle {
    task: JoinHandle<Result<()>>,
    stop: CancellationToken,
}

impl ServerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the server to stop and wait for it to exit
    pub async fn shutdown(self) -> Result<()> {
        self.stop.cancel();
        self.join().await
    }

    /// Wait for the server to exit on its own
    pub async fn join(self) -> Result<()> {
        self.task.await.map_err(join_error)?
    }
}

pub struct Orchestrator {
    ctx: Arc<Context>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Built-in definitions followed by any manifests from the configured directory
    pub fn resource_types(&self) -> Result<Vec<ResourceTypeDefinition>> {
        let mut defs = vec![ResourceTypeDefinition::of::<PostgresVersion>()];
        if let Some(dir) = &self.ctx.config.crd_manifest_dir {
            defs.extend(ResourceTypeDefinition::load_dir(dir)?);
        }
        Ok(defs)
    }

    /// Create missing resource types and wait until the API server serves them
    pub async fn register_types(&self, cancel: &CancellationToken) -> Result<()> {
        let defs = self.resource_types()?;
        ensure_types(&self.ctx.client, &defs).await?;

        let names: Vec<String> = defs.iter().map(ResourceTypeDefinition::name).collect();
        wait_for_established(
            &self.ctx.client,
            &names,
            &self.ctx.config.crd_established,
            cancel,
        )
        .await
    }

    pub fn readiness_request(&self) -> ReadinessRequest {
        let config = &self.ctx.config;
        ReadinessRequest {
            names: config.api_services.clone(),
            marker_key: config.marker_key.clone(),
            schedule: config.readiness,
            settle_delay: config.settle_delay,
        }
    }

    /// Register types, start the server and block until its webhooks are active.
    ///
    /// Server options are validated before anything touches the cluster. If readiness
    /// fails the server is stopped before the error is returned.
    #[instrument(skip_all)]
    pub async fn setup<S>(&self, server: S, cancel: &CancellationToken) -> Result<ServerHandle>
    where
        S: ServerBootstrapper,
    {
        let server_config = server.configure(&self.ctx.config.server)?;
        info!(
            "Server configured on {} with {} webhook route(s)",
            server_config.addr,
            server_config.routes.len()
        );

        self.register_types(cancel).await?;

        let stop = cancel.child_token();
        let mut task = spawn_server(server, server_config, stop.clone());

        let gate = ReadinessGate::new(self.ctx.clone());
        let request = self.readiness_request();
        let ready = tokio::select! {
            res = gate.await_ready(&request, cancel) => Ok(res),
            exited = &mut task => Err(exited),
        };

        match ready {
            Ok(Ok(())) => Ok(ServerHandle { task, stop }),
            Ok(Err(e)) => {
                warn!("Stopping webhook server: {}", e);
                stop.cancel();
                if let Err(stop_err) = task.await.map_err(join_error).and_then(|r| r) {
                    error!("Webhook server failed while stopping: {}", stop_err);
                }
                Err(e)
            }
            Err(exited) => Err(match exited.map_err(join_error) {
                Ok(Ok(())) => AdmissionError::Server(
                    "webhook server exited before becoming ready".to_string(),
                ),
                Ok(Err(e)) | Err(e) => e,
            }),
        }
    }

    pub fn teardown_targets(&self) -> Vec<TeardownTarget> {
        let config = &self.ctx.config;
        TeardownTarget::admission_defaults(
            &config.namespace,
            &config.service_name,
            &config.label_selector,
        )
    }

    /// Remove every admission registration owned by the operator
    pub async fn teardown(&self, cancel: &CancellationToken) -> TeardownReport {
        TeardownCoordinator::new(self.ctx.clone())
            .tear_down(&self.teardown_targets(), cancel)
            .await
    }

    /// Watch the Postgres version catalog; the returned future drives the cache
    pub fn version_catalog(
        &self,
    ) -> (
        ResourceCache<PostgresVersion>,
        impl Future<Output = ()> + Send,
    ) {
        let api: Api<PostgresVersion> = Api::all(self.ctx.client.clone());
        ResourceCache::new(api, watcher::Config::default())
    }
}

fn spawn_server<S>(
    server: S,
    config: ServerConfig,
    stop: CancellationToken,
) -> JoinHandle<Result<()>>
where
    S: ServerBootstrapper,
{
    tokio::spawn(async move { server.run(config, stop).await })
}

fn join_error(e: JoinError) -> AdmissionError {
    AdmissionError::Server(format!("webhook server task failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::annotations::ADMISSION_WEBHOOK_ACTIVE;
    use crate::error::ReadinessCause;
    use crate::kubernetes::poll::PollSchedule;
    use crate::server::ServerOptions;
    use crate::teardown::TargetOutcome;
    use crate::test_utils::{apiservice_json, crd_json, list_json, MockService};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    const CRD_PATH: &str = "/apis/apiextensions.k8s.io/v1/customresourcedefinitions";
    const PG_VERSION_CRD: &str = "postgresversions.catalog.kubedb.com";
    const VALIDATORS: &str = "v1alpha1.validators.kubedb.com";
    const MUTATORS: &str = "v1alpha1.mutators.kubedb.com";

    #[derive(Clone, Default)]
    struct FakeServer {
        fail_run: bool,
        runs: Arc<AtomicUsize>,
        stopped: Arc<AtomicBool>,
    }

    impl ServerBootstrapper for FakeServer {
        fn configure(&self, options: &ServerOptions) -> Result<ServerConfig> {
            options.complete()
        }

        async fn run(&self, _config: ServerConfig, stop: CancellationToken) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail_run {
                return Err(AdmissionError::Server("address in use".to_string()));
            }
            stop.cancelled().await;
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn apiservice_path(name: &str) -> String {
        format!("/apis/apiregistration.k8s.io/v1/apiservices/{}", name)
    }

    fn config() -> Config {
        Config {
            readiness: PollSchedule::from_secs(30, 5),
            settle_delay: Duration::from_secs(1),
            ..Config::default()
        }
    }

    fn orchestrator(mock: &MockService, config: Config) -> Orchestrator {
        Orchestrator::new(Arc::new(Context {
            client: mock.clone().into_client(),
            config,
        }))
    }

    fn registered_cluster() -> MockService {
        MockService::new()
            .on_post(CRD_PATH, 201, &crd_json(PG_VERSION_CRD, false))
            .on_get(
                &format!("{}/{}", CRD_PATH, PG_VERSION_CRD),
                200,
                &crd_json(PG_VERSION_CRD, true),
            )
    }

    fn ready_cluster() -> MockService {
        registered_cluster()
            .on_get(
                &apiservice_path(VALIDATORS),
                200,
                &apiservice_json(VALIDATORS, true, &[(ADMISSION_WEBHOOK_ACTIVE, "true")]),
            )
            .on_get(
                &apiservice_path(MUTATORS),
                200,
                &apiservice_json(MUTATORS, true, &[]),
            )
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_starts_server_once_ready() {
        let mock = ready_cluster();
        let server = FakeServer::default();
        let cancel = CancellationToken::new();

        let handle = orchestrator(&mock, config())
            .setup(server.clone(), &cancel)
            .await
            .unwrap();

        assert!(!handle.is_finished());
        assert_eq!(mock.requests_to("POST", CRD_PATH), 1);

        handle.shutdown().await.unwrap();
        assert_eq!(server.runs.load(Ordering::SeqCst), 1);
        assert!(server.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_server_options_abort_before_cluster_access() {
        let mock = ready_cluster();
        let mut config = config();
        config.server.tls_cert_file = Some(PathBuf::from("/nonexistent/tls.crt"));

        let err = orchestrator(&mock, config)
            .setup(FakeServer::default(), &CancellationToken::new())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, AdmissionError::InvalidTlsMaterial(_)));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_stops_server() {
        let mock = registered_cluster()
            .on_get(
                &apiservice_path(VALIDATORS),
                200,
                &apiservice_json(VALIDATORS, true, &[]),
            )
            .on_get(
                &apiservice_path(MUTATORS),
                200,
                &apiservice_json(MUTATORS, true, &[]),
            );
        let server = FakeServer::default();

        let err = orchestrator(&mock, config())
            .setup(server.clone(), &CancellationToken::new())
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            AdmissionError::Timeout {
                cause: ReadinessCause::MarkerMissing { .. },
                ..
            }
        ));
        assert!(server.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_failure_aborts_setup() {
        let mock = registered_cluster()
            .on_get(
                &apiservice_path(VALIDATORS),
                200,
                &apiservice_json(VALIDATORS, false, &[]),
            );
        let server = FakeServer {
            fail_run: true,
            ..Default::default()
        };

        let err = orchestrator(&mock, config())
            .setup(server, &CancellationToken::new())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, AdmissionError::Server(ref msg) if msg == "address in use"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_setup_reports_cancellation() {
        let mock = ready_cluster();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator(&mock, config())
            .setup(FakeServer::default(), &cancel)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, AdmissionError::Cancelled));
    }

    #[tokio::test]
    async fn test_resource_types_include_manifest_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("validators.yaml"),
            r#"
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: postgresvalidators.validators.kubedb.com
spec:
  group: validators.kubedb.com
  scope: Cluster
  names:
    plural: postgresvalidators
    kind: PostgresValidator
  versions:
    - name: v1alpha1
      served: true
      storage: true
"#,
        )
        .unwrap();
        let config = Config {
            crd_manifest_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };

        let names: Vec<String> = orchestrator(&MockService::new(), config)
            .resource_types()
            .unwrap()
            .iter()
            .map(ResourceTypeDefinition::name)
            .collect();

        assert_eq!(
            names,
            vec![PG_VERSION_CRD, "postgresvalidators.validators.kubedb.com"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_uses_configured_targets() {
        let mock = MockService::new()
            .on_delete(
                "/apis/admissionregistration.k8s.io/v1/validatingwebhookconfigurations",
                200,
                &list_json(
                    "ValidatingWebhookConfigurationList",
                    "admissionregistration.k8s.io/v1",
                    &[],
                ),
            )
            .on_delete(
                "/apis/admissionregistration.k8s.io/v1/mutatingwebhookconfigurations",
                200,
                &list_json(
                    "MutatingWebhookConfigurationList",
                    "admissionregistration.k8s.io/v1",
                    &[],
                ),
            )
            .on_delete(
                "/apis/apiregistration.k8s.io/v1/apiservices",
                200,
                &list_json("APIServiceList", "apiregistration.k8s.io/v1", &[VALIDATORS]),
            )
            .on_delete(
                "/api/v1/namespaces/kubedb/endpoints",
                200,
                &list_json("EndpointsList", "v1", &[]),
            );
        let config = Config {
            namespace: "kubedb".to_string(),
            ..Config::default()
        };

        let report = orchestrator(&mock, config)
            .teardown(&CancellationToken::new())
            .await;

        assert!(report.is_clean());
        assert_eq!(report.entries.len(), 5);
        assert_eq!(
            report.outcome_of(crate::teardown::TargetKind::APIService),
            Some(&TargetOutcome::Deleted)
        );
        assert_eq!(
            mock.requests_to("DELETE", "/api/v1/namespaces/kubedb/services/kubedb-operator"),
            1
        );
    }
}
