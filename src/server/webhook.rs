// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! HTTP(S) endpoint serving health checks and the admission review paths.
//!
//! When TLS material is configured every connection is terminated with rustls before
//! it reaches hyper. Admission review callers go through delegated authentication and
//! authorization; health endpoints do not.

use super::auth::{Decision, Delegation};
use super::{ServerBootstrapper, ServerConfig, ServerOptions, TlsMaterial, WebhookRoute};
use crate::error::{AdmissionError, Result};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Default)]
pub struct WebhookServer;

impl WebhookServer {
    pub fn new() -> Self {
        Self
    }
}

impl ServerBootstrapper for WebhookServer {
    fn configure(&self, options: &ServerOptions) -> Result<ServerConfig> {
        let config = options.complete()?;
        if config.tls.is_none() {
            warn!("No TLS material configured; serving plain HTTP on {}", config.addr);
        }
        Ok(config)
    }

    fn run(
        &self,
        config: ServerConfig,
        stop: CancellationToken,
    ) -> impl Future<Output = Result<()>> + Send {
        serve(config, stop)
    }
}

/// Everything a connection needs to answer requests
struct Endpoint {
    config: ServerConfig,
    delegation: Delegation,
}

#[instrument(skip_all, fields(addr = %config.addr, tls = config.tls.is_some()))]
async fn serve(config: ServerConfig, stop: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(config.addr)
        .await
        .map_err(|e| AdmissionError::Server(format!("Failed to bind {}: {}", config.addr, e)))?;
    let delegation = Delegation::from_config(&config).await?;
    if !delegation.is_enabled() {
        warn!("No delegation kubeconfigs configured; admission callers are not authenticated");
    }
    info!("Webhook server listening");

    listen(listener, Arc::new(Endpoint { config, delegation }), stop).await
}

async fn listen(
    listener: TcpListener,
    endpoint: Arc<Endpoint>,
    stop: CancellationToken,
) -> Result<()> {
    let acceptor = endpoint.config.tls.as_ref().map(TlsMaterial::acceptor);
    loop {
        let (stream, peer) = tokio::select! {
            _ = stop.cancelled() => {
                info!("Webhook server stopping");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        let endpoint = endpoint.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls) => serve_connection(tls, endpoint, peer).await,
                    Err(e) => debug!(%peer, "TLS handshake failed: {}", e),
                },
                None => serve_connection(stream, endpoint, peer).await,
            }
        });
    }
}

async fn serve_connection<S>(stream: S, endpoint: Arc<Endpoint>, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let endpoint = endpoint.clone();
        async move { Ok::<_, Infallible>(handle(&endpoint, req).await) }
    });
    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!(%peer, "Connection closed with error: {}", e);
    }
}

async fn handle(endpoint: &Endpoint, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    if let Some(denied) = gate(endpoint, &parts.method, parts.uri.path(), &parts.headers).await {
        return denied;
    }
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return text(StatusCode::BAD_REQUEST, &format!("Failed to read body: {}", e)),
    };
    route(&endpoint.config, &parts.method, parts.uri.path(), &body)
}

/// Reject admission callers the delegated authenticator or authorizer turns away
async fn gate(
    endpoint: &Endpoint,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
) -> Option<Response<Full<Bytes>>> {
    let route: WebhookRoute = match *method {
        Method::POST => endpoint.config.route(path)?,
        _ => return None,
    };
    match endpoint.delegation.check(headers, route).await {
        Decision::Allowed => None,
        Decision::Unauthenticated(reason) => {
            debug!(path, "Rejecting unauthenticated caller: {}", reason);
            Some(text(StatusCode::UNAUTHORIZED, &reason))
        }
        Decision::Forbidden(reason) => {
            debug!(path, "Rejecting unauthorized caller: {}", reason);
            Some(text(StatusCode::FORBIDDEN, &reason))
        }
    }
}

fn route(config: &ServerConfig, method: &Method, path: &str, body: &[u8]) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/healthz") | (&Method::GET, "/readyz") => text(StatusCode::OK, "ok"),
        (&Method::POST, path) if config.serves(path) => review(body),
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

/// Admit the request, echoing its uid and review version back
fn review(body: &[u8]) -> Response<Full<Bytes>> {
    let request = match parse_review(body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting malformed admission review: {}", e);
            let invalid = AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e));
            return json(StatusCode::BAD_REQUEST, &invalid.into_review());
        }
    };

    debug!(
        uid = %request.uid,
        operation = ?request.operation,
        kind = %request.kind.kind,
        name = %request.name,
        "Admitting request"
    );
    json(StatusCode::OK, &AdmissionResponse::from(&request).into_review())
}

fn parse_review(body: &[u8]) -> std::result::Result<AdmissionRequest<DynamicObject>, String> {
    let review: AdmissionReview<DynamicObject> =
        serde_json::from_slice(body).map_err(|e| e.to_string())?;
    let request: std::result::Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
    request.map_err(|e| e.to_string())
}

fn json<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_string(body) {
        Ok(body) => respond(status, "application/json", body),
        Err(e) => text(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Failed to encode response: {}", e),
        ),
    }
}

fn text(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    respond(status, "text/plain", message.to_string())
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
