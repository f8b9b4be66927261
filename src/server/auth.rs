// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Delegated authentication and authorization of webhook callers.
//!
//! Bearer tokens are verified with a TokenReview against the authentication kubeconfig's
//! cluster. With RBAC enabled and an authorization kubeconfig set, the caller must also be
//! allowed to `create` the webhook's resource according to a SubjectAccessReview.

use super::{ServerConfig, WebhookRoute};
use crate::error::{AdmissionError, Result};
use http::header::AUTHORIZATION;
use http::HeaderMap;
use k8s_openapi::api::authentication::v1::{TokenReview, TokenReviewSpec, UserInfo};
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec,
};
use kube::api::PostParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use tracing::{debug, warn};

const ANONYMOUS_USER: &str = "system:anonymous";
const UNAUTHENTICATED_GROUP: &str = "system:unauthenticated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Unauthenticated(String),
    Forbidden(String),
}

/// Clients for the clusters that authenticate and authorize webhook callers
#[derive(Clone, Default)]
pub struct Delegation {
    authn: Option<Client>,
    authz: Option<Client>,
}

impl Delegation {
    pub fn new(authn: Option<Client>, authz: Option<Client>) -> Self {
        Self { authn, authz }
    }

    /// Build clients from the configured kubeconfigs.
    ///
    /// The authorizer is only used with RBAC enabled.
    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        let authn = match &config.authentication {
            Some(kubeconfig) => Some(client_for(kubeconfig).await?),
            None => None,
        };
        let authz = match (&config.authorization, config.enable_rbac) {
            (Some(kubeconfig), true) => Some(client_for(kubeconfig).await?),
            _ => None,
        };
        Ok(Self { authn, authz })
    }

    pub fn is_enabled(&self) -> bool {
        self.authn.is_some() || self.authz.is_some()
    }

    pub async fn check(&self, headers: &HeaderMap, route: WebhookRoute) -> Decision {
        let user = match &self.authn {
            Some(client) => {
                let Some(token) = bearer_token(headers) else {
                    return Decision::Unauthenticated("missing bearer token".to_string());
                };
                match authenticate(client.clone(), token).await {
                    Ok(user) => user,
                    Err(reason) => return Decision::Unauthenticated(reason),
                }
            }
            None => UserInfo {
                username: Some(ANONYMOUS_USER.to_string()),
                groups: Some(vec![UNAUTHENTICATED_GROUP.to_string()]),
                ..Default::default()
            },
        };

        match &self.authz {
            Some(client) => match authorize(client.clone(), &user, route).await {
                Ok(()) => Decision::Allowed,
                Err(reason) => Decision::Forbidden(reason),
            },
            None => Decision::Allowed,
        }
    }
}

async fn client_for(kubeconfig: &Kubeconfig) -> Result<Client> {
    let config =
        kube::Config::from_custom_kubeconfig(kubeconfig.clone(), &KubeConfigOptions::default())
            .await
            .map_err(|e| {
                AdmissionError::InvalidServerOptions(format!(
                    "Invalid delegation kubeconfig: {}",
                    e
                ))
            })?;
    Client::try_from(config).map_err(|e| {
        AdmissionError::InvalidServerOptions(format!("Failed to build delegation client: {}", e))
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn authenticate(client: Client, token: &str) -> std::result::Result<UserInfo, String> {
    let review = TokenReview {
        spec: TokenReviewSpec {
            token: Some(token.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let reviewed = Api::<TokenReview>::all(client)
        .create(&PostParams::default(), &review)
        .await
        .map_err(|e| {
            warn!("TokenReview failed: {}", e);
            format!("token review failed: {}", e)
        })?;

    let status = reviewed.status.unwrap_or_default();
    match (status.authenticated, status.user) {
        (Some(true), Some(user)) => {
            debug!(user = user.username.as_deref().unwrap_or_default(), "Caller authenticated");
            Ok(user)
        }
        _ => Err(status
            .error
            .unwrap_or_else(|| "token not authenticated".to_string())),
    }
}

async fn authorize(
    client: Client,
    user: &UserInfo,
    route: WebhookRoute,
) -> std::result::Result<(), String> {
    let review = SubjectAccessReview {
        spec: SubjectAccessReviewSpec {
            user: user.username.clone(),
            groups: user.groups.clone(),
            uid: user.uid.clone(),
            extra: user.extra.clone(),
            resource_attributes: Some(resource_attributes(route)),
            ..Default::default()
        },
        ..Default::default()
    };
    let reviewed = Api::<SubjectAccessReview>::all(client)
        .create(&PostParams::default(), &review)
        .await
        .map_err(|e| {
            warn!("SubjectAccessReview failed: {}", e);
            format!("access review failed: {}", e)
        })?;

    match reviewed.status {
        Some(status) if status.allowed => Ok(()),
        Some(status) => Err(status
            .reason
            .unwrap_or_else(|| "access denied".to_string())),
        None => Err("access review returned no status".to_string()),
    }
}

/// The webhook path is `/apis/<group>/<version>/<resource>`; callers need `create` on it
fn resource_attributes(route: WebhookRoute) -> ResourceAttributes {
    let mut segments = route.path().trim_start_matches("/apis/").splitn(3, '/');
    ResourceAttributes {
        group: segments.next().map(str::to_string),
        version: segments.next().map(str::to_string),
        resource: segments.next().map(str::to_string),
        verb: Some("create".to_string()),
        ..Default::default()
    }
}
