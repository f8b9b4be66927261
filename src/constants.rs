// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Annotation keys observed on admission objects
pub mod annotations {
    /// Set on the APIService once the operator has wired up the admission webhook
    pub const ADMISSION_WEBHOOK_ACTIVE: &str = "admission-webhook.appscode.com/active";
}

/// Labels carried by every admission-related object
pub mod labels {
    pub const APP_KEY: &str = "app";
    pub const APP_VALUE: &str = "kubedb";
}

/// Process name used in startup and shutdown logs
pub const OPERATOR_NAME: &str = "pg-operator";

/// Aggregated API defaults
pub mod apiservice {
    /// APIService names checked for availability; the first one carries the marker annotation
    pub const VALIDATORS: &str = "v1alpha1.validators.kubedb.com";
    pub const MUTATORS: &str = "v1alpha1.mutators.kubedb.com";

    /// Namespace and name of the service backing the APIServices
    pub const SERVICE_NAMESPACE: &str = "kube-system";
    pub const SERVICE_NAME: &str = "kubedb-operator";

    /// Condition type and status reported once the aggregated API is reachable
    pub const AVAILABLE_CONDITION: &str = "Available";
    pub const CONDITION_TRUE: &str = "True";
}

/// Webhook paths served through the aggregated API
pub mod webhooks {
    pub const VALIDATING_PATH: &str = "/apis/validators.kubedb.com/v1alpha1/postgresvalidators";
    pub const MUTATING_PATH: &str = "/apis/mutators.kubedb.com/v1alpha1/postgresmutators";
}

/// Timing defaults, all in seconds
pub mod timing {
    pub const READINESS_TIMEOUT_SECS: u64 = 120;
    pub const READINESS_POLL_INTERVAL_SECS: u64 = 5;
    /// Pause after all APIServices report available, before the annotation check
    pub const READINESS_SETTLE_DELAY_SECS: u64 = 5;
    /// Pause after teardown so cached views in the API server converge
    pub const TEARDOWN_GRACE_SECS: u64 = 1;
    pub const CRD_ESTABLISHED_TIMEOUT_SECS: u64 = 60;
    pub const CRD_ESTABLISHED_POLL_INTERVAL_SECS: u64 = 2;
}

/// Secure serving defaults
pub mod serving {
    pub const BIND_ADDRESS: &str = "127.0.0.1";
    pub const SECURE_PORT: u16 = 8443;
}
