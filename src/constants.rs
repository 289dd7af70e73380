// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// API group of all Kyma resources
pub const OPERATOR_GROUP: &str = "operator.kyma-project.io";

/// The latest served version of the Kyma resources
pub const LATEST_VERSION: &str = "v1beta2";

/// The operator name used for server-side apply of CRDs
pub const OPERATOR_NAME: &str = "lifecycle-manager";

/// Field managers used for server-side apply
pub mod field_managers {
    /// Owner of every catalog item written to a target cluster
    pub const CATALOG_SYNC: &str = "catalog-sync";
    /// Owner of the remote Kyma metadata and the remote namespace
    pub const SYNC_CONTEXT: &str = "kyma-sync-context";
}

/// Kubernetes label keys and values used by the sync engine
pub mod labels {
    pub const MANAGED_BY: &str = "operator.kyma-project.io/managed-by";
    pub const MANAGED_BY_VALUE: &str = "lifecycle-manager";
    pub const WATCHED_BY: &str = "operator.kyma-project.io/watched-by";
    pub const WATCHED_BY_VALUE: &str = "lifecycle-manager";
    /// Set to "false" on a ModuleTemplate to keep it out of remote catalogs
    pub const SYNC: &str = "operator.kyma-project.io/sync";
    pub const BETA: &str = "operator.kyma-project.io/beta";
    pub const INTERNAL: &str = "operator.kyma-project.io/internal";
    pub const GLOBAL_ACCOUNT_ID: &str = "kyma-project.io/global-account-id";
    pub const SUBACCOUNT_ID: &str = "kyma-project.io/subaccount-id";
    pub const ISTIO_INJECTION: &str = "istio-injection";
    pub const WARDEN: &str = "namespaces.warden.kyma-project.io/validate";
    pub const ENABLED_VALUE: &str = "enabled";
    /// Value of a boolean label that switches a feature on
    pub const TRUE_VALUE: &str = "true";
    pub const FALSE_VALUE: &str = "false";
}

/// Kubernetes annotation keys used by the sync engine
pub mod annotations {
    /// `<namespace>/<name>` of the KCP Kyma owning a remote Kyma
    pub const OWNED_BY: &str = "operator.kyma-project.io/owned-by";
}

/// Finalizers managed by the sync engine
pub mod finalizers {
    pub const PURGE: &str = "operator.kyma-project.io/purge-finalizer";
}

/// Location of the mirrored Kyma on every target cluster
pub mod remote {
    pub const NAMESPACE: &str = "kyma-system";
    pub const KYMA_NAME: &str = "default";
}

/// Key of the kubeconfig inside a target access secret
pub const KUBECONFIG_SECRET_KEY: &str = "config";

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Lifetime window of a cached target connection
pub mod client_cache {
    use std::time::Duration;

    pub const MIN_TTL: Duration = Duration::from_secs(23 * 60 * 60);
    pub const MAX_TTL: Duration = Duration::from_secs(25 * 60 * 60);
    /// How often expired connections are reaped
    pub const REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);
}
