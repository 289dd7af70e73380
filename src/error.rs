// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::fmt;

use thiserror::Error;

use crate::kubernetes::errors;

/// Category attached to an aggregated failure so callers can ask
/// "did any item of this batch fail" without unpacking the details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// One or more catalog items could not be applied to the target
    CatalogApply,
    /// One or more obsolete catalog items could not be deleted from the target
    CatalogCleanup,
    /// Template and release metadata syncs both reported failures
    CatalogSync,
    /// Finalizers could not be stripped from one or more target resources
    PurgeCleanup,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorCategory::CatalogApply => "could not apply catalog items",
            ErrorCategory::CatalogCleanup => "failed to delete obsolete catalog items",
            ErrorCategory::CatalogSync => "failed to sync module catalog",
            ErrorCategory::PurgeCleanup => "failed removing finalizers from stale resources",
        };
        f.write_str(msg)
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to parse kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Access secret for target {0} not found")]
    AccessSecretNotFound(String),

    #[error("Failed to build client for target {target}: {source}")]
    ClientBuild {
        target: String,
        #[source]
        source: kube::Error,
    },

    #[error("Failed to apply {kind} {name}: {source}")]
    CatalogApply {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Failed to delete {kind} {name}: {source}")]
    CatalogDelete {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Failed to {action} CRD {name}: {source}")]
    Crd {
        name: String,
        action: &'static str,
        #[source]
        source: kube::Error,
    },

    #[error("CRD {0} on target is not ready")]
    CrdNotReady(String),

    #[error("Remote Kyma not found and KCP Kyma is under deletion")]
    NotFoundAndKcpKymaUnderDeletion,

    #[error("Failed to synchronise Kyma {what} to SKR: {source}")]
    KymaSync {
        what: &'static str,
        #[source]
        source: kube::Error,
    },

    #[error("Failed updating finalizers of {name}: {source}")]
    Finalizer {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{category}: {}", join_messages(.errors))]
    Aggregate {
        category: ErrorCategory,
        errors: Vec<SyncError>,
    },
}

fn join_messages(errors: &[SyncError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SyncError {
    pub fn aggregate(category: ErrorCategory, errors: Vec<SyncError>) -> Self {
        SyncError::Aggregate { category, errors }
    }

    /// The Kubernetes error this failure originated from, if any
    pub fn kube_error(&self) -> Option<&kube::Error> {
        match self {
            SyncError::KubeError(e) => Some(e),
            SyncError::ClientBuild { source, .. }
            | SyncError::CatalogApply { source, .. }
            | SyncError::CatalogDelete { source, .. }
            | SyncError::Crd { source, .. }
            | SyncError::KymaSync { source, .. }
            | SyncError::Finalizer { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether this failure, or any failure aggregated into it, carries `category`
    pub fn has_category(&self, category: ErrorCategory) -> bool {
        match self {
            SyncError::Aggregate {
                category: own,
                errors,
            } => *own == category || errors.iter().any(|e| e.has_category(category)),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::AccessSecretNotFound(_))
            || self.kube_error().is_some_and(errors::is_not_found)
    }

    /// The kind of the requested resource is not registered on the server
    pub fn is_no_match(&self) -> bool {
        match self {
            SyncError::Aggregate { errors, .. } => errors.iter().any(SyncError::is_no_match),
            _ => self.kube_error().is_some_and(errors::is_no_match),
        }
    }

    pub fn is_connection_error(&self) -> bool {
        match self {
            SyncError::Aggregate { errors, .. } => {
                errors.iter().any(SyncError::is_connection_error)
            }
            _ => self
                .kube_error()
                .is_some_and(|e| errors::is_connection_error(e)),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
