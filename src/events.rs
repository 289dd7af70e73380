// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes Event emission. Publishing is fire-and-forget: failures are
//! logged and never reach the caller.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        object: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: Option<String>,
    );

    async fn normal(&self, object: &ObjectReference, reason: &str, message: String) {
        self.publish(object, EventType::Normal, reason, Some(message))
            .await;
    }

    async fn warning(
        &self,
        object: &ObjectReference,
        reason: &str,
        err: &(dyn std::error::Error + Send + Sync),
    ) {
        self.publish(object, EventType::Warning, reason, Some(err.to_string()))
            .await;
    }
}

/// Publishes through `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        object: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: reason.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, object).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    pub const CRD_INSTALLATION: &str = "CRDInstallation";
    pub const REMOTE_INSTALLATION: &str = "RemoteInstallation";
    pub const METADATA_SYNCHRONIZATION: &str = "MetadataSynchronization";
    pub const STATUS_SYNCHRONIZATION: &str = "StatusSynchronization";
    pub const SETTING_PURGE_FINALIZER_FAILED: &str = "SettingPurgeFinalizerFailed";
    pub const REMOVING_PURGE_FINALIZER_FAILED: &str = "RemovingPurgeFinalizerFailed";
}
