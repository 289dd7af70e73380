// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-target operations on the mirrored Kyma and its namespace.

use crate::constants::{annotations, field_managers::SYNC_CONTEXT, labels, remote};
use crate::error::{Result, SyncError};
use crate::events::{reasons, EventPublisher};
use crate::kubernetes::cache::TargetKey;
use crate::kubernetes::client::ClientFactory;
use crate::kubernetes::errors;
use crate::kubernetes::namespaces::apply_namespace;
use crate::remote::crd::{crd_name, create_crd_in_runtime};
use crate::types::kyma::{Kyma, KymaStatus};
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// A connection to one target together with event emission
#[derive(Clone)]
pub struct SkrContext {
    client: Client,
    events: Arc<dyn EventPublisher>,
}

impl SkrContext {
    pub fn new(client: Client, events: Arc<dyn EventPublisher>) -> Self {
        Self { client, events }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn kymas(&self) -> Api<Kyma> {
        Api::namespaced(self.client.clone(), remote::NAMESPACE)
    }

    pub async fn create_kyma_namespace(&self) -> Result<()> {
        let labels = BTreeMap::from([
            (
                labels::MANAGED_BY.to_string(),
                labels::MANAGED_BY_VALUE.to_string(),
            ),
            (
                labels::ISTIO_INJECTION.to_string(),
                labels::ENABLED_VALUE.to_string(),
            ),
            (labels::WARDEN.to_string(), labels::ENABLED_VALUE.to_string()),
        ]);
        apply_namespace(&self.client, remote::NAMESPACE, labels, SYNC_CONTEXT).await
    }

    /// The remote Kyma, installing its CRD and creating it from `kyma` when
    /// the target has neither.
    #[instrument(skip_all, fields(kyma = %kyma.name_any()))]
    pub async fn create_or_fetch_kyma(&self, kcp_client: &Client, kyma: &Kyma) -> Result<Kyma> {
        let err = match self.kymas().get(remote::KYMA_NAME).await {
            Ok(remote_kyma) => return Ok(remote_kyma),
            Err(e) if errors::is_not_found(&e) => e,
            Err(e) => return Err(e.into()),
        };

        let kyma_ref = kyma.object_ref(&());
        if errors::is_no_match(&err) {
            create_crd_in_runtime(kcp_client, &self.client, &crd_name("kymas")).await?;
            self.events
                .normal(
                    &kyma_ref,
                    reasons::CRD_INSTALLATION,
                    "CRDs were installed to SKR".to_string(),
                )
                .await;
        }

        if kyma.is_deleting() {
            return Err(SyncError::NotFoundAndKcpKymaUnderDeletion);
        }

        let mut remote_kyma = Kyma::new(remote::KYMA_NAME, kyma.spec.clone());
        remote_kyma.metadata.namespace = Some(remote::NAMESPACE.to_string());
        let created = self
            .kymas()
            .create(&PostParams::default(), &remote_kyma)
            .await?;
        info!("Created remote Kyma on target");
        self.events
            .normal(
                &kyma_ref,
                reasons::REMOTE_INSTALLATION,
                "Kyma was installed to SKR".to_string(),
            )
            .await;
        Ok(created)
    }

    /// Stamp ownership labels, the owner annotation and account labels of
    /// `kcp_kyma` onto the remote Kyma
    #[instrument(skip_all, fields(kyma = %kcp_kyma.name_any()))]
    pub async fn synchronize_kyma_metadata(&self, kcp_kyma: &Kyma, skr_kyma: &mut Kyma) -> Result<()> {
        if skr_kyma.is_deleting() {
            return Ok(());
        }

        let watcher_changed = sync_watcher_labels_annotations(kcp_kyma, skr_kyma);
        let account_changed = sync_account_labels(kcp_kyma, skr_kyma);
        if !watcher_changed && !account_changed {
            return Ok(());
        }

        let patch = serde_json::json!({
            "apiVersion": Kyma::api_version(&()),
            "kind": Kyma::kind(&()),
            "metadata": {
                "name": skr_kyma.name_any(),
                "namespace": skr_kyma.namespace(),
                "labels": skr_kyma.labels(),
                "annotations": skr_kyma.annotations(),
            }
        });
        let result = self
            .kymas()
            .patch(
                &skr_kyma.name_any(),
                &PatchParams::apply(SYNC_CONTEXT).force(),
                &Patch::Apply(&patch),
            )
            .await;

        if let Err(source) = result {
            let err = SyncError::KymaSync {
                what: "metadata",
                source,
            };
            self.events
                .warning(&kcp_kyma.object_ref(&()), reasons::METADATA_SYNCHRONIZATION, &err)
                .await;
            return Err(err);
        }
        Ok(())
    }

    /// Mirror the status of `kcp_kyma` onto the remote Kyma
    #[instrument(skip_all, fields(kyma = %kcp_kyma.name_any()))]
    pub async fn synchronize_kyma_status(&self, kcp_kyma: &Kyma, skr_kyma: &mut Kyma) -> Result<()> {
        if skr_kyma.is_deleting() {
            return Ok(());
        }

        let status = remote_status(kcp_kyma.status.clone().unwrap_or_default());
        let patch = serde_json::json!({ "status": status });
        skr_kyma.status = Some(status);

        let result = self
            .kymas()
            .patch_status(
                &skr_kyma.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await;

        if let Err(source) = result {
            let err = SyncError::KymaSync {
                what: "status",
                source,
            };
            self.events
                .warning(&kcp_kyma.object_ref(&()), reasons::STATUS_SYNCHRONIZATION, &err)
                .await;
            return Err(err);
        }
        Ok(())
    }

    pub async fn remove_finalizers_from_kyma(&self) -> Result<()> {
        let remote_kyma = self.kymas().get(remote::KYMA_NAME).await?;
        if remote_kyma.finalizers().is_empty() {
            return Ok(());
        }
        let patch = serde_json::json!({ "metadata": { "finalizers": null } });
        self.kymas()
            .patch(
                remote::KYMA_NAME,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_kyma(&self) -> Result<()> {
        self.kymas()
            .delete(remote::KYMA_NAME, &DeleteParams::default())
            .await?;
        info!("Deleted remote Kyma");
        Ok(())
    }
}

/// Take over modules and channel the user configured on the remote Kyma
pub fn replace_spec(kcp_kyma: &mut Kyma, remote_kyma: &Kyma) {
    kcp_kyma.spec.modules = remote_kyma.spec.modules.clone();
    kcp_kyma.spec.channel = remote_kyma.spec.channel.clone();
}

fn merge_into(target: &mut BTreeMap<String, String>, source: BTreeMap<String, String>) -> bool {
    let mut changed = false;
    for (key, value) in source {
        if target.get(&key) != Some(&value) {
            target.insert(key, value);
            changed = true;
        }
    }
    changed
}

fn sync_watcher_labels_annotations(kcp_kyma: &Kyma, skr_kyma: &mut Kyma) -> bool {
    let labels_changed = merge_into(
        skr_kyma.labels_mut(),
        BTreeMap::from([
            (
                labels::WATCHED_BY.to_string(),
                labels::WATCHED_BY_VALUE.to_string(),
            ),
            (
                labels::MANAGED_BY.to_string(),
                labels::MANAGED_BY_VALUE.to_string(),
            ),
        ]),
    );
    let owner = format!(
        "{}/{}",
        kcp_kyma.namespace().unwrap_or_default(),
        kcp_kyma.name_any()
    );
    let annotations_changed = merge_into(
        skr_kyma.annotations_mut(),
        BTreeMap::from([(annotations::OWNED_BY.to_string(), owner)]),
    );
    labels_changed || annotations_changed
}

fn sync_account_labels(kcp_kyma: &Kyma, skr_kyma: &mut Kyma) -> bool {
    let account_labels: BTreeMap<String, String> = [labels::GLOBAL_ACCOUNT_ID, labels::SUBACCOUNT_ID]
        .into_iter()
        .filter_map(|key| {
            kcp_kyma
                .labels()
                .get(key)
                .map(|value| (key.to_string(), value.clone()))
        })
        .collect();
    merge_into(skr_kyma.labels_mut(), account_labels)
}

/// Status as shown on the target: templates live in the remote namespace and
/// manifests are not visible there.
fn remote_status(mut status: KymaStatus) -> KymaStatus {
    for module in &mut status.modules {
        if let Some(template) = module.template.as_mut() {
            template.namespace = remote::NAMESPACE.to_string();
        }
        module.manifest = None;
    }
    status
}

/// Hands out [`SkrContext`]s backed by the shared client cache
pub struct SkrContextProvider {
    factory: Arc<ClientFactory>,
    events: Arc<dyn EventPublisher>,
}

impl SkrContextProvider {
    pub fn new(factory: Arc<ClientFactory>, events: Arc<dyn EventPublisher>) -> Self {
        Self { factory, events }
    }

    /// Make sure a client for `key` is cached
    pub async fn init(&self, key: &TargetKey) -> Result<()> {
        self.factory.get(key).await.map(|_| ())
    }

    pub async fn get(&self, key: &TargetKey) -> Result<SkrContext> {
        let client = self.factory.get(key).await?;
        Ok(SkrContext::new(client, self.events.clone()))
    }

    pub fn invalidate(&self, key: &TargetKey) {
        self.factory.invalidate(key);
    }
}
