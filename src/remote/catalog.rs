// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Generic mirroring of a catalog kind from the control plane into a target.
//!
//! A sync cycle applies every control-plane item with server-side apply,
//! installs the CRD on the target when the kind is unknown there, and then
//! deletes the target items this engine manages that no longer exist on
//! the control plane.

use crate::constants::{field_managers::CATALOG_SYNC, labels};
use crate::error::{ErrorCategory, Result, SyncError};
use crate::kubernetes::errors;
use crate::remote::crd::{crd_name, create_crd_in_runtime};
use crate::remote::diff::DiffCalc;
use async_trait::async_trait;
use futures::future::join_all;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::{debug, info, instrument};

/// A namespaced resource kind mirrored by [`CatalogSyncer`]
pub trait CatalogKind:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Key that identifies the same item on both clusters
    fn identity(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Whether the item was written by the catalog sync
    fn is_managed(&self) -> bool {
        self.managed_fields()
            .iter()
            .any(|entry| entry.manager.as_deref() == Some(CATALOG_SYNC))
    }

    fn crd_name() -> String {
        crd_name(&Self::plural(&()))
    }
}

/// Strip server-owned metadata, stamp the managed-by label and move the item
/// into `namespace` when one is configured.
pub fn prepare_for_ssa<K: CatalogKind>(item: &mut K, namespace: Option<&str>) {
    let meta = item.meta_mut();
    meta.resource_version = None;
    meta.uid = None;
    meta.managed_fields = None;
    if let Some(namespace) = namespace {
        meta.namespace = Some(namespace.to_string());
    }
    item.labels_mut().insert(
        labels::MANAGED_BY.to_string(),
        labels::MANAGED_BY_VALUE.to_string(),
    );
}

/// Applies and deletes batches of items on a target
#[async_trait]
pub trait SyncWorker<K: CatalogKind>: Send + Sync {
    async fn sync_concurrently(&self, items: &[K]) -> Result<()>;
    async fn delete_concurrently(&self, items: &[K]) -> Result<()>;
}

/// Worker that issues one request per item and awaits them all together
pub struct ConcurrentWorker<K> {
    kcp_client: Client,
    skr_client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K: CatalogKind> ConcurrentWorker<K> {
    pub fn new(kcp_client: Client, skr_client: Client) -> Self {
        Self {
            kcp_client,
            skr_client,
            _kind: PhantomData,
        }
    }

    fn api_for(&self, item: &K) -> Api<K> {
        Api::namespaced(self.skr_client.clone(), &item.namespace().unwrap_or_default())
    }

    async fn patch_diff(&self, item: K) -> Result<()> {
        self.api_for(&item)
            .patch(
                &item.name_any(),
                &PatchParams::apply(CATALOG_SYNC).force(),
                &Patch::Apply(&item),
            )
            .await
            .map_err(|source| SyncError::CatalogApply {
                kind: K::kind(&()).to_string(),
                name: item.identity(),
                source,
            })?;
        debug!("Applied {} {}", K::kind(&()), item.identity());
        Ok(())
    }

    async fn delete_diff(&self, item: K) -> Result<()> {
        match self
            .api_for(&item)
            .delete(&item.name_any(), &DeleteParams::default())
            .await
        {
            Ok(_) => {
                debug!("Deleted {} {}", K::kind(&()), item.identity());
                Ok(())
            }
            Err(e) if errors::is_not_found(&e) => Ok(()),
            Err(source) => Err(SyncError::CatalogDelete {
                kind: K::kind(&()).to_string(),
                name: item.identity(),
                source,
            }),
        }
    }
}

#[async_trait]
impl<K: CatalogKind> SyncWorker<K> for ConcurrentWorker<K> {
    async fn sync_concurrently(&self, items: &[K]) -> Result<()> {
        let results = join_all(items.iter().cloned().map(|item| self.patch_diff(item))).await;
        let errs: Vec<SyncError> = results.into_iter().filter_map(|r| r.err()).collect();

        if errs.iter().any(SyncError::is_no_match) {
            info!("{} kind missing on target, installing CRD", K::kind(&()));
            create_crd_in_runtime(&self.kcp_client, &self.skr_client, &K::crd_name()).await?;
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(SyncError::aggregate(ErrorCategory::CatalogApply, errs))
        }
    }

    async fn delete_concurrently(&self, items: &[K]) -> Result<()> {
        let results = join_all(items.iter().cloned().map(|item| self.delete_diff(item))).await;
        let errs: Vec<SyncError> = results.into_iter().filter_map(|r| r.err()).collect();

        if errs.is_empty() {
            Ok(())
        } else {
            Err(SyncError::aggregate(ErrorCategory::CatalogCleanup, errs))
        }
    }
}

/// Mirrors one catalog kind into one target
pub struct CatalogSyncer<K: CatalogKind, W: SyncWorker<K> = ConcurrentWorker<K>> {
    skr_client: Client,
    worker: W,
    namespace: Option<String>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: CatalogKind> CatalogSyncer<K> {
    pub fn new(kcp_client: Client, skr_client: Client, namespace: Option<String>) -> Self {
        let worker = ConcurrentWorker::new(kcp_client, skr_client.clone());
        Self::with_worker(skr_client, worker, namespace)
    }
}

impl<K: CatalogKind, W: SyncWorker<K>> CatalogSyncer<K, W> {
    pub fn with_worker(skr_client: Client, worker: W, namespace: Option<String>) -> Self {
        Self {
            skr_client,
            worker,
            namespace: namespace.filter(|ns| !ns.is_empty()),
            _kind: PhantomData,
        }
    }

    /// Make the target's items of this kind match `kcp_items`
    #[instrument(skip_all, fields(kind = %K::kind(&()), items = kcp_items.len()))]
    pub async fn sync_to_skr(&self, kcp_items: Vec<K>) -> Result<()> {
        let prepared: Vec<K> = kcp_items
            .into_iter()
            .map(|mut item| {
                prepare_for_ssa(&mut item, self.namespace.as_deref());
                item
            })
            .collect();

        self.worker.sync_concurrently(&prepared).await?;

        let runtime_items = match self.list_runtime().await {
            Ok(items) => items,
            Err(e) if errors::is_no_match(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let obsolete: Vec<K> = DiffCalc::new(&runtime_items, K::identity)
            .not_existing_in(&prepared)
            .into_iter()
            .filter(|item| item.is_managed())
            .cloned()
            .collect();

        if !obsolete.is_empty() {
            info!("Deleting {} obsolete {} from target", obsolete.len(), K::plural(&()));
        }
        self.worker.delete_concurrently(&obsolete).await
    }

    /// Remove every item of this kind the catalog sync wrote to the target
    #[instrument(skip_all, fields(kind = %K::kind(&())))]
    pub async fn delete_all_managed(&self) -> Result<()> {
        let runtime_items = match self.list_runtime().await {
            Ok(items) => items,
            Err(e) if errors::is_not_found(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let managed: Vec<K> = runtime_items
            .into_iter()
            .filter(|item| item.is_managed())
            .collect();
        self.worker.delete_concurrently(&managed).await
    }

    async fn list_runtime(&self) -> std::result::Result<Vec<K>, kube::Error> {
        let api: Api<K> = Api::all(self.skr_client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}
