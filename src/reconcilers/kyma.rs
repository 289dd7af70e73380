// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kyma reconciler - mirrors every Kyma with its CRDs and module catalog
//! into the Kyma's target cluster.

use crate::error::{Result, SyncError};
use crate::kubernetes::cache::TargetKey;
use crate::remote::context::{replace_spec, SkrContext, SkrContextProvider};
use crate::remote::crd::SyncCrdsUseCase;
use crate::remote::remote_catalog::RemoteCatalog;
use crate::types::Kyma;
use futures::StreamExt;
use kube::api::{Patch, PatchParams};
use kube::runtime::{controller::Action, watcher, Controller};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub struct KymaReconciler {
    kcp_client: Client,
    contexts: Arc<SkrContextProvider>,
    crds: SyncCrdsUseCase,
    catalog: RemoteCatalog,
    requeue: Duration,
}

impl KymaReconciler {
    pub fn new(
        kcp_client: Client,
        contexts: Arc<SkrContextProvider>,
        crds: SyncCrdsUseCase,
        catalog: RemoteCatalog,
        requeue: Duration,
    ) -> Self {
        Self {
            kcp_client,
            contexts,
            crds,
            catalog,
            requeue,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let kymas: Api<Kyma> = Api::all(self.kcp_client.clone());
        let context = Arc::new(self);

        Controller::new(kymas, watcher::Config::default())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled kyma: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    fn kymas(&self, kyma: &Kyma) -> Api<Kyma> {
        Api::namespaced(self.kcp_client.clone(), &kyma.namespace().unwrap_or_default())
    }

    /// Bring the target of `kyma` in line with the control plane
    #[instrument(skip_all, fields(kyma = %kyma.name_any()))]
    pub async fn sync_target(&self, kyma: &Kyma, context: &SkrContext) -> Result<()> {
        context.create_kyma_namespace().await?;
        let mut remote_kyma = context.create_or_fetch_kyma(&self.kcp_client, kyma).await?;

        let mut kyma = kyma.clone();
        if self.crds.execute(context.client(), &mut kyma).await? {
            self.persist_annotations(&kyma).await?;
        }

        let before = kyma.spec.clone();
        replace_spec(&mut kyma, &remote_kyma);
        if kyma.spec != before {
            self.persist_spec(&kyma).await?;
        }

        context
            .synchronize_kyma_metadata(&kyma, &mut remote_kyma)
            .await?;

        let catalog = self.catalog.catalog_for(&kyma).await?;
        self.catalog.sync(context.client(), catalog).await?;

        context
            .synchronize_kyma_status(&kyma, &mut remote_kyma)
            .await
    }

    /// Remove the mirrored Kyma from the target
    pub async fn cleanup_remote_kyma(&self, context: &SkrContext) -> Result<()> {
        for result in [
            context.remove_finalizers_from_kyma().await,
            context.delete_kyma().await,
        ] {
            match result {
                Err(e) if !e.is_not_found() => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    async fn persist_annotations(&self, kyma: &Kyma) -> Result<()> {
        let patch = serde_json::json!({ "metadata": { "annotations": kyma.annotations() } });
        self.kymas(kyma)
            .patch(&kyma.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn persist_spec(&self, kyma: &Kyma) -> Result<()> {
        let patch = serde_json::json!({ "spec": kyma.spec });
        self.kymas(kyma)
            .patch(&kyma.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

async fn reconcile(kyma: Arc<Kyma>, ctx: Arc<KymaReconciler>) -> Result<Action> {
    let key = TargetKey::from(kyma.as_ref());

    if kyma.is_deleting() {
        let context = match ctx.contexts.get(&key).await {
            Ok(context) => context,
            Err(e) if e.is_not_found() => {
                debug!("Target of {} is gone, nothing to clean up", key);
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e),
        };
        ctx.catalog.delete(&key).await?;
        ctx.cleanup_remote_kyma(&context).await?;
        ctx.contexts.invalidate(&key);
        info!("Removed remote Kyma of {}", key);
        return Ok(Action::await_change());
    }

    ctx.contexts.init(&key).await?;
    let context = ctx.contexts.get(&key).await?;
    match ctx.sync_target(&kyma, &context).await {
        Err(SyncError::NotFoundAndKcpKymaUnderDeletion) => Ok(Action::await_change()),
        Err(e) => Err(e),
        Ok(()) => Ok(Action::requeue(ctx.requeue)),
    }
}

fn error_policy(kyma: Arc<Kyma>, error: &SyncError, _ctx: Arc<KymaReconciler>) -> Action {
    error!("Reconciliation of Kyma {} failed: {}", kyma.name_any(), error);
    if error.is_connection_error() {
        return Action::requeue(Duration::from_secs(10));
    }
    Action::requeue(Duration::from_secs(60))
}
