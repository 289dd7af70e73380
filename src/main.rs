// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kyma_skr_sync::config::Config;
use kyma_skr_sync::constants::{client_cache::REAP_INTERVAL, OPERATOR_NAME};
use kyma_skr_sync::events::{EventPublisher, KubeEventPublisher};
use kyma_skr_sync::kubernetes::client::{AccessConfigProvider, InferredConfigProvider};
use kyma_skr_sync::kubernetes::{
    wait_for_operator_crds, ClientFactory, ConnectionCache, KubeconfigSecretProvider, RateLimits,
};
use kyma_skr_sync::metrics;
use kyma_skr_sync::reconcilers::{CrdMatcher, KymaReconciler, PurgeReconciler};
use kyma_skr_sync::remote::crd::{CrdCache, SyncCrdsUseCase};
use kyma_skr_sync::remote::{RemoteCatalog, SkrContextProvider};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Kyma SKR sync");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: kcp_secret_namespace={}, remote_sync_namespace={}, testing_mode={}",
        config.kcp_secret_namespace, config.remote_sync_namespace, config.testing_mode
    );

    metrics::register_metrics()?;

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for Kyma CRD to become available...");
    wait_for_operator_crds(&client).await?;

    let cache = Arc::new(ConnectionCache::new());
    let _reaper = cache.spawn_reaper(REAP_INTERVAL);

    let access: Arc<dyn AccessConfigProvider> = if config.testing_mode {
        Arc::new(InferredConfigProvider)
    } else {
        Arc::new(KubeconfigSecretProvider::new(
            client.clone(),
            config.kcp_secret_namespace.clone(),
        ))
    };
    let limits = RateLimits {
        qps: config.skr_client_qps,
        burst: config.skr_client_burst,
    };
    let factory = Arc::new(ClientFactory::new(cache, access, limits));
    let events: Arc<dyn EventPublisher> = Arc::new(KubeEventPublisher::new(client.clone(), OPERATOR_NAME));
    let contexts = Arc::new(SkrContextProvider::new(factory, events.clone()));

    let kyma_reconciler = KymaReconciler::new(
        client.clone(),
        contexts.clone(),
        SyncCrdsUseCase::new(client.clone(), Arc::new(CrdCache::new())),
        RemoteCatalog::new(client.clone(), contexts.clone(), config.remote_sync_namespace()),
        config.kyma_requeue,
    );
    let purge_reconciler = PurgeReconciler::new(
        client,
        contexts,
        events,
        config.purge_finalizer_timeout,
        CrdMatcher::from_patterns(&config.skip_purging_for),
    );

    info!("Starting reconcilers...");

    tokio::try_join!(
        metrics::serve(config.metrics_port),
        kyma_reconciler.run(),
        purge_reconciler.run()
    )?;

    warn!("All reconcilers stopped unexpectedly");
    Ok(())
}
