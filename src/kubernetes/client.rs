// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Target cluster client creation and kubeconfig utilities

use crate::constants::KUBECONFIG_SECRET_KEY;
use crate::error::{Result, SyncError};
use crate::kubernetes::cache::{ConnectionCache, TargetKey};
use crate::kubernetes::errors;
use crate::kubernetes::evicting::{Evictor, SelfEvictingLayer};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::client::ClientBuilder;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config as KConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower::limit::RateLimitLayer;
use tracing::{debug, info, instrument};

/// Resolves the connection settings of a target cluster
#[async_trait]
pub trait AccessConfigProvider: Send + Sync {
    async fn get_access_config(&self, key: &TargetKey) -> Result<KConfig>;
}

/// Reads the kubeconfig of a target from a Secret on the control plane.
/// The Secret carries the name of the Kyma it grants access to.
pub struct KubeconfigSecretProvider {
    kcp_client: Client,
    namespace: String,
}

impl KubeconfigSecretProvider {
    pub fn new(kcp_client: Client, namespace: impl Into<String>) -> Self {
        Self {
            kcp_client,
            namespace: namespace.into(),
        }
    }

    async fn get_kubeconfig(&self, key: &TargetKey) -> Result<String> {
        let secrets: Api<Secret> = Api::namespaced(self.kcp_client.clone(), &self.namespace);

        debug!(
            "Getting access secret '{}/{}' for target '{}'",
            self.namespace, key.name, key
        );

        let secret = secrets.get(&key.name).await.map_err(|e| {
            if errors::is_not_found(&e) {
                SyncError::AccessSecretNotFound(key.to_string())
            } else {
                SyncError::KubeError(e)
            }
        })?;

        let Some(kubeconfig_data) = secret
            .data
            .as_ref()
            .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
        else {
            return Err(SyncError::KubeconfigError(format!(
                "Access secret for target {} does not contain '{}' key",
                key, KUBECONFIG_SECRET_KEY
            )));
        };

        String::from_utf8(kubeconfig_data.0.clone()).map_err(|e| {
            SyncError::KubeconfigError(format!(
                "Failed to decode kubeconfig for target {}: {}",
                key, e
            ))
        })
    }
}

#[async_trait]
impl AccessConfigProvider for KubeconfigSecretProvider {
    #[instrument(skip(self), fields(target = %key))]
    async fn get_access_config(&self, key: &TargetKey) -> Result<KConfig> {
        let kubeconfig = self.get_kubeconfig(key).await?;
        config_from_kubeconfig(&kubeconfig).await
    }
}

/// Parse a kubeconfig document into client settings
pub async fn config_from_kubeconfig(kubeconfig: &str) -> Result<KConfig> {
    let parsed: Kubeconfig = serde_yaml::from_str(kubeconfig)
        .map_err(|e| SyncError::KubeconfigError(format!("Failed to parse kubeconfig: {}", e)))?;

    KConfig::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
        .await
        .map_err(|e| SyncError::KubeconfigError(format!("Failed to create config: {}", e)))
}

/// Testing mode: every target is reached through the local kubeconfig,
/// with a trailing `local` cluster segment swapped for the target name.
#[derive(Debug, Default)]
pub struct InferredConfigProvider;

#[async_trait]
impl AccessConfigProvider for InferredConfigProvider {
    async fn get_access_config(&self, key: &TargetKey) -> Result<KConfig> {
        let mut c = KConfig::infer()
            .await
            .map_err(|e| SyncError::KubeconfigError(format!("Failed to infer config: {}", e)))?;

        if let Some(url) = testing_cluster_url(&c.cluster_url.to_string(), &key.name) {
            debug!(
                "Testing mode: modifying cluster URL from {} to {}",
                c.cluster_url, url
            );
            c.cluster_url = url
                .parse()
                .map_err(|e| SyncError::KubeconfigError(format!("Invalid URL: {}", e)))?;
        }

        Ok(c)
    }
}

fn testing_cluster_url(cluster_url: &str, target: &str) -> Option<String> {
    let trimmed = cluster_url.trim_end_matches('/');
    let (base, last) = trimmed.rsplit_once('/')?;
    (last == "local").then(|| format!("{}/{}", base, target))
}

/// Request rate bounds of every target connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimits {
    pub qps: f32,
    pub burst: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            qps: 150.0,
            burst: 150,
        }
    }
}

/// Rate limits that cannot be turned into a request budget
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("invalid client rate limits: qps {qps}, burst {burst}")]
pub struct InvalidRateLimits {
    pub qps: f32,
    pub burst: u32,
}

impl RateLimits {
    /// Allow `burst` requests per `burst / qps` seconds
    pub fn layer(&self) -> std::result::Result<RateLimitLayer, InvalidRateLimits> {
        let invalid = InvalidRateLimits {
            qps: self.qps,
            burst: self.burst,
        };
        if self.burst == 0 || !self.qps.is_finite() || self.qps <= 0.0 {
            return Err(invalid);
        }
        let per = Duration::try_from_secs_f64(f64::from(self.burst) / f64::from(self.qps))
            .map_err(|_| invalid)?;
        Ok(RateLimitLayer::new(u64::from(self.burst), per))
    }
}

/// Hands out one cached client per target, building it on a miss.
///
/// Every client owns its own connector so that no TLS or transport state is
/// shared between targets.
pub struct ClientFactory {
    cache: Arc<ConnectionCache>,
    access: Arc<dyn AccessConfigProvider>,
    limits: RateLimits,
}

impl ClientFactory {
    pub fn new(
        cache: Arc<ConnectionCache>,
        access: Arc<dyn AccessConfigProvider>,
        limits: RateLimits,
    ) -> Self {
        Self {
            cache,
            access,
            limits,
        }
    }

    pub fn cache(&self) -> &Arc<ConnectionCache> {
        &self.cache
    }

    #[instrument(skip(self), fields(target = %key))]
    pub async fn get(&self, key: &TargetKey) -> Result<Client> {
        if let Some(client) = self.cache.get(key) {
            return Ok(client);
        }

        let config = self.access.get_access_config(key).await?;
        let generation = self.cache.next_generation();
        let evict = evictor(&self.cache, key.clone(), generation);
        let client = build_client(config, self.limits, evict).map_err(|source| {
            SyncError::ClientBuild {
                target: key.to_string(),
                source,
            }
        })?;

        self.cache.insert(key.clone(), client.clone(), generation);
        info!("Created client for target {}", key);
        Ok(client)
    }

    /// Forget the cached client of a target
    pub fn invalidate(&self, key: &TargetKey) {
        self.cache.delete(key);
    }
}

fn evictor(cache: &Arc<ConnectionCache>, key: TargetKey, generation: u64) -> Evictor {
    let cache = Arc::downgrade(cache);
    Arc::new(move || {
        if let Some(cache) = cache.upgrade() {
            if cache.evict(&key, generation) {
                info!("Evicted client of target {} from cache", key);
            }
        }
    })
}

fn build_client(
    config: KConfig,
    limits: RateLimits,
    evict: Evictor,
) -> std::result::Result<Client, kube::Error> {
    let rate_limit = limits
        .layer()
        .map_err(|e| kube::Error::Service(Box::new(e)))?;
    Ok(ClientBuilder::try_from(config)?
        .with_layer(&SelfEvictingLayer::new(evict))
        .with_layer(&rate_limit)
        .build())
}
