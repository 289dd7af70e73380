// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::kubernetes::client::RateLimits;
use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Namespace on the control plane holding the kubeconfig secrets of targets
    pub kcp_secret_namespace: String,
    /// Namespace catalog items are written to on targets. Empty keeps the
    /// control-plane namespace.
    pub remote_sync_namespace: String,
    pub skr_client_qps: f32,
    pub skr_client_burst: u32,
    pub purge_finalizer_timeout: Duration,
    /// Comma separated CRD names or `*.group` patterns the purge leaves alone
    pub skip_purging_for: String,
    pub kyma_requeue: Duration,
    pub metrics_port: u16,
    // For testing, infers target clients from KUBECONFIG instead of fetching kubeconfig from secrets
    pub testing_mode: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup, falling back to defaults for
    /// unset keys
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            kcp_secret_namespace: string("KCP_SECRET_NAMESPACE", "kcp-system"),
            remote_sync_namespace: string("REMOTE_SYNC_NAMESPACE", "kyma-system"),
            skr_client_qps: parse(&lookup, "SKR_CLIENT_QPS", 150.0)?,
            skr_client_burst: parse(&lookup, "SKR_CLIENT_BURST", 150)?,
            purge_finalizer_timeout: Duration::from_secs(parse(
                &lookup,
                "PURGE_FINALIZER_TIMEOUT_SECS",
                300,
            )?),
            skip_purging_for: string("SKIP_PURGING_FOR", ""),
            kyma_requeue: Duration::from_secs(parse(&lookup, "KYMA_REQUEUE_SECS", 30)?),
            metrics_port: parse(&lookup, "METRICS_PORT", 8080)?,
            testing_mode: lookup("TESTING_MODE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.skr_client_qps.is_finite() || self.skr_client_qps <= 0.0 {
            bail!("SKR_CLIENT_QPS must be a positive number, got {}", self.skr_client_qps);
        }
        if self.skr_client_burst == 0 {
            bail!("SKR_CLIENT_BURST must be at least 1");
        }
        RateLimits {
            qps: self.skr_client_qps,
            burst: self.skr_client_burst,
        }
        .layer()
        .context("SKR_CLIENT_QPS and SKR_CLIENT_BURST do not form a usable request budget")?;
        Ok(())
    }

    pub fn remote_sync_namespace(&self) -> Option<String> {
        Some(self.remote_sync_namespace.clone()).filter(|ns| !ns.is_empty())
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, value)),
        None => Ok(default),
    }
}
