// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Startup gate on the operator kinds being served by the control plane

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::constants::{LATEST_VERSION, OPERATOR_GROUP};
use crate::error::Result;
use crate::types::{Kyma, ModuleReleaseMeta, ModuleTemplate};
use kube::{discovery::Discovery, Client, Resource};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Kinds the controllers watch or sync from the control plane
fn required_kinds() -> [String; 3] {
    [
        Kyma::kind(&()).to_string(),
        ModuleTemplate::kind(&()).to_string(),
        ModuleReleaseMeta::kind(&()).to_string(),
    ]
}

/// Block until the control plane serves every operator kind at the latest
/// version, backing off from POLL_INTERVAL_SECS up to POLL_MAX_INTERVAL_SECS.
pub async fn wait_for_operator_crds(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match served_kinds(client).await {
            Ok(served) => {
                let missing = missing_kinds(&served);
                if missing.is_empty() {
                    info!("Operator kinds of {}/{} are served", OPERATOR_GROUP, LATEST_VERSION);
                    return Ok(());
                }
                info!(
                    "Kinds {} of {}/{} not yet served, waiting {} seconds...",
                    missing.join(", "),
                    OPERATOR_GROUP,
                    LATEST_VERSION,
                    interval
                );
            }
            Err(e) => {
                warn!("Discovery of {} failed: {}, retrying in {} seconds...", OPERATOR_GROUP, e, interval);
            }
        }

        sleep(Duration::from_secs(interval)).await;
        interval = next_interval(interval);
    }
}

fn next_interval(interval: u64) -> u64 {
    (interval * 2).min(POLL_MAX_INTERVAL_SECS)
}

fn missing_kinds(served: &HashSet<String>) -> Vec<String> {
    required_kinds()
        .into_iter()
        .filter(|kind| !served.contains(kind))
        .collect()
}

/// Kinds of the operator group served at the latest version
async fn served_kinds(client: &Client) -> Result<HashSet<String>> {
    let discovery = Discovery::new(client.clone())
        .filter(&[OPERATOR_GROUP])
        .run()
        .await?;

    let served = match discovery.get(OPERATOR_GROUP) {
        Some(group) => group
            .versioned_resources(LATEST_VERSION)
            .into_iter()
            .map(|(ar, _)| ar.kind)
            .collect(),
        None => HashSet::new(),
    };
    Ok(served)
}
