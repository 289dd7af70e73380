// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cross-cluster CRD bookkeeping.
//!
//! The generations of every control-plane CRD and of its copy on a target are
//! recorded as annotations on the Kyma, so a CRD is only re-applied to the
//! target when either side changed since the last apply.

use crate::constants::{labels, LATEST_VERSION, OPERATOR_GROUP, OPERATOR_NAME};
use crate::error::{Result, SyncError};
use crate::kubernetes::errors;
use crate::metrics;
use crate::types::kyma::Kyma;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceConversion, CustomResourceDefinition,
};
use kube::api::{ObjectMeta, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, instrument};

/// Plurals of the CRDs kept in sync with every target
const SYNCED_CRD_PLURALS: [&str; 3] = ["kymas", "moduletemplates", "modulereleasemetas"];

/// Cluster a CRD generation was observed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrdSide {
    Kcp,
    Skr,
}

impl CrdSide {
    fn as_str(self) -> &'static str {
        match self {
            CrdSide::Kcp => "kcp",
            CrdSide::Skr => "skr",
        }
    }
}

/// Full name of a CRD of the operator group
pub fn crd_name(plural: &str) -> String {
    format!("{}.{}", plural, OPERATOR_GROUP)
}

/// Annotation holding the generation of a CRD of `kind` on `side`
pub fn generation_annotation(kind: &str, side: CrdSide) -> String {
    format!("{}-{}-crd-generation", kind.to_lowercase(), side.as_str())
}

fn annotation_for(crd: &CustomResourceDefinition, side: CrdSide) -> String {
    generation_annotation(&crd.spec.names.kind, side)
}

fn generation_of(crd: &CustomResourceDefinition) -> String {
    crd.metadata.generation.unwrap_or_default().to_string()
}

/// Whether the target copy of `kcp_crd` has to be re-applied
pub fn should_patch_remote_crd(
    skr_crd: &CustomResourceDefinition,
    kcp_crd: &CustomResourceDefinition,
    kyma: &Kyma,
) -> bool {
    let annotations = kyma.annotations();
    annotations.get(&annotation_for(kcp_crd, CrdSide::Kcp)) != Some(&generation_of(kcp_crd))
        || annotations.get(&annotation_for(skr_crd, CrdSide::Skr)) != Some(&generation_of(skr_crd))
}

/// Record the generation of `crd` as observed on `side`
pub fn update_kyma_annotations(kyma: &mut Kyma, crd: &CustomResourceDefinition, side: CrdSide) {
    kyma.annotations_mut()
        .insert(annotation_for(crd, side), generation_of(crd));
}

/// Server-side apply the name and spec of `crd` onto the cluster behind `client`
#[instrument(skip(client, crd), fields(crd = %crd.name_any()))]
pub async fn patch_crd(client: &Client, crd: &CustomResourceDefinition) -> Result<()> {
    let name = crd.name_any();
    let mut spec = crd.spec.clone();
    spec.conversion = Some(CustomResourceConversion {
        strategy: "None".to_string(),
        webhook: None,
    });

    let to_apply = CustomResourceDefinition {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            labels: Some(BTreeMap::from([(
                labels::MANAGED_BY.to_string(),
                labels::MANAGED_BY_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        spec,
        status: None,
    };

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    crds.patch(
        &name,
        &PatchParams::apply(OPERATOR_NAME).force(),
        &Patch::Apply(&to_apply),
    )
    .await
    .map_err(|source| SyncError::Crd {
        name: name.clone(),
        action: "patch",
        source,
    })?;

    info!("Applied CRD {} to target", name);
    Ok(())
}

pub fn contains_latest_version(crd: &CustomResourceDefinition, latest_version: &str) -> bool {
    crd.spec.versions.iter().any(|v| v.name == latest_version)
}

/// A CRD is usable once established. A rejected name is not this engine's
/// concern and also counts as ready.
pub fn is_crd_ready(crd: &CustomResourceDefinition) -> bool {
    crd.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                (c.type_ == "Established" && c.status == "True")
                    || (c.type_ == "NamesAccepted" && c.status == "False")
            })
        })
}

/// Copy the CRD `name` from the control plane to the target unless the target
/// already serves the latest version.
#[instrument(skip(kcp_client, skr_client))]
pub async fn create_crd_in_runtime(
    kcp_client: &Client,
    skr_client: &Client,
    name: &str,
) -> Result<()> {
    let kcp_crds: Api<CustomResourceDefinition> = Api::all(kcp_client.clone());
    let kcp_crd = kcp_crds.get(name).await.map_err(|source| SyncError::Crd {
        name: name.to_string(),
        action: "fetch from KCP",
        source,
    })?;

    let skr_crds: Api<CustomResourceDefinition> = Api::all(skr_client.clone());
    match skr_crds.get(name).await {
        Ok(skr_crd) if !contains_latest_version(&skr_crd, LATEST_VERSION) => {
            patch_crd(skr_client, &kcp_crd).await
        }
        Ok(skr_crd) if !is_crd_ready(&skr_crd) => Err(SyncError::CrdNotReady(name.to_string())),
        Ok(_) => Ok(()),
        Err(e) if errors::is_not_found(&e) => patch_crd(skr_client, &kcp_crd).await,
        Err(source) => Err(SyncError::Crd {
            name: name.to_string(),
            action: "fetch from SKR",
            source,
        }),
    }
}

/// In-memory copy of control-plane CRDs
#[derive(Default)]
pub struct CrdCache {
    crds: RwLock<HashMap<String, CustomResourceDefinition>>,
}

impl CrdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<CustomResourceDefinition> {
        self.crds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn add(&self, name: String, crd: CustomResourceDefinition) {
        let mut crds = self.crds.write().unwrap_or_else(PoisonError::into_inner);
        crds.insert(name, crd);
        metrics::set_crd_cache_size(crds.len());
    }

    pub fn len(&self) -> usize {
        self.crds.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps the Kyma, ModuleTemplate and ModuleReleaseMeta CRDs of a target
/// in line with the control plane.
pub struct SyncCrdsUseCase {
    kcp_client: Client,
    crd_cache: std::sync::Arc<CrdCache>,
}

impl SyncCrdsUseCase {
    pub fn new(kcp_client: Client, crd_cache: std::sync::Arc<CrdCache>) -> Self {
        Self {
            kcp_client,
            crd_cache,
        }
    }

    /// Re-apply every outdated CRD to the target and record the observed
    /// generations on `kyma`. Returns whether any CRD was applied.
    #[instrument(skip(self, skr_client, kyma), fields(kyma = %kyma.name_any()))]
    pub async fn execute(&self, skr_client: &Client, kyma: &mut Kyma) -> Result<bool> {
        let mut updated = false;
        for plural in SYNCED_CRD_PLURALS {
            match self.sync_crd(skr_client, kyma, plural).await {
                Ok(patched) => updated |= patched,
                Err(e) if e.is_not_found() => {
                    debug!("CRD {} missing on one side, skipping", crd_name(plural));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(updated)
    }

    async fn sync_crd(&self, skr_client: &Client, kyma: &mut Kyma, plural: &str) -> Result<bool> {
        let name = crd_name(plural);
        let kcp_crd = self.fetch_kcp_crd(&name).await?;

        let skr_crds: Api<CustomResourceDefinition> = Api::all(skr_client.clone());
        let fetch_skr = |source| SyncError::Crd {
            name: name.clone(),
            action: "fetch from SKR",
            source,
        };
        let skr_crd = skr_crds.get(&name).await.map_err(fetch_skr)?;

        if !should_patch_remote_crd(&skr_crd, &kcp_crd, kyma) {
            return Ok(false);
        }

        patch_crd(skr_client, &kcp_crd).await?;
        let skr_crd = skr_crds.get(&name).await.map_err(fetch_skr)?;
        update_kyma_annotations(kyma, &kcp_crd, CrdSide::Kcp);
        update_kyma_annotations(kyma, &skr_crd, CrdSide::Skr);
        Ok(true)
    }

    async fn fetch_kcp_crd(&self, name: &str) -> Result<CustomResourceDefinition> {
        if let Some(crd) = self.crd_cache.get(name) {
            return Ok(crd);
        }
        let crds: Api<CustomResourceDefinition> = Api::all(self.kcp_client.clone());
        let crd = crds.get(name).await.map_err(|source| SyncError::Crd {
            name: name.to_string(),
            action: "fetch from KCP",
            source,
        })?;
        self.crd_cache.add(name.to_string(), crd.clone());
        Ok(crd)
    }
}
