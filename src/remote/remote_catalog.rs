// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Selection of the module catalog a Kyma may see, and its mirroring into the
//! Kyma's target cluster.

use crate::error::{ErrorCategory, Result, SyncError};
use crate::kubernetes::cache::TargetKey;
use crate::remote::context::SkrContextProvider;
use crate::remote::module_release_meta::ModuleReleaseMetaSyncer;
use crate::remote::module_template::ModuleTemplateSyncer;
use crate::types::{Kyma, ModuleReleaseMeta, ModuleTemplate};
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

fn module_version_name(module_name: &str, version: &str) -> String {
    format!("{}-{}", module_name, version)
}

/// Whether a template named `<module_name>-<version>` exists and may be
/// mirrored to `kyma`
pub fn is_allowed_module_version(
    kyma: &Kyma,
    templates: &[ModuleTemplate],
    module_name: &str,
    version: &str,
) -> bool {
    let name = module_version_name(module_name, version);
    templates.iter().any(|template| {
        template.name_any() == name && template.sync_enabled(kyma.is_beta(), kyma.is_internal())
    })
}

/// Release metadata to mirror, reduced to the channels whose template is
/// allowed for `kyma`. Mandatory modules and metas without any remaining
/// channel are left out.
pub fn release_metas_to_sync(
    kyma: &Kyma,
    metas: Vec<ModuleReleaseMeta>,
    templates: &[ModuleTemplate],
) -> Vec<ModuleReleaseMeta> {
    metas
        .into_iter()
        .filter(|meta| !meta.is_mandatory())
        .filter_map(|mut meta| {
            let module_name = meta.spec.module_name.clone();
            meta.spec.channels.retain(|assignment| {
                is_allowed_module_version(kyma, templates, &module_name, &assignment.version)
            });
            (!meta.spec.channels.is_empty()).then_some(meta)
        })
        .collect()
}

/// Templates referenced by one of `metas` that may be mirrored to `kyma`
pub fn allowed_module_templates(
    templates: &[ModuleTemplate],
    metas: &[ModuleReleaseMeta],
    kyma: &Kyma,
) -> Vec<ModuleTemplate> {
    let referenced: HashSet<String> = metas
        .iter()
        .flat_map(|meta| {
            meta.spec
                .channels
                .iter()
                .map(|assignment| module_version_name(&meta.spec.module_name, &assignment.version))
        })
        .collect();

    templates
        .iter()
        .filter(|template| template.sync_enabled(kyma.is_beta(), kyma.is_internal()))
        .filter(|template| {
            referenced.contains(&module_version_name(
                &template.spec.module_name,
                &template.spec.version,
            ))
        })
        .cloned()
        .collect()
}

/// Templates in the channel-based format that carry no release metadata
pub fn legacy_module_templates(templates: &[ModuleTemplate], kyma: &Kyma) -> Vec<ModuleTemplate> {
    templates
        .iter()
        .filter(|template| !template.spec.channel.is_empty())
        .filter(|template| template.sync_enabled(kyma.is_beta(), kyma.is_internal()))
        .cloned()
        .collect()
}

/// The catalog selected for one Kyma
#[derive(Debug, Default)]
pub struct Catalog {
    pub templates: Vec<ModuleTemplate>,
    pub release_metas: Vec<ModuleReleaseMeta>,
}

/// Mirrors the module catalog of the control plane into target clusters
pub struct RemoteCatalog {
    kcp_client: Client,
    contexts: Arc<SkrContextProvider>,
    namespace: Option<String>,
}

impl RemoteCatalog {
    pub fn new(
        kcp_client: Client,
        contexts: Arc<SkrContextProvider>,
        namespace: Option<String>,
    ) -> Self {
        Self {
            kcp_client,
            contexts,
            namespace,
        }
    }

    /// Select and mirror the catalog `kyma` is entitled to
    #[instrument(skip_all, fields(kyma = %kyma.name_any()))]
    pub async fn sync_module_catalog(&self, kyma: &Kyma) -> Result<()> {
        let catalog = self.catalog_for(kyma).await?;
        let context = self.contexts.get(&TargetKey::from(kyma)).await?;
        self.sync(context.client(), catalog).await
    }

    /// Remove every managed template from the target of `key`
    pub async fn delete(&self, key: &TargetKey) -> Result<()> {
        let context = self.contexts.get(key).await?;
        ModuleTemplateSyncer::new(
            self.kcp_client.clone(),
            context.client().clone(),
            self.namespace.clone(),
        )
        .delete_all_managed()
        .await
    }

    pub async fn catalog_for(&self, kyma: &Kyma) -> Result<Catalog> {
        let templates = Api::<ModuleTemplate>::all(self.kcp_client.clone())
            .list(&ListParams::default())
            .await?
            .items;
        let metas = Api::<ModuleReleaseMeta>::all(self.kcp_client.clone())
            .list(&ListParams::default())
            .await?
            .items;

        let release_metas = release_metas_to_sync(kyma, metas, &templates);
        let mut selected = allowed_module_templates(&templates, &release_metas, kyma);
        let mut seen: HashSet<String> = selected.iter().map(ResourceExt::name_any).collect();
        for template in legacy_module_templates(&templates, kyma) {
            if seen.insert(template.name_any()) {
                selected.push(template);
            }
        }
        debug!(
            "Selected {} templates and {} release metas",
            selected.len(),
            release_metas.len()
        );

        Ok(Catalog {
            templates: selected,
            release_metas,
        })
    }

    /// Run both syncers against `skr_client`, reporting all of their failures
    pub async fn sync(&self, skr_client: &Client, catalog: Catalog) -> Result<()> {
        let templates = ModuleTemplateSyncer::new(
            self.kcp_client.clone(),
            skr_client.clone(),
            self.namespace.clone(),
        );
        let metas = ModuleReleaseMetaSyncer::new(
            self.kcp_client.clone(),
            skr_client.clone(),
            self.namespace.clone(),
        );

        let (templates_result, metas_result) = futures::join!(
            templates.sync_to_skr(catalog.templates),
            metas.sync_to_skr(catalog.release_metas)
        );

        let mut errs: Vec<SyncError> = [templates_result, metas_result]
            .into_iter()
            .filter_map(std::result::Result::err)
            .collect();
        match errs.len() {
            0 => Ok(()),
            1 => Err(errs.remove(0)),
            _ => Err(SyncError::aggregate(ErrorCategory::CatalogSync, errs)),
        }
    }
}
