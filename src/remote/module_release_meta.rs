// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::remote::catalog::{CatalogKind, CatalogSyncer};
use crate::types::module_release_meta::ModuleReleaseMeta;

impl CatalogKind for ModuleReleaseMeta {}

pub type ModuleReleaseMetaSyncer = CatalogSyncer<ModuleReleaseMeta>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{list_json, MockService};
    use crate::types::module_release_meta::{ChannelVersionAssignment, ModuleReleaseMetaSpec};

    const METAS: &str = "/apis/operator.kyma-project.io/v1beta2/modulereleasemetas";

    #[tokio::test]
    async fn test_release_metas_are_applied_to_sync_namespace() {
        let skr = MockService::new().on_get(
            METAS,
            200,
            &list_json("operator.kyma-project.io/v1beta2", "ModuleReleaseMeta", vec![]),
        );
        let syncer = ModuleReleaseMetaSyncer::new(
            MockService::new().into_client(),
            skr.clone().into_client(),
            Some("kyma-system".to_string()),
        );
        let mut meta = ModuleReleaseMeta::new(
            "keda",
            ModuleReleaseMetaSpec {
                module_name: "keda".to_string(),
                channels: vec![ChannelVersionAssignment {
                    channel: "regular".to_string(),
                    version: "1.0.0".to_string(),
                }],
                ..Default::default()
            },
        );
        meta.metadata.namespace = Some("kcp-system".to_string());

        syncer.sync_to_skr(vec![meta]).await.unwrap();

        let applied = skr.requests_to("PATCH", "/apis/operator.kyma-project.io");
        assert_eq!(applied.len(), 1);
        assert_eq!(
            applied[0].path,
            "/apis/operator.kyma-project.io/v1beta2/namespaces/kyma-system/modulereleasemetas/keda"
        );
        assert_eq!(applied[0].json()["spec"]["channels"][0]["version"], "1.0.0");
        assert!(skr.requests_to("DELETE", "/").is_empty());
    }
}
