// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace management utilities

use crate::error::Result;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{ObjectMeta, Patch, PatchParams},
    Api, Client,
};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Server-side apply a namespace carrying `labels`, creating it if needed
#[instrument(skip(client, labels))]
pub async fn apply_namespace(
    client: &Client,
    namespace: &str,
    labels: BTreeMap<String, String>,
    field_manager: &str,
) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut patch = serde_json::to_value(&ns)?;
    patch["apiVersion"] = "v1".into();
    patch["kind"] = "Namespace".into();

    namespaces
        .patch(
            namespace,
            &PatchParams::apply(field_manager).force(),
            &Patch::Apply(&patch),
        )
        .await?;
    debug!("Namespace {} applied", namespace);
    Ok(())
}
