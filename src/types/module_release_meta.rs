// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Maps the release channels of a module to versions
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "operator.kyma-project.io",
    version = "v1beta2",
    kind = "ModuleReleaseMeta"
)]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReleaseMetaSpec {
    pub module_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocm_component_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelVersionAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandatory: Option<Mandatory>,
    #[serde(default)]
    pub beta: bool,
    #[serde(default)]
    pub internal: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct ChannelVersionAssignment {
    pub channel: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct Mandatory {
    pub version: String,
}

impl ModuleReleaseMeta {
    pub fn is_mandatory(&self) -> bool {
        self.spec.mandatory.is_some()
    }
}
