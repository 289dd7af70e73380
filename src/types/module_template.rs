// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::labels;
use crate::types::label_is;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

/// A module version offered by the control plane
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "operator.kyma-project.io",
    version = "v1beta2",
    kind = "ModuleTemplate"
)]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTemplateSpec {
    /// Set on templates that predate release metadata
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module_name: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<serde_json::Value>,
}

impl ModuleTemplate {
    /// Whether this template may be mirrored to a Kyma with the given gates
    pub fn sync_enabled(&self, beta_enabled: bool, internal_enabled: bool) -> bool {
        if label_is(self.labels(), labels::SYNC, labels::FALSE_VALUE) {
            return false;
        }
        if self.is_beta() && !beta_enabled {
            return false;
        }
        if self.is_internal() && !internal_enabled {
            return false;
        }
        !self.spec.mandatory
    }

    pub fn is_beta(&self) -> bool {
        label_is(self.labels(), labels::BETA, labels::TRUE_VALUE)
    }

    pub fn is_internal(&self) -> bool {
        label_is(self.labels(), labels::INTERNAL, labels::TRUE_VALUE)
    }
}
