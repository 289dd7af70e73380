// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources of the `operator.kyma-project.io` group.

pub mod kyma;
pub mod module_release_meta;
pub mod module_template;

pub use kyma::Kyma;
pub use module_release_meta::ModuleReleaseMeta;
pub use module_template::ModuleTemplate;

use std::collections::BTreeMap;

/// Whether `labels` carries `key` with a value equal to `value`, ignoring case
pub(crate) fn label_is(labels: &BTreeMap<String, String>, key: &str, value: &str) -> bool {
    labels.get(key).is_some_and(|v| v.eq_ignore_ascii_case(value))
}
