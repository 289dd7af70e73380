// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::remote::catalog::{CatalogKind, CatalogSyncer};
use crate::types::module_template::ModuleTemplate;

impl CatalogKind for ModuleTemplate {}

pub type ModuleTemplateSyncer = CatalogSyncer<ModuleTemplate>;
