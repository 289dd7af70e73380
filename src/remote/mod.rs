// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Everything written to target clusters: the mirrored Kyma, CRDs and the
//! module catalog.

pub mod catalog;
pub mod context;
pub mod crd;
pub mod diff;
pub mod module_release_meta;
pub mod module_template;
pub mod remote_catalog;

pub use context::{SkrContext, SkrContextProvider};
pub use remote_catalog::RemoteCatalog;
