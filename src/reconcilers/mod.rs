// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes reconcilers that react to Kyma watch events.

pub mod kyma;
pub mod purge;

pub use kyma::KymaReconciler;
pub use purge::{CrdMatcher, PurgeReconciler};
