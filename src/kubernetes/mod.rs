// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes plumbing: target connections, error classification, CRD discovery
//! and namespace management.

pub mod cache;
pub mod client;
pub mod crd;
pub mod errors;
pub mod evicting;
pub mod namespaces;

pub use cache::{ConnectionCache, TargetKey};
pub use client::{ClientFactory, KubeconfigSecretProvider, RateLimits};
pub use crd::wait_for_operator_crds;
