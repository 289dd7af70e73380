// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Time-boxed cache of live target connections.

use crate::constants::client_cache::{MAX_TTL, MIN_TTL};
use crate::metrics;
use crate::types::kyma::Kyma;
use kube::{Client, ResourceExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Identity of the root object owning a remote target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub namespace: String,
    pub name: String,
}

impl TargetKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl From<&Kyma> for TargetKey {
    fn from(kyma: &Kyma) -> Self {
        Self::new(kyma.namespace().unwrap_or_default(), kyma.name_any())
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Source of connection lifetimes
pub trait TtlSource: Send + Sync {
    fn next_ttl(&self) -> Duration;
}

/// Draws lifetimes uniformly from a window so that connections created
/// together do not all expire together.
pub struct RandomTtl {
    rng: Mutex<StdRng>,
    min: Duration,
    max: Duration,
}

impl RandomTtl {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic lifetimes for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            min: MIN_TTL,
            max: MAX_TTL,
        }
    }
}

impl Default for RandomTtl {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlSource for RandomTtl {
    fn next_ttl(&self) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let millis = rng.gen_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

struct Entry<C> {
    connection: C,
    expires_at: Instant,
    generation: u64,
}

impl<C> Entry<C> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Cache of one connection per target.
///
/// Every stored connection gets a generation number so that a failure
/// observed on a replaced connection cannot evict its successor.
pub struct ConnectionCache<C = Client> {
    entries: RwLock<HashMap<TargetKey, Entry<C>>>,
    ttl: Box<dyn TtlSource>,
    next_generation: AtomicU64,
}

impl<C: Clone> ConnectionCache<C> {
    pub fn new() -> Self {
        Self::with_ttl(RandomTtl::new())
    }

    pub fn with_ttl(ttl: impl TtlSource + 'static) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Box::new(ttl),
            next_generation: AtomicU64::new(1),
        }
    }

    /// The live connection for `key`, if any
    pub fn get(&self, key: &TargetKey) -> Option<C> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|e| e.is_live(Instant::now()))
            .map(|e| e.connection.clone())
    }

    /// Store a connection with a fresh random lifetime, replacing any previous
    /// one, and return its generation.
    pub fn put(&self, key: TargetKey, connection: C) -> u64 {
        let generation = self.next_generation();
        self.insert(key, connection, generation);
        generation
    }

    /// Reserve a generation for a connection that is stored later with [`Self::insert`]
    pub fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, key: TargetKey, connection: C, generation: u64) {
        let expires_at = Instant::now() + self.ttl.next_ttl();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            Entry {
                connection,
                expires_at,
                generation,
            },
        );
        metrics::set_client_cache_size(entries.len());
    }

    pub fn delete(&self, key: &TargetKey) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        metrics::set_client_cache_size(entries.len());
    }

    /// Remove the entry for `key` only if it still holds `generation`.
    /// Returns whether anything was removed.
    pub fn evict(&self, key: &TargetKey, generation: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let matches = entries
            .get(key)
            .is_some_and(|e| e.generation == generation);
        if matches {
            entries.remove(key);
            metrics::set_client_cache_size(entries.len());
        }
        matches
    }

    /// Number of live entries
    pub fn size(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|e| e.is_live(now)).count()
    }

    /// Drop all expired entries and return how many were removed
    pub fn reap(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        metrics::set_client_cache_size(entries.len());
        before - entries.len()
    }
}

impl<C: Clone> Default for ConnectionCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clone + Send + Sync + 'static> ConnectionCache<C> {
    /// Reap expired entries every `period` until the cache is dropped
    pub fn spawn_reaper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!("Connection cache dropped, stopping reaper");
                    return;
                };
                let reaped = cache.reap();
                if reaped > 0 {
                    debug!("Reaped {} expired target connections", reaped);
                }
            }
        })
    }
}
