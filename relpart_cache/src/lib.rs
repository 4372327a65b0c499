//! Process-wide cache of the child partitions of partitioned tables.
//!
//! The [`PartitionCache`] maps a parent table name to the list of child partitions last read from
//! the database catalog through a [`PartitionSource`]. Entries are filled lazily on the first
//! lookup and refetched after an explicit [`invalidate`][PartitionCache::invalidate] or once the
//! configured TTL has passed.
//!
//! # Failure policy
//!
//! Listing partitions is fail-open: if the source reports an error, or no source is registered at
//! all, the cache logs the problem and answers with an empty list. Failed fetches are never
//! stored, so the next lookup asks the source again.
#![warn(missing_docs)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use relpart_types::ChildPartition;
use tracing::{debug, warn};

mod clock;
pub use clock::{Clock, MockClock, SystemClock};

/// Error reported by a [`PartitionSource`].
pub type FetchError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The catalog query the cache fills itself from.
#[async_trait]
pub trait PartitionSource: std::fmt::Debug + Send + Sync + 'static {
    /// List every physical child partition of `parent`, in catalog discovery order.
    ///
    /// A parent without partitions is answered with an empty list, not an error.
    async fn list_partitions(&self, parent: &str) -> Result<Vec<ChildPartition>, FetchError>;
}

/// Behaviour of a [`PartitionCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// When disabled, every lookup goes to the source.
    pub enabled: bool,
    /// Maximum age of an entry; `None` keeps entries until they are invalidated.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: None,
        }
    }
}

/// Cached partitions of one parent table.
#[derive(Debug, Default)]
struct CatalogEntry {
    /// Bumped on every invalidation. A fetch only stores its result when the generation it saw
    /// before fetching is still current.
    generation: u64,
    cached: Option<Cached>,
}

#[derive(Debug)]
struct Cached {
    partitions: Arc<[ChildPartition]>,
    fetched_at: Instant,
}

enum Lookup {
    Hit(Arc<[ChildPartition]>),
    Miss { epoch: u64, generation: u64 },
}

/// Cache of parent table name to its child partitions.
///
/// Entries are independent of each other and are kept in a [`DashMap`], so lookups for different
/// tables never contend on a shared lock.
#[derive(Debug)]
pub struct PartitionCache {
    source: Option<Arc<dyn PartitionSource>>,
    entries: DashMap<String, CatalogEntry>,
    /// Bumped by [`clear`][Self::clear]; plays the role of the per-entry generation for tables
    /// that had no entry yet when they were fetched.
    epoch: AtomicU64,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl PartitionCache {
    /// A cache filled from `source`, expiring entries by the system clock.
    pub fn new(source: Arc<dyn PartitionSource>, config: CacheConfig) -> Self {
        Self::new_with_clock(Some(source), config, Arc::new(SystemClock))
    }

    /// Create a cache without a registered source; every lookup reports no partitions.
    pub fn without_source(config: CacheConfig) -> Self {
        Self::new_with_clock(None, config, Arc::new(SystemClock))
    }

    /// A cache reading time from `clock`.
    ///
    /// Without a `source` every lookup reports no partitions.
    pub fn new_with_clock(
        source: Option<Arc<dyn PartitionSource>>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            entries: DashMap::new(),
            epoch: AtomicU64::new(0),
            config,
            clock,
        }
    }

    /// The configuration the cache was built with.
    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// The child partitions of `table`, from cache if fresh, else from the source.
    ///
    /// Never fails: fetch errors are logged and reported as an empty list.
    pub async fn fetch_partitions(&self, table: &str) -> Arc<[ChildPartition]> {
        let (epoch, generation) = match self.lookup(table) {
            Lookup::Hit(partitions) => {
                debug!(%table, partitions = partitions.len(), "partition cache hit");
                return partitions;
            }
            Lookup::Miss { epoch, generation } => (epoch, generation),
        };

        let Some(source) = &self.source else {
            warn!(%table, "no partition source registered, reporting no partitions");
            return empty();
        };

        match source.list_partitions(table).await {
            Ok(partitions) => {
                let partitions: Arc<[ChildPartition]> = partitions.into();
                debug!(%table, partitions = partitions.len(), "fetched partitions");
                if self.config.enabled {
                    self.store(table, epoch, generation, Arc::clone(&partitions));
                }
                partitions
            }
            Err(error) => {
                warn!(%table, %error, "failed to fetch partitions, reporting none");
                empty()
            }
        }
    }

    /// Names of the child partitions of `table`, in catalog discovery order.
    pub async fn partition_names(&self, table: &str) -> Vec<String> {
        self.fetch_partitions(table)
            .await
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    /// Mark the entry for `table` stale so the next lookup refetches it.
    pub fn invalidate(&self, table: &str) {
        let mut entry = self.entries.entry(table.to_string()).or_default();
        entry.generation += 1;
        entry.cached = None;
        debug!(%table, generation = entry.generation, "invalidated partitions");
    }

    /// Invalidate every entry.
    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        for mut entry in self.entries.iter_mut() {
            entry.generation += 1;
            entry.cached = None;
        }
        debug!("cleared partition cache");
    }

    fn lookup(&self, table: &str) -> Lookup {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let Some(entry) = self.entries.get(table) else {
            return Lookup::Miss {
                epoch,
                generation: 0,
            };
        };
        match &entry.cached {
            Some(cached) if self.config.enabled && !self.is_expired(cached) => {
                Lookup::Hit(Arc::clone(&cached.partitions))
            }
            _ => Lookup::Miss {
                epoch,
                generation: entry.generation,
            },
        }
    }

    fn store(&self, table: &str, epoch: u64, generation: u64, partitions: Arc<[ChildPartition]>) {
        let mut entry = self.entries.entry(table.to_string()).or_default();
        if entry.generation != generation || self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(%table, "partitions were invalidated during fetch, not caching");
            return;
        }
        entry.cached = Some(Cached {
            partitions,
            fetched_at: self.clock.now(),
        });
    }

    fn is_expired(&self, cached: &Cached) -> bool {
        self.config
            .ttl
            .is_some_and(|ttl| self.clock.now().saturating_duration_since(cached.fetched_at) >= ttl)
    }
}

fn empty() -> Arc<[ChildPartition]> {
    Arc::from(Vec::new())
}
