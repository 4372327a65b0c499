//! Config for the partition list cache.
use std::time::Duration;

use relpart_cache::CacheConfig;

/// CLI config for the partition list cache.
#[derive(Debug, Clone, Copy, clap::Parser)]
pub struct PartitionCacheConfig {
    /// Cache the partition lists read from the database catalog.
    ///
    /// When disabled, every routing decision reads the catalog.
    #[clap(
        long = "partition-cache-enabled",
        env = "RELPART_PARTITION_CACHE_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set,
    )]
    pub enabled: bool,

    /// Maximum age of a cached partition list.
    ///
    /// Without a TTL, lists are kept until they are invalidated.
    #[clap(
        long = "partition-cache-ttl",
        env = "RELPART_PARTITION_CACHE_TTL",
        value_parser = humantime::parse_duration,
    )]
    pub ttl: Option<Duration>,
}

impl From<PartitionCacheConfig> for CacheConfig {
    fn from(config: PartitionCacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            ttl: config.ttl,
        }
    }
}
