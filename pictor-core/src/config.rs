//! Cache configuration and runtime-adjustable tunables.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::policy;

/// Default byte budget for the cache directory (100 MiB).
pub const DEFAULT_FILE_LIMIT: u64 = 100 * 1024 * 1024;

/// Default access count at which an entry is re-encoded to the dense format.
pub const DEFAULT_DENSE_THRESHOLD: u64 = 50;

/// Default cap on concurrently running transcode workers.
pub const DEFAULT_TRANSCODE_CONCURRENCY: usize = 2;

/// Construction-time cache settings.
///
/// `file_limit` and `clear_ratio` can be adjusted later through the
/// orchestrator setters; the rest is fixed for the cache's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory. When `None`, the root is set later via
    /// [`ImageFileCache::init`](crate::cache::ImageFileCache::init) or
    /// falls back to a temp-dir subdirectory.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Byte budget; writes above it are rejected outright and eviction
    /// keeps the total at or below it.
    #[serde(default = "default_file_limit")]
    pub file_limit: u64,

    /// Fraction of the budget freed beyond the overage per eviction pass.
    /// Normalized at construction (see [`policy::normalize_ratio`]).
    #[serde(default = "default_clear_ratio")]
    pub clear_ratio: f64,

    /// Access count at which a generic entry is scheduled for dense
    /// re-encoding.
    #[serde(default = "default_dense_threshold")]
    pub dense_threshold: u64,

    /// Whether background dense re-encoding runs at all.
    #[serde(default = "default_transcode_enabled")]
    pub transcode_enabled: bool,

    /// Cap on concurrently running transcode workers.
    #[serde(default = "default_transcode_concurrency")]
    pub transcode_concurrency: usize,
}

fn default_file_limit() -> u64 {
    DEFAULT_FILE_LIMIT
}

fn default_clear_ratio() -> f64 {
    policy::DEFAULT_CLEAR_RATIO
}

fn default_dense_threshold() -> u64 {
    DEFAULT_DENSE_THRESHOLD
}

fn default_transcode_enabled() -> bool {
    true
}

fn default_transcode_concurrency() -> usize {
    DEFAULT_TRANSCODE_CONCURRENCY
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            file_limit: default_file_limit(),
            clear_ratio: default_clear_ratio(),
            dense_threshold: default_dense_threshold(),
            transcode_enabled: default_transcode_enabled(),
            transcode_concurrency: default_transcode_concurrency(),
        }
    }
}

/// Tunables shared between the orchestrator and the ledger task.
///
/// Limit and ratio are plain atomics so setter calls take effect for the
/// very next eviction decision without a ledger round trip.
#[derive(Debug)]
pub(crate) struct CacheTunables {
    file_limit: AtomicU64,
    clear_ratio_bits: AtomicU64,
    transcode_enabled: AtomicBool,
    dense_threshold: u64,
}

impl CacheTunables {
    pub(crate) fn from_config(config: &CacheConfig) -> Self {
        Self {
            file_limit: AtomicU64::new(config.file_limit),
            clear_ratio_bits: AtomicU64::new(
                policy::normalize_ratio(config.clear_ratio).to_bits(),
            ),
            transcode_enabled: AtomicBool::new(config.transcode_enabled),
            dense_threshold: config.dense_threshold,
        }
    }

    pub(crate) fn file_limit(&self) -> u64 {
        self.file_limit.load(Ordering::Relaxed)
    }

    pub(crate) fn set_file_limit(&self, bytes: u64) {
        self.file_limit.store(bytes, Ordering::Relaxed);
    }

    pub(crate) fn clear_ratio(&self) -> f64 {
        f64::from_bits(self.clear_ratio_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_clear_ratio(&self, ratio: f64) {
        self.clear_ratio_bits
            .store(policy::normalize_ratio(ratio).to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn transcode_enabled(&self) -> bool {
        self.transcode_enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn dense_threshold(&self) -> u64 {
        self.dense_threshold
    }
}
