//! # Pictor Core
//!
//! Size-bounded on-disk image cache with least-recently-used eviction and
//! background transcoding of hot entries into a dense GPU-ready format.
//!
//! ## Overview
//!
//! `pictor-core` caches downloaded images as flat files named by the
//! SHA-256 of their source URL:
//!
//! - **Keyed by source**: one URL, one file; rewrites are idempotent
//! - **Size-bounded**: a byte budget with LRU eviction past the limit,
//!   freeing a configurable fraction of the budget per pass
//! - **Self-describing directory**: the directory itself is the durable
//!   state; a one-shot startup scan rebuilds the index, no manifest
//! - **Background transcoding**: entries read often enough are re-encoded
//!   into a dense format off the request path, swapped in atomically
//! - **Advisory by contract**: no public operation returns an error;
//!   failures degrade to cache misses and are reported through `tracing`
//!
//! Image decode/encode, the persisted flag store, and the platform version
//! gate are injected through the [`ports`] traits; the crate ships no
//! codec.
//!
//! ## Architecture
//!
//! - [`cache`]: the [`ImageFileCache`] orchestrator
//! - [`key`]: key derivation and entry formats
//! - [`policy`]: eviction arithmetic
//! - [`paths`]: on-disk naming
//! - [`scan`]: the startup directory scan
//! - [`ports`]: collaborator traits plus the provided [`FsFlagStore`] and
//!   [`FixedApiLevel`] implementations
//! - [`config`]: construction-time settings
//!
//! Index state lives in a single spawned task; every mutation travels
//! through its queue, so ordering questions have one answer.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pictor_core::{CacheConfig, FixedApiLevel, FsFlagStore, ImageFileCache};
//! use pictor_core::ports::{ImageDecoder, ImageEncoder};
//!
//! async fn warm_cache(decoder: Arc<dyn ImageDecoder>, encoder: Arc<dyn ImageEncoder>) {
//!     let config = CacheConfig {
//!         root: Some("/var/cache/pictor".into()),
//!         ..CacheConfig::default()
//!     };
//!     let flags = Arc::new(FsFlagStore::new("/var/cache/pictor/.flags.json"));
//!     let cache = ImageFileCache::new(
//!         config,
//!         decoder,
//!         encoder,
//!         flags,
//!         Arc::new(FixedApiLevel(12)),
//!     );
//!
//!     cache.scan_cache_files().await;
//!     cache
//!         .write_cache_file("https://img.example/logo.png", b"bytes", ".png")
//!         .await;
//!     if let Some(path) = cache.get_cache_file_path("https://img.example/logo.png").await {
//!         println!("serving {}", path.display());
//!     }
//! }
//! ```

/// The cache orchestrator and its public operations.
pub mod cache;
/// Construction-time configuration.
pub mod config;
/// Error types and the crate result alias.
pub mod error;
mod index;
/// Cache key derivation and entry formats.
pub mod key;
mod ledger;
/// Canonical on-disk naming.
pub mod paths;
/// Eviction policy arithmetic.
pub mod policy;
/// Collaborator ports and the provided implementations.
pub mod ports;
/// Startup directory scan.
pub mod scan;
mod transcode;

pub use cache::{CLEAR_ALL_MIN_API, CLEARED_FLAG_KEY, CacheStats, ImageFileCache, format_bytes};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use key::{CacheKey, DENSE_SUFFIX, EntryFormat};
pub use ports::{
    DecodedImage, FixedApiLevel, FlagStore, FsFlagStore, ImageDecoder, ImageEncoder, PlatformGate,
    SourceFormat,
};
