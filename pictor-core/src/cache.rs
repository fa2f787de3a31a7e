//! The cache orchestrator.
//!
//! [`ImageFileCache`] is the public face of the crate: an explicitly
//! constructed instance wired to its collaborators (decoder, encoder, flag
//! store, platform gate) at build time. Callers hand it source URLs and
//! bytes; it owns key derivation, the on-disk layout, eviction, and the
//! background transcode lifecycle.
//!
//! None of the public operations returns an error. Caching is advisory:
//! a failed write means the next read misses, a failed delete means a few
//! stray bytes until the next pass. Internal failures are logged and
//! absorbed here, at the outermost layer.

use std::collections::HashSet;
use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{CacheConfig, CacheTunables};
use crate::error::Result;
use crate::index::CacheHit;
use crate::key::{CacheKey, EntryFormat};
use crate::ledger::LedgerHandle;
use crate::paths;
use crate::ports::{FlagStore, ImageDecoder, ImageEncoder, PlatformGate};
use crate::scan;
use crate::transcode::TranscodeJob;

/// Minimum platform API level at which the one-time full clear may run.
pub const CLEAR_ALL_MIN_API: u32 = 11;

/// Flag-store key recording that the one-time clear already ran.
pub const CLEARED_FLAG_KEY: &str = "image_cache_cleared";

/// Cheap point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Tracked bytes across all entries.
    pub total_bytes: u64,
    /// Number of tracked entries.
    pub entry_count: usize,
}

/// Size-bounded on-disk image cache with LRU eviction and background
/// dense-format transcoding.
pub struct ImageFileCache {
    root: RwLock<Option<PathBuf>>,
    tunables: Arc<CacheTunables>,
    ledger: LedgerHandle,
    decoder: Arc<dyn ImageDecoder>,
    encoder: Arc<dyn ImageEncoder>,
    flags: Arc<dyn FlagStore>,
    platform: Arc<dyn PlatformGate>,
    transcode_permits: Arc<Semaphore>,
    transcoding: Arc<std::sync::Mutex<HashSet<CacheKey>>>,
    scanned: AtomicBool,
    pending_transcodes: Arc<AtomicU64>,
}

impl ImageFileCache {
    /// Builds the cache and spawns its ledger task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        config: CacheConfig,
        decoder: Arc<dyn ImageDecoder>,
        encoder: Arc<dyn ImageEncoder>,
        flags: Arc<dyn FlagStore>,
        platform: Arc<dyn PlatformGate>,
    ) -> Self {
        let tunables = Arc::new(CacheTunables::from_config(&config));
        let ledger = LedgerHandle::spawn(Arc::clone(&tunables));
        Self {
            root: RwLock::new(config.root),
            tunables,
            ledger,
            decoder,
            encoder,
            flags,
            platform,
            transcode_permits: Arc::new(Semaphore::new(config.transcode_concurrency.max(1))),
            transcoding: Arc::new(std::sync::Mutex::new(HashSet::new())),
            scanned: AtomicBool::new(false),
            pending_transcodes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sets the cache directory and creates it, best-effort.
    ///
    /// The first root wins, whether it arrived here or via
    /// [`CacheConfig::root`]; later calls are ignored.
    pub async fn init(&self, root: impl Into<PathBuf>) {
        let root = root.into();
        let mut slot = self.root.write().await;
        if let Some(existing) = slot.as_ref() {
            debug!(
                root = %existing.display(),
                ignored = %root.display(),
                "cache root already set"
            );
            return;
        }
        if let Err(err) = tokio::fs::create_dir_all(&root).await {
            warn!(root = %root.display(), error = %err, "failed to create cache root");
        }
        info!(root = %root.display(), "cache root set");
        *slot = Some(root);
    }

    /// Sets the byte budget. Takes effect on the next write.
    pub fn set_cache_file_limit(&self, bytes: u64) {
        self.tunables.set_file_limit(bytes);
        debug!(bytes, "cache file limit set");
    }

    /// Sets the fraction of the budget to free per eviction pass.
    ///
    /// Out-of-range values are normalized: negative or NaN falls back to
    /// the default, anything above 1 clamps to 1.
    pub fn set_clear_cache_file_ratio(&self, ratio: f64) {
        self.tunables.set_clear_ratio(ratio);
        debug!(ratio = self.tunables.clear_ratio(), "cache clear ratio set");
    }

    /// Looks up the cached file for `url`.
    ///
    /// A hit counts as an access: the entry moves to the MRU end and, on
    /// crossing the dense threshold, a background transcode is scheduled.
    /// The returned path is not re-checked against the filesystem.
    pub async fn get_cache_file_path(&self, url: &str) -> Option<PathBuf> {
        let key = CacheKey::derive(url);
        let hit = match self.ledger.lookup(key.clone()).await {
            Ok(hit) => hit?,
            Err(err) => {
                warn!(url, error = %err, "cache lookup failed");
                return None;
            }
        };

        let root = self.resolved_root().await;
        let path = paths::cache_file_path(&root, &hit.file_name);
        if self.wants_transcode(&hit) {
            self.schedule_transcode(key, url, &root, &hit.file_name);
        }
        Some(path)
    }

    /// Stores `data` for `url` under `<sha256(url)><suffix>`.
    ///
    /// Payloads larger than the configured limit are rejected outright. A
    /// write whose file name is already tracked and present on disk is
    /// skipped, so repeated downloads of one source cost one file. The
    /// data is staged to a temp name and renamed into place before the
    /// index learns about it; eviction victims are unlinked after they
    /// have left the index.
    pub async fn write_cache_file(&self, url: &str, data: &[u8], suffix: &str) {
        let limit = self.tunables.file_limit();
        if data.len() as u64 > limit {
            warn!(
                url,
                size = data.len(),
                limit,
                "payload exceeds the cache budget; not cached"
            );
            return;
        }

        let key = CacheKey::derive(url);
        let file_name = paths::file_name_for(&key, suffix);
        let root = self.resolved_root().await;
        let path = paths::cache_file_path(&root, &file_name);

        match self.ledger.probe(key.clone()).await {
            Ok(Some(existing)) if existing == file_name => {
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    debug!(url, file = %file_name, "cache file already present");
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(url, error = %err, "cache probe failed");
                return;
            }
        }

        if let Err(err) = stage_file(&root, &path, &file_name, data).await {
            warn!(url, path = %path.display(), error = %err, "failed to write cache file");
            return;
        }

        let format = EntryFormat::from_suffix(suffix);
        let receipt = match self
            .ledger
            .commit(key, file_name.clone(), data.len() as u64, format)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(url, error = %err, "cache commit failed");
                return;
            }
        };
        debug!(
            url,
            file = %file_name,
            size = data.len(),
            total = receipt.total_bytes,
            "cached file"
        );

        if let Some(replaced) = receipt.replaced_file.as_deref() {
            self.unlink(&root, replaced).await;
        }
        for victim in &receipt.victims {
            self.unlink(&root, victim).await;
        }
    }

    /// Drops the entry for `url` and unlinks its file. No-op on a miss.
    pub async fn erase_cache_file(&self, url: &str) {
        let key = CacheKey::derive(url);
        match self.ledger.erase(key).await {
            Ok(Some(erased)) => {
                debug!(
                    url,
                    file = %erased.file_name,
                    freed = erased.file_size,
                    "erased cache entry"
                );
                let root = self.resolved_root().await;
                self.unlink(&root, &erased.file_name).await;
            }
            Ok(None) => debug!(url, "erase of untracked source"),
            Err(err) => warn!(url, error = %err, "cache erase failed"),
        }
    }

    /// One-time full clear of the cache directory.
    ///
    /// Runs only on platforms at or above [`CLEAR_ALL_MIN_API`] and only
    /// once per installation: a persisted flag marks completion, so a
    /// cleared cache stays cleared across restarts.
    pub async fn clear_all_cache_files(&self) {
        if !self.platform.is_at_least(CLEAR_ALL_MIN_API) {
            debug!("platform below the clear-all threshold");
            return;
        }
        match self.flags.get_string(CLEARED_FLAG_KEY) {
            Ok(Some(value)) if value == "true" => {
                debug!("cache already cleared once");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "failed to read the cleared flag");
                return;
            }
        }

        let receipt = match self.ledger.wipe().await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(error = %err, "cache wipe failed");
                return;
            }
        };
        info!(
            files = receipt.file_names.len(),
            freed = receipt.freed_bytes,
            "cleared the cache directory"
        );
        let root = self.resolved_root().await;
        for file_name in &receipt.file_names {
            self.unlink(&root, file_name).await;
        }

        if let Err(err) = self.flags.set_string(CLEARED_FLAG_KEY, "true") {
            warn!(error = %err, "failed to persist the cleared flag");
        }
    }

    /// One-shot startup scan seeding the index from the cache directory.
    ///
    /// Later calls are no-ops, whether or not the first succeeded. Files
    /// written before the scan completes are never clobbered: live index
    /// entries win over their scanned counterparts.
    pub async fn scan_cache_files(&self) {
        if self.scanned.swap(true, Ordering::SeqCst) {
            debug!("cache scan already ran");
            return;
        }

        let root = self.resolved_root().await;
        let scan_root = root.clone();
        let entries =
            match tokio::task::spawn_blocking(move || scan::scan_directory(&scan_root)).await {
                Ok(Ok(entries)) => entries,
                Ok(Err(err)) => {
                    debug!(root = %root.display(), error = %err, "cache scan failed");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "cache scan panicked");
                    return;
                }
            };
        if entries.is_empty() {
            debug!(root = %root.display(), "cache directory is empty");
            return;
        }

        match self.ledger.seed(entries).await {
            Ok(receipt) => info!(
                seeded = receipt.seeded,
                bytes = receipt.seeded_bytes,
                "seeded cache index from disk"
            ),
            Err(err) => warn!(error = %err, "cache seed failed"),
        }
    }

    /// Renders a human-readable report of every tracked entry, MRU first.
    pub async fn dump_cache_info(&self) -> String {
        let snapshot = match self.ledger.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "cache snapshot failed");
                return "cache ledger unavailable\n".to_string();
            }
        };

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} entries, {} of {} used, clear ratio {:.2}",
            snapshot.entries.len(),
            format_bytes(snapshot.total_bytes),
            format_bytes(self.tunables.file_limit()),
            self.tunables.clear_ratio(),
        );
        for entry in &snapshot.entries {
            let accessed: DateTime<Utc> = entry.access_time.into();
            let _ = writeln!(
                out,
                "  {:>12}  {:>6} hits  {}  {}",
                format_bytes(entry.file_size),
                entry.access_count,
                accessed.format("%Y-%m-%d %H:%M:%S"),
                entry.file_name,
            );
        }
        out
    }

    /// Current totals, straight from the ledger.
    pub async fn stats(&self) -> CacheStats {
        match self.ledger.snapshot().await {
            Ok(snapshot) => CacheStats {
                total_bytes: snapshot.total_bytes,
                entry_count: snapshot.entries.len(),
            },
            Err(err) => {
                warn!(error = %err, "cache snapshot failed");
                CacheStats {
                    total_bytes: 0,
                    entry_count: 0,
                }
            }
        }
    }

    /// Number of transcode jobs scheduled but not yet finished.
    pub fn pending_transcodes(&self) -> u64 {
        self.pending_transcodes.load(Ordering::Relaxed)
    }

    async fn resolved_root(&self) -> PathBuf {
        match self.root.read().await.as_ref() {
            Some(root) => root.clone(),
            None => paths::fallback_cache_root(),
        }
    }

    fn wants_transcode(&self, hit: &CacheHit) -> bool {
        self.tunables.transcode_enabled()
            && !hit.format.is_dense()
            && hit.access_count == self.tunables.dense_threshold()
    }

    fn schedule_transcode(&self, key: CacheKey, url: &str, root: &Path, file_name: &str) {
        if !self.try_begin_transcode(&key) {
            return;
        }

        let dense_file_name = paths::dense_file_name(&key);
        let job = TranscodeJob {
            key: key.clone(),
            source_url: url.to_string(),
            source_path: paths::cache_file_path(root, file_name),
            old_file_name: file_name.to_string(),
            dense_path: paths::cache_file_path(root, &dense_file_name),
            dense_file_name,
            decoder: Arc::clone(&self.decoder),
            encoder: Arc::clone(&self.encoder),
            ledger: self.ledger.clone(),
        };
        debug!(url, file = %file_name, "scheduled dense transcode");

        self.pending_transcodes.fetch_add(1, Ordering::Relaxed);
        let permits = Arc::clone(&self.transcode_permits);
        let transcoding = Arc::clone(&self.transcoding);
        let pending = Arc::clone(&self.pending_transcodes);
        tokio::spawn(async move {
            if let Ok(_permit) = permits.acquire_owned().await {
                job.run().await;
            }
            if let Ok(mut set) = transcoding.lock() {
                set.remove(&key);
            }
            pending.fetch_sub(1, Ordering::Relaxed);
        });
    }

    fn try_begin_transcode(&self, key: &CacheKey) -> bool {
        let Ok(mut set) = self.transcoding.lock() else {
            return false;
        };
        if set.contains(key) {
            return false;
        }
        set.insert(key.clone());
        true
    }

    async fn unlink(&self, root: &Path, file_name: &str) {
        let path = paths::cache_file_path(root, file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                // The index already dropped the entry; the stray file is
                // picked up by a later scan at worst.
                warn!(path = %path.display(), error = %err, "failed to remove cache file");
            }
        }
    }
}

impl fmt::Debug for ImageFileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_flight = self
            .transcoding
            .lock()
            .map(|set| set.len())
            .unwrap_or_default();
        f.debug_struct("ImageFileCache")
            .field("scanned", &self.scanned.load(Ordering::Relaxed))
            .field("transcodes_in_flight", &in_flight)
            .field(
                "pending_transcodes",
                &self.pending_transcodes.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// Writes `data` durably to `<path>` via a unique temp name in `root`.
///
/// The rename is the visibility point: readers and the scanner never see a
/// partial file, and an interrupted write leaves only an inert `.tmp.`
/// leftover.
async fn stage_file(root: &Path, path: &Path, file_name: &str, data: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(root).await?;
    let tmp = root.join(format!("{file_name}.tmp.{}", Uuid::new_v4().simple()));

    if let Err(err) = write_staged(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err);
    }
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

async fn write_staged(tmp: &Path, data: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = tokio::fs::set_permissions(tmp, std::fs::Permissions::from_mode(0o600)).await;
    }
    Ok(())
}

/// Renders a byte count with a binary-unit suffix.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
