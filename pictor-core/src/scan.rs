//! Startup directory scan.
//!
//! The cache directory itself is the durable state: one flat directory of
//! `<stem>` / `<stem>.astc` files, no manifest. The scan rebuilds the
//! in-memory index from a single enumeration. True recency order is not
//! recoverable, so files are ordered by their filesystem access time and
//! later touches sort the rest out.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use tracing::debug;

use crate::error::Result;
use crate::key::{CacheKey, EntryFormat};

/// One file discovered by the startup scan.
#[derive(Debug, Clone)]
pub struct SeedEntry {
    /// Key recovered from the file stem.
    pub key: CacheKey,
    /// Full file name, including any suffix.
    pub file_name: String,
    /// Size in bytes.
    pub file_size: u64,
    /// Filesystem access time, falling back to the modification time.
    pub access_time: SystemTime,
    /// Format classified from the suffix.
    pub format: EntryFormat,
}

/// Enumerates cache files under `root`, oldest access first.
///
/// Skips dotfiles, subdirectories, and `.tmp.` staging leftovers from
/// interrupted writes. Blocking; the orchestrator runs it under
/// `spawn_blocking`.
pub fn scan_directory(root: &Path) -> Result<Vec<SeedEntry>> {
    let mut entries = Vec::new();
    for dirent in fs::read_dir(root)? {
        let dirent = dirent?;
        let name = match dirent.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                debug!(name = ?raw, "skipping non-utf8 cache file name");
                continue;
            }
        };
        if name.starts_with('.') || name.contains(".tmp.") {
            continue;
        }

        let metadata = match dirent.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(name = %name, error = %err, "skipping unreadable cache file");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let access_time = metadata
            .accessed()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let stem = name.split('.').next().unwrap_or(name.as_str()).to_string();
        entries.push(SeedEntry {
            key: CacheKey::from_stem(stem),
            format: EntryFormat::from_file_name(&name),
            file_size: metadata.len(),
            access_time,
            file_name: name,
        });
    }

    entries.sort_by_key(|entry| entry.access_time);
    Ok(entries)
}
