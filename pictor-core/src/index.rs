//! The in-memory cache index.
//!
//! A [`LinkedHashMap`] keyed by [`CacheKey`] with the least-recently-used
//! entry at the front, plus an incrementally maintained byte total. The
//! index is exclusively owned by the ledger task; nothing here locks.
//!
//! Invariant: the sum of `file_size` over all records equals `total_bytes`
//! after every method returns.

use std::time::SystemTime;

use linked_hash_map::LinkedHashMap;

use crate::key::{CacheKey, EntryFormat};

/// One tracked cache file.
#[derive(Debug, Clone)]
pub(crate) struct CacheRecord {
    pub(crate) file_name: String,
    pub(crate) file_size: u64,
    pub(crate) access_time: SystemTime,
    pub(crate) access_count: u64,
    pub(crate) format: EntryFormat,
}

/// Outcome of a read hit.
#[derive(Debug, Clone)]
pub(crate) struct CacheHit {
    pub(crate) file_name: String,
    pub(crate) format: EntryFormat,
    /// Post-increment access count; the transcode trigger compares this
    /// against the dense threshold.
    pub(crate) access_count: u64,
}

/// Outcome of an upsert.
#[derive(Debug)]
pub(crate) struct UpsertOutcome {
    /// Size change applied to the running total.
    pub(crate) delta: i64,
    /// Previous file name when the upsert renamed the entry's file; the
    /// caller unlinks it.
    pub(crate) replaced_file: Option<String>,
}

/// Outcome of a transcode swap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwapOutcome {
    /// The record still matched the worker's snapshot and was updated.
    Applied,
    /// The entry was erased or rewritten since the worker started; the
    /// dense output must be discarded.
    Stale,
}

/// Diagnostic copy of one record, for dumps.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotEntry {
    pub(crate) file_name: String,
    pub(crate) file_size: u64,
    pub(crate) access_count: u64,
    pub(crate) access_time: SystemTime,
}

#[derive(Debug, Default)]
pub(crate) struct CacheIndex {
    entries: LinkedHashMap<CacheKey, CacheRecord>,
    total_bytes: u64,
}

impl CacheIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Read hit: promote to the MRU end, stamp the access time, bump the
    /// access count.
    pub(crate) fn touch(&mut self, key: &CacheKey, now: SystemTime) -> Option<CacheHit> {
        let record = self.entries.get_refresh(key)?;
        record.access_time = now;
        record.access_count += 1;
        Some(CacheHit {
            file_name: record.file_name.clone(),
            format: record.format,
            access_count: record.access_count,
        })
    }

    /// Non-promoting lookup of the entry's file name.
    ///
    /// Serves the idempotent-rewrite check; a probe is not a hit and must
    /// not disturb eviction order or counts.
    pub(crate) fn probe(&self, key: &CacheKey) -> Option<String> {
        self.entries.get(key).map(|record| record.file_name.clone())
    }

    /// Insert or update an entry at the MRU end.
    ///
    /// The access count is reset to `initial_count` either way: a rewrite
    /// restarts the entry's life under the creation policy.
    pub(crate) fn upsert(
        &mut self,
        key: CacheKey,
        file_name: String,
        file_size: u64,
        format: EntryFormat,
        initial_count: u64,
        now: SystemTime,
    ) -> UpsertOutcome {
        if let Some(record) = self.entries.get_refresh(&key) {
            let delta = file_size as i64 - record.file_size as i64;
            let replaced_file = if record.file_name != file_name {
                Some(std::mem::replace(&mut record.file_name, file_name))
            } else {
                None
            };
            record.file_size = file_size;
            record.format = format;
            record.access_count = initial_count;
            record.access_time = now;
            self.total_bytes = apply_delta(self.total_bytes, delta);
            UpsertOutcome {
                delta,
                replaced_file,
            }
        } else {
            self.entries.insert(
                key,
                CacheRecord {
                    file_name,
                    file_size,
                    access_time: now,
                    access_count: initial_count,
                    format,
                },
            );
            self.total_bytes = self.total_bytes.saturating_add(file_size);
            UpsertOutcome {
                delta: file_size as i64,
                replaced_file: None,
            }
        }
    }

    /// Erase an entry, returning its record so the caller can unlink the
    /// file.
    pub(crate) fn remove(&mut self, key: &CacheKey) -> Option<CacheRecord> {
        let record = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(record.file_size);
        Some(record)
    }

    /// Walk from the LRU end collecting victims until the accumulated size
    /// reaches `target_bytes` or the index is exhausted. Does not mutate.
    pub(crate) fn collect_tail(&self, target_bytes: u64) -> (Vec<CacheKey>, u64) {
        let mut victims = Vec::new();
        let mut freed = 0u64;
        for (key, record) in self.entries.iter() {
            if freed >= target_bytes {
                break;
            }
            victims.push(key.clone());
            freed += record.file_size;
        }
        (victims, freed)
    }

    /// In-place dense swap.
    ///
    /// Applies only while the record still carries `old_file_name`; a
    /// mismatch means the entry was erased or rewritten after the worker
    /// snapshotted it. Leaves the LRU position and access count untouched.
    pub(crate) fn swap(
        &mut self,
        key: &CacheKey,
        old_file_name: &str,
        new_file_name: String,
        new_size: u64,
    ) -> SwapOutcome {
        match self.entries.get_mut(key) {
            Some(record) if record.file_name == old_file_name => {
                let delta = new_size as i64 - record.file_size as i64;
                record.file_name = new_file_name;
                record.file_size = new_size;
                record.format = EntryFormat::Dense;
                self.total_bytes = apply_delta(self.total_bytes, delta);
                SwapOutcome::Applied
            }
            _ => SwapOutcome::Stale,
        }
    }

    /// Bulk insert for the startup scan.
    ///
    /// `records` must already be ordered oldest access first. Keys already
    /// present are skipped. Anything live in the index was written this
    /// session and is therefore newer than every scanned file, so seeded
    /// entries land on the LRU side of it.
    pub(crate) fn seed(
        &mut self,
        records: Vec<(CacheKey, CacheRecord)>,
    ) -> (usize, u64) {
        let fresh: Vec<_> = records
            .into_iter()
            .filter(|(key, _)| !self.entries.contains_key(key))
            .collect();
        if fresh.is_empty() {
            return (0, 0);
        }

        let seeded = fresh.len();
        let mut seeded_bytes = 0u64;
        if self.entries.is_empty() {
            for (key, record) in fresh {
                seeded_bytes += record.file_size;
                self.entries.insert(key, record);
            }
        } else {
            let live = std::mem::take(&mut self.entries);
            for (key, record) in fresh {
                seeded_bytes += record.file_size;
                self.entries.insert(key, record);
            }
            for (key, record) in live {
                self.entries.insert(key, record);
            }
        }
        self.total_bytes = self.total_bytes.saturating_add(seeded_bytes);
        (seeded, seeded_bytes)
    }

    /// Drain everything, returning the file names and the bytes released.
    pub(crate) fn wipe(&mut self) -> (Vec<String>, u64) {
        let freed = self.total_bytes;
        let file_names = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(_, record)| record.file_name)
            .collect();
        self.total_bytes = 0;
        (file_names, freed)
    }

    /// MRU-first copy of all records.
    pub(crate) fn snapshot(&self) -> Vec<SnapshotEntry> {
        self.entries
            .iter()
            .rev()
            .map(|(_, record)| SnapshotEntry {
                file_name: record.file_name.clone(),
                file_size: record.file_size,
                access_count: record.access_count,
                access_time: record.access_time,
            })
            .collect()
    }
}

fn apply_delta(total: u64, delta: i64) -> u64 {
    if delta >= 0 {
        total.saturating_add(delta as u64)
    } else {
        total.saturating_sub(delta.unsigned_abs())
    }
}
