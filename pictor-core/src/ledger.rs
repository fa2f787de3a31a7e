//! The cache ledger: a single task owning the index.
//!
//! Every index read or mutation travels as a [`LedgerCommand`] over an
//! unbounded channel and is answered on a oneshot, so mutations are
//! strictly serialized without a lock in sight. A commit performs its
//! upsert, the eviction decision, and victim removal as one step; no other
//! command can interleave. Disk work never happens here; replies carry
//! the file names the caller must unlink afterwards (index first, disk
//! best-effort).

use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::CacheTunables;
use crate::error::{CacheError, Result};
use crate::index::{CacheHit, CacheIndex, CacheRecord, SnapshotEntry, SwapOutcome};
use crate::key::{CacheKey, EntryFormat};
use crate::policy;
use crate::scan::SeedEntry;

/// Reply to a committed write.
#[derive(Debug)]
pub(crate) struct CommitReceipt {
    /// File names evicted by this commit, already removed from the index.
    pub(crate) victims: Vec<String>,
    /// Bytes released by those evictions.
    pub(crate) victim_bytes: u64,
    /// Previous file name when the commit renamed the entry's file.
    pub(crate) replaced_file: Option<String>,
    /// Tracked total after the commit and any eviction.
    pub(crate) total_bytes: u64,
}

/// Reply to an erase.
#[derive(Debug)]
pub(crate) struct ErasedEntry {
    pub(crate) file_name: String,
    pub(crate) file_size: u64,
}

/// Reply to a wipe.
#[derive(Debug)]
pub(crate) struct WipeReceipt {
    pub(crate) file_names: Vec<String>,
    pub(crate) freed_bytes: u64,
}

/// Reply to a seed.
#[derive(Debug)]
pub(crate) struct SeedReceipt {
    pub(crate) seeded: usize,
    pub(crate) seeded_bytes: u64,
}

/// Point-in-time view for diagnostics.
#[derive(Debug)]
pub(crate) struct LedgerSnapshot {
    pub(crate) total_bytes: u64,
    pub(crate) entries: Vec<SnapshotEntry>,
}

enum LedgerCommand {
    Lookup {
        key: CacheKey,
        reply: oneshot::Sender<Option<CacheHit>>,
    },
    Probe {
        key: CacheKey,
        reply: oneshot::Sender<Option<String>>,
    },
    Commit {
        key: CacheKey,
        file_name: String,
        file_size: u64,
        format: EntryFormat,
        reply: oneshot::Sender<CommitReceipt>,
    },
    Erase {
        key: CacheKey,
        reply: oneshot::Sender<Option<ErasedEntry>>,
    },
    Swap {
        key: CacheKey,
        old_file_name: String,
        new_file_name: String,
        new_size: u64,
        reply: oneshot::Sender<SwapOutcome>,
    },
    Seed {
        entries: Vec<SeedEntry>,
        reply: oneshot::Sender<SeedReceipt>,
    },
    Wipe {
        reply: oneshot::Sender<WipeReceipt>,
    },
    Snapshot {
        reply: oneshot::Sender<LedgerSnapshot>,
    },
}

/// Clone-cheap handle to the ledger task.
///
/// A handle held by an in-flight transcode keeps the ledger alive until
/// its swap resolves; once every handle is gone the task drains and exits.
#[derive(Debug, Clone)]
pub(crate) struct LedgerHandle {
    tx: mpsc::UnboundedSender<LedgerCommand>,
}

impl LedgerHandle {
    /// Spawns the ledger task. Must be called within a Tokio runtime.
    pub(crate) fn spawn(tunables: Arc<CacheTunables>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let ledger = CacheLedger {
            index: CacheIndex::new(),
            tunables,
        };
        tokio::spawn(ledger.run(rx));
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| CacheError::LedgerClosed)?;
        reply_rx.await.map_err(|_| CacheError::LedgerClosed)
    }

    pub(crate) async fn lookup(&self, key: CacheKey) -> Result<Option<CacheHit>> {
        self.request(|reply| LedgerCommand::Lookup { key, reply }).await
    }

    pub(crate) async fn probe(&self, key: CacheKey) -> Result<Option<String>> {
        self.request(|reply| LedgerCommand::Probe { key, reply }).await
    }

    pub(crate) async fn commit(
        &self,
        key: CacheKey,
        file_name: String,
        file_size: u64,
        format: EntryFormat,
    ) -> Result<CommitReceipt> {
        self.request(|reply| LedgerCommand::Commit {
            key,
            file_name,
            file_size,
            format,
            reply,
        })
        .await
    }

    pub(crate) async fn erase(&self, key: CacheKey) -> Result<Option<ErasedEntry>> {
        self.request(|reply| LedgerCommand::Erase { key, reply }).await
    }

    pub(crate) async fn swap(
        &self,
        key: CacheKey,
        old_file_name: String,
        new_file_name: String,
        new_size: u64,
    ) -> Result<SwapOutcome> {
        self.request(|reply| LedgerCommand::Swap {
            key,
            old_file_name,
            new_file_name,
            new_size,
            reply,
        })
        .await
    }

    pub(crate) async fn seed(&self, entries: Vec<SeedEntry>) -> Result<SeedReceipt> {
        self.request(|reply| LedgerCommand::Seed { entries, reply }).await
    }

    pub(crate) async fn wipe(&self) -> Result<WipeReceipt> {
        self.request(|reply| LedgerCommand::Wipe { reply }).await
    }

    pub(crate) async fn snapshot(&self) -> Result<LedgerSnapshot> {
        self.request(|reply| LedgerCommand::Snapshot { reply }).await
    }
}

struct CacheLedger {
    index: CacheIndex,
    tunables: Arc<CacheTunables>,
}

impl CacheLedger {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LedgerCommand>) {
        debug!("cache ledger started");
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
        debug!("cache ledger stopped");
    }

    fn handle(&mut self, command: LedgerCommand) {
        match command {
            LedgerCommand::Lookup { key, reply } => {
                let hit = self.index.touch(&key, SystemTime::now());
                let _ = reply.send(hit);
            }
            LedgerCommand::Probe { key, reply } => {
                let _ = reply.send(self.index.probe(&key));
            }
            LedgerCommand::Commit {
                key,
                file_name,
                file_size,
                format,
                reply,
            } => {
                let _ = reply.send(self.commit(key, file_name, file_size, format));
            }
            LedgerCommand::Erase { key, reply } => {
                let erased = self.index.remove(&key).map(|record| ErasedEntry {
                    file_name: record.file_name,
                    file_size: record.file_size,
                });
                let _ = reply.send(erased);
            }
            LedgerCommand::Swap {
                key,
                old_file_name,
                new_file_name,
                new_size,
                reply,
            } => {
                let outcome =
                    self.index
                        .swap(&key, &old_file_name, new_file_name, new_size);
                let _ = reply.send(outcome);
            }
            LedgerCommand::Seed { entries, reply } => {
                let records = entries
                    .into_iter()
                    .map(|entry| {
                        let access_count = self.initial_count(entry.format);
                        (
                            entry.key,
                            CacheRecord {
                                file_name: entry.file_name,
                                file_size: entry.file_size,
                                access_time: entry.access_time,
                                access_count,
                                format: entry.format,
                            },
                        )
                    })
                    .collect();
                let (seeded, seeded_bytes) = self.index.seed(records);
                let _ = reply.send(SeedReceipt {
                    seeded,
                    seeded_bytes,
                });
            }
            LedgerCommand::Wipe { reply } => {
                let (file_names, freed_bytes) = self.index.wipe();
                let _ = reply.send(WipeReceipt {
                    file_names,
                    freed_bytes,
                });
            }
            LedgerCommand::Snapshot { reply } => {
                let _ = reply.send(LedgerSnapshot {
                    total_bytes: self.index.total_bytes(),
                    entries: self.index.snapshot(),
                });
            }
        }
    }

    /// Upsert plus the eviction pass, as one serialized step.
    ///
    /// Eviction runs only when the commit grew the total; shrinking
    /// rewrites never trigger it. Victim removal here is the commit point;
    /// the caller unlinks their files afterwards.
    fn commit(
        &mut self,
        key: CacheKey,
        file_name: String,
        file_size: u64,
        format: EntryFormat,
    ) -> CommitReceipt {
        let initial_count = self.initial_count(format);
        let outcome = self.index.upsert(
            key,
            file_name,
            file_size,
            format,
            initial_count,
            SystemTime::now(),
        );

        let mut victims = Vec::new();
        let mut victim_bytes = 0u64;
        let limit = self.tunables.file_limit();
        if outcome.delta > 0 && policy::should_evict(self.index.total_bytes(), limit) {
            let target = policy::sweep_target(
                self.index.total_bytes(),
                limit,
                self.tunables.clear_ratio(),
            );
            let (victim_keys, _) = self.index.collect_tail(target);
            for victim_key in &victim_keys {
                if let Some(record) = self.index.remove(victim_key) {
                    victim_bytes += record.file_size;
                    victims.push(record.file_name);
                }
            }
            debug!(
                evicted = victims.len(),
                freed = victim_bytes,
                total = self.index.total_bytes(),
                limit,
                "evicted least-recently-used entries"
            );
        }

        CommitReceipt {
            victims,
            victim_bytes,
            replaced_file: outcome.replaced_file,
            total_bytes: self.index.total_bytes(),
        }
    }

    fn initial_count(&self, format: EntryFormat) -> u64 {
        if format.is_dense() {
            self.tunables.dense_threshold()
        } else {
            1
        }
    }
}
