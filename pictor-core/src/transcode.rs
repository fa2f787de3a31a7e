//! Background transcode of hot cache entries into the dense format.
//!
//! A job decodes the stored source file, re-encodes it, and swaps the
//! index record over to the dense file. Every failure aborts the job and
//! leaves the original entry untouched; transcoding is an optimization,
//! never a correctness requirement, so nothing here surfaces errors to
//! callers.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::spawn_blocking;
use tracing::debug;

use crate::index::SwapOutcome;
use crate::key::CacheKey;
use crate::ledger::LedgerHandle;
use crate::ports::{ImageDecoder, ImageEncoder};

/// A single transcode attempt for one cache entry.
pub(crate) struct TranscodeJob {
    pub(crate) key: CacheKey,
    pub(crate) source_url: String,
    pub(crate) source_path: PathBuf,
    pub(crate) old_file_name: String,
    pub(crate) dense_path: PathBuf,
    pub(crate) dense_file_name: String,
    pub(crate) decoder: Arc<dyn ImageDecoder>,
    pub(crate) encoder: Arc<dyn ImageEncoder>,
    pub(crate) ledger: LedgerHandle,
}

impl TranscodeJob {
    /// Runs the job to completion. Infallible from the caller's view.
    pub(crate) async fn run(self) {
        let decoder = Arc::clone(&self.decoder);
        let source = self.source_path.clone();
        let decoded = match spawn_blocking(move || decoder.decode(&source)).await {
            Ok(Ok(decoded)) => decoded,
            Ok(Err(err)) => {
                debug!(url = %self.source_url, error = %err, "transcode decode failed");
                return;
            }
            Err(err) => {
                debug!(url = %self.source_url, error = %err, "transcode decode panicked");
                return;
            }
        };

        // Animated and vector sources keep their original bytes.
        if decoded.frame_count != 1 {
            debug!(
                url = %self.source_url,
                frames = decoded.frame_count,
                "skipping transcode of multi-frame image"
            );
            return;
        }
        if decoded.format.is_vector() {
            debug!(url = %self.source_url, "skipping transcode of vector image");
            return;
        }

        let encoder = Arc::clone(&self.encoder);
        let dense_path = self.dense_path.clone();
        let dense_size = match spawn_blocking(move || encoder.encode(&decoded, &dense_path)).await {
            Ok(Ok(size)) => size,
            Ok(Err(err)) => {
                debug!(url = %self.source_url, error = %err, "transcode encode failed");
                self.discard_dense().await;
                return;
            }
            Err(err) => {
                debug!(url = %self.source_url, error = %err, "transcode encode panicked");
                self.discard_dense().await;
                return;
            }
        };

        match self
            .ledger
            .swap(
                self.key.clone(),
                self.old_file_name.clone(),
                self.dense_file_name.clone(),
                dense_size,
            )
            .await
        {
            Ok(SwapOutcome::Applied) => {
                debug!(
                    url = %self.source_url,
                    dense = %self.dense_file_name,
                    bytes = dense_size,
                    "transcoded cache entry"
                );
                if let Err(err) = tokio::fs::remove_file(&self.source_path).await {
                    debug!(
                        path = %self.source_path.display(),
                        error = %err,
                        "failed to remove transcoded source file"
                    );
                }
            }
            Ok(SwapOutcome::Stale) => {
                // The entry was rewritten or erased mid-flight; the fresh
                // bytes win and the dense file is discarded.
                debug!(url = %self.source_url, "cache entry changed during transcode");
                self.discard_dense().await;
            }
            Err(err) => {
                debug!(url = %self.source_url, error = %err, "transcode swap failed");
                self.discard_dense().await;
            }
        }
    }

    async fn discard_dense(&self) {
        match tokio::fs::remove_file(&self.dense_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                debug!(
                    path = %self.dense_path.display(),
                    error = %err,
                    "failed to remove abandoned dense file"
                );
            }
        }
    }
}

impl fmt::Debug for TranscodeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscodeJob")
            .field("key", &self.key)
            .field("source_url", &self.source_url)
            .field("old_file_name", &self.old_file_name)
            .field("dense_file_name", &self.dense_file_name)
            .finish_non_exhaustive()
    }
}
