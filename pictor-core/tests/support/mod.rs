//! Shared fixtures for cache integration tests.
//!
//! The codec ports are faked in memory: the decoder reads the file back as
//! opaque pixels and reports whatever frame count / source format the test
//! configured, the encoder writes a fixed-size dense file. Call counters
//! let tests assert which side of the pipeline ran.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pictor_core::error::{CacheError, Result};
use pictor_core::ports::{FlagStore, ImageDecoder, ImageEncoder};
use pictor_core::{CacheConfig, CacheKey, DecodedImage, FixedApiLevel, ImageFileCache, SourceFormat};
use tempfile::TempDir;

/// Decoder fake with configurable shape and failure injection.
pub struct FakeDecoder {
    frame_count: u32,
    format: SourceFormat,
    fail: bool,
    calls: AtomicU64,
}

impl FakeDecoder {
    pub fn single_frame() -> Self {
        Self {
            frame_count: 1,
            format: SourceFormat::Png,
            fail: false,
            calls: AtomicU64::new(0),
        }
    }

    pub fn animated(frame_count: u32) -> Self {
        Self {
            frame_count,
            format: SourceFormat::Gif,
            ..Self::single_frame()
        }
    }

    pub fn vector() -> Self {
        Self {
            format: SourceFormat::Svg,
            ..Self::single_frame()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::single_frame()
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageDecoder for FakeDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CacheError::Decode("injected decode failure".to_string()));
        }
        let pixels = std::fs::read(path)?;
        Ok(DecodedImage {
            frame_count: self.frame_count,
            format: self.format,
            width: 4,
            height: 4,
            pixels,
        })
    }
}

/// Encoder fake writing a fixed-size dense file.
pub struct FakeEncoder {
    dense_len: usize,
    fail: bool,
    calls: AtomicU64,
}

impl FakeEncoder {
    pub fn writing(dense_len: usize) -> Self {
        Self {
            dense_len,
            fail: false,
            calls: AtomicU64::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::writing(0)
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageEncoder for FakeEncoder {
    fn encode(&self, _image: &DecodedImage, out_path: &Path) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CacheError::Encode("injected encode failure".to_string()));
        }
        std::fs::write(out_path, vec![0xA5u8; self.dense_len])?;
        Ok(self.dense_len as u64)
    }
}

/// In-memory flag store.
#[derive(Default)]
pub struct MemFlagStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemFlagStore {
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().expect("flag store lock").get(key).cloned()
    }
}

impl FlagStore for MemFlagStore {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .expect("flag store lock")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A cache wired to fakes over a fresh temp directory.
pub struct CacheHarness {
    pub cache: ImageFileCache,
    pub dir: TempDir,
    pub decoder: Arc<FakeDecoder>,
    pub encoder: Arc<FakeEncoder>,
    pub flags: Arc<MemFlagStore>,
}

impl CacheHarness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn on_disk(&self, file_name: &str) -> bool {
        self.root().join(file_name).exists()
    }

    /// Sorted names of the files currently in the cache directory.
    pub fn disk_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.root())
            .expect("read cache dir")
            .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Polls until no transcode job is pending.
    pub async fn wait_for_transcodes(&self) {
        for _ in 0..500 {
            if self.cache.pending_transcodes() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("transcode jobs did not settle");
    }
}

/// Builder over [`CacheConfig`] plus the fakes.
pub struct HarnessBuilder {
    config: CacheConfig,
    decoder: FakeDecoder,
    encoder: FakeEncoder,
    api_level: u32,
    explicit_root: bool,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            // A small threshold keeps transcode tests short.
            config: CacheConfig {
                dense_threshold: 3,
                ..CacheConfig::default()
            },
            decoder: FakeDecoder::single_frame(),
            encoder: FakeEncoder::writing(16),
            api_level: 12,
            explicit_root: true,
        }
    }
}

impl HarnessBuilder {
    pub fn limit(mut self, bytes: u64) -> Self {
        self.config.file_limit = bytes;
        self
    }

    pub fn ratio(mut self, ratio: f64) -> Self {
        self.config.clear_ratio = ratio;
        self
    }

    pub fn dense_threshold(mut self, count: u64) -> Self {
        self.config.dense_threshold = count;
        self
    }

    pub fn transcode_enabled(mut self, enabled: bool) -> Self {
        self.config.transcode_enabled = enabled;
        self
    }

    pub fn decoder(mut self, decoder: FakeDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn encoder(mut self, encoder: FakeEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn api_level(mut self, level: u32) -> Self {
        self.api_level = level;
        self
    }

    /// Leave `CacheConfig::root` unset; the test calls `init` itself.
    pub fn without_root(mut self) -> Self {
        self.explicit_root = false;
        self
    }

    pub fn build(self) -> CacheHarness {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = self.config;
        if self.explicit_root {
            config.root = Some(dir.path().to_path_buf());
        }
        let decoder = Arc::new(self.decoder);
        let encoder = Arc::new(self.encoder);
        let flags = Arc::new(MemFlagStore::default());
        let cache = ImageFileCache::new(
            config,
            Arc::clone(&decoder) as Arc<dyn ImageDecoder>,
            Arc::clone(&encoder) as Arc<dyn ImageEncoder>,
            Arc::clone(&flags) as Arc<dyn FlagStore>,
            Arc::new(FixedApiLevel(self.api_level)),
        );
        CacheHarness {
            cache,
            dir,
            decoder,
            encoder,
            flags,
        }
    }
}

/// File stem (and bare generic file name) for a source URL.
pub fn stem_for(url: &str) -> String {
    CacheKey::derive(url).stem().to_string()
}

/// Dense file name for a source URL.
pub fn dense_name_for(url: &str) -> String {
    format!("{}{}", stem_for(url), pictor_core::DENSE_SUFFIX)
}

/// Creates `root/<name>` with the given bytes and a backdated access and
/// modification time, for scanner fixtures.
pub fn write_aged_file(root: &Path, name: &str, bytes: &[u8], age_secs: u64) {
    use std::fs::{File, FileTimes};
    use std::io::Write as _;
    use std::time::SystemTime;

    let mut file = File::create(root.join(name)).expect("create fixture");
    file.write_all(bytes).expect("write fixture");
    let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(age_secs);
    let times = FileTimes::new().set_accessed(stamp).set_modified(stamp);
    file.set_times(times).expect("set fixture times");
}
