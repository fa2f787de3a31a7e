//! Collaborator ports.
//!
//! The cache orchestrates around four seams it does not own: image
//! decode/encode, a persisted key-value flag store, and a platform version
//! gate. Codec ports are synchronous; the transcode worker runs them under
//! `spawn_blocking`, so implementations are free to block.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Encoded form a decoder reports for its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// JPEG.
    Jpeg,
    /// PNG.
    Png,
    /// WebP.
    Webp,
    /// GIF (usually multi-frame).
    Gif,
    /// SVG or another vector format; never transcoded.
    Svg,
    /// Anything the decoder could not classify.
    Unknown,
}

impl SourceFormat {
    /// Vector sources cannot be re-encoded into the dense raster format.
    pub fn is_vector(self) -> bool {
        matches!(self, Self::Svg)
    }
}

/// A decoded image handed between the codec ports.
///
/// `pixels` is an opaque buffer in whatever layout the decoder/encoder
/// pair agrees on; the cache never inspects it.
#[derive(Clone)]
pub struct DecodedImage {
    /// Number of frames in the source; only single-frame images are
    /// transcoded.
    pub frame_count: u32,
    /// Encoded form of the source.
    pub format: SourceFormat,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Raw pixel data.
    pub pixels: Vec<u8>,
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("frame_count", &self.frame_count)
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &format_args!("{} bytes", self.pixels.len()))
            .finish()
    }
}

/// Port for decoding a cached file ahead of dense re-encoding.
pub trait ImageDecoder: Send + Sync {
    /// Decodes the file at `path`.
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

/// Port for writing the dense re-encoding of a decoded image.
pub trait ImageEncoder: Send + Sync {
    /// Encodes `image` into the dense format at `out_path`, returning the
    /// bytes written. The implementation owns the file write.
    fn encode(&self, image: &DecodedImage, out_path: &Path) -> Result<u64>;
}

/// Port for the persisted one-shot flags (the "already cleared" marker).
pub trait FlagStore: Send + Sync {
    /// Reads a flag; `Ok(None)` when it was never set.
    fn get_string(&self, key: &str) -> Result<Option<String>>;
    /// Writes a flag durably.
    fn set_string(&self, key: &str, value: &str) -> Result<()>;
}

/// Port gating operations on a minimum platform API level.
pub trait PlatformGate: Send + Sync {
    /// Whether the running platform is at or above `api_level`.
    fn is_at_least(&self, api_level: u32) -> bool;
}

/// [`FlagStore`] backed by a small JSON map file.
///
/// Reads tolerate a missing file; writes rewrite the whole map. Fit for a
/// handful of one-shot markers, nothing more.
#[derive(Debug, Clone)]
pub struct FsFlagStore {
    path: PathBuf,
}

impl FsFlagStore {
    /// Creates a store over `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl FlagStore for FsFlagStore {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut flags = self.load()?;
        flags.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&flags)?)?;
        Ok(())
    }
}

/// [`PlatformGate`] reporting a fixed API level.
#[derive(Debug, Clone, Copy)]
pub struct FixedApiLevel(pub u32);

impl PlatformGate for FixedApiLevel {
    fn is_at_least(&self, api_level: u32) -> bool {
        self.0 >= api_level
    }
}
