//! Cache keys and on-disk entry formats.
//!
//! A key is the lowercase SHA-256 hex of the source locator (typically a
//! URL) and doubles as the file stem inside the cache directory, so the
//! directory listing alone is enough to rebuild the index after a restart.

use std::fmt;

use sha2::{Digest, Sha256};

/// Reserved suffix for entries re-encoded into the dense format.
pub const DENSE_SUFFIX: &str = ".astc";

/// Stable identifier for a cached resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for a source locator.
    pub fn derive(source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wraps a stem recovered from an on-disk file name.
    ///
    /// The scanner cannot re-derive the original locator, so the stem is
    /// taken at face value.
    pub fn from_stem(stem: impl Into<String>) -> Self {
        Self(stem.into())
    }

    /// The file stem this key maps to.
    pub fn stem(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk encoding class of a cache entry.
///
/// Classified once when the entry is created or scanned; stored on the
/// record so the hot paths never re-inspect file-name strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFormat {
    /// Whatever encoding the caller handed us.
    Generic,
    /// The dense re-encoded form; never transcoded again.
    Dense,
}

impl EntryFormat {
    /// Classifies a caller-supplied suffix.
    pub fn from_suffix(suffix: &str) -> Self {
        if suffix == DENSE_SUFFIX {
            Self::Dense
        } else {
            Self::Generic
        }
    }

    /// Classifies a full on-disk file name.
    pub fn from_file_name(file_name: &str) -> Self {
        if file_name.ends_with(DENSE_SUFFIX) {
            Self::Dense
        } else {
            Self::Generic
        }
    }

    /// Whether this entry is already in the dense format.
    pub fn is_dense(self) -> bool {
        matches!(self, Self::Dense)
    }
}
