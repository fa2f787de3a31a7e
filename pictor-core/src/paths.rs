//! Canonical path construction for cache files.
//!
//! Pure string/path assembly, no I/O and no failure modes. Platform
//! delimiter handling is delegated to [`PathBuf::join`].

use std::path::{Path, PathBuf};

use crate::key::{CacheKey, DENSE_SUFFIX};

/// On-disk file name for a key with a caller-supplied suffix.
///
/// An empty suffix produces the bare stem.
pub fn file_name_for(key: &CacheKey, suffix: &str) -> String {
    format!("{}{}", key.stem(), suffix)
}

/// On-disk file name for the dense re-encoding of a key.
pub fn dense_file_name(key: &CacheKey) -> String {
    format!("{}{}", key.stem(), DENSE_SUFFIX)
}

/// Full path of a cache file under the configured root.
pub fn cache_file_path(root: &Path, file_name: &str) -> PathBuf {
    root.join(file_name)
}

/// Root used when no cache directory has been configured.
///
/// Keys are hashed, so spilling into the shared temp directory leaks no
/// source locators.
pub fn fallback_cache_root() -> PathBuf {
    std::env::temp_dir().join("pictor")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_concatenate_stem_and_suffix() {
        let key = CacheKey::from_stem("deadbeef");
        assert_eq!(file_name_for(&key, ""), "deadbeef");
        assert_eq!(file_name_for(&key, ".jpg"), "deadbeef.jpg");
        assert_eq!(dense_file_name(&key), "deadbeef.astc");
    }

    #[test]
    fn paths_join_under_root() {
        let root = Path::new("/var/cache/images");
        let path = cache_file_path(root, "deadbeef.astc");
        assert_eq!(path, Path::new("/var/cache/images/deadbeef.astc"));
    }

    #[test]
    fn fallback_lives_under_temp() {
        let fallback = fallback_cache_root();
        assert!(fallback.starts_with(std::env::temp_dir()));
        assert!(fallback.ends_with("pictor"));
    }
}
