//! Write/read round trips through the public cache surface.

mod support;

use support::{CacheHarness, stem_for};

#[tokio::test]
async fn write_then_get_returns_the_cached_path() {
    let h = CacheHarness::builder().build();
    let url = "https://img.example/banner.png";

    h.cache.write_cache_file(url, b"payload", "").await;

    let path = h.cache.get_cache_file_path(url).await.expect("hit");
    assert_eq!(path, h.root().join(stem_for(url)));
    assert_eq!(std::fs::read(&path).expect("read back"), b"payload");

    let stats = h.cache.stats().await;
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.total_bytes, 7);
}

#[tokio::test]
async fn unknown_url_misses() {
    let h = CacheHarness::builder().build();
    assert!(
        h.cache
            .get_cache_file_path("https://img.example/never-written")
            .await
            .is_none()
    );
}

#[tokio::test]
async fn suffixed_write_keeps_the_suffix() {
    let h = CacheHarness::builder().build();
    let url = "https://img.example/photo";

    h.cache.write_cache_file(url, b"jpeg bytes", ".jpg").await;

    let expected = format!("{}.jpg", stem_for(url));
    let path = h.cache.get_cache_file_path(url).await.expect("hit");
    assert_eq!(path, h.root().join(&expected));
    assert!(h.on_disk(&expected));
}

#[tokio::test]
async fn rewriting_the_same_source_is_idempotent() {
    let h = CacheHarness::builder().build();
    let url = "https://img.example/stable";

    h.cache.write_cache_file(url, b"payload", "").await;
    h.cache.write_cache_file(url, b"payload", "").await;

    let stats = h.cache.stats().await;
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.total_bytes, 7);
    assert_eq!(h.disk_entries().len(), 1);
}

#[tokio::test]
async fn rewrite_with_a_new_suffix_replaces_the_old_file() {
    let h = CacheHarness::builder().build();
    let url = "https://img.example/reformatted";

    h.cache.write_cache_file(url, b"one", "").await;
    h.cache.write_cache_file(url, b"other bytes", ".jpg").await;

    assert!(!h.on_disk(&stem_for(url)));
    assert!(h.on_disk(&format!("{}.jpg", stem_for(url))));

    let stats = h.cache.stats().await;
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.total_bytes, 11);
}

#[tokio::test]
async fn oversized_payload_is_rejected() {
    let h = CacheHarness::builder().limit(10).build();
    let url = "https://img.example/huge";

    h.cache.write_cache_file(url, &[0u8; 11], "").await;

    assert!(h.cache.get_cache_file_path(url).await.is_none());
    assert_eq!(h.cache.stats().await.entry_count, 0);
    assert!(h.disk_entries().is_empty());
}

#[tokio::test]
async fn erase_removes_the_entry_and_its_file() {
    let h = CacheHarness::builder().build();
    let url = "https://img.example/short-lived";

    h.cache.write_cache_file(url, b"payload", "").await;
    h.cache.erase_cache_file(url).await;

    assert!(h.cache.get_cache_file_path(url).await.is_none());
    assert!(h.disk_entries().is_empty());
    assert_eq!(h.cache.stats().await.total_bytes, 0);

    // Erasing something untracked is a quiet no-op.
    h.cache.erase_cache_file("https://img.example/other").await;
}

#[tokio::test]
async fn init_sets_the_root_once() {
    let h = CacheHarness::builder().without_root().build();
    let url = "https://img.example/rooted";
    let first = h.dir.path().join("primary");
    let second = h.dir.path().join("secondary");

    h.cache.init(&first).await;
    h.cache.init(&second).await;
    h.cache.write_cache_file(url, b"payload", "").await;

    assert!(first.join(stem_for(url)).exists());
    assert!(!second.exists());
}

#[tokio::test]
async fn dump_reports_totals_and_entries_mru_first() {
    let h = CacheHarness::builder().build();
    let url_a = "https://img.example/a";
    let url_b = "https://img.example/b";

    h.cache.write_cache_file(url_a, b"aaaa", "").await;
    h.cache.write_cache_file(url_b, b"bb", "").await;
    h.cache.get_cache_file_path(url_a).await.expect("hit");

    let dump = h.cache.dump_cache_info().await;
    let mut lines = dump.lines();
    let header = lines.next().expect("header line");
    assert!(header.starts_with("2 entries"), "header was {header:?}");

    let first = lines.next().expect("first entry");
    let second = lines.next().expect("second entry");
    assert!(first.contains(&stem_for(url_a)), "mru first, got {first:?}");
    assert!(second.contains(&stem_for(url_b)));
    assert!(first.contains("2 hits"));
}
