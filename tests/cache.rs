//! Content Cache Integration Tests
//!
//! Freshness semantics, namespaces and side-car metadata across backends.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, TimeZone, Utc};
use filetime::FileTime;
use songbook::cache::{sidecar_key, ContentCache, LocalCache, Metadata, MemoryCache, RetryPolicy};
use tempfile::TempDir;

async fn local_cache() -> (LocalCache, TempDir) {
    let temp = TempDir::new().unwrap();
    let cache = LocalCache::open(temp.path().join("cache"), RetryPolicy::none())
        .await
        .unwrap();
    (cache, temp)
}

fn backdate(path: &std::path::Path, seconds_ago: u64) -> DateTime<Utc> {
    let then = SystemTime::now() - Duration::from_secs(seconds_ago);
    filetime::set_file_mtime(path, FileTime::from_system_time(then)).unwrap();
    DateTime::<Utc>::from(then)
}

#[tokio::test]
async fn test_local_freshness_invariant() {
    let (cache, _temp) = local_cache().await;
    cache.put("merged-pdf/latest.pdf", b"master", None).await.unwrap();

    let path = cache.path_for("merged-pdf/latest.pdf").unwrap();
    let written = backdate(&path, 3600);

    // Threshold at or before the write: fresh
    let hit = cache
        .get("merged-pdf/latest.pdf", Some(written - chrono::Duration::minutes(5)))
        .await
        .unwrap();
    assert_eq!(hit, Some(b"master".to_vec()));
    assert!(cache
        .get("merged-pdf/latest.pdf", Some(written))
        .await
        .unwrap()
        .is_some());

    // Threshold after the write: stale, reported as absent
    let stale = cache
        .get("merged-pdf/latest.pdf", Some(written + chrono::Duration::seconds(1)))
        .await
        .unwrap();
    assert_eq!(stale, None);

    assert_eq!(
        cache.modified_at("merged-pdf/latest.pdf").await.unwrap().map(|t| t.timestamp()),
        Some(written.timestamp())
    );
}

#[tokio::test]
async fn test_memory_freshness_uses_clock() {
    let now = Arc::new(Mutex::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
    let clock_source = Arc::clone(&now);
    let cache = MemoryCache::with_clock(Arc::new(move || *clock_source.lock().unwrap()));

    cache.put("song-sheets/a.pdf", b"a", None).await.unwrap();
    let t0 = *now.lock().unwrap();

    assert!(cache.get("song-sheets/a.pdf", Some(t0)).await.unwrap().is_some());
    assert!(cache
        .get("song-sheets/a.pdf", Some(t0 + chrono::Duration::milliseconds(1)))
        .await
        .unwrap()
        .is_none());

    // Overwrite later: fresh again for the later threshold
    *now.lock().unwrap() = t0 + chrono::Duration::hours(1);
    cache.put("song-sheets/a.pdf", b"a2", None).await.unwrap();
    assert_eq!(
        cache
            .get("song-sheets/a.pdf", Some(t0 + chrono::Duration::minutes(30)))
            .await
            .unwrap(),
        Some(b"a2".to_vec())
    );
}

#[tokio::test]
async fn test_missing_key_is_not_an_error() {
    let (local, _temp) = local_cache().await;
    let memory = MemoryCache::new();

    let caches: [&dyn ContentCache; 2] = [&local, &memory];
    for cache in caches {
        assert_eq!(cache.get("song-sheets/nope.pdf", None).await.unwrap(), None);
        assert_eq!(cache.modified_at("song-sheets/nope.pdf").await.unwrap(), None);
        assert_eq!(cache.metadata("song-sheets/nope.pdf").await.unwrap(), None);
    }
}

#[tokio::test]
async fn test_invalid_keys_are_rejected() {
    let (cache, _temp) = local_cache().await;
    assert!(cache.put("../escape.pdf", b"x", None).await.is_err());
    assert!(cache.get("/absolute", None).await.is_err());
}

#[tokio::test]
async fn test_sidecar_metadata_for_local_backend() {
    let (cache, _temp) = local_cache().await;
    let mut metadata = Metadata::new();
    metadata.insert("gdrive-file-name".to_string(), "Wonderwall.pdf".to_string());

    // Native metadata is silently ignored
    cache.put("song-sheets/w.pdf", b"w", Some(&metadata)).await.unwrap();
    assert!(!cache.supports_native_metadata());
    assert_eq!(cache.metadata("song-sheets/w.pdf").await.unwrap(), None);

    let locator = cache.put_metadata("song-sheets/w.pdf", &metadata).await.unwrap();
    assert!(locator.ends_with("w.pdf.metadata.json"));
    assert_eq!(cache.metadata("song-sheets/w.pdf").await.unwrap(), Some(metadata));

    // Listing hides side-car records
    assert_eq!(cache.list("song-sheets/").await.unwrap(), vec!["song-sheets/w.pdf"]);
    assert!(cache
        .get(&sidecar_key("song-sheets/w.pdf"), None)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_native_metadata_for_memory_backend() {
    let cache = MemoryCache::new();
    let mut metadata = Metadata::new();
    metadata.insert("gdrive-file-name".to_string(), "Yellow.pdf".to_string());

    cache.put("song-sheets/y.pdf", b"y", Some(&metadata)).await.unwrap();
    assert!(cache.supports_native_metadata());
    assert_eq!(cache.metadata("song-sheets/y.pdf").await.unwrap(), Some(metadata));
}

#[tokio::test]
async fn test_list_is_sorted_and_scoped() {
    let (cache, _temp) = local_cache().await;
    for key in ["song-sheets/b.pdf", "song-sheets/a.pdf", "song-sheets/sub/c.pdf", "merged-pdf/latest.pdf"] {
        cache.put(key, b"x", None).await.unwrap();
    }

    assert_eq!(
        cache.list("song-sheets/").await.unwrap(),
        vec!["song-sheets/a.pdf", "song-sheets/b.pdf", "song-sheets/sub/c.pdf"]
    );
    assert_eq!(cache.list("").await.unwrap().len(), 4);
}
