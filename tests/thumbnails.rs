//! Still-frame path: frame cache bounds, bucketing and extraction sharing.

mod common;

use common::{ScriptedBackend, pipeline, wait_until};
use hoverscrub::ThumbnailLookup;
use hoverscrub::entities::MediaSource;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_frame_cache_evicts_lru_at_2001() {
    let backend = Arc::new(ScriptedBackend::new(100.0));
    let p = pipeline(Arc::clone(&backend));
    let src = MediaSource::new("long.mp4");

    for i in 0..2000 {
        let t = i as f64 * 0.01;
        assert!(p.thumbnail(&src, t, 8).wait_timeout(WAIT).is_some());
    }
    assert_eq!(p.stats().frame_entries, 2000);

    // Touch the oldest entry so the second-oldest becomes the victim
    assert!(p.cached_thumbnail_sync(&src, 0.0, 8).is_some());
    assert!(p.thumbnail(&src, 25.0, 8).wait_timeout(WAIT).is_some());

    assert_eq!(p.stats().frame_entries, 2000);
    assert!(p.cached_thumbnail_sync(&src, 0.0, 8).is_some());
    assert!(p.cached_thumbnail_sync(&src, 0.01, 8).is_none());
    assert!(p.cached_thumbnail_sync(&src, 25.0, 8).is_some());
}

#[test]
fn test_times_share_two_decimal_bucket() {
    let backend = Arc::new(ScriptedBackend::new(10.0));
    let p = pipeline(Arc::clone(&backend));
    let src = MediaSource::new("clip.mp4");

    p.thumbnail(&src, 1.0, 64).wait_timeout(WAIT).unwrap();
    assert!(p.cached_thumbnail_sync(&src, 1.004, 64).is_some());
    assert!(p.cached_thumbnail_sync(&src, 1.006, 64).is_none());
    // Width is part of the key
    assert!(p.cached_thumbnail_sync(&src, 1.0, 128).is_none());
    assert_eq!(backend.extract_count(), 1);
}

#[test]
fn test_concurrent_requests_share_one_extraction() {
    let backend = Arc::new(ScriptedBackend::new(10.0).with_extract_delay(Duration::from_millis(100)));
    let p = pipeline(Arc::clone(&backend));
    let src = MediaSource::new("clip.mp4");

    let first = p.thumbnail(&src, 3.0, 64);
    let second = p.thumbnail(&src, 3.0, 64);
    assert!(!first.is_ready());
    assert!(!second.is_ready());

    let a = first.wait_timeout(WAIT).unwrap();
    let b = second.wait_timeout(WAIT).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(backend.extract_count(), 1);
}

#[test]
fn test_sync_lookup_never_waits() {
    let backend = Arc::new(ScriptedBackend::new(10.0).with_extract_delay(Duration::from_millis(200)));
    let p = pipeline(Arc::clone(&backend));
    let src = MediaSource::new("clip.mp4");

    let pending = p.thumbnail(&src, 2.0, 64);
    let started = std::time::Instant::now();
    assert!(p.cached_thumbnail_sync(&src, 2.0, 64).is_none());
    assert!(started.elapsed() < Duration::from_millis(100));

    assert!(pending.wait_timeout(WAIT).is_some());
    assert!(matches!(p.thumbnail(&src, 2.0, 64), ThumbnailLookup::Ready(_)));
}

#[test]
fn test_failed_extraction_is_not_cached() {
    let backend = Arc::new(ScriptedBackend::new(10.0));
    let src = MediaSource::new("corrupt.mp4");
    backend.corrupt_frames(&src);
    let p = pipeline(Arc::clone(&backend));

    assert!(p.thumbnail(&src, 1.0, 64).wait_timeout(WAIT).is_none());
    assert!(p.cached_thumbnail_sync(&src, 1.0, 64).is_none());

    // A later request tries again
    assert!(p.thumbnail(&src, 1.0, 64).wait_timeout(WAIT).is_none());
    assert_eq!(backend.extract_count(), 2);
}

#[test]
fn test_context_reused_across_frames() {
    let backend = Arc::new(ScriptedBackend::new(10.0));
    let p = pipeline(Arc::clone(&backend));
    let src = MediaSource::new("clip.mp4");

    for t in [1.0, 2.0, 3.0] {
        p.thumbnail(&src, t, 64).wait_timeout(WAIT).unwrap();
    }
    assert_eq!(p.stats().decode_contexts, 1);
    assert_eq!(p.thumbnails().contexts().len(), 1);
}

#[test]
fn test_prewarm_fills_evenly_spaced_frames() {
    let backend = Arc::new(ScriptedBackend::new(8.0));
    let p = pipeline(Arc::clone(&backend));
    let src = MediaSource::new("clip.mp4");
    let width = p.config().thumbnail_width;

    p.prewarm(&src, 8.0, 4);
    assert!(wait_until(WAIT, || p.stats().frame_entries == 4));
    for t in [0.0, 2.0, 4.0, 6.0] {
        assert!(p.cached_thumbnail_sync(&src, t, width).is_some(), "missing {}", t);
    }

    // Already cached: a second prewarm extracts nothing
    p.prewarm(&src, 8.0, 4);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(backend.extract_count(), 4);
}
