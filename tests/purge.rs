//! Purging: per-source forget and global clear, including in-flight work.

mod common;

use common::{RecordingVoice, ScriptedBackend, pipeline, pipeline_with, test_config, wait_until};
use hoverscrub::ScrubPipeline;
use hoverscrub::entities::MediaSource;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

/// Give `src` a handle, a cached still, a context and a decoded track.
fn populate(p: &ScrubPipeline, src: &MediaSource) {
    p.acquire_handle(src).unwrap();
    p.thumbnail(src, 1.0, 64).wait_timeout(WAIT).unwrap();
    p.prepare_audio(src);
    assert!(wait_until(WAIT, || p.audio().contains(src)));
}

#[test]
fn test_forget_source_removes_everything_for_that_source() {
    let backend = Arc::new(ScriptedBackend::new(2.0));
    let voice = Arc::new(RecordingVoice::default());
    let p = pipeline_with(Arc::clone(&backend), voice.clone(), test_config());
    let a = MediaSource::new("a.mp4");
    let b = MediaSource::new("b.mp4");
    populate(&p, &a);
    populate(&p, &b);
    p.scrub_audio(&a, 0.5);
    let stops = voice.stops();

    p.forget_source(&a);

    assert!(!p.handles().contains(&a));
    assert!(backend.handle(&a).is_released());
    assert!(p.seek_status(&a).is_none());
    assert!(!p.thumbnails().cache().has_source(&a));
    assert!(!p.thumbnails().contexts().contains(&a));
    assert!(!p.audio().contains(&a));
    assert_eq!(voice.stops(), stops + 1);

    // Other sources untouched
    assert!(p.handles().contains(&b));
    assert!(p.cached_thumbnail_sync(&b, 1.0, 64).is_some());
    assert!(p.audio().contains(&b));

    // Forgetting twice is harmless
    p.forget_source(&a);
}

#[test]
fn test_clear_all_empties_pipeline() {
    let backend = Arc::new(ScriptedBackend::new(2.0));
    let p = pipeline(Arc::clone(&backend));
    let sources: Vec<MediaSource> = (0..3).map(|i| MediaSource::new(format!("{}.mp4", i))).collect();
    for s in &sources {
        populate(&p, s);
    }

    p.clear_all();
    let stats = p.stats();
    assert_eq!(stats.live_handles, 0);
    assert_eq!(stats.tracked_seeks, 0);
    assert_eq!(stats.frame_entries, 0);
    assert_eq!(stats.frame_bytes, 0);
    assert_eq!(stats.decode_contexts, 0);
    assert_eq!(stats.audio_buffers, 0);
    for s in &sources {
        assert!(backend.handle(s).is_released());
    }

    // Pipeline keeps working afterwards
    assert!(p.thumbnail(&sources[0], 1.0, 64).wait_timeout(WAIT).is_some());
}

#[test]
fn test_inflight_audio_discarded_after_clear() {
    let backend = Arc::new(ScriptedBackend::new(2.0).with_audio_delay(Duration::from_millis(100)));
    let p = pipeline(Arc::clone(&backend));
    let src = MediaSource::new("clip.mp4");

    p.prepare_audio(&src);
    // Let a worker pick the job up before clearing
    assert!(wait_until(WAIT, || backend.audio_decode_count() == 1));
    p.clear_all();

    std::thread::sleep(Duration::from_millis(300));
    assert!(!p.audio().contains(&src));
    assert!(!p.audio().is_loading(&src));
}

#[test]
fn test_inflight_thumbnail_discarded_after_forget() {
    let backend = Arc::new(ScriptedBackend::new(2.0).with_extract_delay(Duration::from_millis(100)));
    let p = pipeline(Arc::clone(&backend));
    let src = MediaSource::new("clip.mp4");

    let pending = p.thumbnail(&src, 1.0, 64);
    assert!(wait_until(WAIT, || backend.extract_count() == 1));
    p.forget_source(&src);

    // Waiter is released without a frame and nothing lands in the cache
    assert!(pending.wait_timeout(WAIT).is_none());
    std::thread::sleep(Duration::from_millis(200));
    assert!(p.cached_thumbnail_sync(&src, 1.0, 64).is_none());
    assert_eq!(p.stats().frame_entries, 0);
}

#[test]
fn test_queued_jobs_skipped_after_clear() {
    let backend = Arc::new(ScriptedBackend::new(2.0).with_extract_delay(Duration::from_millis(150)));
    let config = hoverscrub::config::PipelineConfig {
        workers: Some(1),
        ..test_config()
    };
    let p = pipeline_with(Arc::clone(&backend), Arc::new(hoverscrub::backends::NullVoice), config);
    let src = MediaSource::new("clip.mp4");

    for i in 0..10 {
        let _ = p.thumbnail(&src, i as f64 * 0.1, 64);
    }
    assert!(wait_until(WAIT, || backend.extract_count() >= 1));
    p.clear_all();
    std::thread::sleep(Duration::from_millis(400));

    // At most the job already running when the epoch moved got through
    assert!(backend.extract_count() <= 2);
    assert_eq!(p.stats().frame_entries, 0);
}

#[test]
fn test_forget_stops_running_prewarm() {
    let backend = Arc::new(ScriptedBackend::new(10.0).with_extract_delay(Duration::from_millis(20)));
    let config = hoverscrub::config::PipelineConfig {
        workers: Some(1),
        ..test_config()
    };
    let p = pipeline_with(Arc::clone(&backend), Arc::new(hoverscrub::backends::NullVoice), config);
    let src = MediaSource::new("clip.mp4");

    p.prewarm(&src, 10.0, 20);
    assert!(wait_until(WAIT, || backend.extract_count() >= 2));
    p.forget_source(&src);
    let at_forget = backend.extract_count();
    std::thread::sleep(Duration::from_millis(600));

    // Only the extraction running at forget time may finish, and it is discarded
    assert!(backend.extract_count() <= at_forget + 1);
    assert!(!p.thumbnails().cache().has_source(&src));
    assert!(!p.thumbnails().contexts().contains(&src));
    assert_eq!(p.stats().frame_entries, 0);

    // A fresh prewarm after the purge works normally
    p.prewarm(&src, 10.0, 2);
    assert!(wait_until(WAIT, || p.stats().frame_entries == 2));
}
