//! Audio path: idempotent track decode and throttled snippets.

mod common;

use common::{RecordingVoice, ScriptedBackend, pipeline, pipeline_with, test_config, wait_until};
use hoverscrub::ScrubOutcome;
use hoverscrub::entities::MediaSource;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_prepare_audio_decodes_once() {
    let backend = Arc::new(ScriptedBackend::new(2.0).with_audio_delay(Duration::from_millis(100)));
    let p = pipeline(Arc::clone(&backend));
    let src = MediaSource::new("clip.mp4");

    assert!(p.prepare_audio(&src));
    for _ in 0..4 {
        assert!(!p.prepare_audio(&src));
    }
    assert!(wait_until(WAIT, || p.audio().contains(&src)));
    assert!(!p.prepare_audio(&src));
    assert_eq!(backend.audio_decode_count(), 1);
    assert_eq!(p.stats().audio_buffers, 1);
}

#[test]
fn test_concurrent_prepare_audio_decodes_once() {
    let backend = Arc::new(ScriptedBackend::new(2.0).with_audio_delay(Duration::from_millis(50)));
    let p = Arc::new(pipeline(Arc::clone(&backend)));
    let src = MediaSource::new("clip.mp4");
    let barrier = Arc::new(Barrier::new(2));

    let callers: Vec<_> = (0..2)
        .map(|_| {
            let (p, src, barrier) = (Arc::clone(&p), src.clone(), Arc::clone(&barrier));
            std::thread::spawn(move || {
                barrier.wait();
                p.prepare_audio(&src)
            })
        })
        .collect();
    let launched: Vec<bool> = callers.into_iter().map(|h| h.join().unwrap()).collect();

    // Exactly one caller launched the decode
    assert_eq!(launched.iter().filter(|l| **l).count(), 1);
    assert!(wait_until(WAIT, || p.audio().contains(&src)));
    assert_eq!(backend.audio_decode_count(), 1);
    assert_eq!(p.stats().audio_buffers, 1);
}

#[test]
fn test_failed_decode_allows_retry() {
    let backend = Arc::new(ScriptedBackend::new(2.0));
    let src = MediaSource::new("silent.mp4");
    backend.break_source(&src);
    let p = pipeline(Arc::clone(&backend));

    assert!(p.prepare_audio(&src));
    assert!(wait_until(WAIT, || !p.audio().is_loading(&src)));
    assert!(!p.audio().contains(&src));
    assert!(p.prepare_audio(&src));
}

#[test]
fn test_snippet_throttle_60ms() {
    let backend = Arc::new(ScriptedBackend::new(5.0));
    let voice = Arc::new(RecordingVoice::default());
    let p = pipeline_with(Arc::clone(&backend), voice.clone(), test_config());
    let src = MediaSource::new("clip.mp4");

    p.prepare_audio(&src);
    assert!(wait_until(WAIT, || p.audio().contains(&src)));

    let t0 = Instant::now();
    assert_eq!(p.scrub_audio_at(&src, 1.0, t0), ScrubOutcome::Scheduled);
    assert_eq!(p.scrub_audio_at(&src, 1.1, t0 + Duration::from_millis(30)), ScrubOutcome::Throttled);
    assert_eq!(p.scrub_audio_at(&src, 1.2, t0 + Duration::from_millis(70)), ScrubOutcome::Scheduled);

    let played = voice.played();
    assert_eq!(played.len(), 2);
    assert!((played[0].offset_secs - 1.0).abs() < 1e-9);
    assert!((played[1].offset_secs - 1.2).abs() < 1e-9);
    // Previous snippet is stopped before each new one starts
    assert_eq!(voice.stops(), 2);
}

#[test]
fn test_throttle_measured_from_last_scheduled() {
    let backend = Arc::new(ScriptedBackend::new(5.0));
    let voice = Arc::new(RecordingVoice::default());
    let p = pipeline_with(Arc::clone(&backend), voice.clone(), test_config());
    let src = MediaSource::new("clip.mp4");
    p.prepare_audio(&src);
    assert!(wait_until(WAIT, || p.audio().contains(&src)));

    let t0 = Instant::now();
    p.scrub_audio_at(&src, 1.0, t0);
    // Rejected requests do not push the window forward
    for ms in [20, 40, 50] {
        assert_eq!(p.scrub_audio_at(&src, 1.0, t0 + Duration::from_millis(ms)), ScrubOutcome::Throttled);
    }
    assert_eq!(p.scrub_audio_at(&src, 1.0, t0 + Duration::from_millis(60)), ScrubOutcome::Scheduled);
}

#[test]
fn test_snippet_window_and_fades() {
    let backend = Arc::new(ScriptedBackend::new(5.0));
    let voice = Arc::new(RecordingVoice::default());
    let p = pipeline_with(Arc::clone(&backend), voice.clone(), test_config());
    let src = MediaSource::new("clip.mp4");
    p.prepare_audio(&src);
    assert!(wait_until(WAIT, || p.audio().contains(&src)));

    assert_eq!(p.scrub_audio_at(&src, 2.0, Instant::now()), ScrubOutcome::Scheduled);
    let snippet = &voice.played()[0];
    // 80 ms at 1 kHz stereo
    assert_eq!(snippet.frames(), 80);
    assert_eq!(snippet.samples[0], 0.0);
    assert_eq!(snippet.samples[40 * 2], 1.0);
    assert_eq!(*snippet.samples.last().unwrap(), 0.0);
}

#[test]
fn test_snippet_near_end_pulled_back() {
    let backend = Arc::new(ScriptedBackend::new(1.0));
    let voice = Arc::new(RecordingVoice::default());
    let p = pipeline_with(Arc::clone(&backend), voice.clone(), test_config());
    let src = MediaSource::new("clip.mp4");
    p.prepare_audio(&src);
    assert!(wait_until(WAIT, || p.audio().contains(&src)));

    p.scrub_audio_at(&src, 0.99, Instant::now());
    let snippet = &voice.played()[0];
    assert_eq!(snippet.frames(), 80);
    assert!((snippet.offset_secs - 0.92).abs() < 1e-9);
}

#[test]
fn test_scrub_before_decode_requests_track() {
    let backend = Arc::new(ScriptedBackend::new(2.0).with_audio_delay(Duration::from_millis(50)));
    let voice = Arc::new(RecordingVoice::default());
    let p = pipeline_with(Arc::clone(&backend), voice.clone(), test_config());
    let src = MediaSource::new("clip.mp4");

    assert_eq!(p.scrub_audio(&src, 0.5), ScrubOutcome::Buffering);
    assert!(voice.played().is_empty());
    assert!(wait_until(WAIT, || p.audio().contains(&src)));
    assert_eq!(p.scrub_audio(&src, 0.5), ScrubOutcome::Scheduled);
    assert_eq!(backend.audio_decode_count(), 1);
}

#[test]
fn test_stop_only_silences_active_source() {
    let backend = Arc::new(ScriptedBackend::new(2.0));
    let voice = Arc::new(RecordingVoice::default());
    let p = pipeline_with(Arc::clone(&backend), voice.clone(), test_config());
    let a = MediaSource::new("a.mp4");
    let b = MediaSource::new("b.mp4");
    p.prepare_audio(&a);
    assert!(wait_until(WAIT, || p.audio().contains(&a)));

    p.scrub_audio(&a, 0.5);
    let stops = voice.stops();
    assert!(!p.stop_audio(&b));
    assert_eq!(voice.stops(), stops);

    assert!(p.stop_audio(&a));
    assert_eq!(voice.stops(), stops + 1);
    // Idempotent
    assert!(!p.stop_audio(&a));
    assert_eq!(p.snippets().active(), None);
}
