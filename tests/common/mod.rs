//! Scripted backend for integration tests.
//!
//! Seeks stay in flight until the test completes them by hand, so coalescing
//! can be observed step by step. Extractions and audio decodes are counted.

#![allow(dead_code)]

use hoverscrub::backends::NullVoice;
use hoverscrub::config::PipelineConfig;
use hoverscrub::entities::{
    AudioBuffer, AudioFormat, AudioVoice, DecodeContext, DecodeHandle, MediaBackend, MediaError,
    MediaInfo, MediaSource, PreviewImage, SeekDone, SeekOutcome, Snippet,
};
use hoverscrub::ScrubPipeline;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct ScriptedHandle {
    issued: Mutex<Vec<f64>>,
    queue: Mutex<VecDeque<(f64, SeekDone)>>,
    max_in_flight: AtomicUsize,
    released: AtomicBool,
    current: Mutex<Option<Arc<PreviewImage>>>,
}

impl ScriptedHandle {
    /// Land the oldest outstanding seek. Returns its target time.
    pub fn complete_next(&self) -> Option<f64> {
        self.finish_next(SeekOutcome::Landed)
    }

    pub fn fail_next(&self) -> Option<f64> {
        self.finish_next(SeekOutcome::Failed)
    }

    fn finish_next(&self, outcome: SeekOutcome) -> Option<f64> {
        let (time, done) = self.queue.lock().unwrap().pop_front()?;
        if outcome == SeekOutcome::Landed {
            let img = PreviewImage::from_rgba(2, 2, vec![0; 16], time).unwrap();
            *self.current.lock().unwrap() = Some(Arc::new(img));
        }
        // Outside every lock: completion may issue the next seek
        done(outcome);
        Some(time)
    }

    pub fn issued(&self) -> Vec<f64> {
        self.issued.lock().unwrap().clone()
    }

    pub fn outstanding(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl DecodeHandle for ScriptedHandle {
    fn seek_exact(&self, time: f64, done: SeekDone) {
        if self.is_released() {
            done(SeekOutcome::Failed);
            return;
        }
        self.issued.lock().unwrap().push(time);
        let mut queue = self.queue.lock().unwrap();
        queue.push_back((time, done));
        self.max_in_flight.fetch_max(queue.len(), Ordering::SeqCst);
    }

    fn current_frame(&self) -> Option<Arc<PreviewImage>> {
        self.current.lock().unwrap().clone()
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

struct ScriptedContext {
    extracts: Arc<AtomicUsize>,
    delay: Duration,
    fail: bool,
}

impl DecodeContext for ScriptedContext {
    fn extract(&mut self, time: f64, width: u32, _tolerance: f64) -> Result<PreviewImage, MediaError> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(MediaError::Decode("scripted failure".to_string()));
        }
        let height = (width / 2).max(1);
        PreviewImage::from_rgba(width, height, vec![128; (width * height * 4) as usize], time)
    }
}

pub struct ScriptedBackend {
    pub duration: f64,
    pub extract_delay: Duration,
    pub audio_delay: Duration,
    handles: Mutex<HashMap<MediaSource, Arc<ScriptedHandle>>>,
    broken: Mutex<HashSet<MediaSource>>,
    undecodable: Mutex<HashSet<MediaSource>>,
    pub handles_opened: AtomicUsize,
    pub extracts: Arc<AtomicUsize>,
    pub audio_decodes: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            extract_delay: Duration::ZERO,
            audio_delay: Duration::ZERO,
            handles: Mutex::new(HashMap::new()),
            broken: Mutex::new(HashSet::new()),
            undecodable: Mutex::new(HashSet::new()),
            handles_opened: AtomicUsize::new(0),
            extracts: Arc::new(AtomicUsize::new(0)),
            audio_decodes: AtomicUsize::new(0),
        }
    }

    pub fn with_extract_delay(mut self, delay: Duration) -> Self {
        self.extract_delay = delay;
        self
    }

    pub fn with_audio_delay(mut self, delay: Duration) -> Self {
        self.audio_delay = delay;
        self
    }

    /// Every open on `source` fails.
    pub fn break_source(&self, source: &MediaSource) {
        self.broken.lock().unwrap().insert(source.clone());
    }

    /// Opens succeed but still extraction fails.
    pub fn corrupt_frames(&self, source: &MediaSource) {
        self.undecodable.lock().unwrap().insert(source.clone());
    }

    /// Most recently opened handle for `source`
    pub fn handle(&self, source: &MediaSource) -> Arc<ScriptedHandle> {
        Arc::clone(self.handles.lock().unwrap().get(source).expect("handle never opened"))
    }

    pub fn extract_count(&self) -> usize {
        self.extracts.load(Ordering::SeqCst)
    }

    pub fn audio_decode_count(&self) -> usize {
        self.audio_decodes.load(Ordering::SeqCst)
    }

    fn check(&self, source: &MediaSource) -> Result<(), MediaError> {
        if self.broken.lock().unwrap().contains(source) {
            return Err(MediaError::Open(format!("{} is broken", source)));
        }
        Ok(())
    }
}

impl MediaBackend for ScriptedBackend {
    fn open_handle(&self, source: &MediaSource) -> Result<Arc<dyn DecodeHandle>, MediaError> {
        self.check(source)?;
        self.handles_opened.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(ScriptedHandle::default());
        self.handles.lock().unwrap().insert(source.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    fn open_context(&self, source: &MediaSource) -> Result<Box<dyn DecodeContext>, MediaError> {
        self.check(source)?;
        Ok(Box::new(ScriptedContext {
            extracts: Arc::clone(&self.extracts),
            delay: self.extract_delay,
            fail: self.undecodable.lock().unwrap().contains(source),
        }))
    }

    fn decode_audio(&self, source: &MediaSource, format: AudioFormat) -> Result<AudioBuffer, MediaError> {
        self.audio_decodes.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.audio_delay);
        self.check(source)?;
        let frames = (self.duration * format.sample_rate as f64) as usize;
        Ok(AudioBuffer::new(format, vec![1.0; frames * format.channels as usize]))
    }

    fn probe(&self, source: &MediaSource) -> Result<MediaInfo, MediaError> {
        self.check(source)?;
        Ok(MediaInfo {
            duration_secs: self.duration,
            width: 64,
            height: 32,
            has_audio: true,
        })
    }
}

/// Voice that records what it was asked to play.
#[derive(Default)]
pub struct RecordingVoice {
    played: Mutex<Vec<Snippet>>,
    stops: AtomicUsize,
}

impl RecordingVoice {
    pub fn played(&self) -> Vec<Snippet> {
        self.played.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AudioVoice for RecordingVoice {
    fn play(&self, snippet: Snippet) {
        self.played.lock().unwrap().push(snippet);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        workers: Some(2),
        audio_format: AudioFormat { sample_rate: 1000, channels: 2 },
        ..Default::default()
    }
}

pub fn pipeline_with(backend: Arc<ScriptedBackend>, voice: Arc<dyn AudioVoice>, config: PipelineConfig) -> ScrubPipeline {
    ScrubPipeline::new(config, backend, voice).unwrap()
}

pub fn pipeline(backend: Arc<ScriptedBackend>) -> ScrubPipeline {
    pipeline_with(backend, Arc::new(NullVoice), test_config())
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
