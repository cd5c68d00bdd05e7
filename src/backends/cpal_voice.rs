//! Snippet playback on the default output device.
//!
//! `cpal::Stream` is not `Send` on every host, so the stream lives on its own
//! thread for the lifetime of the voice. The stream callback reads the current
//! snippet from shared state; `play` swaps it, `stop` clears it.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat};
use crossbeam_channel::{Sender, bounded};
use log::{debug, error, warn};
use std::sync::{Arc, Mutex};

use crate::entities::{AudioVoice, MediaError, Snippet};

#[derive(Default)]
struct Playback {
    samples: Vec<f32>,
    channels: usize,
    /// Snippet frames advanced per device frame
    step: f64,
    position: f64,
}

impl Playback {
    fn next_frame(&mut self, out_channels: usize, out: &mut [f32]) {
        let frames = self.samples.len() / self.channels.max(1);
        let frame = self.position as usize;
        if frame >= frames {
            out.iter_mut().for_each(|s| *s = 0.0);
            return;
        }
        let base = frame * self.channels;
        for (c, slot) in out.iter_mut().enumerate().take(out_channels) {
            *slot = self.samples[base + c.min(self.channels - 1)];
        }
        self.position += self.step;
    }
}

pub struct CpalVoice {
    playback: Arc<Mutex<Playback>>,
    device_rate: u32,
    // Dropping this ends the stream thread
    _shutdown: Sender<()>,
}

impl CpalVoice {
    pub fn new() -> Result<Self, MediaError> {
        let playback = Arc::new(Mutex::new(Playback::default()));
        let (ready_tx, ready_rx) = bounded::<Result<u32, String>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let shared = Arc::clone(&playback);

        std::thread::Builder::new()
            .name("hoverscrub-audio-out".to_string())
            .spawn(move || {
                let stream = match open_stream(shared) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Blocks until the voice is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Audio output stream closed");
            })
            .map_err(|e| MediaError::Open(format!("Failed to spawn audio thread: {}", e)))?;

        let device_rate = ready_rx
            .recv()
            .map_err(|_| MediaError::Open("Audio thread exited during setup".to_string()))?
            .map_err(MediaError::Open)?;

        Ok(Self {
            playback,
            device_rate,
            _shutdown: shutdown_tx,
        })
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

impl AudioVoice for CpalVoice {
    fn play(&self, snippet: Snippet) {
        let step = snippet.format.sample_rate as f64 / self.device_rate.max(1) as f64;
        let mut pb = self.playback.lock().unwrap_or_else(|e| e.into_inner());
        pb.channels = snippet.format.channels.max(1) as usize;
        pb.samples = snippet.samples;
        pb.step = step;
        pb.position = 0.0;
    }

    fn stop(&self) {
        let mut pb = self.playback.lock().unwrap_or_else(|e| e.into_inner());
        pb.samples.clear();
        pb.position = 0.0;
    }
}

fn open_stream(playback: Arc<Mutex<Playback>>) -> Result<(cpal::Stream, u32), String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| "No default output device".to_string())?;
    let supported = device
        .default_output_config()
        .map_err(|e| format!("Failed to get default output config: {e}"))?;

    let rate = supported.sample_rate().0;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let err_fn = |err: cpal::StreamError| error!("Audio stream error: {err}");
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, playback, err_fn)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, playback, err_fn)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, playback, err_fn)?,
        other => return Err(format!("Unsupported sample format: {other}")),
    };
    stream
        .play()
        .map_err(|e| format!("Failed to start audio stream: {e}"))?;
    debug!("Audio output: {} Hz, {} ch, {:?}", rate, config.channels, sample_format);
    Ok((stream, rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    playback: Arc<Mutex<Playback>>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, String>
where
    T: Sample + FromSample<f32> + cpal::SizedSample,
{
    let channels = config.channels.max(1) as usize;
    let mut frame = vec![0.0f32; channels];
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                // Never block the audio thread; a contended lock yields one silent buffer
                let Ok(mut pb) = playback.try_lock() else {
                    data.iter_mut().for_each(|s| *s = T::from_sample(0.0f32));
                    return;
                };
                for out in data.chunks_mut(channels) {
                    pb.next_frame(channels, &mut frame);
                    for (dst, &src) in out.iter_mut().zip(frame.iter()) {
                        *dst = T::from_sample(src);
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| {
            warn!("Failed to build output stream: {e}");
            format!("Failed to build output stream: {e}")
        })
}
