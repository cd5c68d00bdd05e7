//! FFmpeg backend - real container decoding via playa-ffmpeg
//!
//! Live handles own a decoder on a dedicated thread and serve exact seeks in
//! order. Still contexts keep the demuxer and decoder open between
//! extractions and stop at the first frame inside the tolerance window.
//! Audio is decoded in full, converted to interleaved f32 and resampled
//! to the pipeline format.

use crossbeam_channel::{Sender, bounded, unbounded};
use log::{debug, trace, warn};
use playa_ffmpeg as ffmpeg;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use crate::entities::{
    AudioBuffer, AudioFormat, DecodeContext, DecodeHandle, MediaBackend, MediaError, MediaInfo,
    MediaSource, PreviewImage, SeekDone, SeekOutcome,
};

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg::init() {
            warn!("FFmpeg init failed: {}", e);
        }
        unsafe {
            // AV_LOG_QUIET: keep decoder chatter off stderr
            ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_QUIET);
        }
    });
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        init_ffmpeg();
        Self
    }
}

impl MediaBackend for FfmpegBackend {
    fn open_handle(&self, source: &MediaSource) -> Result<Arc<dyn DecodeHandle>, MediaError> {
        Ok(Arc::new(FfmpegHandle::spawn(source)?))
    }

    fn open_context(&self, source: &MediaSource) -> Result<Box<dyn DecodeContext>, MediaError> {
        Ok(Box::new(FfmpegContext {
            video: VideoStream::open(source.path())?,
        }))
    }

    fn decode_audio(&self, source: &MediaSource, format: AudioFormat) -> Result<AudioBuffer, MediaError> {
        decode_audio_track(source.path(), format)
    }

    fn probe(&self, source: &MediaSource) -> Result<MediaInfo, MediaError> {
        let path = source.path();
        let ictx = ffmpeg::format::input(path)
            .map_err(|e| MediaError::Open(format!("Failed to open {}: {}", path.display(), e)))?;
        let duration_secs = ictx.duration().max(0) as f64 / ffmpeg::ffi::AV_TIME_BASE as f64;
        let has_audio = ictx.streams().best(ffmpeg::media::Type::Audio).is_some();
        drop(ictx);

        let video = VideoStream::open(path)?;
        Ok(MediaInfo {
            duration_secs,
            width: video.decoder.width(),
            height: video.decoder.height(),
            has_audio,
        })
    }
}

/// Demuxer + video decoder for one file
struct VideoStream {
    ictx: ffmpeg::format::context::Input,
    stream_idx: usize,
    decoder: ffmpeg::decoder::Video,
    /// Seconds per stream tick
    time_base: f64,
}

impl VideoStream {
    fn open(path: &Path) -> Result<Self, MediaError> {
        init_ffmpeg();

        let ictx = ffmpeg::format::input(path)
            .map_err(|e| MediaError::Open(format!("Failed to open video: {}", e)))?;
        let stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(MediaError::NoStream("video"))?;
        let stream_idx = stream.index();
        let tb = stream.time_base();
        let time_base = if tb.denominator() != 0 {
            tb.numerator() as f64 / tb.denominator() as f64
        } else {
            1.0 / ffmpeg::ffi::AV_TIME_BASE as f64
        };

        let mut decoder_ctx = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| MediaError::Open(format!("Failed to create decoder context: {}", e)))?;
        unsafe {
            (*decoder_ctx.as_mut_ptr()).thread_type = ffmpeg::ffi::FF_THREAD_FRAME;
            (*decoder_ctx.as_mut_ptr()).thread_count = 0;
        }
        let decoder = decoder_ctx
            .decoder()
            .video()
            .map_err(|e| MediaError::Open(format!("Failed to create video decoder: {}", e)))?;

        Ok(Self {
            ictx,
            stream_idx,
            decoder,
            time_base,
        })
    }

    /// Seek to the keyframe at or before `time`, then decode forward to the
    /// first frame at or after `time - slack`.
    fn decode_at(&mut self, time: f64, slack: f64) -> Result<(ffmpeg::util::frame::video::Video, f64), MediaError> {
        let target_ts = (time.max(0.0) / self.time_base) as i64;
        let accept_ts = ((time - slack).max(0.0) / self.time_base) as i64;

        let seek_ret = unsafe {
            ffmpeg::ffi::av_seek_frame(
                self.ictx.as_mut_ptr(),
                self.stream_idx as i32,
                target_ts,
                ffmpeg::ffi::AVSEEK_FLAG_BACKWARD,
            )
        };
        if seek_ret < 0 {
            warn!("Video seek failed (ret={}), decoding from current position", seek_ret);
        }
        self.decoder.flush();

        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        let mut last: Option<(ffmpeg::util::frame::video::Video, f64)> = None;
        for (stream, packet) in self.ictx.packets() {
            if stream.index() != self.stream_idx {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                trace!("Packet rejected: {}", e);
                continue;
            }
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
                let secs = pts as f64 * self.time_base;
                if pts >= accept_ts {
                    return Ok((decoded, secs));
                }
                last = Some((decoded.clone(), secs));
            }
        }

        // Past the last packet: hand back the final frame (seek beyond the end)
        let _ = self.decoder.send_eof();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let secs = decoded.timestamp().or(decoded.pts()).unwrap_or(0) as f64 * self.time_base;
            last = Some((decoded.clone(), secs));
        }
        last.ok_or_else(|| MediaError::Decode(format!("No frame at {:.3}s", time)))
    }
}

/// Scale to RGBA at `width` (aspect kept) and pack rows tightly.
fn to_preview(frame: &ffmpeg::util::frame::video::Video, width: u32, pts: f64) -> Result<PreviewImage, MediaError> {
    let (src_w, src_h) = (frame.width(), frame.height());
    if src_w == 0 || src_h == 0 {
        return Err(MediaError::Decode("Empty video frame".to_string()));
    }
    let dst_w = if width == 0 { src_w } else { width };
    let dst_h = ((src_h as u64 * dst_w as u64 / src_w as u64) as u32).max(1);

    let mut scaler = ffmpeg::software::scaling::Context::get(
        frame.format(),
        src_w,
        src_h,
        ffmpeg::format::Pixel::RGBA,
        dst_w,
        dst_h,
        ffmpeg::software::scaling::Flags::BILINEAR,
    )
    .map_err(|e| MediaError::Decode(format!("Failed to create scaler: {}", e)))?;

    let mut rgba = ffmpeg::util::frame::video::Video::empty();
    scaler
        .run(frame, &mut rgba)
        .map_err(|e| MediaError::Decode(format!("Failed to scale frame: {}", e)))?;

    let data = rgba.data(0);
    let stride = rgba.stride(0);
    let row_bytes = dst_w as usize * 4;
    let mut pixels = vec![0u8; row_bytes * dst_h as usize];
    for y in 0..dst_h as usize {
        let src = y * stride;
        let dst = y * row_bytes;
        pixels[dst..dst + row_bytes].copy_from_slice(&data[src..src + row_bytes]);
    }
    PreviewImage::from_rgba(dst_w, dst_h, pixels, pts)
}

type SeekCommand = (f64, SeekDone);

/// Live handle: one decoder thread per source, seeks served in arrival order.
pub struct FfmpegHandle {
    commands: Mutex<Option<Sender<SeekCommand>>>,
    current: Arc<Mutex<Option<Arc<PreviewImage>>>>,
}

impl FfmpegHandle {
    fn spawn(source: &MediaSource) -> Result<Self, MediaError> {
        let (tx, rx) = unbounded::<SeekCommand>();
        let (ready_tx, ready_rx) = bounded::<Result<(), MediaError>>(1);
        let current = Arc::new(Mutex::new(None));
        let frame_slot = Arc::clone(&current);
        let path = source.path().to_path_buf();
        let name = source.file_name().to_string();

        std::thread::Builder::new()
            .name(format!("hoverscrub-seek-{}", name))
            .spawn(move || {
                let mut video = match VideoStream::open(&path) {
                    Ok(v) => {
                        let _ = ready_tx.send(Ok(()));
                        v
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Native size: the live frame is what the user looks at
                let width = video.decoder.width();
                for (time, done) in rx {
                    match video.decode_at(time, 0.0).and_then(|(f, pts)| to_preview(&f, width, pts)) {
                        Ok(img) => {
                            *frame_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(img));
                            done(SeekOutcome::Landed);
                        }
                        Err(e) => {
                            debug!("Exact seek to {:.3} failed: {}", time, e);
                            done(SeekOutcome::Failed);
                        }
                    }
                }
                trace!("Seek thread for {} exiting", name);
            })
            .map_err(|e| MediaError::Open(format!("Failed to spawn seek thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| MediaError::Open("Seek thread exited during open".to_string()))??;

        Ok(Self {
            commands: Mutex::new(Some(tx)),
            current,
        })
    }
}

impl DecodeHandle for FfmpegHandle {
    fn seek_exact(&self, time: f64, done: SeekDone) {
        let tx = self.commands.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let rejected = match tx {
            Some(tx) => tx.send((time, done)).err().map(|e| e.into_inner().1),
            None => Some(done),
        };
        if let Some(done) = rejected {
            done(SeekOutcome::Failed);
        }
    }

    fn current_frame(&self) -> Option<Arc<PreviewImage>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn release(&self) {
        self.commands.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

struct FfmpegContext {
    video: VideoStream,
}

impl DecodeContext for FfmpegContext {
    fn extract(&mut self, time: f64, width: u32, tolerance: f64) -> Result<PreviewImage, MediaError> {
        let (frame, pts) = self.video.decode_at(time, tolerance)?;
        to_preview(&frame, width, pts)
    }
}

/// Decode the whole audio track into `format`.
fn decode_audio_track(path: &Path, format: AudioFormat) -> Result<AudioBuffer, MediaError> {
    init_ffmpeg();

    let mut ictx = ffmpeg::format::input(path)
        .map_err(|e| MediaError::Open(format!("Failed to open audio: {}", e)))?;
    let stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Audio)
        .ok_or(MediaError::NoStream("audio"))?;
    let stream_idx = stream.index();
    let decoder_ctx = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .map_err(|e| MediaError::Open(format!("Failed to create decoder context: {}", e)))?;
    let mut decoder = decoder_ctx
        .decoder()
        .audio()
        .map_err(|e| MediaError::Open(format!("Failed to create audio decoder: {}", e)))?;

    let mut native = Vec::new();
    let mut native_channels = 0usize;
    let mut native_rate = 0u32;
    let mut decoded = ffmpeg::util::frame::Audio::empty();

    let mut drain = |decoder: &mut ffmpeg::decoder::Audio, native: &mut Vec<f32>| {
        while decoder.receive_frame(&mut decoded).is_ok() {
            native_rate = decoded.rate();
            native_channels = append_interleaved(&decoded, native);
        }
    };

    for (stream, packet) in ictx.packets() {
        if stream.index() != stream_idx {
            continue;
        }
        if decoder.send_packet(&packet).is_err() {
            continue;
        }
        drain(&mut decoder, &mut native);
    }
    let _ = decoder.send_eof();
    drain(&mut decoder, &mut native);

    if native_channels == 0 || native_rate == 0 {
        return Err(MediaError::Decode("Audio stream produced no samples".to_string()));
    }
    debug!(
        "Decoded {} native frames ({} ch @ {} Hz) from {}",
        native.len() / native_channels,
        native_channels,
        native_rate,
        path.display()
    );
    Ok(AudioBuffer::new(format, convert(&native, native_channels, native_rate, format)))
}

/// Append one decoded frame as interleaved f32. Returns its channel count.
fn append_interleaved(frame: &ffmpeg::util::frame::Audio, out: &mut Vec<f32>) -> usize {
    use ffmpeg::format::Sample;
    use ffmpeg::format::sample::Type;

    let channels = frame.ch_layout().channels() as usize;
    let samples = frame.samples();
    if channels == 0 || samples == 0 {
        return channels;
    }

    let (width, read): (usize, fn(&[u8]) -> f32) = match frame.format() {
        Sample::F32(_) => (4, read_f32),
        Sample::F64(_) => (8, read_f64),
        Sample::I16(_) => (2, read_i16),
        Sample::I32(_) => (4, read_i32),
        Sample::U8(_) => (1, read_u8),
        other => {
            warn!("Unsupported sample format {:?}, frame skipped", other);
            return channels;
        }
    };

    let planar = matches!(
        frame.format(),
        Sample::F32(Type::Planar)
            | Sample::F64(Type::Planar)
            | Sample::I16(Type::Planar)
            | Sample::I32(Type::Planar)
            | Sample::U8(Type::Planar)
    );

    out.reserve(samples * channels);
    if planar {
        for i in 0..samples {
            for c in 0..channels {
                let plane = frame.data(c);
                out.push(read(&plane[i * width..(i + 1) * width]));
            }
        }
    } else {
        let data = frame.data(0);
        for chunk in data[..samples * channels * width].chunks_exact(width) {
            out.push(read(chunk));
        }
    }
    channels
}

fn read_f32(b: &[u8]) -> f32 {
    f32::from_ne_bytes([b[0], b[1], b[2], b[3]])
}

fn read_f64(b: &[u8]) -> f32 {
    f64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
}

fn read_i16(b: &[u8]) -> f32 {
    i16::from_ne_bytes([b[0], b[1]]) as f32 / 32768.0
}

fn read_i32(b: &[u8]) -> f32 {
    i32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0
}

fn read_u8(b: &[u8]) -> f32 {
    (b[0] as f32 - 128.0) / 128.0
}

/// Remix and linearly resample interleaved audio to `dst`.
fn convert(src: &[f32], src_channels: usize, src_rate: u32, dst: AudioFormat) -> Vec<f32> {
    let src_frames = src.len() / src_channels.max(1);
    if src_frames == 0 {
        return Vec::new();
    }
    let dst_channels = dst.channels.max(1) as usize;
    let dst_frames = (src_frames as u64 * dst.sample_rate as u64 / src_rate.max(1) as u64) as usize;
    let step = src_rate as f64 / dst.sample_rate.max(1) as f64;

    let sample = |frame: usize, c: usize| -> f32 {
        let base = frame * src_channels;
        if dst_channels == 1 && src_channels > 1 {
            src[base..base + src_channels].iter().sum::<f32>() / src_channels as f32
        } else {
            src[base + c.min(src_channels - 1)]
        }
    };

    let mut out = Vec::with_capacity(dst_frames * dst_channels);
    for j in 0..dst_frames {
        let pos = j as f64 * step;
        let i = (pos as usize).min(src_frames - 1);
        let next = (i + 1).min(src_frames - 1);
        let frac = (pos - i as f64) as f32;
        for c in 0..dst_channels {
            let a = sample(i, c);
            let b = sample(next, c);
            out.push(a + (b - a) * frac);
        }
    }
    out
}
