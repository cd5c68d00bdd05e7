use hoverscrub::backends::NullVoice;
use hoverscrub::backends::synthetic::SyntheticBackend;
use hoverscrub::cli::Args;
use hoverscrub::config::{self, PathConfig, PipelineConfig};
use hoverscrub::core::handle_pool::HandleRef;
use hoverscrub::entities::{AudioVoice, MediaBackend, MediaSource, PreviewImage};
use hoverscrub::{ScrubPipeline, ThumbnailLookup};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Per-clip outcome of one hover sweep
struct SweepReport {
    source: MediaSource,
    events: usize,
    seeks_issued: u64,
    landed: Option<f64>,
    first_frames: usize,
    fallback_hits: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    init_logging(&args, &path_config)?;

    let mut pipeline_config = PipelineConfig::load_or_default(&path_config)?;
    if let Some(workers) = args.workers {
        pipeline_config.workers = Some(workers);
    }
    if let Some(width) = args.width {
        pipeline_config.thumbnail_width = width;
    }

    if args.write_config {
        let path = config::config_file(config::CONFIG_FILE, &path_config);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        pipeline_config.save(&path)?;
        println!("Config written to {}", path.display());
        return Ok(());
    }

    let backend = make_backend(&args)?;
    let voice = make_voice(&args);
    let pipeline = ScrubPipeline::new(pipeline_config, Arc::clone(&backend), voice)
        .context("Failed to start decode workers")?;

    let sources = collect_sources(&args)?;
    if let Some(dir) = &args.dump_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create dump directory: {}", dir.display()))?;
    }

    let width = pipeline.config().thumbnail_width;
    let mut reports = Vec::with_capacity(sources.len());
    for source in &sources {
        let duration = match backend.probe(source) {
            Ok(info) => info.duration_secs,
            Err(e) => {
                warn!("Probe failed for {}: {}", source, e);
                args.duration
            }
        };
        if args.prewarm > 0 {
            pipeline.prewarm(source, duration, args.prewarm);
        }
        pipeline.prepare_audio(source);

        let report = sweep(&pipeline, source, duration, width, &args);
        if let Some(dir) = &args.dump_dir {
            dump_frames(&pipeline, source, duration, width, dir)?;
        }
        pipeline.end_hover(source);
        reports.push(report);

        if pipeline.relieve_pressure() {
            warn!("Cache memory over budget, caches cleared");
        }
    }

    print_summary(&pipeline, &reports);
    Ok(())
}

/// Logging setup: 0 = warn, -v = info, -vv = debug, -vvv+ = trace.
/// `--log [FILE]` sends output to a file instead of stderr.
fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = match log_path_opt {
            Some(path) => path.clone(),
            None => {
                config::ensure_data_dir(path_config)?;
                config::data_file(config::LOG_FILE, path_config)
            }
        };
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn make_backend(args: &Args) -> Result<Arc<dyn MediaBackend>> {
    if args.synthetic {
        let backend = SyntheticBackend::new(args.duration).with_latency(Duration::from_millis(args.latency_ms));
        return Ok(Arc::new(backend));
    }
    #[cfg(feature = "ffmpeg")]
    return Ok(Arc::new(hoverscrub::backends::ffmpeg::FfmpegBackend::new()));
    #[cfg(not(feature = "ffmpeg"))]
    bail!("Built without the \"ffmpeg\" feature; use --synthetic or rebuild with --features ffmpeg");
}

fn make_voice(args: &Args) -> Arc<dyn AudioVoice> {
    if !args.audio {
        return Arc::new(NullVoice);
    }
    #[cfg(feature = "cpal-output")]
    {
        match hoverscrub::backends::cpal_voice::CpalVoice::new() {
            Ok(voice) => return Arc::new(voice),
            Err(e) => warn!("Audio output unavailable, snippets muted: {}", e),
        }
    }
    #[cfg(not(feature = "cpal-output"))]
    warn!("Built without the \"cpal-output\" feature, snippets muted");
    Arc::new(NullVoice)
}

fn collect_sources(args: &Args) -> Result<Vec<MediaSource>> {
    if args.files.is_empty() {
        if args.synthetic {
            return Ok((1..=4).map(|i| MediaSource::new(format!("clip{:02}", i))).collect());
        }
        bail!("No input files (pass FILE arguments or --synthetic)");
    }
    let sources: Vec<MediaSource> = if args.synthetic {
        args.files.iter().map(|p| MediaSource::new(p.to_string_lossy())).collect()
    } else {
        args.files.iter().map(MediaSource::from_path).collect()
    };
    Ok(sources)
}

/// Move a simulated cursor across one clip from left to right.
fn sweep(pipeline: &ScrubPipeline, source: &MediaSource, duration: f64, width: u32, args: &Args) -> SweepReport {
    let steps = args.steps.max(1);
    let first_frames = Arc::new(AtomicUsize::new(0));
    let mut fallback_hits = 0;

    info!("Hover sweep: {} ({:.2}s, {} steps)", source, duration, steps);
    for step in 0..steps {
        let t_norm = if steps == 1 { 0.5 } else { step as f64 / (steps - 1) as f64 };
        let counter = Arc::clone(&first_frames);
        let name = source.file_name().to_string();
        let fallback = pipeline.position(source, t_norm, duration, width, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            debug!("First live frame visible: {}", name);
        });
        if fallback.is_some() {
            fallback_hits += 1;
        }
        std::thread::sleep(Duration::from_millis(args.interval_ms));
    }

    wait_for_seeks(pipeline, source, Duration::from_secs(2));
    let status = pipeline.seek_status(source);
    SweepReport {
        source: source.clone(),
        events: steps,
        seeks_issued: status.map(|s| s.issued).unwrap_or(0),
        landed: status.and_then(|s| s.landed),
        first_frames: first_frames.load(Ordering::SeqCst),
        fallback_hits,
    }
}

fn wait_for_seeks(pipeline: &ScrubPipeline, source: &MediaSource, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match pipeline.seek_status(source) {
            Some(s) if s.in_flight => std::thread::sleep(Duration::from_millis(5)),
            _ => return,
        }
    }
    warn!("Seeks for {} still in flight after {:?}", source, timeout);
}

fn dump_frames(pipeline: &ScrubPipeline, source: &MediaSource, duration: f64, width: u32, dir: &Path) -> Result<()> {
    let stem = sanitize(source.file_name());
    let live = pipeline.acquire_handle(source).and_then(|h: HandleRef| h.current_frame());
    if let Some(img) = live {
        save_png(&img, &dir.join(format!("{}_live.png", stem)))?;
    }
    let still = match pipeline.thumbnail(source, duration, width) {
        ThumbnailLookup::Ready(img) => Some(img),
        lookup => lookup.wait_timeout(Duration::from_secs(5)),
    };
    if let Some(img) = still {
        save_png(&img, &dir.join(format!("{}_still.png", stem)))?;
    }
    Ok(())
}

fn save_png(img: &PreviewImage, path: &Path) -> Result<()> {
    img.image()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Wrote {} ({}x{})", path.display(), img.width(), img.height());
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn print_summary(pipeline: &ScrubPipeline, reports: &[SweepReport]) {
    println!("{:<24} {:>6} {:>6} {:>9} {:>6} {:>9}", "clip", "events", "seeks", "landed", "first", "fallback");
    for r in reports {
        let landed = r.landed.map(|t| format!("{:.3}", t)).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:>6} {:>6} {:>9} {:>6} {:>9}",
            r.source.file_name(),
            r.events,
            r.seeks_issued,
            landed,
            r.first_frames,
            r.fallback_hits
        );
    }

    let stats = pipeline.stats();
    println!();
    println!("live handles:    {}", stats.live_handles);
    println!(
        "frame cache:     {} entries, {:.1} MB, hit rate {:.1}%",
        stats.frame_entries,
        stats.frame_bytes as f64 / 1024.0 / 1024.0,
        stats.hit_rate() * 100.0
    );
    println!("decode contexts: {}", stats.decode_contexts);
    println!(
        "audio buffers:   {} ({:.1} MB)",
        stats.audio_buffers,
        stats.audio_bytes as f64 / 1024.0 / 1024.0
    );
}
