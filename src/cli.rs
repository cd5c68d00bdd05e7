use clap::Parser;
use std::path::PathBuf;

/// Hover-scrub preview pipeline: sweeps a simulated hover over each clip and
/// reports how the pools, caches and seek coordinator behaved.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Media files to scrub (with --synthetic, any names; defaults to four virtual clips)
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Use procedural media instead of decoding files
    #[arg(short = 's', long = "synthetic")]
    pub synthetic: bool,

    /// Length of each synthetic clip in seconds
    #[arg(long = "duration", value_name = "SECS", default_value = "10.0")]
    pub duration: f64,

    /// Simulated decode latency of synthetic seeks/extractions
    #[arg(long = "latency-ms", value_name = "MS", default_value = "8")]
    pub latency_ms: u64,

    /// Hover positions per clip, evenly spread from start to end
    #[arg(short = 'n', long = "steps", value_name = "N", default_value = "24")]
    pub steps: usize,

    /// Delay between hover events
    #[arg(long = "interval-ms", value_name = "MS", default_value = "16")]
    pub interval_ms: u64,

    /// Thumbnails to prewarm per clip before the sweep
    #[arg(long = "prewarm", value_name = "N", default_value = "0")]
    pub prewarm: usize,

    /// Thumbnail width in pixels (overrides config)
    #[arg(short = 'w', long = "width", value_name = "PX")]
    pub width: Option<u32>,

    /// Write the last live frame and fallback still of each clip as PNG
    #[arg(short = 'd', long = "dump-dir", value_name = "DIR")]
    pub dump_dir: Option<PathBuf>,

    /// Play audio snippets on the default output device
    #[arg(short = 'a', long = "audio")]
    pub audio: bool,

    /// Background decode threads (overrides config)
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Write the effective configuration to the config directory and exit
    #[arg(long = "write-config")]
    pub write_config: bool,

    /// Enable debug logging to file (default: hoverscrub.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}
