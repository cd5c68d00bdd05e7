//! Pipeline configuration and config/data path resolution.
//!
//! `PipelineConfig` carries every pool/cache bound and timing constant.
//! It is loaded from `hoverscrub.json`; any missing field falls back to the
//! defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::entities::AudioFormat;

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "hoverscrub.json";
/// Default log file name inside the data directory
pub const LOG_FILE: &str = "hoverscrub.log";
/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "HOVERSCRUB_CONFIG_DIR";

pub const DEFAULT_HANDLE_POOL_SIZE: usize = 12;
pub const DEFAULT_FRAME_CACHE_SIZE: usize = 2000;
pub const DEFAULT_CONTEXT_POOL_SIZE: usize = 50;
pub const DEFAULT_AUDIO_CACHE_SIZE: usize = 12;
pub const DEFAULT_THUMBNAIL_TOLERANCE_SECS: f64 = 0.5;
pub const DEFAULT_TIME_KEY_PRECISION: u32 = 2;
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 320;
pub const DEFAULT_SNIPPET_INTERVAL_MS: u64 = 60;
pub const DEFAULT_SNIPPET_WINDOW_MS: u64 = 80;
pub const DEFAULT_SNIPPET_FADE_MS: u64 = 5;

/// Tunables for the whole scrub pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Live decode handles kept (one per source)
    pub handle_pool_size: usize,
    /// Decoded preview frames kept
    pub frame_cache_size: usize,
    /// Still-extraction contexts kept (one per source)
    pub context_pool_size: usize,
    /// Fully decoded audio tracks kept
    pub audio_cache_size: usize,
    /// Accepted distance between requested and extracted still frame
    pub thumbnail_tolerance_secs: f64,
    /// Decimal places of the time component in frame-cache keys
    pub time_key_precision: u32,
    /// Width used by `prewarm`
    pub thumbnail_width: u32,
    /// Minimum spacing between scheduled audio snippets
    pub snippet_interval_ms: u64,
    /// Length of one audio snippet
    pub snippet_window_ms: u64,
    /// Linear fade at each snippet edge
    pub snippet_fade_ms: u64,
    /// PCM format all audio is converted to
    pub audio_format: AudioFormat,
    /// Background decode threads (None = 3/4 of cores)
    pub workers: Option<usize>,
    /// Fraction of available memory the caches may use before `relieve_pressure` clears them
    pub memory_fraction: f64,
    /// Memory left for the rest of the system (GB)
    pub memory_reserve_gb: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            handle_pool_size: DEFAULT_HANDLE_POOL_SIZE,
            frame_cache_size: DEFAULT_FRAME_CACHE_SIZE,
            context_pool_size: DEFAULT_CONTEXT_POOL_SIZE,
            audio_cache_size: DEFAULT_AUDIO_CACHE_SIZE,
            thumbnail_tolerance_secs: DEFAULT_THUMBNAIL_TOLERANCE_SECS,
            time_key_precision: DEFAULT_TIME_KEY_PRECISION,
            thumbnail_width: DEFAULT_THUMBNAIL_WIDTH,
            snippet_interval_ms: DEFAULT_SNIPPET_INTERVAL_MS,
            snippet_window_ms: DEFAULT_SNIPPET_WINDOW_MS,
            snippet_fade_ms: DEFAULT_SNIPPET_FADE_MS,
            audio_format: AudioFormat::default(),
            workers: None,
            memory_fraction: 0.5,
            memory_reserve_gb: 2.0,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Unknown fields are ignored, missing ones defaulted.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(config.normalized())
    }

    /// Load `hoverscrub.json` from the resolved config directory, or defaults if absent.
    pub fn load_or_default(paths: &PathConfig) -> Result<Self> {
        let path = config_file(CONFIG_FILE, paths);
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        log::info!("Loading config from {}", path.display());
        Self::load(&path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Clamp values that would make a pool or the audio path unusable.
    pub fn normalized(mut self) -> Self {
        self.handle_pool_size = self.handle_pool_size.max(1);
        self.frame_cache_size = self.frame_cache_size.max(1);
        self.context_pool_size = self.context_pool_size.max(1);
        self.audio_cache_size = self.audio_cache_size.max(1);
        self.thumbnail_width = self.thumbnail_width.max(1);
        self.thumbnail_tolerance_secs = self.thumbnail_tolerance_secs.max(0.0);
        self.time_key_precision = self.time_key_precision.min(6);
        self.audio_format.sample_rate = self.audio_format.sample_rate.max(1);
        self.audio_format.channels = self.audio_format.channels.max(1);
        self.memory_fraction = self.memory_fraction.clamp(0.0, 1.0);
        self
    }

    /// Worker thread count (75% of cores, leave the rest for UI)
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get() * 3 / 4)
            .max(1)
    }

    pub fn snippet_interval(&self) -> Duration {
        Duration::from_millis(self.snippet_interval_ms)
    }

    pub fn snippet_window(&self) -> Duration {
        Duration::from_millis(self.snippet_window_ms)
    }

    pub fn snippet_fade(&self) -> Duration {
        Duration::from_millis(self.snippet_fade_ms)
    }
}

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (HOVERSCRUB_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file.
///
/// Linux: ~/.config/hoverscrub/{name}; macOS: ~/Library/Application Support/hoverscrub/{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Path to a data file (logs).
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Create the data directory if missing (needed before opening a log file).
pub fn ensure_data_dir(config: &PathConfig) -> Result<PathBuf> {
    let dir = get_data_dir(config);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
    }
    Ok(dir)
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(dir) = dirs_next::config_dir() {
        return dir.join("hoverscrub");
    }
    PathBuf::from(".")
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(dir) = dirs_next::data_dir() {
        return dir.join("hoverscrub");
    }
    PathBuf::from(".")
}
