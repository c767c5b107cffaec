//! Configuration management for the capture core.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Capture resolution, frame rate, and bitrate
    #[serde(default)]
    pub video: VideoConfig,

    /// Ring buffer window and status cadence
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Clip output location
    #[serde(default)]
    pub output: OutputConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Capture width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Capture height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Target frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Video bitrate in bits per second
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Target buffered duration in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Cadence of buffered-duration status events (ms), independent of
    /// frame rate
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,

    /// Depth of the render-to-encoder frame queue; frames beyond this are
    /// dropped rather than queued so rendering never waits on compression
    #[serde(default = "default_frame_queue_depth")]
    pub frame_queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for saved clips
    #[serde(default = "default_output_directory_option")]
    pub output_directory: Option<PathBuf>,
}

// Default value functions
fn default_width() -> u32 {
    1280 // 720p capture
}

fn default_height() -> u32 {
    720
}

fn default_fps() -> u32 {
    30
}

fn default_bitrate() -> u32 {
    6_000_000
}

fn default_window_secs() -> u64 {
    20
}

fn default_status_interval_ms() -> u64 {
    500
}

fn default_frame_queue_depth() -> usize {
    8
}

fn default_output_directory() -> PathBuf {
    std::env::temp_dir().join("retrocap-clips")
}

fn default_output_directory_option() -> Option<PathBuf> {
    Some(default_output_directory())
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            bitrate: default_bitrate(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            status_interval_ms: default_status_interval_ms(),
            frame_queue_depth: default_frame_queue_depth(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_directory: Some(default_output_directory()),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = match self.config_path.clone() {
            Some(path) => path,
            None => Self::default_config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "retrocap", "retrocap")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Capture dimensions with both axes forced even, as most video
    /// encoders require.
    pub fn capture_dimensions(&self) -> (u32, u32) {
        (make_even(self.video.width), make_even(self.video.height))
    }

    /// Ring buffer window as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.buffer.window_secs)
    }

    /// Status event cadence as a duration.
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.buffer.status_interval_ms.max(1))
    }

    /// Directory clips are saved into.
    pub fn output_directory(&self) -> PathBuf {
        self.output
            .output_directory
            .clone()
            .unwrap_or_else(default_output_directory)
    }

    /// Generate a timestamped clip path in the output directory, creating
    /// the directory if needed.
    pub fn default_clip_path(&self) -> Result<PathBuf> {
        let dir = self.output_directory();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;

        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S");
        Ok(dir.join(format!("clip_{}.mp4", timestamp)))
    }
}

/// Round down to an even value (codec requirement).
fn make_even(v: u32) -> u32 {
    v & !1
}
