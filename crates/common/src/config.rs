//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where exported reels are saved.
    pub exports_dir: PathBuf,

    /// Preview playback settings.
    #[serde(default)]
    pub playback: PlaybackDefaults,

    /// Export capture settings.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Media ingestion settings.
    #[serde(default)]
    pub media: MediaDefaults,

    /// Rendering surface settings.
    #[serde(default)]
    pub render: RenderDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Preview playback parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackDefaults {
    /// Tick step of the preview clock in milliseconds.
    pub tick_ms: u64,

    /// Whether preview wraps back to the start at the end of the reel.
    pub loop_preview: bool,
}

/// Export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Default quality tier name (low, medium, high, ultra).
    pub quality: String,

    /// Extra capture time after the reel ends before the encoder is stopped.
    pub safety_margin_secs: f64,

    /// Preferred container ("webm" or "mp4"). Advisory only.
    pub format: String,

    /// Path to the ffmpeg binary.
    pub ffmpeg_path: String,
}

/// Media ingestion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaDefaults {
    /// Bounded wait for probing a source's native duration.
    pub probe_timeout_secs: f64,

    /// Duration substituted when a probe fails or times out.
    pub fallback_video_duration_secs: f64,

    /// Display duration for newly ingested photos.
    pub image_duration_secs: f64,

    /// Path to the ffprobe binary.
    pub ffprobe_path: String,
}

/// Rendering surface parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Canvas width in pixels.
    pub width: u32,

    /// Canvas height in pixels.
    pub height: u32,

    /// Ken Burns target zoom.
    pub ken_burns_target_scale: f64,

    /// Optional TTF/OTF font used for overlays and title cards.
    pub font_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelcraft=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exports_dir: dirs_default_exports(),
            playback: PlaybackDefaults::default(),
            export: ExportDefaults::default(),
            media: MediaDefaults::default(),
            render: RenderDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            loop_preview: true,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            quality: "high".to_string(),
            safety_margin_secs: 0.5,
            format: "webm".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl Default for MediaDefaults {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 5.0,
            fallback_video_duration_secs: 5.0,
            image_duration_secs: 3.0,
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            ken_burns_target_scale: 1.25,
            font_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
                    Ok(config) => return config.sanitized(),
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Clamp numeric settings into their legal ranges.
    pub fn sanitized(mut self) -> Self {
        self.playback.tick_ms = self.playback.tick_ms.clamp(1, 1000);
        self.export.safety_margin_secs = finite_or(self.export.safety_margin_secs, 0.5).clamp(0.0, 2.0);
        self.media.probe_timeout_secs = finite_or(self.media.probe_timeout_secs, 5.0).clamp(0.1, 60.0);
        self.media.fallback_video_duration_secs =
            finite_or(self.media.fallback_video_duration_secs, 5.0).max(1.0);
        self.media.image_duration_secs = finite_or(self.media.image_duration_secs, 3.0).max(1.0);
        self.render.width = self.render.width.clamp(16, 7680) & !1;
        self.render.height = self.render.height.clamp(16, 4320) & !1;
        self.render.ken_burns_target_scale =
            finite_or(self.render.ken_burns_target_scale, 1.25).clamp(1.0, 4.0);
        self
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelcraft").join("config.json")
}

/// Default exports directory.
fn dirs_default_exports() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("reelcraft").join("exports")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_playback_contract() {
        let config = AppConfig::default();
        assert_eq!(config.playback.tick_ms, 50);
        assert!(config.playback.loop_preview);
        assert!((config.export.safety_margin_secs - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let raw = r#"{ "exports_dir": "/tmp/reels", "export": { "quality": "ultra" } }"#;
        let parsed: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.export.quality, "ultra");
        assert_eq!(parsed.export.ffmpeg_path, "ffmpeg");
        assert_eq!(parsed.render.width, 1280);
    }

    #[test]
    fn test_sanitized_clamps_out_of_range_values() {
        let mut config = AppConfig::default();
        config.export.safety_margin_secs = 30.0;
        config.media.image_duration_secs = -4.0;
        config.render.width = 1281;
        config.render.ken_burns_target_scale = f64::NAN;

        let config = config.sanitized();
        assert!((config.export.safety_margin_secs - 2.0).abs() < 1e-9);
        assert!((config.media.image_duration_secs - 1.0).abs() < 1e-9);
        assert_eq!(config.render.width, 1280);
        assert!((config.render.ken_burns_target_scale - 1.25).abs() < 1e-9);
    }
}
