//! Export configuration: quality tiers, container preference and size
//! estimates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Frame rate used for every export tier.
pub const EXPORT_FPS: u32 = 30;

/// Upper bound on the capture safety margin.
pub const MAX_SAFETY_MARGIN_SECS: f64 = 2.0;

/// Quality tier, mapped to a fixed video bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl QualityTier {
    pub const ALL: [QualityTier; 4] = [
        QualityTier::Low,
        QualityTier::Medium,
        QualityTier::High,
        QualityTier::Ultra,
    ];

    /// Target video bitrate in bits per second.
    pub fn bitrate_bps(self) -> u64 {
        match self {
            QualityTier::Low => 2_500_000,
            QualityTier::Medium => 5_000_000,
            QualityTier::High => 10_000_000,
            QualityTier::Ultra => 20_000_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
            QualityTier::Ultra => "ultra",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            "ultra" => Ok(QualityTier::Ultra),
            other => Err(format!(
                "unknown quality tier '{other}' (expected low, medium, high or ultra)"
            )),
        }
    }
}

/// Requested container. Advisory: the produced container is whatever the
/// available encoder supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Webm,
    Mp4,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Webm => "webm",
            ExportFormat::Mp4 => "mp4",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ExportFormat::Webm => "video/webm",
            ExportFormat::Mp4 => "video/mp4",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webm" => Ok(ExportFormat::Webm),
            "mp4" => Ok(ExportFormat::Mp4),
            other => Err(format!("unknown format '{other}' (expected webm or mp4)")),
        }
    }
}

/// Settings of one export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub quality: QualityTier,
    pub format: ExportFormat,
    /// Output canvas size in pixels.
    pub width: u32,
    pub height: u32,
    /// Extra capture time after the timeline pass completes.
    pub safety_margin_secs: f64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            quality: QualityTier::High,
            format: ExportFormat::Webm,
            width: 1280,
            height: 720,
            safety_margin_secs: 0.5,
        }
    }
}

impl ExportSettings {
    pub fn bitrate_bps(&self) -> u64 {
        self.quality.bitrate_bps()
    }

    /// Safety margin bounded to `[0, MAX_SAFETY_MARGIN_SECS]`.
    pub fn safety_margin(&self) -> f64 {
        if self.safety_margin_secs.is_finite() {
            self.safety_margin_secs.clamp(0.0, MAX_SAFETY_MARGIN_SECS)
        } else {
            0.0
        }
    }

    /// Even output dimensions (most encoders reject odd chroma planes).
    pub fn even_dimensions(&self) -> (u32, u32) {
        ((self.width.max(2)) & !1, (self.height.max(2)) & !1)
    }
}

/// Estimated output size in MiB for a tier and duration.
pub fn estimate_file_size_mb(quality: QualityTier, duration_secs: f64) -> f64 {
    let duration = if duration_secs.is_finite() {
        duration_secs.max(0.0)
    } else {
        0.0
    };
    quality.bitrate_bps() as f64 * duration / (8.0 * 1024.0 * 1024.0)
}
