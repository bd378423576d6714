//! Media items, clips, focal points and text overlays.
//!
//! Focal points and overlay positions are expressed in percent
//! (`[0.0, 100.0]`) of the item's own frame so they survive canvas
//! resizing.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::theme::{Color, TransitionContext};

/// Shortest display duration for any item.
pub const MIN_ITEM_DURATION_SECS: f64 = 1.0;

/// Longest configurable display duration for photos and cards.
pub const MAX_ITEM_DURATION_SECS: f64 = 60.0;

/// Display duration for newly ingested photos.
pub const DEFAULT_IMAGE_DURATION_SECS: f64 = 3.0;

/// Display duration for generated title and logo cards.
pub const DEFAULT_CARD_DURATION_SECS: f64 = 3.0;

/// Fixed length of the animated transition segment.
pub const TRANSITION_DURATION_SECS: f64 = 4.0;

/// At most this many focal points per item.
pub const MAX_FOCAL_POINTS: usize = 2;

/// Stable identifier of a timeline item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl ItemId {
    /// Placeholder for items not yet inserted into a timeline.
    pub const UNASSIGNED: ItemId = ItemId(0);
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Stable identifier of a clip within a video item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip-{}", self.0)
    }
}

/// What an item displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    TitleCard,
    LogoCard,
    TransitionSegment,
}

impl MediaKind {
    /// Generated cards are painted from theme tokens and never animate.
    pub fn is_card(self) -> bool {
        matches!(self, MediaKind::TitleCard | MediaKind::LogoCard)
    }

    /// Items whose position and existence are managed by the timeline itself.
    pub fn is_protected(self) -> bool {
        matches!(self, MediaKind::LogoCard | MediaKind::TransitionSegment)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::TitleCard => "title_card",
            MediaKind::LogoCard => "logo_card",
            MediaKind::TransitionSegment => "transition_segment",
        }
    }
}

/// Owned handle to a source's raw bytes.
///
/// Clones share the underlying buffer; the bytes are released when the last
/// handle is dropped.
#[derive(Clone, Serialize, Deserialize)]
pub struct MediaSource {
    /// Raw encoded bytes (image file, video container).
    #[serde(skip)]
    pub bytes: Arc<[u8]>,

    /// Where the bytes came from, if they came from disk.
    pub path: Option<PathBuf>,

    /// MIME type hint (e.g. `image/jpeg`, `video/mp4`).
    pub mime: Option<String>,
}

impl MediaSource {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, mime: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            path: None,
            mime,
        }
    }

    /// Read a source from disk, guessing its MIME type from the extension.
    pub fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let bytes = std::fs::read(&path)?;
        let mime = mime_from_extension(&path);
        Ok(Self {
            bytes: bytes.into(),
            path: Some(path),
            mime,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => format!("<{} bytes>", self.bytes.len()),
        }
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSource")
            .field("bytes", &self.bytes.len())
            .field("path", &self.path)
            .field("mime", &self.mime)
            .finish()
    }
}

impl PartialEq for MediaSource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes) && self.path == other.path && self.mime == other.mime
    }
}

fn mime_from_extension(path: &std::path::Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => return None,
    };
    Some(mime.to_string())
}

/// A trimmed sub-range `[start_secs, end_secs)` of a source video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl Clip {
    pub fn duration(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }

    /// Whether this clip is a legal range within a source of the given length.
    pub fn is_valid_within(&self, source_duration_secs: f64) -> bool {
        self.start_secs.is_finite()
            && self.end_secs.is_finite()
            && self.start_secs >= 0.0
            && self.start_secs < self.end_secs
            && self.end_secs <= source_duration_secs + 1e-9
    }
}

/// A normalized point of interest, in percent of the image frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocalPoint {
    pub x: f64,
    pub y: f64,
}

impl FocalPoint {
    pub const CENTER: FocalPoint = FocalPoint { x: 50.0, y: 50.0 };

    /// Create a focal point, clamping into `[0, 100]` (non-finite input maps
    /// to the center).
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: clamp_percent(x),
            y: clamp_percent(y),
        }
    }

    pub fn is_within_bounds(&self) -> bool {
        (0.0..=100.0).contains(&self.x) && (0.0..=100.0).contains(&self.y)
    }

    /// Fraction form in `[0, 1]`.
    pub fn as_fraction(&self) -> (f64, f64) {
        (self.x / 100.0, self.y / 100.0)
    }
}

impl Default for FocalPoint {
    fn default() -> Self {
        Self::CENTER
    }
}

fn clamp_percent(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 100.0)
    } else {
        50.0
    }
}

/// Ken Burns animation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KenBurnsVariant {
    #[default]
    ZoomIn,
    ZoomOut,
    PanLeft,
    PanRight,
}

/// Ken Burns settings of an image item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KenBurns {
    pub enabled: bool,
    pub variant: KenBurnsVariant,
}

impl KenBurns {
    pub fn enabled(variant: KenBurnsVariant) -> Self {
        Self {
            enabled: true,
            variant,
        }
    }
}

/// A text overlay drawn on top of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOverlay {
    /// Anchor position in percent of the canvas.
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub font_family: String,
    /// Font size in canvas pixels at the reference height of 720 px.
    pub font_size: f64,
    pub color: Color,
    pub background: Option<Color>,
    /// Overlay opacity in `[0, 1]`.
    pub opacity: f64,
}

impl TextOverlay {
    pub const MIN_FONT_SIZE: f64 = 4.0;
    pub const MAX_FONT_SIZE: f64 = 400.0;

    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            ..Self::default()
        }
        .normalized()
    }

    /// Clamp every numeric field into its legal range.
    pub fn normalized(mut self) -> Self {
        self.x = clamp_percent(self.x);
        self.y = clamp_percent(self.y);
        self.opacity = if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.font_size = if self.font_size.is_finite() {
            self.font_size
                .clamp(Self::MIN_FONT_SIZE, Self::MAX_FONT_SIZE)
        } else {
            Self::default().font_size
        };
        self
    }
}

impl Default for TextOverlay {
    fn default() -> Self {
        Self {
            x: 50.0,
            y: 85.0,
            text: String::new(),
            font_family: "sans-serif".to_string(),
            font_size: 36.0,
            color: Color::WHITE,
            background: None,
            opacity: 1.0,
        }
    }
}

/// Small RGBA preview of an item.
#[derive(Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    /// Straight-alpha RGBA8 pixels, row-major.
    pub pixels: Arc<[u8]>,
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thumbnail({}x{})", self.width, self.height)
    }
}

/// A single entry of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: ItemId,
    pub kind: MediaKind,

    /// Source bytes (photos, videos, logo bitmap).
    pub source: Option<MediaSource>,

    /// Configured duration for photos and cards. Ignored for video.
    pub duration_secs: f64,

    /// Native length of a video source.
    #[serde(default)]
    pub source_duration_secs: Option<f64>,

    /// Trimmed ranges of a video source, in playback order.
    #[serde(default)]
    pub clips: Vec<Clip>,

    #[serde(default)]
    pub focal_points: Vec<FocalPoint>,

    #[serde(default)]
    pub ken_burns: KenBurns,

    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,

    /// Title text of a title card.
    #[serde(default)]
    pub title: Option<String>,

    /// Context a transition segment was generated for.
    #[serde(default)]
    pub transition: Option<TransitionContext>,

    #[serde(skip)]
    pub thumbnail: Option<Thumbnail>,
}

impl MediaItem {
    fn base(kind: MediaKind, source: Option<MediaSource>, duration_secs: f64) -> Self {
        Self {
            id: ItemId::UNASSIGNED,
            kind,
            source,
            duration_secs,
            source_duration_secs: None,
            clips: vec![],
            focal_points: vec![],
            ken_burns: KenBurns::default(),
            text_overlays: vec![],
            title: None,
            transition: None,
            thumbnail: None,
        }
    }

    /// A photo shown for `duration_secs`.
    pub fn image(source: MediaSource, duration_secs: f64) -> Self {
        Self::base(MediaKind::Image, Some(source), duration_secs)
    }

    /// A video whose whole source plays (until clips are added).
    pub fn video(source: MediaSource, source_duration_secs: f64) -> Self {
        let mut item = Self::base(MediaKind::Video, Some(source), 0.0);
        item.source_duration_secs = Some(source_duration_secs);
        item
    }

    /// A generated title card.
    pub fn title_card(title: impl Into<String>, duration_secs: f64) -> Self {
        let mut item = Self::base(MediaKind::TitleCard, None, duration_secs);
        item.title = Some(title.into());
        item
    }

    /// The closing logo card, optionally with a logo bitmap.
    pub fn logo_card(logo: Option<MediaSource>) -> Self {
        Self::base(MediaKind::LogoCard, logo, DEFAULT_CARD_DURATION_SECS)
    }

    /// The fixed-length animated transition.
    pub fn transition_segment(context: TransitionContext) -> Self {
        let mut item = Self::base(
            MediaKind::TransitionSegment,
            None,
            TRANSITION_DURATION_SECS,
        );
        item.transition = Some(context);
        item
    }

    pub fn with_thumbnail(mut self, thumbnail: Thumbnail) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    /// Native length of the source; zero when unknown.
    pub fn source_duration(&self) -> f64 {
        self.source_duration_secs.unwrap_or(0.0).max(0.0)
    }

    /// Time this item occupies in the composited output.
    pub fn effective_duration(&self) -> f64 {
        match self.kind {
            MediaKind::Video if self.clips.is_empty() => self.source_duration(),
            MediaKind::Video => self.clips.iter().map(Clip::duration).sum(),
            MediaKind::TransitionSegment => TRANSITION_DURATION_SECS,
            _ => self.duration_secs.max(0.0),
        }
    }

    /// Clips to play: the explicit list, or the whole source as one
    /// implicit clip.
    pub fn playback_clips(&self) -> Vec<Clip> {
        if self.kind != MediaKind::Video {
            return vec![];
        }
        if self.clips.is_empty() {
            vec![Clip {
                id: ClipId(0),
                start_secs: 0.0,
                end_secs: self.source_duration(),
            }]
        } else {
            self.clips.clone()
        }
    }

    /// Focal point the Ken Burns effect moves toward.
    pub fn primary_focal_point(&self) -> FocalPoint {
        self.focal_points.first().copied().unwrap_or_default()
    }

    /// Short human-readable label for logs and CLI listings.
    pub fn label(&self) -> String {
        match self.kind {
            MediaKind::TitleCard => format!(
                "title card \"{}\"",
                self.title.as_deref().unwrap_or_default()
            ),
            MediaKind::TransitionSegment => {
                let location = self
                    .transition
                    .as_ref()
                    .and_then(|c| c.location.as_deref())
                    .unwrap_or("-");
                format!("transition to {location}")
            }
            kind => match &self.source {
                Some(source) => format!("{} {}", kind.as_str(), source.label()),
                None => kind.as_str().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_source() -> MediaSource {
        MediaSource::from_bytes(vec![0u8; 4], Some("video/mp4".to_string()))
    }

    fn clip(id: u64, start: f64, end: f64) -> Clip {
        Clip {
            id: ClipId(id),
            start_secs: start,
            end_secs: end,
        }
    }

    #[test]
    fn test_video_without_clips_uses_source_duration() {
        let item = MediaItem::video(dummy_source(), 12.5);
        assert!((item.effective_duration() - 12.5).abs() < 1e-9);

        let clips = item.playback_clips();
        assert_eq!(clips.len(), 1);
        assert!((clips[0].end_secs - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_video_with_clips_sums_clip_durations() {
        let mut item = MediaItem::video(dummy_source(), 20.0);
        item.clips = vec![clip(1, 0.0, 2.0), clip(2, 10.0, 13.5)];
        assert!((item.effective_duration() - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_transition_duration_is_fixed() {
        let mut item = MediaItem::transition_segment(TransitionContext {
            location: Some("Lisbon".to_string()),
            theme_id: None,
        });
        item.duration_secs = 99.0;
        assert!((item.effective_duration() - TRANSITION_DURATION_SECS).abs() < 1e-9);
    }

    #[test]
    fn test_clip_validity() {
        assert!(clip(1, 0.0, 5.0).is_valid_within(5.0));
        assert!(!clip(1, 3.0, 3.0).is_valid_within(5.0));
        assert!(!clip(1, 0.0, 5.1).is_valid_within(5.0));
        assert!(!clip(1, -0.1, 2.0).is_valid_within(5.0));
        assert!(!clip(1, f64::NAN, 2.0).is_valid_within(5.0));
    }

    #[test]
    fn test_focal_point_clamps() {
        let fp = FocalPoint::new(120.0, -5.0);
        assert_eq!(fp, FocalPoint { x: 100.0, y: 0.0 });
        assert_eq!(FocalPoint::new(f64::NAN, 20.0), FocalPoint { x: 50.0, y: 20.0 });
        assert_eq!(FocalPoint::new(80.0, 20.0).as_fraction(), (0.8, 0.2));
    }

    #[test]
    fn test_overlay_normalization() {
        let overlay = TextOverlay {
            x: 140.0,
            opacity: 3.0,
            font_size: 1.0,
            ..TextOverlay::new("Hello", 10.0, 10.0)
        }
        .normalized();
        assert!((overlay.x - 100.0).abs() < 1e-9);
        assert!((overlay.opacity - 1.0).abs() < 1e-9);
        assert!((overlay.font_size - TextOverlay::MIN_FONT_SIZE).abs() < 1e-9);
    }

    #[test]
    fn test_media_source_shares_bytes() {
        let a = MediaSource::from_bytes(vec![1u8, 2, 3], None);
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.bytes, &b.bytes));
        assert_eq!(a, b);
        assert_eq!(a.label(), "<3 bytes>");
    }

    #[test]
    fn test_item_json_skips_bytes() {
        let item = MediaItem::title_card("Summer 2026", 3.0);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "title_card");
        assert_eq!(json["title"], "Summer 2026");
    }
}
