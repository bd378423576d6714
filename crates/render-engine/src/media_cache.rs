//! Decoded media per timeline item.
//!
//! The cache builds the [`FrameSource`] for an item the first time it is
//! rendered and keeps it until the item is released. Releasing drops the
//! decoded bitmaps, stops the item's decoder and deletes spooled copies of
//! its source.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use image::imageops::FilterType;
use image::RgbaImage;
use reelcraft_common::config::MediaDefaults;
use reelcraft_common::error::{ReelError, ReelResult};
use reelcraft_common::events::{EventBus, ReelEvent};
use reelcraft_processing_core::ken_burns::EffectEngine;
use reelcraft_project_model::{
    ItemId, MediaItem, MediaKind, MediaSource, Size, Thumbnail, TransitionContext,
};

use crate::frame_source::{
    FrameSource, GeneratedCardSource, OpaqueAnimationSource, PlaceholderSource, StaticImageSource,
    SweepTransition, TransitionFactory, TrimmedVideoSource,
};
use crate::video::VideoBackend;

/// Longest edge of ingestion thumbnails.
pub const THUMBNAIL_EDGE: u32 = 160;

/// Decoded bitmaps are kept at most this many times the canvas size.
const MAX_DECODE_FACTOR: u32 = 2;

/// Outcome of probing a video's native duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbedDuration {
    pub secs: f64,
    /// The probe failed and `secs` is the fallback.
    pub substituted: bool,
}

/// Owner of every item's decoded media.
pub struct MediaCache {
    canvas: Size,
    defaults: MediaDefaults,
    video: Arc<dyn VideoBackend>,
    effects: EffectEngine,
    events: EventBus,
    transitions: TransitionFactory,
    sources: HashMap<ItemId, Box<dyn FrameSource>>,
    decoded: HashMap<ItemId, Arc<RgbaImage>>,
}

impl MediaCache {
    pub fn new(
        canvas: Size,
        defaults: MediaDefaults,
        video: Arc<dyn VideoBackend>,
        events: EventBus,
    ) -> Self {
        Self {
            canvas,
            defaults,
            video,
            effects: EffectEngine::default(),
            events,
            transitions: SweepTransition::factory(),
            sources: HashMap::new(),
            decoded: HashMap::new(),
        }
    }

    pub fn with_effects(mut self, effects: EffectEngine) -> Self {
        self.effects = effects;
        self
    }

    /// Use a different animation for transition segments.
    pub fn with_transition_factory(mut self, factory: TransitionFactory) -> Self {
        self.transitions = factory;
        self
    }

    pub fn canvas(&self) -> Size {
        self.canvas
    }

    pub fn video_backend(&self) -> &Arc<dyn VideoBackend> {
        &self.video
    }

    /// Number of items with live media.
    pub fn len(&self) -> usize {
        self.sources.len() + self.decoded.keys().filter(|id| !self.sources.contains_key(id)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.sources.contains_key(&item_id) || self.decoded.contains_key(&item_id)
    }

    /// Hand over a bitmap decoded during ingestion so it is not decoded twice.
    pub fn adopt_bitmap(&mut self, item_id: ItemId, bitmap: Arc<RgbaImage>) {
        self.decoded.insert(item_id, bitmap);
    }

    /// Decode an image source, bounded to twice the canvas size.
    pub fn decode(&self, source: &MediaSource) -> ReelResult<RgbaImage> {
        let decoded = image::load_from_memory(&source.bytes)?.to_rgba8();
        let max_w = self.canvas.width.saturating_mul(MAX_DECODE_FACTOR).max(1);
        let max_h = self.canvas.height.saturating_mul(MAX_DECODE_FACTOR).max(1);
        if decoded.width() <= max_w && decoded.height() <= max_h {
            return Ok(decoded);
        }
        let scale = (max_w as f64 / decoded.width() as f64).min(max_h as f64 / decoded.height() as f64);
        let w = ((decoded.width() as f64 * scale).round() as u32).max(1);
        let h = ((decoded.height() as f64 * scale).round() as u32).max(1);
        Ok(image::imageops::resize(&decoded, w, h, FilterType::Triangle))
    }

    /// Probe a video's duration with a bounded wait.
    pub async fn query_video_duration(&self, source: &MediaSource) -> ReelResult<f64> {
        let timeout = Duration::from_secs_f64(self.defaults.probe_timeout_secs.max(0.01));
        let probe = self.video.probe_duration(source, timeout);
        match tokio::time::timeout(timeout, probe).await {
            Ok(result) => result,
            Err(_) => Err(ReelError::media_load(format!(
                "duration probe of {} timed out after {:.1}s",
                source.label(),
                timeout.as_secs_f64()
            ))),
        }
    }

    /// Substitute the configured fallback duration after a failed lookup
    /// and report it against `item_id`.
    pub fn substitute_video_duration(
        &self,
        item_id: ItemId,
        source_label: &str,
        err: &ReelError,
    ) -> ProbedDuration {
        let secs = self.defaults.fallback_video_duration_secs;
        tracing::warn!(
            item = %item_id,
            source = %source_label,
            error = %err,
            fallback_secs = secs,
            "Video duration unavailable; using fallback"
        );
        self.events.emit(ReelEvent::MediaLoadWarning {
            item_id: item_id.0,
            source: source_label.to_string(),
            message: err.to_string(),
            substituted_secs: secs,
        });
        ProbedDuration {
            secs,
            substituted: true,
        }
    }

    /// Probe a video's duration with a bounded wait. On failure the
    /// configured fallback is substituted and a warning event is emitted.
    pub async fn probe_video_duration(&self, item_id: ItemId, source: &MediaSource) -> ProbedDuration {
        match self.query_video_duration(source).await {
            Ok(secs) => ProbedDuration {
                secs,
                substituted: false,
            },
            Err(err) => self.substitute_video_duration(item_id, &source.label(), &err),
        }
    }

    /// The frame source for `item`, built on first use.
    pub fn source_for(&mut self, item: &MediaItem) -> Option<&mut Box<dyn FrameSource>> {
        if !self.sources.contains_key(&item.id) {
            let source = self.build_source(item);
            tracing::debug!(item = %item.id, kind = item.kind.as_str(), source = source.name(), "Frame source created");
            self.sources.insert(item.id, source);
        }
        self.sources.get_mut(&item.id)
    }

    fn build_source(&mut self, item: &MediaItem) -> Box<dyn FrameSource> {
        let built: ReelResult<Box<dyn FrameSource>> = match item.kind {
            MediaKind::Image => self
                .bitmap_for(item)
                .map(|bitmap| Box::new(StaticImageSource::new(bitmap, self.effects.clone())) as _),
            MediaKind::Video => match &item.source {
                Some(source) => self
                    .video
                    .open(source, self.canvas)
                    .map(|seeker| Box::new(TrimmedVideoSource::new(seeker)) as _),
                None => Err(ReelError::media_load("video item has no source")),
            },
            MediaKind::TitleCard => Ok(Box::new(GeneratedCardSource::title())),
            MediaKind::LogoCard => {
                let logo = match item.source {
                    Some(_) => self.bitmap_for(item).map(Some),
                    None => Ok(None),
                };
                logo.map(|logo| Box::new(GeneratedCardSource::logo(logo)) as _)
            }
            MediaKind::TransitionSegment => {
                let context = item.transition.clone().unwrap_or(TransitionContext {
                    location: None,
                    theme_id: None,
                });
                Ok(Box::new(OpaqueAnimationSource::new((self.transitions)(&context))))
            }
        };

        match built {
            Ok(source) => source,
            Err(err) => {
                tracing::warn!(item = %item.id, error = %err, "Media could not be loaded; drawing a placeholder");
                self.events.emit(ReelEvent::MediaLoadWarning {
                    item_id: item.id.0,
                    source: item
                        .source
                        .as_ref()
                        .map(MediaSource::label)
                        .unwrap_or_else(|| item.label()),
                    message: err.to_string(),
                    substituted_secs: item.effective_duration(),
                });
                Box::new(PlaceholderSource)
            }
        }
    }

    fn bitmap_for(&mut self, item: &MediaItem) -> ReelResult<Arc<RgbaImage>> {
        if let Some(bitmap) = self.decoded.get(&item.id) {
            return Ok(Arc::clone(bitmap));
        }
        let source = item
            .source
            .as_ref()
            .ok_or_else(|| ReelError::media_load(format!("{} has no source", item.label())))?;
        let bitmap = Arc::new(self.decode(source)?);
        self.decoded.insert(item.id, Arc::clone(&bitmap));
        Ok(bitmap)
    }

    /// Tell an item's source that playback moved past it.
    pub fn finish(&mut self, item_id: ItemId) {
        if let Some(source) = self.sources.get_mut(&item_id) {
            source.finish();
        }
    }

    pub fn defaults(&self) -> &MediaDefaults {
        &self.defaults
    }

    /// Drop everything held for `item_id`. Returns whether anything was held.
    pub fn release(&mut self, item_id: ItemId) -> bool {
        let source = self.sources.remove(&item_id);
        let bitmap = self.decoded.remove(&item_id);
        let held = source.is_some() || bitmap.is_some();
        if let Some(mut source) = source {
            source.release();
        }
        if held {
            tracing::info!(item = %item_id, "Released decoded media");
            self.events.emit(ReelEvent::ResourceReleased { item_id: item_id.0 });
        }
        held
    }

    /// Release every item not in `live`.
    pub fn retain(&mut self, live: &[ItemId]) -> usize {
        let stale: Vec<ItemId> = self
            .sources
            .keys()
            .chain(self.decoded.keys())
            .filter(|id| !live.contains(id))
            .copied()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        stale.into_iter().filter(|id| self.release(*id)).count()
    }

    /// Release everything.
    pub fn clear(&mut self) {
        self.retain(&[]);
    }
}

impl std::fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCache")
            .field("canvas", &self.canvas)
            .field("video", &self.video.name())
            .field("sources", &self.sources.len())
            .field("decoded", &self.decoded.len())
            .finish()
    }
}

/// Thumbnail with a longest edge of [`THUMBNAIL_EDGE`] pixels.
pub fn make_thumbnail(bitmap: &RgbaImage) -> Thumbnail {
    let (w, h) = (bitmap.width().max(1), bitmap.height().max(1));
    let scale = THUMBNAIL_EDGE as f64 / w.max(h) as f64;
    let (tw, th) = if scale >= 1.0 {
        (w, h)
    } else {
        (
            ((w as f64 * scale).round() as u32).max(1),
            ((h as f64 * scale).round() as u32).max(1),
        )
    };
    let thumb = image::imageops::thumbnail(bitmap, tw, th);
    Thumbnail {
        width: thumb.width(),
        height: thumb.height(),
        pixels: Arc::from(thumb.into_raw()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::SyntheticVideoBackend;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_source(w: u32, h: u32) -> MediaSource {
        let img = RgbaImage::from_pixel(w, h, Rgba([200, 40, 40, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        MediaSource::from_bytes(bytes, Some("image/png".into()))
    }

    fn cache(events: EventBus) -> MediaCache {
        MediaCache::new(
            Size::new(64, 36),
            MediaDefaults::default(),
            Arc::new(SyntheticVideoBackend::new(4.0)),
            events,
        )
    }

    #[test]
    fn test_decode_is_bounded_by_canvas() {
        let cache = cache(EventBus::new());
        let bitmap = cache.decode(&png_source(640, 360)).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (128, 72));
        let small = cache.decode(&png_source(20, 10)).unwrap();
        assert_eq!((small.width(), small.height()), (20, 10));
    }

    #[test]
    fn test_thumbnail_longest_edge() {
        let thumb = make_thumbnail(&RgbaImage::new(800, 400));
        assert_eq!((thumb.width, thumb.height), (160, 80));
        assert_eq!(thumb.pixels.len(), 160 * 80 * 4);

        let tiny = make_thumbnail(&RgbaImage::new(10, 20));
        assert_eq!((tiny.width, tiny.height), (10, 20));
    }

    #[test]
    fn test_release_emits_event_once() {
        let events = EventBus::new();
        let log = events.collector();
        let mut cache = cache(events);
        let mut item = MediaItem::image(png_source(8, 8), 3.0);
        item.id = ItemId(5);

        assert!(cache.source_for(&item).is_some());
        assert!(cache.contains(item.id));
        assert!(cache.release(item.id));
        assert!(!cache.release(item.id));
        assert!(!cache.contains(item.id));

        let log = log.lock().unwrap();
        assert_eq!(*log, vec![ReelEvent::ResourceReleased { item_id: 5 }]);
    }

    #[test]
    fn test_undecodable_image_gets_placeholder_and_warning() {
        let events = EventBus::new();
        let log = events.collector();
        let mut cache = cache(events);
        let mut item = MediaItem::image(MediaSource::from_bytes(vec![1u8, 2, 3], None), 3.0);
        item.id = ItemId(9);

        let source = cache.source_for(&item).unwrap();
        assert_eq!(source.name(), "placeholder");
        assert!(matches!(
            log.lock().unwrap().first(),
            Some(ReelEvent::MediaLoadWarning { item_id: 9, .. })
        ));
    }

    #[test]
    fn test_retain_releases_removed_items() {
        let mut cache = cache(EventBus::new());
        let mut a = MediaItem::title_card("a", 3.0);
        a.id = ItemId(1);
        let mut b = MediaItem::title_card("b", 3.0);
        b.id = ItemId(2);
        cache.source_for(&a);
        cache.source_for(&b);
        cache.adopt_bitmap(ItemId(3), Arc::new(RgbaImage::new(1, 1)));
        assert_eq!(cache.len(), 3);

        assert_eq!(cache.retain(&[ItemId(2)]), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(ItemId(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_substitutes_fallback() {
        let events = EventBus::new();
        let log = events.collector();
        let mut defaults = MediaDefaults::default();
        defaults.probe_timeout_secs = 1.0;
        defaults.fallback_video_duration_secs = 5.0;
        let cache = MediaCache::new(
            Size::new(64, 36),
            defaults,
            Arc::new(SyntheticVideoBackend::new(12.0).with_probe_delay(Duration::from_secs(30))),
            events,
        );

        let probed = cache
            .probe_video_duration(ItemId(4), &MediaSource::from_bytes(vec![0u8], None))
            .await;
        assert_eq!(
            probed,
            ProbedDuration {
                secs: 5.0,
                substituted: true
            }
        );
        assert!(matches!(
            log.lock().unwrap().as_slice(),
            [ReelEvent::MediaLoadWarning { item_id: 4, substituted_secs, .. }] if *substituted_secs == 5.0
        ));
    }

    #[tokio::test]
    async fn test_probe_success_is_not_substituted() {
        let cache = cache(EventBus::new());
        let probed = cache
            .probe_video_duration(ItemId(1), &MediaSource::from_bytes(vec![0u8], None))
            .await;
        assert!(!probed.substituted);
        assert_eq!(probed.secs, 4.0);
    }
}
