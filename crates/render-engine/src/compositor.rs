//! Frame renderer: paints the active item and its overlays onto the surface.
//!
//! The renderer is the only writer of the [`Surface`]. Each call resolves
//! the item's frame source, executes its draw operations and then the
//! overlay pass. When a source is not ready (a video still seeking) the
//! surface is left untouched, so the last good frame stays on screen.

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use reelcraft_common::config::AppConfig;
use reelcraft_common::events::EventBus;
use reelcraft_processing_core::ken_burns::EffectEngine;
use reelcraft_processing_core::scheduler::Resolution;
use reelcraft_project_model::{ItemId, MediaItem, MediaKind, Size, ThemeTokens, TimelineState};
use serde::Serialize;

use crate::frame_source::{FrameSample, SampleRequest};
use crate::media_cache::MediaCache;
use crate::overlay::TextOverlayCompositor;
use crate::surface::Surface;
use crate::video::VideoBackend;

/// What happened to the surface on a render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A fresh frame of the item was painted.
    Painted { item_id: ItemId },
    /// The item was not ready; the previous frame was kept.
    Stale { item_id: ItemId },
    /// Nothing to render at this time.
    Empty,
}

impl FrameStatus {
    pub fn is_painted(&self) -> bool {
        matches!(self, FrameStatus::Painted { .. })
    }
}

/// Renderer counters, reported in export diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub frames_painted: u64,
    /// Frames where the last good frame was kept.
    pub stale_frames: u64,
    /// Samples answered while a video seek was in flight.
    pub pending_seeks: u64,
    /// Render calls with no active item.
    pub empty_frames: u64,
    /// Settled renders whose source did not become ready in time.
    pub settle_timeouts: u64,
}

/// Owns the surface and paints timeline items onto it.
pub struct FrameRenderer {
    surface: Surface,
    cache: MediaCache,
    overlays: TextOverlayCompositor,
    theme: ThemeTokens,
    active: Option<ItemId>,
    stats: RenderStats,
}

impl FrameRenderer {
    pub fn new(cache: MediaCache, theme: ThemeTokens) -> Self {
        Self {
            surface: Surface::new(cache.canvas()),
            cache,
            overlays: TextOverlayCompositor::new(),
            theme,
            active: None,
            stats: RenderStats::default(),
        }
    }

    /// Build a renderer from the application configuration. A font that
    /// cannot be loaded is logged and text is skipped.
    pub fn from_config(
        config: &AppConfig,
        video: Arc<dyn VideoBackend>,
        theme: ThemeTokens,
        events: EventBus,
    ) -> Self {
        let canvas = Size::new(config.render.width, config.render.height);
        let cache = MediaCache::new(canvas, config.media.clone(), video, events)
            .with_effects(EffectEngine::new(config.render.ken_burns_target_scale));
        let mut renderer = Self::new(cache, theme);
        if let Some(path) = &config.render.font_path {
            match Surface::load_font(path) {
                Ok(font) => renderer.surface = Surface::new(canvas).with_font(font),
                Err(err) => tracing::warn!(error = %err, "Overlay font unavailable"),
            }
        }
        renderer
    }

    pub fn with_surface(mut self, surface: Surface) -> Self {
        self.surface = surface;
        self
    }

    pub fn canvas(&self) -> Size {
        self.surface.size()
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// The current pixels.
    pub fn frame(&self) -> &RgbaImage {
        self.surface.image()
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn theme(&self) -> &ThemeTokens {
        &self.theme
    }

    pub fn set_theme(&mut self, theme: ThemeTokens) {
        self.theme = theme;
    }

    pub fn cache(&self) -> &MediaCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut MediaCache {
        &mut self.cache
    }

    /// Paint the frame for `resolution` without waiting on any decoder.
    pub fn render(
        &mut self,
        timeline: &TimelineState,
        resolution: Option<&Resolution>,
    ) -> FrameStatus {
        let Some((item, resolution)) = active_item(timeline, resolution) else {
            self.leave_active();
            self.stats.empty_frames += 1;
            return FrameStatus::Empty;
        };
        self.enter(item.id);

        let req = SampleRequest {
            item,
            resolution,
            canvas: self.surface.size(),
            theme: &self.theme,
        };
        let sample = match self.cache.source_for(item) {
            Some(source) => source.sample(&req),
            None => FrameSample::Pending,
        };
        self.paint(item, sample)
    }

    /// Like [`Self::render`], but first waits up to `max_wait` for the
    /// item's source to become ready. Used for offline rendering where
    /// every frame must show its exact source time.
    pub async fn render_settled(
        &mut self,
        timeline: &TimelineState,
        resolution: Option<&Resolution>,
        max_wait: Duration,
    ) -> FrameStatus {
        if let Some((item, resolution)) = active_item(timeline, resolution) {
            let req = SampleRequest {
                item,
                resolution,
                canvas: self.surface.size(),
                theme: &self.theme,
            };
            if let Some(source) = self.cache.source_for(item) {
                match tokio::time::timeout(max_wait, source.prepare(&req)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::warn!(item = %item.id, error = %err, "Source could not be prepared");
                    }
                    Err(_) => {
                        self.stats.settle_timeouts += 1;
                        tracing::debug!(item = %item.id, wait_ms = max_wait.as_millis() as u64, "Source not ready in time");
                    }
                }
            }
        }
        self.render(timeline, resolution)
    }

    fn paint(&mut self, item: &MediaItem, sample: FrameSample) -> FrameStatus {
        match sample {
            FrameSample::Ready(ops) => {
                self.surface.execute(&ops);
                self.overlays.draw(&item.text_overlays, &mut self.surface);
                self.stats.frames_painted += 1;
                FrameStatus::Painted { item_id: item.id }
            }
            FrameSample::Pending => {
                self.stats.stale_frames += 1;
                if item.kind == MediaKind::Video {
                    self.stats.pending_seeks += 1;
                }
                FrameStatus::Stale { item_id: item.id }
            }
        }
    }

    fn enter(&mut self, item_id: ItemId) {
        if self.active == Some(item_id) {
            return;
        }
        self.leave_active();
        self.active = Some(item_id);
    }

    fn leave_active(&mut self) {
        if let Some(previous) = self.active.take() {
            self.cache.finish(previous);
        }
    }

    /// Release the media of one item (after removal or replacement).
    pub fn release(&mut self, item_id: ItemId) -> bool {
        if self.active == Some(item_id) {
            self.active = None;
        }
        self.cache.release(item_id)
    }

    /// Release media of items no longer in `timeline`.
    pub fn sync(&mut self, timeline: &TimelineState) -> usize {
        let live: Vec<ItemId> = timeline.items().iter().map(|item| item.id).collect();
        if self.active.is_some_and(|id| !live.contains(&id)) {
            self.active = None;
        }
        self.cache.retain(&live)
    }
}

impl std::fmt::Debug for FrameRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRenderer")
            .field("surface", &self.surface)
            .field("cache", &self.cache)
            .field("active", &self.active)
            .field("stats", &self.stats)
            .finish()
    }
}

/// The item a resolution points at, if it still matches the timeline.
fn active_item<'a>(
    timeline: &'a TimelineState,
    resolution: Option<&'a Resolution>,
) -> Option<(&'a MediaItem, &'a Resolution)> {
    let resolution = resolution?;
    let item = timeline
        .items()
        .get(resolution.index)
        .filter(|item| item.id == resolution.item_id)?;
    Some((item, resolution))
}
