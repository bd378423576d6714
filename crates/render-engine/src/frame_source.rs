//! Frame sources: one per timeline item, sampled at a local offset.
//!
//! A source turns `(item, local offset, canvas)` into draw operations.
//! Sources that depend on asynchronous decoding (video) answer
//! [`FrameSample::Pending`] instead of blocking; the renderer then keeps
//! the last good frame on screen and asks again on the next tick.

use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use reelcraft_common::error::ReelResult;
use reelcraft_processing_core::ken_burns::EffectEngine;
use reelcraft_processing_core::scheduler::Resolution;
use reelcraft_project_model::geometry::{contain_rect, cover_rect};
use reelcraft_project_model::{Color, MediaItem, Rect, Size, ThemeTokens, TransitionContext};

use crate::surface::DrawOp;
use crate::video::VideoSeeker;

/// Everything a source needs to describe one frame.
#[derive(Debug, Clone, Copy)]
pub struct SampleRequest<'a> {
    pub item: &'a MediaItem,
    pub resolution: &'a Resolution,
    pub canvas: Size,
    pub theme: &'a ThemeTokens,
}

impl SampleRequest<'_> {
    pub fn local_offset(&self) -> f64 {
        self.resolution.local_offset
    }
}

/// Result of sampling a source.
#[derive(Debug, Clone)]
pub enum FrameSample {
    Ready(Vec<DrawOp>),
    /// Not decodable yet; retry on a later tick.
    Pending,
}

impl FrameSample {
    pub fn is_ready(&self) -> bool {
        matches!(self, FrameSample::Ready(_))
    }
}

/// Uniform sampling contract over every item kind.
#[async_trait]
pub trait FrameSource: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Describe the frame at the requested offset without blocking.
    fn sample(&mut self, req: &SampleRequest<'_>) -> FrameSample;

    /// Wait until [`Self::sample`] can answer `Ready` for `req`.
    async fn prepare(&mut self, _req: &SampleRequest<'_>) -> ReelResult<()> {
        Ok(())
    }

    /// The scheduler moved on to another item.
    fn finish(&mut self) {}

    /// Drop decoded resources. The source is not sampled afterwards.
    fn release(&mut self) {}
}

/// A decoded photo framed by the Ken Burns engine.
pub struct StaticImageSource {
    bitmap: Option<Arc<RgbaImage>>,
    effects: EffectEngine,
}

impl StaticImageSource {
    pub fn new(bitmap: Arc<RgbaImage>, effects: EffectEngine) -> Self {
        Self {
            bitmap: Some(bitmap),
            effects,
        }
    }

    pub fn bitmap(&self) -> Option<&Arc<RgbaImage>> {
        self.bitmap.as_ref()
    }
}

#[async_trait]
impl FrameSource for StaticImageSource {
    fn name(&self) -> &'static str {
        "image"
    }

    fn sample(&mut self, req: &SampleRequest<'_>) -> FrameSample {
        let Some(bitmap) = &self.bitmap else {
            return FrameSample::Ready(vec![DrawOp::Clear(Color::BLACK)]);
        };
        let size = Size::new(bitmap.width(), bitmap.height());
        let framing = self
            .effects
            .framing_for_item(req.item, size, req.canvas, req.local_offset());
        FrameSample::Ready(vec![
            DrawOp::Clear(Color::BLACK),
            DrawOp::Image {
                image: Arc::clone(bitmap),
                dest: framing.rect(),
                opacity: 1.0,
            },
        ])
    }

    fn release(&mut self) {
        self.bitmap = None;
    }
}

/// A trimmed video, sampled through a [`VideoSeeker`].
pub struct TrimmedVideoSource {
    seeker: Box<dyn VideoSeeker>,
    tolerance_secs: f64,
}

impl TrimmedVideoSource {
    pub fn new(seeker: Box<dyn VideoSeeker>) -> Self {
        Self {
            seeker,
            tolerance_secs: crate::video::SEEK_TOLERANCE_SECS,
        }
    }

    fn target(req: &SampleRequest<'_>) -> f64 {
        req.resolution
            .clip
            .map(|clip| clip.source_time)
            .unwrap_or(req.resolution.local_offset)
    }

    fn near(&self, target: f64) -> bool {
        self.seeker
            .current_time()
            .is_some_and(|t| (t - target).abs() <= self.tolerance_secs)
    }

    fn is_at(&mut self, target: f64) -> bool {
        self.seeker.ready()
            && self
                .seeker
                .current_time()
                .is_some_and(|t| (t - target).abs() <= self.tolerance_secs)
    }

    fn frame_ops(&self, req: &SampleRequest<'_>) -> Option<Vec<DrawOp>> {
        let frame = self.seeker.frame()?;
        let size = Size::new(frame.width(), frame.height());
        Some(vec![
            DrawOp::Clear(Color::BLACK),
            DrawOp::Image {
                image: frame,
                dest: cover_rect(size, req.canvas),
                opacity: 1.0,
            },
        ])
    }
}

#[async_trait]
impl FrameSource for TrimmedVideoSource {
    fn name(&self) -> &'static str {
        "video"
    }

    fn sample(&mut self, req: &SampleRequest<'_>) -> FrameSample {
        let target = Self::target(req);
        // Retarget before polling so an in-flight seek lands on this tick's
        // time rather than a stale one.
        if !self.near(target) {
            self.seeker.request_seek(target);
        }
        if self.is_at(target) {
            if let Some(ops) = self.frame_ops(req) {
                return FrameSample::Ready(ops);
            }
        }
        FrameSample::Pending
    }

    async fn prepare(&mut self, req: &SampleRequest<'_>) -> ReelResult<()> {
        let target = Self::target(req);
        if self.is_at(target) {
            return Ok(());
        }
        self.seeker.seek_to(target).await
    }

    fn finish(&mut self) {
        self.seeker.cancel();
    }

    fn release(&mut self) {
        self.seeker.release();
    }
}

/// Title and logo cards painted from theme tokens.
pub struct GeneratedCardSource {
    logo: Option<Arc<RgbaImage>>,
}

impl GeneratedCardSource {
    pub fn title() -> Self {
        Self { logo: None }
    }

    pub fn logo(bitmap: Option<Arc<RgbaImage>>) -> Self {
        Self { logo: bitmap }
    }

    /// Text size used for card titles, relative to the canvas height.
    fn title_px(canvas: Size) -> f32 {
        (canvas.height as f32 * 0.09).max(8.0)
    }
}

#[async_trait]
impl FrameSource for GeneratedCardSource {
    fn name(&self) -> &'static str {
        "card"
    }

    fn sample(&mut self, req: &SampleRequest<'_>) -> FrameSample {
        let (cw, ch) = (req.canvas.width as f64, req.canvas.height as f64);
        let theme = req.theme;
        let mut ops = vec![DrawOp::Clear(theme.background)];

        let bar = Rect::centered(cw / 2.0, ch * 0.68, cw * 0.18, (ch * 0.008).max(2.0));
        ops.push(DrawOp::FillRect {
            rect: bar,
            color: theme.accent,
        });

        match (&self.logo, req.item.title.as_deref()) {
            (Some(logo), _) => {
                let bounds = Rect::centered(cw / 2.0, ch * 0.42, cw * 0.5, ch * 0.4);
                ops.push(DrawOp::Image {
                    image: Arc::clone(logo),
                    dest: contain_rect(Size::new(logo.width(), logo.height()), bounds),
                    opacity: 1.0,
                });
            }
            (None, Some(title)) if !title.trim().is_empty() => ops.push(DrawOp::Text {
                text: title.to_string(),
                family: None,
                center_x: cw / 2.0,
                center_y: ch * 0.5,
                size_px: Self::title_px(req.canvas),
                color: theme.text,
            }),
            _ => {}
        }
        FrameSample::Ready(ops)
    }

    fn release(&mut self) {
        self.logo = None;
    }
}

/// The external animation played during a transition segment.
///
/// The renderer treats it as an opaque frame source: it is asked for the
/// frame at a progress in `[0, 1]` and told once when the segment ends.
pub trait TransitionAnimation: Send {
    fn frame(&mut self, progress: f64, canvas: Size, theme: &ThemeTokens) -> FrameSample;

    /// The segment finished playing.
    fn complete(&mut self) {}
}

/// Builds the animation for a transition context.
pub type TransitionFactory =
    Box<dyn Fn(&TransitionContext) -> Box<dyn TransitionAnimation> + Send + Sync>;

/// Stand-in animation: the destination name over the theme background with
/// an accent sweep.
pub struct SweepTransition {
    label: Option<String>,
}

impl SweepTransition {
    pub fn new(context: &TransitionContext) -> Self {
        Self {
            label: context.location.clone().filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn factory() -> TransitionFactory {
        Box::new(|context: &TransitionContext| -> Box<dyn TransitionAnimation> {
            Box::new(SweepTransition::new(context))
        })
    }
}

impl TransitionAnimation for SweepTransition {
    fn frame(&mut self, progress: f64, canvas: Size, theme: &ThemeTokens) -> FrameSample {
        let (cw, ch) = (canvas.width as f64, canvas.height as f64);
        let progress = progress.clamp(0.0, 1.0);
        let mut ops = vec![
            DrawOp::Clear(theme.background),
            DrawOp::FillRect {
                rect: Rect::new(0.0, ch * 0.8, cw * progress, (ch * 0.01).max(2.0)),
                color: theme.accent,
            },
        ];
        if let Some(label) = &self.label {
            ops.push(DrawOp::Text {
                text: label.clone(),
                family: None,
                center_x: cw / 2.0,
                center_y: ch / 2.0,
                size_px: (ch as f32 * 0.08).max(8.0),
                color: theme.text.with_opacity((progress * 2.0).min(1.0)),
            });
        }
        FrameSample::Ready(ops)
    }
}

/// Callback fired once when a transition segment completes.
pub type CompletionCallback = Box<dyn FnMut() + Send>;

/// Wraps a [`TransitionAnimation`] bound to the segment's fixed duration.
pub struct OpaqueAnimationSource {
    animation: Box<dyn TransitionAnimation>,
    on_complete: Option<CompletionCallback>,
    completed: bool,
    started: bool,
}

impl OpaqueAnimationSource {
    pub fn new(animation: Box<dyn TransitionAnimation>) -> Self {
        Self {
            animation,
            on_complete: None,
            completed: false,
            started: false,
        }
    }

    pub fn on_complete(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn complete(&mut self) {
        if self.completed || !self.started {
            return;
        }
        self.completed = true;
        self.animation.complete();
        if let Some(callback) = self.on_complete.as_mut() {
            callback();
        }
        tracing::debug!("Transition segment completed");
    }
}

#[async_trait]
impl FrameSource for OpaqueAnimationSource {
    fn name(&self) -> &'static str {
        "transition"
    }

    fn sample(&mut self, req: &SampleRequest<'_>) -> FrameSample {
        // A new pass (loop or seek back) replays the animation.
        if self.completed && req.resolution.progress() < 1.0 {
            self.completed = false;
        }
        self.started = true;
        self.animation
            .frame(req.resolution.progress(), req.canvas, req.theme)
    }

    fn finish(&mut self) {
        self.complete();
    }

    fn release(&mut self) {
        self.on_complete = None;
    }
}

/// Shown in place of an item whose media could not be decoded.
pub struct PlaceholderSource;

#[async_trait]
impl FrameSource for PlaceholderSource {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn sample(&mut self, req: &SampleRequest<'_>) -> FrameSample {
        FrameSample::Ready(vec![DrawOp::Clear(req.theme.background)])
    }
}
