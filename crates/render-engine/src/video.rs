//! Video readiness contract and its implementations.
//!
//! A [`VideoSeeker`] stands in for a decoder positioned somewhere in a
//! source video. Seeks are asynchronous: [`VideoSeeker::request_seek`]
//! returns immediately and [`VideoSeeker::ready`] reports when the frame
//! for the requested time is available. Offline rendering awaits
//! [`VideoSeeker::seek_to`] instead.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use reelcraft_common::error::{ReelError, ReelResult};
use reelcraft_project_model::{MediaSource, Size, EXPORT_FPS};
use tokio::task::JoinHandle;

use crate::ffmpeg::{self, SpooledSource};

/// A decoded frame counts as "at" a time within half a frame at 30 fps.
pub const SEEK_TOLERANCE_SECS: f64 = 0.5 / EXPORT_FPS as f64;

#[async_trait]
pub trait VideoSeeker: Send {
    /// Whether a decoded frame is available and no seek is in flight.
    fn ready(&mut self) -> bool;

    /// Source time of the decoded frame.
    fn current_time(&self) -> Option<f64>;

    /// Start seeking to `t` without waiting.
    fn request_seek(&mut self, t: f64);

    /// Seek to `t` and wait until the frame is decoded.
    async fn seek_to(&mut self, t: f64) -> ReelResult<()>;

    /// The decoded frame.
    fn frame(&self) -> Option<Arc<RgbaImage>>;

    /// Abandon any in-flight seek.
    fn cancel(&mut self) {}

    /// Drop the decoder and any handles on the source.
    fn release(&mut self) {}
}

/// Opens seekers and probes durations for video sources.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Native duration of a source in seconds.
    async fn probe_duration(&self, source: &MediaSource, timeout: Duration) -> ReelResult<f64>;

    /// Open a seeker producing frames no larger than `canvas`.
    fn open(&self, source: &MediaSource, canvas: Size) -> ReelResult<Box<dyn VideoSeeker>>;
}

struct PendingSeek {
    target: f64,
    remaining_polls: u32,
}

/// Seeker over frames held in memory.
///
/// Seeks complete after a configurable number of [`VideoSeeker::ready`]
/// polls, which models a decoder that lags the playhead.
pub struct FrameSequenceSeeker {
    frames: Vec<(f64, Arc<RgbaImage>)>,
    latency_polls: u32,
    current: Option<f64>,
    pending: Option<PendingSeek>,
}

impl FrameSequenceSeeker {
    /// Frames as `(timestamp, bitmap)` pairs, in any order.
    pub fn new(mut frames: Vec<(f64, Arc<RgbaImage>)>) -> Self {
        frames.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            frames,
            latency_polls: 0,
            current: None,
            pending: None,
        }
    }

    /// Frames for a synthetic clip: one solid color per frame, cycling
    /// through hues over the clip.
    pub fn generated(duration_secs: f64, fps: u32, size: Size) -> Self {
        let fps = fps.max(1);
        let count = (duration_secs.max(0.0) * fps as f64).ceil().max(1.0) as usize;
        let frames = (0..count)
            .map(|i| {
                let t = i as f64 / fps as f64;
                let hue = i as f64 / count as f64;
                let frame = RgbaImage::from_pixel(
                    size.width.max(1),
                    size.height.max(1),
                    Rgba(hue_to_rgba(hue)),
                );
                (t, Arc::new(frame))
            })
            .collect();
        Self::new(frames)
    }

    /// Complete each seek only after `polls` calls to `ready()`.
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[async_trait]
impl VideoSeeker for FrameSequenceSeeker {
    fn ready(&mut self) -> bool {
        if let Some(pending) = &mut self.pending {
            if pending.remaining_polls > 0 {
                pending.remaining_polls -= 1;
                return false;
            }
            self.current = Some(pending.target);
            self.pending = None;
        }
        self.current.is_some() && !self.frames.is_empty()
    }

    fn current_time(&self) -> Option<f64> {
        self.current
    }

    fn request_seek(&mut self, t: f64) {
        if self.latency_polls == 0 {
            self.current = Some(t);
            return;
        }
        match &mut self.pending {
            // The in-flight seek lands on the newest target.
            Some(pending) => pending.target = t,
            None => {
                self.pending = Some(PendingSeek {
                    target: t,
                    remaining_polls: self.latency_polls,
                })
            }
        }
    }

    async fn seek_to(&mut self, t: f64) -> ReelResult<()> {
        tokio::task::yield_now().await;
        if self.frames.is_empty() {
            return Err(ReelError::media_load("frame sequence has no frames"));
        }
        self.pending = None;
        self.current = Some(t);
        Ok(())
    }

    fn frame(&self) -> Option<Arc<RgbaImage>> {
        let t = self.current?;
        let index = self
            .frames
            .partition_point(|(ts, _)| *ts <= t + 1e-9)
            .saturating_sub(1);
        self.frames.get(index).map(|(_, frame)| Arc::clone(frame))
    }

    fn cancel(&mut self) {
        self.pending = None;
    }

    fn release(&mut self) {
        self.frames.clear();
        self.current = None;
        self.pending = None;
    }
}

fn hue_to_rgba(hue: f64) -> [u8; 4] {
    let h = (hue.rem_euclid(1.0)) * 6.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    let c = |v: f64| (v * 255.0).round() as u8;
    [c(r), c(g), c(b), 255]
}

#[derive(Default)]
struct SeekSlot {
    time: Option<f64>,
    frame: Option<Arc<RgbaImage>>,
    size: Option<Size>,
    error: Option<String>,
}

/// Seeker decoding one frame per seek with an ffmpeg child process.
pub struct FfmpegVideoSeeker {
    ffmpeg: String,
    ffprobe: String,
    canvas: Size,
    spool: Option<Arc<SpooledSource>>,
    slot: Arc<Mutex<SeekSlot>>,
    task: Option<JoinHandle<()>>,
    queued: Option<f64>,
}

impl FfmpegVideoSeeker {
    pub fn new(ffmpeg: &str, ffprobe: &str, source: &MediaSource, canvas: Size) -> ReelResult<Self> {
        Ok(Self {
            ffmpeg: ffmpeg.to_string(),
            ffprobe: ffprobe.to_string(),
            canvas,
            spool: Some(Arc::new(SpooledSource::new(source)?)),
            slot: Arc::new(Mutex::new(SeekSlot::default())),
            task: None,
            queued: None,
        })
    }

    fn slot(&self) -> MutexGuard<'_, SeekSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn busy(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn spawn_decode(&mut self, t: f64) {
        let Some(spool) = self.spool.clone() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Video seek requested outside a tokio runtime");
            return;
        };
        let slot = Arc::clone(&self.slot);
        let ffmpeg = self.ffmpeg.clone();
        let ffprobe = self.ffprobe.clone();
        let canvas = self.canvas;

        self.task = Some(runtime.spawn(async move {
            let known = slot.lock().unwrap_or_else(PoisonError::into_inner).size;
            let size = match known {
                Some(size) => size,
                None => {
                    let native =
                        ffmpeg::probe_dimensions(&ffprobe, spool.path(), Duration::from_secs(5))
                            .await;
                    let size = decode_size(native, canvas);
                    slot.lock().unwrap_or_else(PoisonError::into_inner).size = Some(size);
                    size
                }
            };

            let decoded = ffmpeg::decode_frame(&ffmpeg, spool.path(), t, size)
                .await
                .and_then(|pixels| {
                    RgbaImage::from_raw(size.width, size.height, pixels)
                        .ok_or_else(|| ReelError::media_load("decoded frame has the wrong size"))
                });

            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            // A failed decode (e.g. past the last frame) keeps the previous
            // frame on screen rather than stalling the item.
            slot.time = Some(t);
            match decoded {
                Ok(frame) => {
                    slot.frame = Some(Arc::new(frame));
                    slot.error = None;
                }
                Err(err) => {
                    tracing::debug!(error = %err, source_time = t, "Video frame decode failed");
                    slot.error = Some(err.to_string());
                }
            }
        }));
    }
}

/// Decode size: the native size shrunk to fit the canvas, with even sides.
fn decode_size(native: Option<Size>, canvas: Size) -> Size {
    let Some(native) = native else {
        return canvas;
    };
    let scale = (canvas.width as f64 / native.width as f64)
        .min(canvas.height as f64 / native.height as f64)
        .min(1.0);
    let even = |v: f64| ((v.round() as u32).max(2)) & !1;
    Size::new(
        even(native.width as f64 * scale),
        even(native.height as f64 * scale),
    )
}

#[async_trait]
impl VideoSeeker for FfmpegVideoSeeker {
    fn ready(&mut self) -> bool {
        if self.busy() {
            return false;
        }
        self.task = None;
        if let Some(t) = self.queued.take() {
            self.spawn_decode(t);
            return false;
        }
        let slot = self.slot();
        slot.time.is_some() && slot.frame.is_some()
    }

    fn current_time(&self) -> Option<f64> {
        self.slot().time
    }

    fn request_seek(&mut self, t: f64) {
        if self.busy() {
            self.queued = Some(t);
        } else {
            self.spawn_decode(t);
        }
    }

    async fn seek_to(&mut self, t: f64) -> ReelResult<()> {
        self.queued = None;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        let at_target = self
            .slot()
            .time
            .is_some_and(|time| (time - t).abs() <= SEEK_TOLERANCE_SECS);
        if !at_target {
            self.spawn_decode(t);
            if let Some(task) = self.task.take() {
                task.await
                    .map_err(|e| ReelError::media_load(format!("decode task failed: {e}")))?;
            }
        }
        let slot = self.slot();
        match (&slot.frame, &slot.error) {
            (None, Some(error)) => Err(ReelError::media_load(error.clone())),
            (None, None) => Err(ReelError::media_load("no frame decoded")),
            _ => Ok(()),
        }
    }

    fn frame(&self) -> Option<Arc<RgbaImage>> {
        self.slot().frame.clone()
    }

    fn cancel(&mut self) {
        self.queued = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn release(&mut self) {
        self.cancel();
        self.spool = None;
        let mut slot = self.slot();
        slot.frame = None;
        slot.time = None;
    }
}

/// ffmpeg/ffprobe-backed video access.
#[derive(Debug, Clone)]
pub struct FfmpegVideoBackend {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl FfmpegVideoBackend {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        ffmpeg::command_exists(&self.ffmpeg) && ffmpeg::command_exists(&self.ffprobe)
    }
}

impl Default for FfmpegVideoBackend {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

#[async_trait]
impl VideoBackend for FfmpegVideoBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn probe_duration(&self, source: &MediaSource, timeout: Duration) -> ReelResult<f64> {
        let spool = SpooledSource::new(source)?;
        ffmpeg::probe_duration(&self.ffprobe, spool.path(), timeout).await
    }

    fn open(&self, source: &MediaSource, canvas: Size) -> ReelResult<Box<dyn VideoSeeker>> {
        Ok(Box::new(FfmpegVideoSeeker::new(
            &self.ffmpeg,
            &self.ffprobe,
            source,
            canvas,
        )?))
    }
}

/// Generated video content: every source is a color sweep of a fixed
/// duration. Probes can be delayed to exercise timeouts.
#[derive(Debug, Clone)]
pub struct SyntheticVideoBackend {
    pub duration_secs: f64,
    pub probe_delay: Duration,
    pub latency_polls: u32,
    pub frame_size: Size,
}

impl SyntheticVideoBackend {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            probe_delay: Duration::ZERO,
            latency_polls: 0,
            frame_size: Size::new(64, 36),
        }
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }
}

#[async_trait]
impl VideoBackend for SyntheticVideoBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn probe_duration(&self, _source: &MediaSource, _timeout: Duration) -> ReelResult<f64> {
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        Ok(self.duration_secs)
    }

    fn open(&self, _source: &MediaSource, _canvas: Size) -> ReelResult<Box<dyn VideoSeeker>> {
        Ok(Box::new(
            FrameSequenceSeeker::generated(self.duration_secs, EXPORT_FPS, self.frame_size)
                .with_latency(self.latency_polls),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames() -> Vec<(f64, Arc<RgbaImage>)> {
        [(1.0, [0, 255, 0, 255]), (0.0, [255, 0, 0, 255])]
            .into_iter()
            .map(|(t, px)| (t, Arc::new(RgbaImage::from_pixel(2, 2, Rgba(px)))))
            .collect()
    }

    #[test]
    fn test_frame_sequence_picks_frame_at_or_before_time() {
        let mut seeker = FrameSequenceSeeker::new(frames());
        assert!(!seeker.ready());
        seeker.request_seek(0.5);
        assert!(seeker.ready());
        assert_eq!(seeker.frame().unwrap().get_pixel(0, 0).0, [255, 0, 0, 255]);
        seeker.request_seek(1.0);
        assert_eq!(seeker.frame().unwrap().get_pixel(0, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_latency_lands_on_newest_target() {
        let mut seeker = FrameSequenceSeeker::new(frames()).with_latency(2);
        seeker.request_seek(0.2);
        assert!(!seeker.ready());
        seeker.request_seek(1.1);
        assert!(!seeker.ready());
        assert!(seeker.ready());
        assert_eq!(seeker.current_time(), Some(1.1));
    }

    #[tokio::test]
    async fn test_seek_to_completes_immediately() {
        let mut seeker = FrameSequenceSeeker::new(frames()).with_latency(10);
        seeker.seek_to(1.0).await.unwrap();
        assert!(seeker.ready());
        assert_eq!(seeker.current_time(), Some(1.0));
    }

    #[tokio::test]
    async fn test_released_sequence_cannot_seek() {
        let mut seeker = FrameSequenceSeeker::new(frames());
        seeker.release();
        assert!(seeker.is_empty());
        assert!(seeker.seek_to(0.0).await.is_err());
        assert!(seeker.frame().is_none());
    }

    #[test]
    fn test_generated_frame_count() {
        let seeker = FrameSequenceSeeker::generated(2.0, 30, Size::new(4, 4));
        assert_eq!(seeker.len(), 60);
    }

    #[test]
    fn test_decode_size_fits_canvas() {
        let canvas = Size::new(1280, 720);
        assert_eq!(decode_size(None, canvas), canvas);
        assert_eq!(
            decode_size(Some(Size::new(3840, 2160)), canvas),
            Size::new(1280, 720)
        );
        assert_eq!(
            decode_size(Some(Size::new(640, 480)), canvas),
            Size::new(640, 480)
        );
        let portrait = decode_size(Some(Size::new(1080, 1920)), canvas);
        assert_eq!(portrait.height, 720);
        assert_eq!(portrait.width % 2, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_probe_respects_delay() {
        let backend = SyntheticVideoBackend::new(6.0).with_probe_delay(Duration::from_secs(10));
        let source = MediaSource::from_bytes(vec![0u8], None);
        let probe = backend.probe_duration(&source, Duration::from_secs(1));
        let result = tokio::time::timeout(Duration::from_secs(1), probe).await;
        assert!(result.is_err());
    }
}
