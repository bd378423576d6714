//! Export session management.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use reelcraft_common::clock::{RateController, TickSource};
use reelcraft_common::config::AppConfig;
use reelcraft_common::error::{ReelError, ReelResult};
use reelcraft_common::events::{EventBus, ReelEvent};
use reelcraft_processing_core::playback::{PlaybackClock, TickOutcome};
use reelcraft_processing_core::scheduler::{PlaybackMode, Scheduler};
use reelcraft_project_model::{
    ExportFormat, ExportSettings, QualityTier, Size, TimelineState, EXPORT_FPS,
};
use reelcraft_render_engine::{FrameRenderer, RenderStats};
use serde::Serialize;

use crate::artifact::ExportArtifact;
use crate::backend::EncoderBackend;
use crate::capture::CaptureStream;
use crate::pipeline::{select_codec, CodecCandidate, EncoderConfig, VideoEncoder, CODEC_CANDIDATES};

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress information.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportProgress {
    /// Fraction of the timeline captured, in `[0, 1]`.
    pub progress: f64,
    pub frames_captured: u64,
    /// Frames in one pass of the timeline.
    pub total_frames: u64,
    /// Capture time left until the timeline end.
    pub eta_secs: f64,
    pub stage: ExportStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Preparing,
    Recording,
    Finalizing,
    Complete,
    Failed,
}

/// How frames are painted during capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Wait for every source to settle before capturing its frame.
    #[default]
    Offline,
    /// Paint whatever is ready at each tick, like live playback.
    Realtime,
}

/// Options of one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub settings: ExportSettings,
    pub mode: CaptureMode,
    /// Longest wait for a source to settle in offline mode.
    pub settle_timeout: Duration,
    /// Progress notifications per second of capture time.
    pub progress_hz: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            settings: ExportSettings::default(),
            mode: CaptureMode::Offline,
            settle_timeout: Duration::from_secs(2),
            progress_hz: 4,
        }
    }
}

impl ExportOptions {
    /// Options from the `export` and `render` sections of the config.
    pub fn from_config(config: &AppConfig) -> ReelResult<Self> {
        let quality = config
            .export
            .quality
            .parse::<QualityTier>()
            .map_err(|message| ReelError::Config { message })?;
        let format = config
            .export
            .format
            .parse::<ExportFormat>()
            .map_err(|message| ReelError::Config { message })?;
        Ok(Self {
            settings: ExportSettings {
                quality,
                format,
                width: config.render.width,
                height: config.render.height,
                safety_margin_secs: config.export.safety_margin_secs,
            },
            ..Self::default()
        })
    }
}

/// State of an export session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No export running. Both the initial and the terminal state.
    Idle,
    /// Capturing frames.
    Recording,
}

/// Cancels a running export from outside the session.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Counters of a finished export, logged and written next to the artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ExportDiagnostics {
    pub backend: &'static str,
    pub codec: String,
    pub bitrate_bps: u64,
    pub width: u32,
    pub height: u32,
    pub total_secs: f64,
    /// Capture time when the encoder was stopped.
    pub capture_secs: f64,
    /// Distinct surface captures.
    pub frames_captured: u64,
    /// Frames submitted to the encoder, including repeats that kept the
    /// stream at a constant rate.
    pub frames_encoded: u64,
    pub repeated_frames: u64,
    pub render: RenderStats,
    pub chunk_count: usize,
    pub bytes: usize,
    pub wall_elapsed_secs: f64,
}

impl ExportDiagnostics {
    /// JSON report written next to exported files.
    pub fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "generated_at": Local::now().to_rfc3339(),
            "export": self,
        })
    }
}

/// Frames and chunks gathered while recording.
struct Recording {
    chunks: Vec<Vec<u8>>,
    frames_encoded: u64,
    repeated_frames: u64,
    capture_secs: f64,
}

/// Drives one pass of the timeline through the renderer into an encoder.
///
/// A session moves `Idle -> Recording -> Idle`. Every run either returns
/// an artifact or an error; in both cases the session is idle afterwards
/// and the capture stream has been released.
pub struct ExportSession<T: TickSource> {
    backend: Arc<dyn EncoderBackend>,
    ticker: T,
    events: EventBus,
    state: SessionState,
    abort_flag: Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
    diagnostics: Option<ExportDiagnostics>,
}

impl<T: TickSource> ExportSession<T> {
    pub fn new(backend: Arc<dyn EncoderBackend>, ticker: T, events: EventBus) -> Self {
        Self {
            backend,
            ticker,
            events,
            state: SessionState::Idle,
            abort_flag: Arc::new(AtomicBool::new(false)),
            progress: None,
            diagnostics: None,
        }
    }

    /// Receive progress updates while recording.
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ticker(&self) -> &T {
        &self.ticker
    }

    /// Handle that aborts the running (or next) export.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            flag: Arc::clone(&self.abort_flag),
        }
    }

    /// Request an abort; takes effect at the next captured frame.
    pub fn abort(&self) {
        self.abort_flag.store(true, Ordering::SeqCst);
    }

    /// Diagnostics of the last successful export.
    pub fn diagnostics(&self) -> Option<&ExportDiagnostics> {
        self.diagnostics.as_ref()
    }

    /// Codecs the backend can produce, in preference order.
    pub async fn available_codecs(&self) -> Vec<CodecCandidate> {
        let supported = self.backend.probe().await;
        CODEC_CANDIDATES
            .iter()
            .copied()
            .filter(|c| supported.contains(c))
            .collect()
    }

    /// Export one pass of `timeline`.
    ///
    /// Validation and encoder selection happen before anything is
    /// allocated. Failures are also delivered as `ExportFailed` events.
    pub async fn run(
        &mut self,
        timeline: &TimelineState,
        renderer: &mut FrameRenderer,
        options: &ExportOptions,
    ) -> ReelResult<ExportArtifact> {
        if self.state != SessionState::Idle {
            return Err(ReelError::invalid_state("Export already running"));
        }
        let result = self.export(timeline, renderer, options).await;
        self.state = SessionState::Idle;
        self.abort_flag.store(false, Ordering::SeqCst);

        if let Err(err) = &result {
            tracing::error!(class = ?err.class(), error = %err, "Export failed");
            self.report(ExportProgress {
                progress: 0.0,
                frames_captured: 0,
                total_frames: 0,
                eta_secs: 0.0,
                stage: ExportStage::Failed,
            });
            self.events.emit(ReelEvent::export_failed(err));
        }
        result
    }

    async fn export(
        &mut self,
        timeline: &TimelineState,
        renderer: &mut FrameRenderer,
        options: &ExportOptions,
    ) -> ReelResult<ExportArtifact> {
        let started = Instant::now();
        timeline.ensure_not_empty()?;
        let total_secs = timeline.total_duration();
        if !(total_secs.is_finite() && total_secs > 0.0) {
            return Err(ReelError::validation("Timeline has no playable duration"));
        }
        let canvas = renderer.canvas();
        if canvas.width == 0 || canvas.height == 0 || canvas.width % 2 != 0 || canvas.height % 2 != 0
        {
            return Err(ReelError::validation(format!(
                "Canvas {}x{} cannot be encoded (dimensions must be even)",
                canvas.width, canvas.height
            )));
        }

        let supported = self.backend.probe().await;
        let codec = select_codec(options.settings.format, &supported).ok_or_else(|| {
            ReelError::encoder_unavailable(format!(
                "{} backend supports none of the candidate codecs",
                self.backend.name()
            ))
        })?;
        let config = EncoderConfig::new(codec, canvas, options.settings.bitrate_bps());

        self.report(ExportProgress {
            progress: 0.0,
            frames_captured: 0,
            total_frames: 0,
            eta_secs: total_secs,
            stage: ExportStage::Preparing,
        });
        let mut encoder = self.backend.open(&config).await?;

        self.state = SessionState::Recording;
        tracing::info!(
            total_secs,
            backend = self.backend.name(),
            codec = %codec.label(),
            requested = %options.settings.format,
            bitrate_bps = config.bitrate_bps,
            mode = ?options.mode,
            "Export started"
        );
        self.events.emit(ReelEvent::ExportStarted {
            total_secs,
            container: codec.container.extension().to_string(),
            codec: codec.codec.to_string(),
            bitrate_bps: config.bitrate_bps,
        });

        let stats_before = renderer.stats();
        let mut stream = CaptureStream::new(canvas, config.fps);
        let mut chunks = encoder.drain_chunks();

        let recorded = self
            .record(
                timeline,
                renderer,
                options,
                total_secs,
                &mut stream,
                encoder.as_mut(),
                &mut chunks,
            )
            .await;
        stream.release();

        let recording = match recorded {
            Ok(recording) => recording,
            Err(err) => {
                encoder.abort().await;
                tracing::warn!(discarded_chunks = chunks.len(), "Buffered chunks discarded");
                chunks.clear();
                return Err(err);
            }
        };
        let Recording {
            mut chunks,
            frames_encoded,
            repeated_frames,
            capture_secs,
        } = recording;

        self.report(ExportProgress {
            progress: 1.0,
            frames_captured: stream.frames(),
            total_frames: total_frames(total_secs),
            eta_secs: 0.0,
            stage: ExportStage::Finalizing,
        });
        match encoder.finish().await {
            Ok(tail) => chunks.extend(tail),
            Err(err) => {
                tracing::warn!(discarded_chunks = chunks.len(), "Buffered chunks discarded");
                return Err(err);
            }
        }

        // Only now, after the stop condition, do the chunks become a file.
        let chunk_count = chunks.len();
        let bytes = chunks.concat();
        let artifact = ExportArtifact::new(bytes, codec, Local::now(), capture_secs, frames_encoded);

        let render = render_delta(stats_before, renderer.stats());
        let diagnostics = ExportDiagnostics {
            backend: self.backend.name(),
            codec: codec.label(),
            bitrate_bps: config.bitrate_bps,
            width: canvas.width,
            height: canvas.height,
            total_secs,
            capture_secs,
            frames_captured: stream.frames(),
            frames_encoded,
            repeated_frames,
            render,
            chunk_count,
            bytes: artifact.len(),
            wall_elapsed_secs: started.elapsed().as_secs_f64(),
        };
        tracing::info!(
            frames_captured = diagnostics.frames_captured,
            frames_encoded,
            stale_frames = render.stale_frames,
            chunks = chunk_count,
            bytes = artifact.len(),
            capture_secs,
            elapsed_secs = diagnostics.wall_elapsed_secs,
            file = %artifact.file_name,
            "Export finished"
        );
        self.diagnostics = Some(diagnostics);

        self.report(ExportProgress {
            progress: 1.0,
            frames_captured: stream.frames(),
            total_frames: total_frames(total_secs),
            eta_secs: 0.0,
            stage: ExportStage::Complete,
        });
        self.events.emit(ReelEvent::ExportProgress { percent: 100 });
        self.events.emit(ReelEvent::ExportCompleted {
            file_name: artifact.file_name.clone(),
            bytes: artifact.len(),
        });
        Ok(artifact)
    }

    /// Capture until one full pass is done and the safety margin has
    /// elapsed. Frames are painted in strictly increasing timeline order.
    #[allow(clippy::too_many_arguments)]
    async fn record(
        &mut self,
        timeline: &TimelineState,
        renderer: &mut FrameRenderer,
        options: &ExportOptions,
        total_secs: f64,
        stream: &mut CaptureStream,
        encoder: &mut dyn VideoEncoder,
        chunks: &mut Vec<Vec<u8>>,
    ) -> ReelResult<Recording> {
        let margin = options.settings.safety_margin();
        let fps = stream.fps() as f64;
        let total_frames = total_frames(total_secs);
        let scheduler = Scheduler::new(PlaybackMode::Export);
        let mut clock = PlaybackClock::new(total_secs, false);
        let mut rate = RateController::new(options.progress_hz);
        let mut frames_encoded = 0u64;
        let mut repeated_frames = 0u64;
        let mut pass_complete = false;
        let start = self.ticker.now();

        clock.play();
        loop {
            if self.abort_flag.load(Ordering::SeqCst) {
                return Err(ReelError::runtime_capture("Export aborted"));
            }
            let elapsed = self.ticker.now().saturating_sub(start);
            let capture_secs = elapsed.as_secs_f64();

            // The final frame stays on the surface through the margin.
            if !pass_complete {
                let resolution = scheduler.resolve(timeline, clock.time());
                match options.mode {
                    CaptureMode::Offline => {
                        renderer
                            .render_settled(timeline, resolution.as_ref(), options.settle_timeout)
                            .await;
                    }
                    CaptureMode::Realtime => {
                        renderer.render(timeline, resolution.as_ref());
                    }
                }
            }

            // Keep the stream at a constant rate when paints fall behind.
            let frames_due = (capture_secs * fps).round() as u64 + 1;
            let frame = stream.capture(renderer.frame(), capture_secs)?;
            loop {
                encoder.push_frame(frame).await?;
                frames_encoded += 1;
                if frames_encoded >= frames_due {
                    break;
                }
                repeated_frames += 1;
            }
            chunks.extend(encoder.drain_chunks());

            if rate.should_tick(elapsed.as_nanos() as u64) {
                let progress = (capture_secs / total_secs).clamp(0.0, 1.0);
                self.events.emit(ReelEvent::ExportProgress {
                    percent: (progress * 100.0).floor() as u8,
                });
                self.report(ExportProgress {
                    progress,
                    frames_captured: stream.frames(),
                    total_frames,
                    eta_secs: (total_secs - capture_secs).max(0.0),
                    stage: ExportStage::Recording,
                });
            }

            if pass_complete && capture_secs >= total_secs + margin {
                tracing::debug!(capture_secs, margin, "Stop condition reached");
                return Ok(Recording {
                    chunks: std::mem::take(chunks),
                    frames_encoded,
                    repeated_frames,
                    capture_secs,
                });
            }

            let dt = self.ticker.next_tick().await;
            if clock.tick(dt.as_secs_f64()) == TickOutcome::Completed {
                pass_complete = true;
                tracing::debug!(total_secs, "Timeline pass completed");
            }
        }
    }

    fn report(&self, progress: ExportProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }
}

fn total_frames(total_secs: f64) -> u64 {
    (total_secs * EXPORT_FPS as f64).ceil() as u64
}

fn render_delta(before: RenderStats, after: RenderStats) -> RenderStats {
    RenderStats {
        frames_painted: after.frames_painted.saturating_sub(before.frames_painted),
        stale_frames: after.stale_frames.saturating_sub(before.stale_frames),
        pending_seeks: after.pending_seeks.saturating_sub(before.pending_seeks),
        empty_frames: after.empty_frames.saturating_sub(before.empty_frames),
        settle_timeouts: after.settle_timeouts.saturating_sub(before.settle_timeouts),
    }
}

/// Even canvas size for `settings`.
pub fn export_canvas(settings: &ExportSettings) -> Size {
    let (width, height) = settings.even_dimensions();
    Size::new(width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = AppConfig::default();
        config.export.quality = "ultra".into();
        config.export.format = "mp4".into();
        let options = ExportOptions::from_config(&config).unwrap();
        assert_eq!(options.settings.bitrate_bps(), 20_000_000);
        assert_eq!(options.settings.format, ExportFormat::Mp4);
        assert_eq!(options.mode, CaptureMode::Offline);

        config.export.quality = "extreme".into();
        assert!(matches!(
            ExportOptions::from_config(&config),
            Err(ReelError::Config { .. })
        ));
    }

    #[test]
    fn test_total_frames_rounds_up() {
        assert_eq!(total_frames(8.0), 240);
        assert_eq!(total_frames(1.01), 31);
    }

    #[test]
    fn test_render_delta() {
        let before = RenderStats {
            frames_painted: 10,
            stale_frames: 2,
            ..RenderStats::default()
        };
        let after = RenderStats {
            frames_painted: 25,
            stale_frames: 2,
            settle_timeouts: 1,
            ..RenderStats::default()
        };
        let delta = render_delta(before, after);
        assert_eq!(delta.frames_painted, 15);
        assert_eq!(delta.stale_frames, 0);
        assert_eq!(delta.settle_timeouts, 1);
    }

    #[test]
    fn test_export_canvas_is_even() {
        let settings = ExportSettings {
            width: 641,
            height: 361,
            ..ExportSettings::default()
        };
        assert_eq!(export_canvas(&settings), Size::new(640, 360));
    }
}
