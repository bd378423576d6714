pub mod check;
pub mod export;
pub mod info;
pub mod preview;

use std::path::Path;
use std::sync::Arc;

use reelcraft_common::config::AppConfig;
use reelcraft_common::events::{EventBus, ReelEvent};
use reelcraft_project_model::{Manifest, TimelineState};
use reelcraft_render_engine::{
    ingest_manifest, FfmpegVideoBackend, FrameRenderer, IngestReport, SyntheticVideoBackend,
    VideoBackend,
};

/// A manifest turned into a timeline plus a renderer ready to paint it.
pub struct LoadedReel {
    pub manifest: Manifest,
    pub timeline: TimelineState,
    pub renderer: FrameRenderer,
    pub report: IngestReport,
    pub events: EventBus,
}

/// ffmpeg-backed video decoding when available, generated frames otherwise.
pub fn video_backend(config: &AppConfig) -> Arc<dyn VideoBackend> {
    let ffmpeg = FfmpegVideoBackend::new(&config.export.ffmpeg_path, &config.media.ffprobe_path);
    if ffmpeg.is_available() {
        Arc::new(ffmpeg)
    } else {
        tracing::warn!(
            ffmpeg = %config.export.ffmpeg_path,
            ffprobe = %config.media.ffprobe_path,
            "ffmpeg/ffprobe not found; video items render as generated frames"
        );
        Arc::new(SyntheticVideoBackend::new(
            config.media.fallback_video_duration_secs,
        ))
    }
}

/// Load `path`, ingest its media and build a renderer for `config`'s canvas.
pub async fn load_reel(config: &AppConfig, path: &Path) -> anyhow::Result<LoadedReel> {
    let manifest =
        Manifest::load(path).map_err(|e| anyhow::anyhow!("Failed to load manifest: {e}"))?;

    let events = EventBus::new();
    events.subscribe(|event| match event {
        ReelEvent::MediaLoadWarning {
            item_id,
            source,
            message,
            substituted_secs,
        } => {
            eprintln!(
                "  warning: item {item_id} ({source}): {message} (using {substituted_secs:.1}s)"
            );
        }
        ReelEvent::CommandRejected { .. } => {
            tracing::debug!(?event, "Edit rejected");
        }
        _ => {}
    });

    let mut renderer = FrameRenderer::from_config(
        config,
        video_backend(config),
        manifest.theme.clone(),
        events.clone(),
    );
    let (timeline, report) = ingest_manifest(&manifest, renderer.cache_mut(), events.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to build timeline: {e}"))?;

    for skipped in &report.skipped {
        eprintln!("  skipped: {skipped}");
    }
    for rejected in &report.rejected_edits {
        eprintln!("  rejected: {rejected}");
    }

    Ok(LoadedReel {
        manifest,
        timeline,
        renderer,
        report,
        events,
    })
}
