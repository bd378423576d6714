//! Export a reel to a video file.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use reelcraft_capture_engine::{
    detect_best_backend, export_canvas, CaptureMode, ExportArtifact, ExportOptions,
    ExportProgress, ExportSession, ExportStage,
};
use reelcraft_common::clock::{RealtimeTicker, TickSource, VirtualTicker};
use reelcraft_common::config::AppConfig;
use reelcraft_common::error::ReelResult;
use reelcraft_project_model::{ExportFormat, QualityTier, EXPORT_FPS};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    mut config: AppConfig,
    path: PathBuf,
    output: Option<PathBuf>,
    quality: Option<String>,
    format: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    realtime: bool,
) -> anyhow::Result<()> {
    println!("Exporting reel: {}", path.display());

    let mut options = ExportOptions::from_config(&config)?;

    // Manifest settings override the config; flags override both.
    let manifest = reelcraft_project_model::Manifest::load(&path)
        .map_err(|e| anyhow::anyhow!("Failed to load manifest: {e}"))?;
    if let Some(settings) = manifest.export {
        options.settings = settings;
    }
    if let Some(quality) = quality {
        options.settings.quality = quality
            .parse::<QualityTier>()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    if let Some(format) = format {
        options.settings.format = format
            .parse::<ExportFormat>()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    if let Some(width) = width {
        options.settings.width = width;
    }
    if let Some(height) = height {
        options.settings.height = height;
    }
    if realtime {
        options.mode = CaptureMode::Realtime;
    }

    // The renderer paints at the export canvas.
    let canvas = export_canvas(&options.settings);
    config.render.width = canvas.width;
    config.render.height = canvas.height;

    let reel = super::load_reel(&config, &path).await?;
    let mut renderer = reel.renderer;

    let Some(backend) = detect_best_backend(&config.export.ffmpeg_path) else {
        return Err(anyhow::anyhow!(
            "No encoder available: install ffmpeg or set export.ffmpeg_path"
        ));
    };

    println!("  Quality: {}", options.settings.quality);
    println!("  Format: {} (preferred)", options.settings.format);
    println!("  Resolution: {}x{}", canvas.width, canvas.height);
    println!("  Duration: {:.2}s", reel.timeline.total_duration());

    let progress_cb = Box::new(|p: ExportProgress| {
        if p.stage == ExportStage::Recording {
            print!(
                "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
                p.progress * 100.0,
                p.frames_captured,
                p.total_frames,
                p.eta_secs,
            );
            std::io::stdout().flush().ok();
        }
    });

    let result = match options.mode {
        CaptureMode::Offline => {
            let session = ExportSession::new(
                Arc::clone(&backend),
                VirtualTicker::from_hz(EXPORT_FPS),
                reel.events.clone(),
            )
            .on_progress(progress_cb);
            run_session(session, &reel.timeline, &mut renderer, &options).await
        }
        CaptureMode::Realtime => {
            let session = ExportSession::new(
                Arc::clone(&backend),
                RealtimeTicker::from_hz(EXPORT_FPS),
                reel.events.clone(),
            )
            .on_progress(progress_cb);
            run_session(session, &reel.timeline, &mut renderer, &options).await
        }
    };

    let (artifact, report) = export_outcome(result)?;

    let dir = output.unwrap_or_else(|| config.exports_dir.clone());
    let saved = artifact.save_to(&dir)?;
    println!("\nExport complete: {}", saved.display());
    println!(
        "  {} ({}), {:.1} MiB, {} frames",
        artifact.codec,
        artifact.mime,
        artifact.len() as f64 / (1024.0 * 1024.0),
        artifact.frames
    );

    if let Some(report) = report {
        let report_path = saved.with_extension("report.json");
        std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
        println!("  Report: {}", report_path.display());
    }

    Ok(())
}

/// A failed session becomes the command's error so the process exits
/// non-zero.
fn export_outcome<T>(result: ReelResult<T>) -> anyhow::Result<T> {
    result.map_err(|e| {
        println!();
        anyhow::anyhow!("Export failed: {e}")
    })
}

async fn run_session<T: TickSource>(
    mut session: ExportSession<T>,
    timeline: &reelcraft_project_model::TimelineState,
    renderer: &mut reelcraft_render_engine::FrameRenderer,
    options: &ExportOptions,
) -> ReelResult<(ExportArtifact, Option<serde_json::Value>)> {
    let abort = session.abort_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nAborting export...");
            abort.abort();
        }
    });

    let result = session.run(timeline, renderer, options).await;
    watcher.abort();

    let artifact = result?;
    let report = session.diagnostics().map(|d| d.report());
    Ok((artifact, report))
}
