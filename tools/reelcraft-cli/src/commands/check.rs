//! Check encoder and decoder availability.

use reelcraft_capture_engine::{EncoderBackend, FfmpegBackend, CODEC_CANDIDATES};
use reelcraft_common::config::AppConfig;
use reelcraft_render_engine::ffmpeg::command_exists;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Reelcraft System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = &config.export.ffmpeg_path;
    let ffprobe = &config.media.ffprobe_path;

    if command_exists(ffprobe) {
        println!("[OK] ffprobe: {ffprobe}");
    } else {
        println!("[WARN] ffprobe not found: {ffprobe}");
        println!(
            "       Video durations fall back to {:.1}s",
            config.media.fallback_video_duration_secs
        );
    }

    let backend = FfmpegBackend::new(ffmpeg.as_str());
    if !backend.is_available() {
        println!("[FAIL] ffmpeg not found: {ffmpeg}");
        println!();
        println!("Export is unavailable. Install ffmpeg or set export.ffmpeg_path.");
        return Ok(());
    }
    println!("[OK] ffmpeg: {ffmpeg}");

    let supported = backend.probe().await;
    println!();
    println!("Codecs (in preference order):");
    for candidate in CODEC_CANDIDATES.iter() {
        let available = supported.contains(candidate);
        println!(
            "  [{}] {:<12} {}",
            if available { "OK" } else { "--" },
            candidate.label(),
            candidate.encoder
        );
    }

    println!();
    if supported.is_empty() {
        println!("ffmpeg has none of the supported encoders. Export is unavailable.");
    } else {
        println!("Export is available ({} codecs).", supported.len());
    }

    Ok(())
}
