//! Render still frames of a reel, optionally playing it in real time.

use std::path::PathBuf;
use std::time::Duration;

use reelcraft_common::clock::RealtimeTicker;
use reelcraft_common::config::AppConfig;
use reelcraft_render_engine::{FrameStatus, PreviewPlayer};

const SNAPSHOT_WAIT: Duration = Duration::from_secs(5);

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    at: Vec<f64>,
    output: PathBuf,
    play: Option<f64>,
) -> anyhow::Result<()> {
    let reel = super::load_reel(config, &path).await?;
    let timeline = reel.timeline;
    let total = timeline.total_duration();

    std::fs::create_dir_all(&output)?;
    let ticker = RealtimeTicker::new(Duration::from_millis(config.playback.tick_ms));
    let mut player = PreviewPlayer::new(
        reel.renderer,
        ticker,
        &timeline,
        config.playback.loop_preview,
    );

    for t in at {
        if !t.is_finite() {
            eprintln!("  skipping non-finite time {t}");
            continue;
        }
        let status = player.snapshot(&timeline, t, SNAPSHOT_WAIT).await;
        let file = output.join(format!("frame-{:08.3}.png", t.clamp(0.0, total)));
        match status {
            FrameStatus::Empty => {
                println!("  {t:>8.3}s  (empty timeline)");
                continue;
            }
            FrameStatus::Stale { item_id } => {
                println!("  {t:>8.3}s  {item_id}: decoder did not settle, showing last frame");
            }
            FrameStatus::Painted { item_id } => {
                println!("  {t:>8.3}s  {item_id}");
            }
        }
        player.renderer().frame().save(&file)?;
        println!("             -> {}", file.display());
    }

    if let Some(secs) = play {
        println!();
        println!("Playing {secs:.1}s of preview...");
        player.reset(&timeline);
        let report = player.run_for(&timeline, secs).await;
        println!(
            "  ticks: {}  painted: {}  stale: {}  wraps: {}  final: {:.2}s",
            report.ticks, report.painted, report.stale, report.wraps, report.final_time
        );
    }

    Ok(())
}
