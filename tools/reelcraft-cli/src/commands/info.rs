//! Show the timeline a manifest produces.

use std::path::PathBuf;

use reelcraft_common::config::AppConfig;
use reelcraft_project_model::{estimate_file_size_mb, QualityTier};
use serde::Serialize;

#[derive(Serialize)]
struct ItemSummary {
    id: u64,
    kind: &'static str,
    label: String,
    start_secs: f64,
    duration_secs: f64,
    clips: usize,
}

#[derive(Serialize)]
struct ReelSummary {
    items: Vec<ItemSummary>,
    total_secs: f64,
    skipped: Vec<String>,
    estimated_mb: Vec<(&'static str, f64)>,
}

pub async fn run(config: &AppConfig, path: PathBuf, json: bool) -> anyhow::Result<()> {
    let reel = super::load_reel(config, &path).await?;
    let timeline = &reel.timeline;

    let mut start = 0.0;
    let items = timeline
        .items()
        .iter()
        .map(|item| {
            let duration = item.effective_duration();
            let summary = ItemSummary {
                id: item.id.0,
                kind: item.kind.as_str(),
                label: item.label(),
                start_secs: start,
                duration_secs: duration,
                clips: item.playback_clips().len(),
            };
            start += duration;
            summary
        })
        .collect();

    let total = timeline.total_duration();
    let summary = ReelSummary {
        items,
        total_secs: total,
        skipped: reel.report.skipped.clone(),
        estimated_mb: QualityTier::ALL
            .iter()
            .map(|tier| (tier.as_str(), estimate_file_size_mb(*tier, total)))
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Reel: {}", path.display());
    if let Some(context) = timeline.transition_context() {
        println!(
            "  Transition: {}",
            context.location.as_deref().unwrap_or("(no location)")
        );
    }
    println!();

    println!("Timeline:");
    for item in &summary.items {
        println!(
            "  [{:>3}] {:>7.2}s  {:<18} {:>6.2}s  {}",
            item.id, item.start_secs, item.kind, item.duration_secs, item.label
        );
        if item.clips > 1 {
            println!("        {} clips", item.clips);
        }
    }
    println!("  Total: {:.2}s", summary.total_secs);
    if timeline.is_empty() {
        println!("  (nothing to export: add at least one photo, video or title card)");
    }
    println!();

    println!("Estimated export size:");
    for (tier, mb) in &summary.estimated_mb {
        println!("  {tier:<7} {mb:>8.1} MiB");
    }

    Ok(())
}
