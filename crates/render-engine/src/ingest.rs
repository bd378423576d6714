//! Ingestion: turning source files into timeline items.
//!
//! Photos are decoded once here (for the thumbnail) and the bitmap is
//! handed to the media cache. Videos get their native duration probed with
//! a bounded wait.

use std::sync::Arc;

use image::RgbaImage;
use reelcraft_common::error::{ReelError, ReelResult};
use reelcraft_common::events::EventBus;
use reelcraft_project_model::{
    CommandOutcome, EntryKind, ItemId, Manifest, MediaItem, MediaSource, TimelineCommand,
    TimelineState,
};

use crate::media_cache::{make_thumbnail, MediaCache};

/// An image item ready for insertion plus its decoded bitmap.
pub struct IngestedImage {
    pub item: MediaItem,
    pub bitmap: Option<Arc<RgbaImage>>,
}

/// Build an image item, decoding it for the thumbnail. An undecodable
/// image is still returned; it renders as a placeholder.
pub fn ingest_image(cache: &MediaCache, source: MediaSource, duration_secs: f64) -> IngestedImage {
    match cache.decode(&source) {
        Ok(bitmap) => {
            let thumbnail = make_thumbnail(&bitmap);
            IngestedImage {
                item: MediaItem::image(source, duration_secs).with_thumbnail(thumbnail),
                bitmap: Some(Arc::new(bitmap)),
            }
        }
        Err(err) => {
            tracing::warn!(source = %source.label(), error = %err, "Image could not be decoded");
            IngestedImage {
                item: MediaItem::image(source, duration_secs),
                bitmap: None,
            }
        }
    }
}

/// A video item ready for insertion. A failed duration lookup is kept so
/// it can be reported once the item has an id.
pub struct IngestedVideo {
    pub item: MediaItem,
    pub duration_error: Option<ReelError>,
}

/// Build a video item with its probed (or fallback) duration.
pub async fn ingest_video(cache: &MediaCache, source: MediaSource) -> IngestedVideo {
    match cache.query_video_duration(&source).await {
        Ok(secs) => IngestedVideo {
            item: MediaItem::video(source, secs),
            duration_error: None,
        },
        Err(err) => IngestedVideo {
            item: MediaItem::video(source, cache.defaults().fallback_video_duration_secs),
            duration_error: Some(err),
        },
    }
}

/// What happened while ingesting a manifest.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub inserted: Vec<ItemId>,
    /// Entries that were skipped, with the reason.
    pub skipped: Vec<String>,
    /// Edits rejected on otherwise valid entries.
    pub rejected_edits: Vec<String>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.rejected_edits.is_empty()
    }
}

/// Build a timeline from a manifest.
///
/// Entries that are structurally unusable (missing files, missing paths)
/// are reported and skipped; edits with bad numbers go through the
/// timeline's clamping and validation like any other command.
pub async fn ingest_manifest(
    manifest: &Manifest,
    cache: &mut MediaCache,
    events: EventBus,
) -> ReelResult<(TimelineState, IngestReport)> {
    let logo = match &manifest.logo {
        Some(path) => {
            let path = manifest.resolve(path);
            match MediaSource::from_path(&path) {
                Ok(source) => Some(source),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "Logo not loaded");
                    None
                }
            }
        }
        None => None,
    };

    let mut timeline = TimelineState::new(events, logo);
    let mut report = IngestReport::default();

    if let Some(context) = &manifest.transition {
        timeline.apply(TimelineCommand::SetTransitionContext {
            context: Some(context.clone()),
        })?;
    }

    for (n, entry) in manifest.items.iter().enumerate() {
        let source = match (&entry.path, entry.needs_source()) {
            (Some(path), true) => {
                let path = manifest.resolve(path);
                match MediaSource::from_path(&path) {
                    Ok(source) => Some(source),
                    Err(err) => {
                        report
                            .skipped
                            .push(format!("entry {n}: {}: {err}", path.display()));
                        continue;
                    }
                }
            }
            (None, true) => {
                report.skipped.push(format!("entry {n}: {:?} requires a path", entry.kind));
                continue;
            }
            (_, false) => None,
        };

        let mut bitmap = None;
        let mut duration_failure = None;
        let item = match (entry.kind, source) {
            (EntryKind::Image, Some(source)) => {
                let duration = entry
                    .duration_secs
                    .unwrap_or(cache.defaults().image_duration_secs);
                let ingested = ingest_image(cache, source, duration);
                bitmap = ingested.bitmap;
                Ok(ingested.item)
            }
            (EntryKind::Video, Some(source)) => {
                let label = source.label();
                let ingested = ingest_video(cache, source).await;
                duration_failure = ingested.duration_error.map(|err| (label, err));
                Ok(ingested.item)
            }
            (_, source) => entry.base_item(source, None),
        };
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                report.skipped.push(format!("entry {n}: {err}"));
                continue;
            }
        };

        let item_id = match timeline.apply(TimelineCommand::Insert { item, index: None }) {
            Ok(CommandOutcome::Inserted(id)) => id,
            Ok(_) => continue,
            Err(err) => {
                report.skipped.push(format!("entry {n}: {err}"));
                continue;
            }
        };
        if let Some(bitmap) = bitmap {
            cache.adopt_bitmap(item_id, bitmap);
        }
        if let Some((label, err)) = duration_failure {
            cache.substitute_video_duration(item_id, &label, &err);
        }
        report.inserted.push(item_id);

        for command in entry.edit_commands(item_id) {
            let name = command.name();
            if let Err(err) = timeline.apply(command) {
                report
                    .rejected_edits
                    .push(format!("entry {n}: {name}: {err}"));
            }
        }
    }

    tracing::info!(
        items = timeline.len(),
        inserted = report.inserted.len(),
        skipped = report.skipped.len(),
        total_secs = timeline.total_duration(),
        "Manifest ingested"
    );
    Ok((timeline, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::SyntheticVideoBackend;
    use image::{ImageFormat, Rgba};
    use reelcraft_common::events::ReelEvent;
    use reelcraft_common::config::MediaDefaults;
    use reelcraft_project_model::{ManifestEntry, MediaKind, Size, TransitionContext};
    use std::path::PathBuf;

    fn cache() -> MediaCache {
        MediaCache::new(
            Size::new(64, 36),
            MediaDefaults::default(),
            Arc::new(SyntheticVideoBackend::new(6.0)),
            EventBus::new(),
        )
    }

    fn entry(kind: EntryKind, path: Option<&str>) -> ManifestEntry {
        ManifestEntry {
            kind,
            path: path.map(PathBuf::from),
            duration_secs: None,
            clips: vec![],
            focal_points: vec![],
            ken_burns: None,
            text_overlays: vec![],
            title: None,
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reelcraft-ingest-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_ingest_image_builds_thumbnail() {
        let cache = cache();
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(400, 200, Rgba([1, 2, 3, 255]))
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let ingested = ingest_image(&cache, MediaSource::from_bytes(bytes, None), 3.0);
        let thumb = ingested.item.thumbnail.unwrap();
        assert_eq!((thumb.width, thumb.height), (160, 80));
        assert!(ingested.bitmap.is_some());
    }

    #[tokio::test]
    async fn test_manifest_ingestion() {
        let dir = scratch_dir("manifest");
        let photo = dir.join("photo.png");
        RgbaImage::from_pixel(40, 20, Rgba([9, 9, 9, 255]))
            .save(&photo)
            .unwrap();
        std::fs::write(dir.join("clip.mp4"), b"not really a video").unwrap();

        let mut video = entry(EntryKind::Video, Some("clip.mp4"));
        video.clips = vec![[1.0, 3.0], [4.0, 9.0]];
        let mut title = entry(EntryKind::TitleCard, None);
        title.title = Some("Road trip".into());

        let manifest = Manifest {
            transition: Some(TransitionContext {
                location: Some("Porto".into()),
                theme_id: None,
            }),
            items: vec![
                title,
                entry(EntryKind::Image, Some("photo.png")),
                video,
                entry(EntryKind::Image, Some("missing.png")),
                entry(EntryKind::Video, None),
            ],
            base_dir: dir.clone(),
            ..Manifest::default()
        };

        let mut cache = cache();
        let (timeline, report) = ingest_manifest(&manifest, &mut cache, EventBus::new())
            .await
            .unwrap();

        let kinds: Vec<MediaKind> = timeline.items().iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MediaKind::TransitionSegment,
                MediaKind::TitleCard,
                MediaKind::Image,
                MediaKind::Video,
                MediaKind::LogoCard,
            ]
        );
        assert_eq!(report.inserted.len(), 3);
        assert_eq!(report.skipped.len(), 2);
        // Second clip is clamped to the 6 s source.
        assert!(report.rejected_edits.is_empty());
        assert!((timeline.items()[3].effective_duration() - 4.0).abs() < 1e-9);
        assert!(cache.contains(timeline.items()[2].id));

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_warning_names_the_inserted_item() {
        let dir = scratch_dir("duration-warning");
        std::fs::write(dir.join("slow.mp4"), b"not really a video").unwrap();
        let manifest = Manifest {
            items: vec![entry(EntryKind::Video, Some("slow.mp4"))],
            base_dir: dir.clone(),
            ..Manifest::default()
        };

        let events = EventBus::new();
        let log = events.collector();
        let mut defaults = MediaDefaults::default();
        defaults.probe_timeout_secs = 1.0;
        defaults.fallback_video_duration_secs = 7.0;
        let mut cache = MediaCache::new(
            Size::new(64, 36),
            defaults,
            Arc::new(SyntheticVideoBackend::new(12.0).with_probe_delay(std::time::Duration::from_secs(30))),
            events.clone(),
        );
        let (timeline, report) = ingest_manifest(&manifest, &mut cache, events)
            .await
            .unwrap();

        let video_id = report.inserted[0];
        assert_ne!(video_id, ItemId::UNASSIGNED);
        assert!((timeline.get(video_id).unwrap().effective_duration() - 7.0).abs() < 1e-9);
        let warnings: Vec<ReelEvent> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ReelEvent::MediaLoadWarning { .. }))
            .cloned()
            .collect();
        match warnings.as_slice() {
            [ReelEvent::MediaLoadWarning {
                item_id,
                source,
                substituted_secs,
                ..
            }] => {
                assert_eq!(*item_id, video_id.0);
                assert!(source.ends_with("slow.mp4"), "{source}");
                assert_eq!(*substituted_secs, 7.0);
            }
            other => panic!("unexpected warnings {other:?}"),
        }

        std::fs::remove_dir_all(dir).ok();
    }
}
