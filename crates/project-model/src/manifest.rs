//! JSON manifest describing a reel to build.
//!
//! A manifest is read-only input: each entry becomes an `Insert` command
//! followed by edit commands, all validated by [`TimelineState`].
//!
//! [`TimelineState`]: crate::timeline::TimelineState

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::export::ExportSettings;
use crate::media::{
    FocalPoint, ItemId, KenBurns, MediaItem, MediaKind, MediaSource, TextOverlay,
    DEFAULT_CARD_DURATION_SECS, DEFAULT_IMAGE_DURATION_SECS,
};
use crate::theme::{ThemeTokens, TransitionContext};
use crate::timeline::TimelineCommand;

/// Kind of a manifest entry. Logo and transition are not listed as entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Image,
    Video,
    TitleCard,
}

impl From<EntryKind> for MediaKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Image => MediaKind::Image,
            EntryKind::Video => MediaKind::Video,
            EntryKind::TitleCard => MediaKind::TitleCard,
        }
    }
}

/// One item of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub kind: EntryKind,

    /// Source file, relative to the manifest directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub duration_secs: Option<f64>,

    /// `[start, end]` pairs in source seconds.
    #[serde(default)]
    pub clips: Vec<[f64; 2]>,

    /// `[x, y]` pairs in percent.
    #[serde(default)]
    pub focal_points: Vec<[f64; 2]>,

    #[serde(default)]
    pub ken_burns: Option<KenBurns>,

    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,

    #[serde(default)]
    pub title: Option<String>,
}

impl ManifestEntry {
    /// Whether this entry needs a source file.
    pub fn needs_source(&self) -> bool {
        matches!(self.kind, EntryKind::Image | EntryKind::Video)
    }

    /// Build the item to insert. Video entries need the probed source
    /// duration; edits are applied afterwards via [`Self::edit_commands`].
    pub fn base_item(
        &self,
        source: Option<MediaSource>,
        source_duration_secs: Option<f64>,
    ) -> Result<MediaItem, ManifestError> {
        match (self.kind, source) {
            (EntryKind::Image, Some(source)) => Ok(MediaItem::image(
                source,
                self.duration_secs.unwrap_or(DEFAULT_IMAGE_DURATION_SECS),
            )),
            (EntryKind::Video, Some(source)) => {
                let duration = source_duration_secs.ok_or_else(|| {
                    ManifestError::Invalid(format!("{} has no known duration", source.label()))
                })?;
                Ok(MediaItem::video(source, duration))
            }
            (EntryKind::TitleCard, _) => Ok(MediaItem::title_card(
                self.title.clone().unwrap_or_default(),
                self.duration_secs.unwrap_or(DEFAULT_CARD_DURATION_SECS),
            )),
            (kind, None) => Err(ManifestError::Invalid(format!(
                "{kind:?} entry requires a path"
            ))),
        }
    }

    /// Edit commands applied after the item was inserted as `item_id`.
    pub fn edit_commands(&self, item_id: ItemId) -> Vec<TimelineCommand> {
        let mut commands = vec![];
        for [start, end] in &self.clips {
            commands.push(TimelineCommand::AddClip {
                item_id,
                start_secs: *start,
                end_secs: *end,
            });
        }
        if self.kind == EntryKind::Image {
            for (index, [x, y]) in self.focal_points.iter().enumerate() {
                commands.push(TimelineCommand::SetFocalPoint {
                    item_id,
                    index,
                    point: Some(FocalPoint::new(*x, *y)),
                });
            }
            if let Some(ken_burns) = self.ken_burns {
                commands.push(TimelineCommand::SetKenBurns { item_id, ken_burns });
            }
        }
        for overlay in &self.text_overlays {
            commands.push(TimelineCommand::SetOverlay {
                item_id,
                index: None,
                overlay: overlay.clone(),
            });
        }
        commands
    }
}

/// Top-level manifest document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub theme: ThemeTokens,
    pub transition: Option<TransitionContext>,
    /// Logo bitmap for the closing card.
    pub logo: Option<PathBuf>,
    pub export: Option<ExportSettings>,
    pub items: Vec<ManifestEntry>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Manifest {
    /// Load a manifest from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ManifestError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut manifest: Manifest =
            serde_json::from_str(&json).map_err(|e| ManifestError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;
        manifest.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(manifest)
    }

    /// Resolve a manifest-relative path.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// Errors that can occur when reading a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid manifest entry: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::KenBurnsVariant;

    const SAMPLE: &str = r##"{
        "theme": { "id": "ocean", "background": "#003355" },
        "transition": { "location": "Lisbon" },
        "items": [
            { "kind": "image", "path": "a.jpg", "duration_secs": 4,
              "focal_points": [[80, 20]],
              "ken_burns": { "enabled": true, "variant": "zoom_in" } },
            { "kind": "video", "path": "b.mp4", "clips": [[0, 2.5], [4, 6]] },
            { "kind": "title_card", "title": "The End" }
        ]
    }"##;

    #[test]
    fn test_parse_sample() {
        let manifest: Manifest = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(manifest.items.len(), 3);
        assert_eq!(manifest.theme.id, "ocean");
        assert!(manifest.transition.unwrap().requires_transition());
        assert_eq!(
            manifest.items[0].ken_burns,
            Some(KenBurns::enabled(KenBurnsVariant::ZoomIn))
        );
    }

    #[test]
    fn test_edit_commands_for_image() {
        let manifest: Manifest = serde_json::from_str(SAMPLE).unwrap();
        let commands = manifest.items[0].edit_commands(ItemId(9));
        let names: Vec<_> = commands.iter().map(TimelineCommand::name).collect();
        assert_eq!(names, vec!["set_focal_point", "set_ken_burns"]);
    }

    #[test]
    fn test_video_entry_requires_duration() {
        let manifest: Manifest = serde_json::from_str(SAMPLE).unwrap();
        let source = MediaSource::from_bytes(vec![0u8; 8], None);
        assert!(manifest.items[1].base_item(Some(source.clone()), None).is_err());
        let item = manifest.items[1].base_item(Some(source), Some(8.0)).unwrap();
        assert_eq!(item.kind, MediaKind::Video);
        assert_eq!(manifest.items[1].edit_commands(item.id).len(), 2);
    }

    #[test]
    fn test_image_entry_without_path_is_invalid() {
        let entry = ManifestEntry {
            kind: EntryKind::Image,
            path: None,
            duration_secs: None,
            clips: vec![],
            focal_points: vec![],
            ken_burns: None,
            text_overlays: vec![],
            title: None,
        };
        assert!(entry.needs_source());
        assert!(matches!(
            entry.base_item(None, None),
            Err(ManifestError::Invalid(_))
        ));
    }

    #[test]
    fn test_resolve_relative_paths() {
        let manifest = Manifest {
            base_dir: PathBuf::from("/trips/2026"),
            ..Default::default()
        };
        assert_eq!(
            manifest.resolve(Path::new("a.jpg")),
            PathBuf::from("/trips/2026/a.jpg")
        );
        assert_eq!(
            manifest.resolve(Path::new("/abs/b.mp4")),
            PathBuf::from("/abs/b.mp4")
        );
    }
}
