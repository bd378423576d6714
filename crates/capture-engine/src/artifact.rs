//! The finished export.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use reelcraft_common::error::{ReelError, ReelResult};
use reelcraft_project_model::ExportFormat;
use serde::Serialize;

use crate::pipeline::CodecCandidate;

/// Attempts at finding a free file name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A complete encoded reel, held in memory until saved.
#[derive(Debug, Clone, Serialize)]
pub struct ExportArtifact {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Container actually produced (may differ from the requested one).
    pub container: ExportFormat,
    pub codec: String,
    pub mime: String,
    pub file_name: String,
    /// Captured duration, including the safety margin.
    pub duration_secs: f64,
    pub frames: u64,
}

impl ExportArtifact {
    pub fn new(
        bytes: Vec<u8>,
        codec: CodecCandidate,
        created: DateTime<Local>,
        duration_secs: f64,
        frames: u64,
    ) -> Self {
        Self {
            bytes,
            container: codec.container,
            codec: codec.codec.to_string(),
            mime: codec.mime(),
            file_name: file_name_for(codec.container, created),
            duration_secs,
            frames,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the artifact into `dir`, adding a numeric suffix when the
    /// name is taken. Returns the written path.
    pub fn save_to(&self, dir: &Path) -> ReelResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let (stem, ext) = self
            .file_name
            .rsplit_once('.')
            .unwrap_or((self.file_name.as_str(), self.container.extension()));

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}-{attempt}.{ext}")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&self.bytes)?;
                    file.sync_all()?;
                    tracing::info!(path = %path.display(), bytes = self.bytes.len(), "Reel saved");
                    return Ok(path);
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(ReelError::invalid_state(format!(
            "no free file name for {} in {}",
            self.file_name,
            dir.display()
        )))
    }
}

/// `reel-YYYYMMDD-HHMMSS.<ext>`
pub fn file_name_for(container: ExportFormat, created: DateTime<Local>) -> String {
    format!(
        "reel-{}.{}",
        created.format("%Y%m%d-%H%M%S"),
        container.extension()
    )
}
