//! ffmpeg/ffprobe process helpers.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reelcraft_common::error::{ReelError, ReelResult};
use reelcraft_project_model::{MediaSource, Size};
use tokio::process::Command;

/// Check whether a binary is on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// A source made addressable by path for ffmpeg.
///
/// Sources that only exist in memory are spooled into a temporary file,
/// which is deleted when this handle is dropped.
#[derive(Debug)]
pub struct SpooledSource {
    path: PathBuf,
    temporary: bool,
}

static SPOOL_COUNTER: AtomicU64 = AtomicU64::new(0);

impl SpooledSource {
    pub fn new(source: &MediaSource) -> ReelResult<Self> {
        if let Some(path) = source.path.as_ref().filter(|p| p.exists()) {
            return Ok(Self {
                path: path.clone(),
                temporary: false,
            });
        }
        let n = SPOOL_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "reelcraft-{}-{n}.media",
            std::process::id()
        ));
        std::fs::write(&path, &source.bytes)?;
        tracing::debug!(path = %path.display(), bytes = source.len(), "Spooled in-memory source");
        Ok(Self {
            path,
            temporary: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpooledSource {
    fn drop(&mut self) {
        if self.temporary {
            if let Err(err) = std::fs::remove_file(&self.path) {
                tracing::debug!(error = %err, path = %self.path.display(), "Failed to remove spooled source");
            }
        }
    }
}

/// Read a video's duration with ffprobe, giving up after `timeout`.
pub async fn probe_duration(ffprobe: &str, path: &Path, timeout: Duration) -> ReelResult<f64> {
    let mut cmd = Command::new(ffprobe);
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ])
    .arg(path)
    .stdin(Stdio::null())
    .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| {
            ReelError::media_load(format!(
                "ffprobe did not answer within {:.1}s for {}",
                timeout.as_secs_f64(),
                path.display()
            ))
        })?
        .map_err(|e| ReelError::media_load(format!("Failed to start {ffprobe}: {e}")))?;

    if !output.status.success() {
        return Err(ReelError::media_load(format!(
            "ffprobe failed (status {}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    parse_duration(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        ReelError::media_load(format!("ffprobe reported no duration for {}", path.display()))
    })
}

/// Read a video's frame size with ffprobe.
pub async fn probe_dimensions(ffprobe: &str, path: &Path, timeout: Duration) -> Option<Size> {
    let mut cmd = Command::new(ffprobe);
    cmd.args([
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=width,height",
        "-of",
        "csv=p=0:s=x",
    ])
    .arg(path)
    .stdin(Stdio::null())
    .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output()).await.ok()?.ok()?;
    if !output.status.success() {
        return None;
    }
    parse_dimensions(&String::from_utf8_lossy(&output.stdout))
}

fn parse_duration(raw: &str) -> Option<f64> {
    let secs = raw.lines().next()?.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

fn parse_dimensions(raw: &str) -> Option<Size> {
    let line = raw.lines().next()?.trim();
    let (w, h) = line.split_once('x')?;
    let width = w.parse::<u32>().ok()?;
    let height = h.parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some(Size::new(width, height))
}

/// Decode the single frame at `t` seconds as raw RGBA, scaled to `size`.
pub async fn decode_frame(
    ffmpeg: &str,
    path: &Path,
    t: f64,
    size: Size,
) -> ReelResult<Vec<u8>> {
    let output = Command::new(ffmpeg)
        .args(["-v", "error", "-ss"])
        .arg(format!("{:.3}", t.max(0.0)))
        .arg("-i")
        .arg(path)
        .args([
            "-frames:v",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
        ])
        .arg(format!("{}x{}", size.width, size.height))
        .arg("pipe:1")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ReelError::media_load(format!("Failed to start {ffmpeg}: {e}")))?;

    let expected = size.width as usize * size.height as usize * 4;
    if !output.status.success() || output.stdout.len() < expected {
        return Err(ReelError::media_load(format!(
            "ffmpeg could not decode a frame at {t:.3}s (status {}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let mut pixels = output.stdout;
    pixels.truncate(expected);
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("12.480000\n"), Some(12.48));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration("0.0"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_dimensions() {
        assert_eq!(parse_dimensions("1920x1080\n"), Some(Size::new(1920, 1080)));
        assert_eq!(parse_dimensions("0x1080"), None);
        assert_eq!(parse_dimensions("garbage"), None);
    }

    #[test]
    fn test_spooled_source_is_removed_on_drop() {
        let source = MediaSource::from_bytes(vec![1u8, 2, 3, 4], None);
        let spooled = SpooledSource::new(&source).unwrap();
        let path = spooled.path().to_path_buf();
        assert!(path.exists());
        drop(spooled);
        assert!(!path.exists());
    }

    #[test]
    fn test_command_exists_for_shell() {
        assert!(command_exists("sh"));
        assert!(!command_exists("reelcraft-definitely-not-a-binary"));
    }
}
