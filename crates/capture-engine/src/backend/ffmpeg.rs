//! ffmpeg encoder backend.
//!
//! Raw RGBA frames are written to ffmpeg's stdin; the muxed container is
//! read from stdout on a separate task and handed out as chunks.

use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reelcraft_common::error::{ReelError, ReelResult};
use reelcraft_project_model::ExportFormat;
use reelcraft_render_engine::ffmpeg::command_exists;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::EncoderBackend;
use crate::pipeline::{CodecCandidate, EncoderConfig, EncoderStats, VideoEncoder, CODEC_CANDIDATES};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const READ_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: String,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        command_exists(&self.ffmpeg)
    }

    fn args(config: &EncoderConfig) -> Vec<String> {
        let codec = config.codec;
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(format!("{}x{}", config.size.width, config.size.height));
        args.extend([
            "-r".to_string(),
            config.fps.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-an".to_string(),
            "-c:v".to_string(),
            codec.encoder.to_string(),
            "-b:v".to_string(),
            config.bitrate_bps.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]);
        match codec.container {
            ExportFormat::Webm => {
                args.extend(["-deadline", "realtime", "-cpu-used", "8"].map(String::from));
            }
            // Fragmented so the muxer never needs to seek back in a pipe.
            ExportFormat::Mp4 => {
                args.extend(["-movflags", "frag_keyframe+empty_moov"].map(String::from));
            }
        }
        args.extend([
            "-f".to_string(),
            codec.container.extension().to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn probe(&self) -> Vec<CodecCandidate> {
        if !self.is_available() {
            return Vec::new();
        }
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let output = match tokio::time::timeout(PROBE_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                tracing::warn!(status = %output.status, "ffmpeg -encoders failed");
                return Vec::new();
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "Failed to run ffmpeg -encoders");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(timeout_secs = PROBE_TIMEOUT.as_secs(), "ffmpeg -encoders timed out");
                return Vec::new();
            }
        };
        let listing = String::from_utf8_lossy(&output.stdout);
        let encoders = parse_video_encoders(&listing);
        let supported: Vec<CodecCandidate> = CODEC_CANDIDATES
            .iter()
            .copied()
            .filter(|c| encoders.contains(c.encoder))
            .collect();
        tracing::debug!(
            supported = ?supported.iter().map(CodecCandidate::label).collect::<Vec<_>>(),
            "Probed ffmpeg encoders"
        );
        supported
    }

    async fn open(&self, config: &EncoderConfig) -> ReelResult<Box<dyn VideoEncoder>> {
        let args = Self::args(config);
        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ReelError::encoder_unavailable(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            codec = %config.codec.label(),
            width = config.size.width,
            height = config.size.height,
            bitrate_bps = config.bitrate_bps,
            "ffmpeg encoder started"
        );

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::encoder_unavailable("Failed to capture ffmpeg stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::encoder_unavailable("Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::encoder_unavailable("Failed to capture ffmpeg stderr"))?;

        let (tx, chunks) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK_BYTES];
            let mut total = 0u64;
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                total += n as u64;
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Ok::<u64, std::io::Error>(total)
        });

        // Drain stderr so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        Ok(Box::new(FfmpegEncoder {
            config: *config,
            child,
            stdin: Some(stdin),
            chunks,
            reader: Some(reader),
            stderr: Some(stderr_task),
            stats: EncoderStats::default(),
        }))
    }
}

pub struct FfmpegEncoder {
    config: EncoderConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    reader: Option<JoinHandle<std::io::Result<u64>>>,
    stderr: Option<JoinHandle<String>>,
    stats: EncoderStats,
}

impl FfmpegEncoder {
    async fn stderr_output(&mut self) -> String {
        match self.stderr.take() {
            Some(task) => task
                .await
                .unwrap_or_else(|_| "<failed to join stderr reader>".to_string()),
            None => String::new(),
        }
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    fn codec(&self) -> CodecCandidate {
        self.config.codec
    }

    async fn push_frame(&mut self, rgba: &[u8]) -> ReelResult<()> {
        if rgba.len() != self.config.frame_len() {
            return Err(ReelError::runtime_capture(format!(
                "frame of {} bytes, expected {}",
                rgba.len(),
                self.config.frame_len()
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReelError::runtime_capture("encoder input already closed"))?;
        if let Err(err) = stdin.write_all(rgba).await {
            let stderr = self.stderr_output().await;
            return Err(ReelError::runtime_capture(format!(
                "ffmpeg stopped accepting frames: {err}: {}",
                stderr.trim()
            )));
        }
        self.stats.frames_encoded += 1;
        Ok(())
    }

    fn drain_chunks(&mut self) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Ok(chunk) = self.chunks.try_recv() {
            self.stats.chunks += 1;
            self.stats.bytes += chunk.len() as u64;
            chunks.push(chunk);
        }
        chunks
    }

    async fn finish(&mut self) -> ReelResult<Vec<Vec<u8>>> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .shutdown()
                .await
                .map_err(|e| ReelError::runtime_capture(format!("Failed to close ffmpeg stdin: {e}")))?;
        }
        if let Some(reader) = self.reader.take() {
            match reader.await {
                Ok(Ok(bytes)) => tracing::debug!(bytes, "ffmpeg output drained"),
                Ok(Err(err)) => {
                    return Err(ReelError::runtime_capture(format!(
                        "Failed reading ffmpeg output: {err}"
                    )))
                }
                Err(err) => {
                    return Err(ReelError::runtime_capture(format!(
                        "ffmpeg output reader failed: {err}"
                    )))
                }
            }
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ReelError::runtime_capture(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr = self.stderr_output().await;
        if !status.success() {
            return Err(ReelError::runtime_capture(format!(
                "ffmpeg encode failed (status {status}): {}",
                stderr.trim()
            )));
        }
        Ok(self.drain_chunks())
    }

    async fn abort(&mut self) {
        self.stdin = None;
        if let Err(err) = self.child.start_kill() {
            tracing::debug!(error = %err, "ffmpeg already exited");
        }
        let _ = self.child.wait().await;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
        while self.chunks.try_recv().is_ok() {}
        tracing::info!(frames = self.stats.frames_encoded, "ffmpeg encoder aborted");
    }

    fn stats(&self) -> EncoderStats {
        self.stats
    }
}

/// Names of the video encoders in `ffmpeg -encoders` output.
fn parse_video_encoders(listing: &str) -> HashSet<&str> {
    listing
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            (flags.len() == 6 && flags.starts_with('V') && name != "=").then_some(name)
        })
        .collect()
}
