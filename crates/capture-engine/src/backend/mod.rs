use std::sync::Arc;

use async_trait::async_trait;
use reelcraft_common::error::ReelResult;

use crate::pipeline::{CodecCandidate, EncoderConfig, VideoEncoder};

/// A source of video encoders.
#[async_trait]
pub trait EncoderBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candidates this backend can produce right now. An empty list means
    /// the backend is unusable.
    async fn probe(&self) -> Vec<CodecCandidate>;

    /// Start an encoder for `config`.
    async fn open(&self, config: &EncoderConfig) -> ReelResult<Box<dyn VideoEncoder>>;
}

pub mod ffmpeg;
pub mod memory;

pub use ffmpeg::FfmpegBackend;
pub use memory::MemoryBackend;

/// The ffmpeg backend at `ffmpeg_path` when it is installed, otherwise
/// `None`.
pub fn detect_best_backend(ffmpeg_path: &str) -> Option<Arc<dyn EncoderBackend>> {
    let backend = FfmpegBackend::new(ffmpeg_path);
    if backend.is_available() {
        Some(Arc::new(backend))
    } else {
        tracing::warn!(ffmpeg = ffmpeg_path, "ffmpeg not found; no encoder backend available");
        None
    }
}
