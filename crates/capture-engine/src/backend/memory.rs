//! In-memory encoder.
//!
//! Produces a small deterministic stream (a header chunk, then one record
//! per frame) without any external tool. Used by tests and for dry runs.

use async_trait::async_trait;
use reelcraft_common::error::{ReelError, ReelResult};

use crate::backend::EncoderBackend;
use crate::pipeline::{CodecCandidate, EncoderConfig, EncoderStats, VideoEncoder, CODEC_CANDIDATES};

/// Magic bytes at the start of a memory-encoded stream.
pub const MEMORY_MAGIC: &[u8; 6] = b"RCMEM1";

/// Size of one encoded frame record.
pub const FRAME_RECORD_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    supported: Vec<CodecCandidate>,
    frames_per_chunk: u32,
    fail_after_frames: Option<u64>,
}

impl MemoryBackend {
    /// Backend claiming support for every candidate.
    pub fn new() -> Self {
        Self {
            supported: CODEC_CANDIDATES.to_vec(),
            frames_per_chunk: 15,
            fail_after_frames: None,
        }
    }

    /// Backend that supports nothing.
    pub fn unavailable() -> Self {
        Self::with_codecs(Vec::new())
    }

    pub fn with_codecs(supported: Vec<CodecCandidate>) -> Self {
        Self {
            supported,
            ..Self::new()
        }
    }

    /// Emit a chunk every `frames` frames.
    pub fn with_chunk_frames(mut self, frames: u32) -> Self {
        self.frames_per_chunk = frames.max(1);
        self
    }

    /// Fail with a capture error on the frame after `frames` were accepted.
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after_frames = Some(frames);
        self
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EncoderBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn probe(&self) -> Vec<CodecCandidate> {
        self.supported.clone()
    }

    async fn open(&self, config: &EncoderConfig) -> ReelResult<Box<dyn VideoEncoder>> {
        if !self.supported.contains(&config.codec) {
            return Err(ReelError::encoder_unavailable(format!(
                "memory backend does not produce {}",
                config.codec.label()
            )));
        }
        Ok(Box::new(MemoryEncoder::new(
            *config,
            self.frames_per_chunk,
            self.fail_after_frames,
        )))
    }
}

pub struct MemoryEncoder {
    config: EncoderConfig,
    frames_per_chunk: u32,
    fail_after_frames: Option<u64>,
    pending: Vec<u8>,
    pending_frames: u32,
    ready: Vec<Vec<u8>>,
    stats: EncoderStats,
    closed: bool,
}

impl MemoryEncoder {
    fn new(config: EncoderConfig, frames_per_chunk: u32, fail_after_frames: Option<u64>) -> Self {
        let mut header = MEMORY_MAGIC.to_vec();
        header.extend_from_slice(&config.size.width.to_le_bytes());
        header.extend_from_slice(&config.size.height.to_le_bytes());
        header.extend_from_slice(&config.fps.to_le_bytes());
        header.extend_from_slice(&config.bitrate_bps.to_le_bytes());
        header.extend_from_slice(config.codec.label().as_bytes());
        Self {
            config,
            frames_per_chunk,
            fail_after_frames,
            pending: Vec::new(),
            pending_frames: 0,
            ready: vec![header],
            stats: EncoderStats::default(),
            closed: false,
        }
    }

    fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            self.ready.push(std::mem::take(&mut self.pending));
            self.pending_frames = 0;
        }
    }
}

#[async_trait]
impl VideoEncoder for MemoryEncoder {
    fn codec(&self) -> CodecCandidate {
        self.config.codec
    }

    async fn push_frame(&mut self, rgba: &[u8]) -> ReelResult<()> {
        if self.closed {
            return Err(ReelError::runtime_capture("encoder already closed"));
        }
        if self
            .fail_after_frames
            .is_some_and(|limit| self.stats.frames_encoded >= limit)
        {
            return Err(ReelError::runtime_capture(format!(
                "memory encoder failed after {} frames",
                self.stats.frames_encoded
            )));
        }
        if rgba.len() != self.config.frame_len() {
            return Err(ReelError::runtime_capture(format!(
                "frame of {} bytes, expected {}",
                rgba.len(),
                self.config.frame_len()
            )));
        }
        tokio::task::yield_now().await;

        self.pending
            .extend_from_slice(&self.stats.frames_encoded.to_le_bytes());
        self.pending.extend_from_slice(&fnv1a(rgba).to_le_bytes());
        self.pending_frames += 1;
        self.stats.frames_encoded += 1;
        if self.pending_frames >= self.frames_per_chunk {
            self.flush_pending();
        }
        Ok(())
    }

    fn drain_chunks(&mut self) -> Vec<Vec<u8>> {
        let chunks = std::mem::take(&mut self.ready);
        self.stats.chunks += chunks.len() as u64;
        self.stats.bytes += chunks.iter().map(|c| c.len() as u64).sum::<u64>();
        chunks
    }

    async fn finish(&mut self) -> ReelResult<Vec<Vec<u8>>> {
        self.flush_pending();
        self.closed = true;
        Ok(self.drain_chunks())
    }

    async fn abort(&mut self) {
        self.closed = true;
        self.pending.clear();
        self.ready.clear();
    }

    fn stats(&self) -> EncoderStats {
        self.stats
    }
}

/// Record count of a memory-encoded stream, if it is one.
pub fn count_frame_records(stream: &[u8], codec: &CodecCandidate) -> Option<usize> {
    let header_len = MEMORY_MAGIC.len() + 4 + 4 + 4 + 8 + codec.label().len();
    if stream.len() < header_len || !stream.starts_with(MEMORY_MAGIC) {
        return None;
    }
    let body = stream.len() - header_len;
    (body % FRAME_RECORD_LEN == 0).then_some(body / FRAME_RECORD_LEN)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
        (hash ^ *b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcraft_project_model::Size;

    fn config() -> EncoderConfig {
        EncoderConfig::new(CODEC_CANDIDATES[0], Size::new(2, 2), 2_500_000)
    }

    #[tokio::test]
    async fn test_chunks_concatenate_to_stream() {
        let backend = MemoryBackend::new().with_chunk_frames(2);
        let mut encoder = backend.open(&config()).await.unwrap();
        let mut chunks = encoder.drain_chunks();
        for i in 0..5u8 {
            encoder.push_frame(&[i; 16]).await.unwrap();
            chunks.extend(encoder.drain_chunks());
        }
        // Header plus two full chunks; the fifth frame waits for finish.
        assert_eq!(chunks.len(), 3);
        chunks.extend(encoder.finish().await.unwrap());
        assert_eq!(chunks.len(), 4);

        let stream = chunks.concat();
        assert_eq!(count_frame_records(&stream, &CODEC_CANDIDATES[0]), Some(5));
        assert_eq!(encoder.stats().frames_encoded, 5);
        assert_eq!(encoder.stats().bytes, stream.len() as u64);
    }

    #[tokio::test]
    async fn test_failure_is_a_capture_error() {
        let backend = MemoryBackend::new().failing_after(1);
        let mut encoder = backend.open(&config()).await.unwrap();
        encoder.push_frame(&[0; 16]).await.unwrap();
        let err = encoder.push_frame(&[0; 16]).await.unwrap_err();
        assert!(matches!(err, ReelError::RuntimeCapture { .. }));
    }

    #[tokio::test]
    async fn test_wrong_frame_size_and_unknown_codec() {
        let backend = MemoryBackend::with_codecs(vec![CODEC_CANDIDATES[2]]);
        assert!(matches!(
            backend.open(&config()).await.err(),
            Some(ReelError::EncoderUnavailable { .. })
        ));

        let mut encoder = MemoryBackend::new().open(&config()).await.unwrap();
        assert!(encoder.push_frame(&[0; 3]).await.is_err());
        assert_eq!(MemoryBackend::unavailable().probe().await, vec![]);
    }
}
