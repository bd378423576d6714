//! Encoder interface and codec selection.
//!
//! An export produces whatever container/codec the runtime encoder
//! actually supports. The requested format only decides which candidates
//! are tried first.

use async_trait::async_trait;
use reelcraft_common::error::ReelResult;
use reelcraft_project_model::{ExportFormat, Size, EXPORT_FPS};
use serde::Serialize;

/// A container/codec pair an encoder backend may be able to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CodecCandidate {
    pub container: ExportFormat,
    /// Codec name as reported in the artifact's MIME type.
    pub codec: &'static str,
    /// Encoder name understood by ffmpeg.
    pub encoder: &'static str,
}

/// Every candidate in descending preference.
pub const CODEC_CANDIDATES: [CodecCandidate; 4] = [
    CodecCandidate {
        container: ExportFormat::Webm,
        codec: "vp9",
        encoder: "libvpx-vp9",
    },
    CodecCandidate {
        container: ExportFormat::Webm,
        codec: "vp8",
        encoder: "libvpx",
    },
    CodecCandidate {
        container: ExportFormat::Mp4,
        codec: "h264",
        encoder: "libx264",
    },
    CodecCandidate {
        container: ExportFormat::Mp4,
        codec: "mpeg4",
        encoder: "mpeg4",
    },
];

impl CodecCandidate {
    /// Short label such as `webm/vp9`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.container.extension(), self.codec)
    }

    /// MIME type of the produced file, with the codec parameter.
    pub fn mime(&self) -> String {
        format!("{};codecs={}", self.container.mime(), self.codec)
    }
}

/// Candidates ordered for a requested format: the requested container's
/// candidates first, each group keeping its preference order.
pub fn candidates_for(format: ExportFormat) -> Vec<CodecCandidate> {
    let (mut first, rest): (Vec<_>, Vec<_>) = CODEC_CANDIDATES
        .iter()
        .copied()
        .partition(|c| c.container == format);
    first.extend(rest);
    first
}

/// Pick the most preferred candidate among those a backend supports.
pub fn select_codec(format: ExportFormat, supported: &[CodecCandidate]) -> Option<CodecCandidate> {
    candidates_for(format)
        .into_iter()
        .find(|candidate| supported.contains(candidate))
}

/// Parameters of one encoder instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderConfig {
    pub codec: CodecCandidate,
    pub size: Size,
    pub fps: u32,
    pub bitrate_bps: u64,
}

impl EncoderConfig {
    pub fn new(codec: CodecCandidate, size: Size, bitrate_bps: u64) -> Self {
        Self {
            codec,
            size,
            fps: EXPORT_FPS,
            bitrate_bps,
        }
    }

    /// Bytes of one raw RGBA frame.
    pub fn frame_len(&self) -> usize {
        self.size.width as usize * self.size.height as usize * 4
    }
}

/// Runtime statistics from an encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EncoderStats {
    /// Frames submitted.
    pub frames_encoded: u64,

    /// Encoded chunks handed out so far.
    pub chunks: u64,

    /// Encoded bytes handed out so far.
    pub bytes: u64,
}

/// A running encoder.
///
/// Frames go in as raw RGBA; encoded output comes back as an ordered
/// stream of chunks. Chunks are only meaningful when concatenated in
/// order after [`VideoEncoder::finish`].
#[async_trait]
pub trait VideoEncoder: Send {
    fn codec(&self) -> CodecCandidate;

    /// Submit one frame of exactly [`EncoderConfig::frame_len`] bytes.
    async fn push_frame(&mut self, rgba: &[u8]) -> ReelResult<()>;

    /// Take the chunks produced so far.
    fn drain_chunks(&mut self) -> Vec<Vec<u8>>;

    /// Flush the encoder and return the remaining chunks.
    async fn finish(&mut self) -> ReelResult<Vec<Vec<u8>>>;

    /// Stop immediately, discarding pending output.
    async fn abort(&mut self);

    fn stats(&self) -> EncoderStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(candidates: &[CodecCandidate]) -> Vec<String> {
        candidates.iter().map(CodecCandidate::label).collect()
    }

    #[test]
    fn test_requested_container_goes_first() {
        assert_eq!(
            labels(&candidates_for(ExportFormat::Mp4)),
            vec!["mp4/h264", "mp4/mpeg4", "webm/vp9", "webm/vp8"]
        );
        assert_eq!(
            labels(&candidates_for(ExportFormat::Webm)),
            vec!["webm/vp9", "webm/vp8", "mp4/h264", "mp4/mpeg4"]
        );
    }

    #[test]
    fn test_format_is_advisory() {
        // Only an mp4 encoder is present: a webm request still produces mp4.
        let supported = [CODEC_CANDIDATES[3]];
        let codec = select_codec(ExportFormat::Webm, &supported).unwrap();
        assert_eq!(codec.container, ExportFormat::Mp4);
        assert_eq!(codec.mime(), "video/mp4;codecs=mpeg4");
        assert!(select_codec(ExportFormat::Webm, &[]).is_none());
    }

    #[test]
    fn test_frame_len() {
        let config = EncoderConfig::new(CODEC_CANDIDATES[0], Size::new(4, 2), 1);
        assert_eq!(config.frame_len(), 32);
        assert_eq!(config.fps, 30);
    }
}
