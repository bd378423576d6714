//! Reelcraft Capture Engine
//!
//! Turns one pass of the timeline into a downloadable video. The export
//! session drives the playback clock through the timeline, captures the
//! renderer's surface after every paint and feeds the frames to an encoder
//! whose chunks are buffered until the stop condition fires.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  ExportSession                   │
//! │  ┌──────────────┐  ┌───────────────┐  ┌────────┐ │
//! │  │PlaybackClock │─▶│ FrameRenderer │─▶│Capture │ │
//! │  │ + Scheduler  │  │   (surface)   │  │ Stream │ │
//! │  └──────────────┘  └───────────────┘  └───┬────┘ │
//! │                                           ▼      │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │ VideoEncoder (ffmpeg / memory) ─▶ chunks   │  │
//! │  └────────────────────────────────────────────┘  │
//! └───────────────────────┬──────────────────────────┘
//!                         ▼
//!                   ExportArtifact
//! ```

pub mod artifact;
pub mod backend;
pub mod capture;
pub mod pipeline;
pub mod session;

pub use artifact::ExportArtifact;
pub use backend::{detect_best_backend, EncoderBackend, FfmpegBackend, MemoryBackend};
pub use capture::CaptureStream;
pub use pipeline::{CodecCandidate, EncoderConfig, EncoderStats, VideoEncoder, CODEC_CANDIDATES};
pub use session::*;
