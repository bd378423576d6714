//! Reelcraft Render Engine
//!
//! Turns the active timeline item into pixels.
//!
//! # Pipeline
//!
//! ```text
//! TimelineState ──► Scheduler ──► Resolution ─┐
//!                                             ├── FrameSource::sample ──► DrawOps
//!            MediaCache (decoded media) ──────┘                              │
//!                                                                            ├── Surface
//!                                     TextOverlayCompositor ──► DrawOps ─────┘
//! ```
//!
//! Video sources answer `Pending` while their decoder seeks; the surface
//! then keeps the last good frame.

pub mod compositor;
pub mod ffmpeg;
pub mod fonts;
pub mod frame_source;
pub mod ingest;
pub mod media_cache;
pub mod overlay;
pub mod preview;
pub mod surface;
pub mod video;

pub use compositor::{FrameRenderer, FrameStatus, RenderStats};
pub use fonts::FontBook;
pub use frame_source::{FrameSample, FrameSource, SampleRequest};
pub use ingest::{ingest_manifest, IngestReport};
pub use media_cache::MediaCache;
pub use overlay::TextOverlayCompositor;
pub use preview::{PreviewPlayer, PreviewReport};
pub use surface::{DrawOp, Surface};
pub use video::{FfmpegVideoBackend, SyntheticVideoBackend, VideoBackend, VideoSeeker};
