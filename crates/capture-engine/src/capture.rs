//! Capture of the rendered surface as a frame stream.

use image::RgbaImage;
use reelcraft_common::error::{ReelError, ReelResult};
use reelcraft_project_model::Size;

/// State of the stream's video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

/// Copies painted frames out of the renderer's surface.
///
/// The stream only reads the surface. Frames must arrive in strictly
/// increasing timeline order; a frame at or before the previous timestamp
/// is a capture error.
#[derive(Debug)]
pub struct CaptureStream {
    size: Size,
    fps: u32,
    buffer: Vec<u8>,
    frames: u64,
    last_timestamp: Option<f64>,
    track: TrackState,
}

impl CaptureStream {
    pub fn new(size: Size, fps: u32) -> Self {
        tracing::debug!(width = size.width, height = size.height, fps, "Capture stream opened");
        Self {
            size,
            fps,
            buffer: Vec::with_capacity(size.width as usize * size.height as usize * 4),
            frames: 0,
            last_timestamp: None,
            track: TrackState::Live,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn track_state(&self) -> TrackState {
        self.track
    }

    pub fn is_live(&self) -> bool {
        self.track == TrackState::Live
    }

    /// Copy `frame` (painted for capture time `timestamp`) and return the
    /// raw RGBA bytes.
    pub fn capture(&mut self, frame: &RgbaImage, timestamp: f64) -> ReelResult<&[u8]> {
        if !self.is_live() {
            return Err(ReelError::runtime_capture("capture track has ended"));
        }
        if frame.dimensions() != (self.size.width, self.size.height) {
            return Err(ReelError::runtime_capture(format!(
                "surface is {}x{}, stream expects {}x{}",
                frame.width(),
                frame.height(),
                self.size.width,
                self.size.height
            )));
        }
        if let Some(last) = self.last_timestamp {
            if !(timestamp > last) {
                return Err(ReelError::runtime_capture(format!(
                    "frame at {timestamp:.4}s does not follow {last:.4}s"
                )));
            }
        }
        self.buffer.clear();
        self.buffer.extend_from_slice(frame.as_raw());
        self.last_timestamp = Some(timestamp);
        self.frames += 1;
        Ok(&self.buffer)
    }

    /// End the track and free the frame buffer. Idempotent.
    pub fn release(&mut self) {
        if self.track == TrackState::Ended {
            return;
        }
        self.track = TrackState::Ended;
        self.buffer = Vec::new();
        tracing::info!(frames = self.frames, "Capture tracks released");
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.release();
    }
}
