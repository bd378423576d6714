//! Reelcraft Processing Core
//!
//! Timeline math shared by preview and export:
//! - **Scheduler:** Map a global playhead time to the active item and clip
//! - **Ken Burns:** Pan/zoom framing of still images over their display time
//! - **Playback:** The playhead clock with play/pause/seek/reset and looping
//!
//! This crate is pure computation: no I/O, no platform dependencies.
//! All inputs are data; all outputs are data.

pub mod ken_burns;
pub mod playback;
pub mod scheduler;

pub use ken_burns::{EffectEngine, EffectParams, Framing};
pub use playback::{PlaybackClock, PlaybackState, TickOutcome};
pub use scheduler::{PlaybackMode, Resolution, Scheduler};
