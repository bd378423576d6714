//! Reelcraft Common Utilities
//!
//! Shared infrastructure for all Reelcraft crates:
//! - Error types and result aliases
//! - Tick sources for preview playback and export capture
//! - Event bus for command rejections, warnings and export lifecycle
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use events::*;
