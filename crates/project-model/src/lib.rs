//! Reelcraft Project Model
//!
//! Defines the core data contracts of a reel:
//! - **Media:** Photos, trimmed videos, generated cards and the transition segment
//! - **Timeline:** The ordered item collection and its validated command surface
//! - **Theme:** Color tokens used to paint generated cards
//! - **Export:** Quality tiers, container preference and size estimates
//! - **Manifest:** JSON input describing a reel to build
//!
//! Focal points and overlay positions are normalized to `[0.0, 100.0]`
//! percent of the frame so they survive canvas resizing.

pub mod export;
pub mod geometry;
pub mod manifest;
pub mod media;
pub mod theme;
pub mod timeline;

pub use export::*;
pub use geometry::*;
pub use manifest::*;
pub use media::*;
pub use theme::*;
pub use timeline::*;
