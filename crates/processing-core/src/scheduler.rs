//! Timeline scheduling: map a global playhead time to the active item.
//!
//! # Algorithm
//!
//! 1. **Normalize** the playhead: negative or non-finite times resolve as 0.
//! 2. **Bound** it: in preview mode times past the end wrap to the start; in
//!    export mode they are terminal and resolve to nothing.
//! 3. **Walk** the items accumulating effective durations. An item owns the
//!    half-open interval `[start, start + len)`, so a time exactly on a
//!    boundary belongs to the next item. Zero-length items are skipped.
//! 4. **Map** video offsets through the item's clips to a source time.

use reelcraft_project_model::{ClipId, ItemId, MediaItem, MediaKind, TimelineState};

/// How times past the end of the timeline are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Loop back to the start.
    #[default]
    Preview,
    /// One pass only; the end is terminal.
    Export,
}

/// The active clip of a video item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipResolution {
    pub clip_id: ClipId,
    /// Position of the clip within the item's playback clips.
    pub index: usize,
    /// Time within the source video to display.
    pub source_time: f64,
}

/// The item under the playhead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    /// Index of the item in the timeline.
    pub index: usize,
    pub item_id: ItemId,
    pub kind: MediaKind,
    /// Global time at which the item starts.
    pub item_start: f64,
    /// Time since the item started.
    pub local_offset: f64,
    /// Effective duration of the item.
    pub item_duration: f64,
    /// Set for video items.
    pub clip: Option<ClipResolution>,
}

impl Resolution {
    /// Fraction of the item elapsed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.item_duration > 0.0 {
            (self.local_offset / self.item_duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Global time span occupied by one item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub item_id: ItemId,
    pub kind: MediaKind,
    pub start: f64,
    pub end: f64,
}

/// Maps playhead positions to timeline items.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    mode: PlaybackMode,
}

impl Scheduler {
    pub fn new(mode: PlaybackMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
    }

    /// Resolve the item active at global time `t`.
    pub fn resolve(&self, timeline: &TimelineState, t: f64) -> Option<Resolution> {
        resolve(timeline.items(), t, self.mode)
    }

    /// Total length of one pass over the timeline.
    pub fn total_duration(&self, timeline: &TimelineState) -> f64 {
        timeline.total_duration()
    }
}

/// Sum of effective durations over `items`.
pub fn total_duration(items: &[MediaItem]) -> f64 {
    items.iter().map(MediaItem::effective_duration).sum()
}

/// The time span of every item with a positive duration.
pub fn segments(items: &[MediaItem]) -> Vec<Segment> {
    let mut start = 0.0;
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let len = item.effective_duration();
        if len <= 0.0 {
            continue;
        }
        out.push(Segment {
            index,
            item_id: item.id,
            kind: item.kind,
            start,
            end: start + len,
        });
        start += len;
    }
    out
}

/// Resolve the item active at global time `t`.
pub fn resolve(items: &[MediaItem], t: f64, mode: PlaybackMode) -> Option<Resolution> {
    let total = total_duration(items);
    if total.is_nan() || total <= 0.0 {
        return None;
    }

    let mut t = if t.is_finite() { t.max(0.0) } else { 0.0 };
    if t >= total {
        match mode {
            PlaybackMode::Preview => t = t.rem_euclid(total),
            PlaybackMode::Export => return None,
        }
    }

    let mut accumulated = 0.0;
    let mut last_non_empty = None;
    for (index, item) in items.iter().enumerate() {
        let len = item.effective_duration();
        if len <= 0.0 {
            continue;
        }
        if t < accumulated + len {
            return Some(build(index, item, accumulated, t - accumulated, len));
        }
        last_non_empty = Some((index, accumulated, len));
        accumulated += len;
    }

    // Rounding drift between the two sums; pin to the end of the last item.
    last_non_empty.map(|(index, start, len)| {
        let local = (t - start).clamp(0.0, len);
        build(index, &items[index], start, local, len)
    })
}

fn build(index: usize, item: &MediaItem, start: f64, local: f64, len: f64) -> Resolution {
    let clip = if item.kind == MediaKind::Video {
        resolve_clip(item, local)
    } else {
        None
    };
    Resolution {
        index,
        item_id: item.id,
        kind: item.kind,
        item_start: start,
        local_offset: local,
        item_duration: len,
        clip,
    }
}

/// Map an offset within a video item to its clip and source time.
pub fn resolve_clip(item: &MediaItem, local_offset: f64) -> Option<ClipResolution> {
    let clips = item.playback_clips();
    let mut before = 0.0;
    let mut last = None;
    for (index, clip) in clips.iter().enumerate() {
        let len = clip.duration();
        if len <= 0.0 {
            continue;
        }
        if local_offset < before + len {
            return Some(ClipResolution {
                clip_id: clip.id,
                index,
                source_time: clip.start_secs + (local_offset - before).max(0.0),
            });
        }
        last = Some((index, clip));
        before += len;
    }
    last.map(|(index, clip)| ClipResolution {
        clip_id: clip.id,
        index,
        source_time: clip.end_secs,
    })
}
