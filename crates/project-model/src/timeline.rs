//! The timeline: an ordered, exclusively-owned collection of media items.
//!
//! All mutation goes through [`TimelineState::apply`]. A command is executed
//! against a staged copy of the item list, the staged copy is re-checked
//! against every timeline invariant, and only then committed. Rejected
//! commands leave the timeline untouched and are reported on the event bus.

use reelcraft_common::{ErrorClass, EventBus, ReelError, ReelEvent};

use crate::media::{
    Clip, ClipId, FocalPoint, ItemId, KenBurns, MediaItem, MediaKind, MediaSource, TextOverlay,
    DEFAULT_CARD_DURATION_SECS, DEFAULT_IMAGE_DURATION_SECS, MAX_FOCAL_POINTS,
    MAX_ITEM_DURATION_SECS, MIN_ITEM_DURATION_SECS, TRANSITION_DURATION_SECS,
};
use crate::theme::TransitionContext;

/// A validated mutation of the timeline.
#[derive(Debug, Clone)]
pub enum TimelineCommand {
    /// Ingest a new item. `index` is an absolute position; `None` appends
    /// before the closing logo card.
    Insert {
        item: MediaItem,
        index: Option<usize>,
    },
    Remove {
        item_id: ItemId,
    },
    /// Move an item to absolute position `to`.
    Reorder {
        item_id: ItemId,
        to: usize,
    },
    SetDuration {
        item_id: ItemId,
        secs: f64,
    },
    SetTrim {
        item_id: ItemId,
        clip_id: ClipId,
        start_secs: f64,
        end_secs: f64,
    },
    AddClip {
        item_id: ItemId,
        start_secs: f64,
        end_secs: f64,
    },
    RemoveClip {
        item_id: ItemId,
        clip_id: ClipId,
    },
    /// Set (`Some`) or clear (`None`) the focal point at `index`.
    /// `index == len` appends.
    SetFocalPoint {
        item_id: ItemId,
        index: usize,
        point: Option<FocalPoint>,
    },
    SetKenBurns {
        item_id: ItemId,
        ken_burns: KenBurns,
    },
    /// Replace the overlay at `index`, or append when `index` is `None`.
    SetOverlay {
        item_id: ItemId,
        index: Option<usize>,
        overlay: TextOverlay,
    },
    RemoveOverlay {
        item_id: ItemId,
        index: usize,
    },
    SetTransitionContext {
        context: Option<TransitionContext>,
    },
}

impl TimelineCommand {
    /// Short command name used in events and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Remove { .. } => "remove",
            Self::Reorder { .. } => "reorder",
            Self::SetDuration { .. } => "set_duration",
            Self::SetTrim { .. } => "set_trim",
            Self::AddClip { .. } => "add_clip",
            Self::RemoveClip { .. } => "remove_clip",
            Self::SetFocalPoint { .. } => "set_focal_point",
            Self::SetKenBurns { .. } => "set_ken_burns",
            Self::SetOverlay { .. } => "set_overlay",
            Self::RemoveOverlay { .. } => "remove_overlay",
            Self::SetTransitionContext { .. } => "set_transition_context",
        }
    }
}

/// Result of a committed command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Inserted(ItemId),
    /// The removed item; the caller releases its decoded resources.
    Removed(Box<MediaItem>),
    ClipAdded(ClipId),
    Updated(ItemId),
    TransitionChanged {
        inserted: Option<ItemId>,
        removed: Option<Box<MediaItem>>,
    },
}

/// Reasons a command is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("{kind:?} item {item_id} is managed by the timeline and cannot be changed this way")]
    ProtectedItem { item_id: ItemId, kind: MediaKind },

    #[error("Unknown item {0}")]
    UnknownItem(ItemId),

    #[error("Unknown clip {clip_id} on {item_id}")]
    UnknownClip { item_id: ItemId, clip_id: ClipId },

    #[error("Invalid trim [{start_secs}, {end_secs}) for a {source_secs}s source")]
    InvalidTrim {
        start_secs: f64,
        end_secs: f64,
        source_secs: f64,
    },

    #[error("{item_id} already has the maximum number of focal points")]
    TooManyFocalPoints { item_id: ItemId },

    #[error("Index {index} out of range (valid: {min}..={max})")]
    IndexOutOfRange {
        index: usize,
        min: usize,
        max: usize,
    },

    #[error("Timeline has no content items")]
    EmptyTimeline,

    #[error("Duration of video {0} is derived from its clips")]
    DurationDerived(ItemId),

    #[error("{command} is not supported for {kind:?} items")]
    UnsupportedForKind {
        command: &'static str,
        kind: MediaKind,
    },

    #[error("Video source has no usable duration")]
    MissingSourceDuration,

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),
}

impl From<TimelineError> for ReelError {
    fn from(err: TimelineError) -> Self {
        ReelError::validation(err.to_string())
    }
}

/// Clamp a requested photo/card duration into the legal range. Non-finite
/// input falls back to `default_secs`.
pub fn clamp_item_duration(secs: f64, default_secs: f64) -> f64 {
    if secs.is_finite() {
        secs.clamp(MIN_ITEM_DURATION_SECS, MAX_ITEM_DURATION_SECS)
    } else {
        default_secs.clamp(MIN_ITEM_DURATION_SECS, MAX_ITEM_DURATION_SECS)
    }
}

/// Items plus the context that decides whether a transition exists.
#[derive(Debug, Clone)]
struct Staged {
    items: Vec<MediaItem>,
    transition: Option<TransitionContext>,
}

/// Exclusive owner of the timeline items.
#[derive(Debug)]
pub struct TimelineState {
    items: Vec<MediaItem>,
    transition: Option<TransitionContext>,
    next_id: u64,
    events: EventBus,
}

impl TimelineState {
    /// Create a timeline holding only the closing logo card.
    pub fn new(events: EventBus, logo: Option<MediaSource>) -> Self {
        let mut state = Self {
            items: vec![],
            transition: None,
            next_id: 1,
            events,
        };
        let mut logo_card = MediaItem::logo_card(logo);
        logo_card.id = state.allocate_item_id();
        state.items.push(logo_card);
        state
    }

    /// Read-only view of the ordered items.
    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing but generated items (logo, transition) remains.
    pub fn is_empty(&self) -> bool {
        !self.items.iter().any(|item| !item.kind.is_protected())
    }

    pub fn get(&self, item_id: ItemId) -> Option<&MediaItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn index_of(&self, item_id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id == item_id)
    }

    pub fn logo_card(&self) -> Option<&MediaItem> {
        self.items.last().filter(|item| item.kind == MediaKind::LogoCard)
    }

    pub fn transition_context(&self) -> Option<&TransitionContext> {
        self.transition.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Sum of the effective durations of all items, transition included.
    pub fn total_duration(&self) -> f64 {
        self.items.iter().map(MediaItem::effective_duration).sum()
    }

    /// Reject timelines with nothing to show.
    pub fn ensure_not_empty(&self) -> Result<(), TimelineError> {
        if self.is_empty() {
            Err(TimelineError::EmptyTimeline)
        } else {
            Ok(())
        }
    }

    /// Apply a command: stage, validate, commit.
    pub fn apply(&mut self, command: TimelineCommand) -> Result<CommandOutcome, TimelineError> {
        let name = command.name();
        let mut staged = Staged {
            items: self.items.clone(),
            transition: self.transition.clone(),
        };

        let result = self
            .execute(&mut staged, command)
            .and_then(|outcome| {
                check_invariants(&staged.items, staged.transition.as_ref())?;
                Ok(outcome)
            });

        match result {
            Ok(outcome) => {
                self.items = staged.items;
                self.transition = staged.transition;
                tracing::debug!(
                    command = name,
                    items = self.items.len(),
                    total_secs = self.total_duration(),
                    "Timeline command committed"
                );
                self.events.emit(ReelEvent::CommandCommitted {
                    command: name.to_string(),
                });
                Ok(outcome)
            }
            Err(err) => {
                self.events.emit(ReelEvent::CommandRejected {
                    command: name.to_string(),
                    class: ErrorClass::Validation,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn allocate_item_id(&mut self) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        id
    }

    fn allocate_clip_id(&mut self) -> ClipId {
        let id = ClipId(self.next_id);
        self.next_id += 1;
        id
    }

    fn execute(
        &mut self,
        staged: &mut Staged,
        command: TimelineCommand,
    ) -> Result<CommandOutcome, TimelineError> {
        let name = command.name();
        match command {
            TimelineCommand::Insert { item, index } => {
                if item.kind.is_protected() {
                    return Err(TimelineError::UnsupportedForKind {
                        command: name,
                        kind: item.kind,
                    });
                }
                let item = self.prepare_insert(item)?;
                let (min, max) = user_range(&staged.items);
                let index = index.unwrap_or(max);
                if index < min || index > max {
                    return Err(TimelineError::IndexOutOfRange { index, min, max });
                }
                let id = item.id;
                staged.items.insert(index, item);
                Ok(CommandOutcome::Inserted(id))
            }

            TimelineCommand::Remove { item_id } => {
                let index = find_unprotected(&staged.items, item_id)?;
                let removed = staged.items.remove(index);
                Ok(CommandOutcome::Removed(Box::new(removed)))
            }

            TimelineCommand::Reorder { item_id, to } => {
                let from = find_unprotected(&staged.items, item_id)?;
                let (min, max) = user_range(&staged.items);
                // After removal the last legal slot shifts down by one.
                let max = max.saturating_sub(1);
                if to < min || to > max {
                    return Err(TimelineError::IndexOutOfRange { index: to, min, max });
                }
                let item = staged.items.remove(from);
                staged.items.insert(to, item);
                Ok(CommandOutcome::Updated(item_id))
            }

            TimelineCommand::SetDuration { item_id, secs } => {
                let item = find_mut(&mut staged.items, item_id)?;
                match item.kind {
                    MediaKind::Video => return Err(TimelineError::DurationDerived(item_id)),
                    MediaKind::TransitionSegment => {
                        return Err(TimelineError::ProtectedItem {
                            item_id,
                            kind: item.kind,
                        })
                    }
                    _ => {}
                }
                item.duration_secs = clamp_item_duration(secs, item.duration_secs);
                Ok(CommandOutcome::Updated(item_id))
            }

            TimelineCommand::SetTrim {
                item_id,
                clip_id,
                start_secs,
                end_secs,
            } => {
                let item = find_kind_mut(&mut staged.items, item_id, MediaKind::Video, name)?;
                let (start, end) = clamp_trim(start_secs, end_secs, item.source_duration())?;
                let clip = item
                    .clips
                    .iter_mut()
                    .find(|clip| clip.id == clip_id)
                    .ok_or(TimelineError::UnknownClip { item_id, clip_id })?;
                clip.start_secs = start;
                clip.end_secs = end;
                Ok(CommandOutcome::Updated(item_id))
            }

            TimelineCommand::AddClip {
                item_id,
                start_secs,
                end_secs,
            } => {
                let clip_id = self.allocate_clip_id();
                let item = find_kind_mut(&mut staged.items, item_id, MediaKind::Video, name)?;
                let (start, end) = clamp_trim(start_secs, end_secs, item.source_duration())?;
                item.clips.push(Clip {
                    id: clip_id,
                    start_secs: start,
                    end_secs: end,
                });
                Ok(CommandOutcome::ClipAdded(clip_id))
            }

            TimelineCommand::RemoveClip { item_id, clip_id } => {
                let item = find_kind_mut(&mut staged.items, item_id, MediaKind::Video, name)?;
                let before = item.clips.len();
                item.clips.retain(|clip| clip.id != clip_id);
                if item.clips.len() == before {
                    return Err(TimelineError::UnknownClip { item_id, clip_id });
                }
                Ok(CommandOutcome::Updated(item_id))
            }

            TimelineCommand::SetFocalPoint {
                item_id,
                index,
                point,
            } => {
                let item = find_kind_mut(&mut staged.items, item_id, MediaKind::Image, name)?;
                let len = item.focal_points.len();
                match point {
                    Some(point) => {
                        let point = FocalPoint::new(point.x, point.y);
                        if index < len {
                            item.focal_points[index] = point;
                        } else if index == len {
                            if len >= MAX_FOCAL_POINTS {
                                return Err(TimelineError::TooManyFocalPoints { item_id });
                            }
                            item.focal_points.push(point);
                        } else {
                            return Err(TimelineError::IndexOutOfRange {
                                index,
                                min: 0,
                                max: len,
                            });
                        }
                    }
                    None => {
                        if index >= len {
                            return Err(TimelineError::IndexOutOfRange {
                                index,
                                min: 0,
                                max: len.saturating_sub(1),
                            });
                        }
                        item.focal_points.remove(index);
                    }
                }
                Ok(CommandOutcome::Updated(item_id))
            }

            TimelineCommand::SetKenBurns { item_id, ken_burns } => {
                let item = find_kind_mut(&mut staged.items, item_id, MediaKind::Image, name)?;
                item.ken_burns = ken_burns;
                Ok(CommandOutcome::Updated(item_id))
            }

            TimelineCommand::SetOverlay {
                item_id,
                index,
                overlay,
            } => {
                let item = find_mut(&mut staged.items, item_id)?;
                let overlay = overlay.normalized();
                match index {
                    None => item.text_overlays.push(overlay),
                    Some(i) if i < item.text_overlays.len() => item.text_overlays[i] = overlay,
                    Some(i) => {
                        return Err(TimelineError::IndexOutOfRange {
                            index: i,
                            min: 0,
                            max: item.text_overlays.len().saturating_sub(1),
                        })
                    }
                }
                Ok(CommandOutcome::Updated(item_id))
            }

            TimelineCommand::RemoveOverlay { item_id, index } => {
                let item = find_mut(&mut staged.items, item_id)?;
                if index >= item.text_overlays.len() {
                    return Err(TimelineError::IndexOutOfRange {
                        index,
                        min: 0,
                        max: item.text_overlays.len().saturating_sub(1),
                    });
                }
                item.text_overlays.remove(index);
                Ok(CommandOutcome::Updated(item_id))
            }

            TimelineCommand::SetTransitionContext { context } => {
                let context = context.filter(TransitionContext::requires_transition);
                let existing = staged
                    .items
                    .iter()
                    .position(|item| item.kind == MediaKind::TransitionSegment);

                let outcome = match (&context, existing) {
                    (Some(ctx), Some(index)) => {
                        staged.items[index].transition = Some(ctx.clone());
                        CommandOutcome::TransitionChanged {
                            inserted: None,
                            removed: None,
                        }
                    }
                    (Some(ctx), None) => {
                        let mut segment = MediaItem::transition_segment(ctx.clone());
                        segment.id = self.allocate_item_id();
                        let id = segment.id;
                        staged.items.insert(0, segment);
                        CommandOutcome::TransitionChanged {
                            inserted: Some(id),
                            removed: None,
                        }
                    }
                    (None, Some(index)) => CommandOutcome::TransitionChanged {
                        inserted: None,
                        removed: Some(Box::new(staged.items.remove(index))),
                    },
                    (None, None) => CommandOutcome::TransitionChanged {
                        inserted: None,
                        removed: None,
                    },
                };
                staged.transition = context;
                Ok(outcome)
            }
        }
    }

    /// Assign ids and clamp an ingested item into the legal ranges.
    fn prepare_insert(&mut self, mut item: MediaItem) -> Result<MediaItem, TimelineError> {
        item.id = self.allocate_item_id();
        item.duration_secs = match item.kind {
            MediaKind::Video => 0.0,
            MediaKind::Image => clamp_item_duration(item.duration_secs, DEFAULT_IMAGE_DURATION_SECS),
            _ => clamp_item_duration(item.duration_secs, DEFAULT_CARD_DURATION_SECS),
        };

        if item.kind == MediaKind::Video {
            let source = item
                .source_duration_secs
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .ok_or(TimelineError::MissingSourceDuration)?;
            let mut clips = Vec::with_capacity(item.clips.len());
            for clip in std::mem::take(&mut item.clips) {
                let (start, end) = clamp_trim(clip.start_secs, clip.end_secs, source)?;
                clips.push(Clip {
                    id: self.allocate_clip_id(),
                    start_secs: start,
                    end_secs: end,
                });
            }
            item.clips = clips;
        } else {
            item.clips.clear();
        }

        if item.kind == MediaKind::Image {
            if item.focal_points.len() > MAX_FOCAL_POINTS {
                return Err(TimelineError::TooManyFocalPoints { item_id: item.id });
            }
            for point in &mut item.focal_points {
                *point = FocalPoint::new(point.x, point.y);
            }
        } else {
            item.focal_points.clear();
            item.ken_burns = KenBurns::default();
        }

        item.text_overlays = std::mem::take(&mut item.text_overlays)
            .into_iter()
            .map(TextOverlay::normalized)
            .collect();
        Ok(item)
    }
}

/// Clamp a trim range into `[0, source]`; reject empty or inverted ranges.
fn clamp_trim(start: f64, end: f64, source_secs: f64) -> Result<(f64, f64), TimelineError> {
    let invalid = TimelineError::InvalidTrim {
        start_secs: start,
        end_secs: end,
        source_secs,
    };
    if !start.is_finite() || !end.is_finite() || source_secs <= 0.0 {
        return Err(invalid);
    }
    let start = start.clamp(0.0, source_secs);
    let end = end.clamp(0.0, source_secs);
    if start >= end {
        return Err(invalid);
    }
    Ok((start, end))
}

/// Absolute index range user items may occupy: after the transition and up
/// to (and including the slot of) the logo card.
fn user_range(items: &[MediaItem]) -> (usize, usize) {
    let min = usize::from(
        items
            .first()
            .is_some_and(|item| item.kind == MediaKind::TransitionSegment),
    );
    let max = if items
        .last()
        .is_some_and(|item| item.kind == MediaKind::LogoCard)
    {
        items.len() - 1
    } else {
        items.len()
    };
    (min, max.max(min))
}

fn find_unprotected(items: &[MediaItem], item_id: ItemId) -> Result<usize, TimelineError> {
    let index = items
        .iter()
        .position(|item| item.id == item_id)
        .ok_or(TimelineError::UnknownItem(item_id))?;
    let kind = items[index].kind;
    if kind.is_protected() {
        return Err(TimelineError::ProtectedItem { item_id, kind });
    }
    Ok(index)
}

fn find_mut(items: &mut [MediaItem], item_id: ItemId) -> Result<&mut MediaItem, TimelineError> {
    items
        .iter_mut()
        .find(|item| item.id == item_id)
        .ok_or(TimelineError::UnknownItem(item_id))
}

fn find_kind_mut<'a>(
    items: &'a mut [MediaItem],
    item_id: ItemId,
    kind: MediaKind,
    command: &'static str,
) -> Result<&'a mut MediaItem, TimelineError> {
    let item = find_mut(items, item_id)?;
    if item.kind != kind {
        return Err(TimelineError::UnsupportedForKind {
            command,
            kind: item.kind,
        });
    }
    Ok(item)
}

/// Check every structural invariant of an item list.
pub fn check_invariants(
    items: &[MediaItem],
    transition: Option<&TransitionContext>,
) -> Result<(), TimelineError> {
    let violated = |msg: String| Err(TimelineError::InvariantViolated(msg));

    let logos = items
        .iter()
        .filter(|item| item.kind == MediaKind::LogoCard)
        .count();
    if logos != 1 {
        return violated(format!("expected exactly one logo card, found {logos}"));
    }
    if items.last().map(|item| item.kind) != Some(MediaKind::LogoCard) {
        return violated("logo card must be the last item".to_string());
    }

    let transitions: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.kind == MediaKind::TransitionSegment)
        .map(|(i, _)| i)
        .collect();
    let required = transition.is_some_and(TransitionContext::requires_transition);
    match (required, transitions.as_slice()) {
        (true, [0]) | (false, []) => {}
        (true, _) => return violated("transition segment must be first".to_string()),
        (false, _) => return violated("transition segment without context".to_string()),
    }

    for item in items {
        let duration = item.effective_duration();
        if !(duration.is_finite() && duration > 0.0) {
            return violated(format!("{} has non-positive duration {duration}", item.id));
        }
        match item.kind {
            MediaKind::Video => {
                let source = item.source_duration();
                if let Some(clip) = item.clips.iter().find(|c| !c.is_valid_within(source)) {
                    return violated(format!("{} on {} is outside the source", clip.id, item.id));
                }
            }
            MediaKind::TransitionSegment => {
                if (duration - TRANSITION_DURATION_SECS).abs() > f64::EPSILON {
                    return violated("transition duration is fixed".to_string());
                }
            }
            _ => {
                if !(MIN_ITEM_DURATION_SECS..=MAX_ITEM_DURATION_SECS).contains(&item.duration_secs) {
                    return violated(format!("{} duration out of range", item.id));
                }
            }
        }
        if item.focal_points.len() > MAX_FOCAL_POINTS
            || !item.focal_points.iter().all(FocalPoint::is_within_bounds)
        {
            return violated(format!("{} has invalid focal points", item.id));
        }
        if item
            .text_overlays
            .iter()
            .any(|o| !(0.0..=1.0).contains(&o.opacity))
        {
            return violated(format!("{} has an overlay opacity out of range", item.id));
        }
    }
    Ok(())
}
