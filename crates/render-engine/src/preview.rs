//! Live preview: the playback clock driving the scheduler and renderer.

use std::time::Duration;

use reelcraft_common::clock::TickSource;
use reelcraft_processing_core::playback::{PlaybackClock, PlaybackState, TickOutcome};
use reelcraft_processing_core::scheduler::{PlaybackMode, Scheduler};
use reelcraft_project_model::{CommandOutcome, TimelineCommand, TimelineError, TimelineState};

use crate::compositor::{FrameRenderer, FrameStatus};

/// Summary of a timed preview run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PreviewReport {
    pub ticks: u64,
    pub painted: u64,
    pub stale: u64,
    pub wraps: u64,
    pub final_time: f64,
}

/// Preview player over a timeline owned by the caller.
pub struct PreviewPlayer<T: TickSource> {
    clock: PlaybackClock,
    scheduler: Scheduler,
    renderer: FrameRenderer,
    ticker: T,
}

impl<T: TickSource> PreviewPlayer<T> {
    pub fn new(renderer: FrameRenderer, ticker: T, timeline: &TimelineState, looping: bool) -> Self {
        Self {
            clock: PlaybackClock::new(timeline.total_duration(), looping),
            scheduler: Scheduler::new(PlaybackMode::Preview),
            renderer,
            ticker,
        }
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn state(&self) -> PlaybackState {
        self.clock.state()
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn renderer(&self) -> &FrameRenderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut FrameRenderer {
        &mut self.renderer
    }

    pub fn into_renderer(self) -> FrameRenderer {
        self.renderer
    }

    pub fn play(&mut self) {
        self.clock.play();
        tracing::debug!(time = self.clock.time(), "Preview playing");
    }

    pub fn pause(&mut self) {
        self.clock.pause();
        tracing::debug!(time = self.clock.time(), "Preview paused");
    }

    /// Back to the start, stopped, with the first frame painted.
    pub fn reset(&mut self, timeline: &TimelineState) -> FrameStatus {
        self.clock.reset();
        self.refresh(timeline)
    }

    /// Move the playhead and repaint synchronously.
    pub fn seek(&mut self, timeline: &TimelineState, t: f64) -> FrameStatus {
        self.clock.seek(t);
        self.refresh(timeline)
    }

    /// Repaint the frame at the current playhead.
    pub fn refresh(&mut self, timeline: &TimelineState) -> FrameStatus {
        let resolution = self.scheduler.resolve(timeline, self.clock.time());
        self.renderer.render(timeline, resolution.as_ref())
    }

    /// Seek and wait (up to `max_wait`) until the frame at `t` is exact.
    pub async fn snapshot(
        &mut self,
        timeline: &TimelineState,
        t: f64,
        max_wait: Duration,
    ) -> FrameStatus {
        self.clock.seek(t);
        let resolution = self.scheduler.resolve(timeline, self.clock.time());
        self.renderer
            .render_settled(timeline, resolution.as_ref(), max_wait)
            .await
    }

    /// Wait for the next tick, advance the clock and repaint.
    pub async fn step(&mut self, timeline: &TimelineState) -> (TickOutcome, FrameStatus) {
        let dt = self.ticker.next_tick().await;
        let outcome = self.clock.tick(dt.as_secs_f64());
        (outcome, self.refresh(timeline))
    }

    /// Play for `secs` of ticker time, or until a non-looping pass ends.
    pub async fn run_for(&mut self, timeline: &TimelineState, secs: f64) -> PreviewReport {
        let budget = Duration::from_secs_f64(secs.max(0.0));
        let start = self.ticker.now();
        let mut report = PreviewReport::default();
        self.play();

        while self.ticker.now().saturating_sub(start) < budget {
            let (outcome, status) = self.step(timeline).await;
            report.ticks += 1;
            match status {
                FrameStatus::Painted { .. } => report.painted += 1,
                FrameStatus::Stale { .. } => report.stale += 1,
                FrameStatus::Empty => {}
            }
            match outcome {
                TickOutcome::Wrapped { .. } => report.wraps += 1,
                TickOutcome::Completed => break,
                _ => {}
            }
        }
        report.final_time = self.clock.time();
        report
    }

    /// Apply an edit and keep playback consistent with it: removed items
    /// release their media immediately and the clock adopts the new total.
    pub fn apply(
        &mut self,
        timeline: &mut TimelineState,
        command: TimelineCommand,
    ) -> Result<CommandOutcome, TimelineError> {
        let outcome = timeline.apply(command)?;
        match &outcome {
            CommandOutcome::Removed(item) => {
                self.renderer.release(item.id);
            }
            CommandOutcome::TransitionChanged {
                removed: Some(item),
                ..
            } => {
                self.renderer.release(item.id);
            }
            _ => {}
        }
        self.clock.set_duration(timeline.total_duration());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_cache::MediaCache;
    use crate::video::SyntheticVideoBackend;
    use reelcraft_common::clock::VirtualTicker;
    use reelcraft_common::config::MediaDefaults;
    use reelcraft_common::events::{EventBus, ReelEvent};
    use reelcraft_project_model::{MediaItem, Size, ThemeTokens, TransitionContext};
    use std::sync::Arc;

    fn setup(events: &EventBus) -> (TimelineState, PreviewPlayer<VirtualTicker>) {
        let mut timeline = TimelineState::new(events.clone(), None);
        timeline
            .apply(TimelineCommand::Insert {
                item: MediaItem::title_card("Hello", 2.0),
                index: None,
            })
            .unwrap();
        let cache = MediaCache::new(
            Size::new(32, 18),
            MediaDefaults::default(),
            Arc::new(SyntheticVideoBackend::new(3.0)),
            events.clone(),
        );
        let renderer = FrameRenderer::new(cache, ThemeTokens::default());
        let player = PreviewPlayer::new(renderer, VirtualTicker::from_hz(20), &timeline, true);
        (timeline, player)
    }

    #[tokio::test]
    async fn test_preview_loops_over_the_timeline() {
        let events = EventBus::new();
        let (timeline, mut player) = setup(&events);
        assert!((player.clock().duration() - 5.0).abs() < 1e-9);

        let report = player.run_for(&timeline, 6.0).await;
        assert_eq!(report.ticks, 120);
        assert_eq!(report.wraps, 1);
        assert_eq!(report.painted, 120);
        assert!((report.final_time - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_pause_holds_time() {
        let events = EventBus::new();
        let (timeline, mut player) = setup(&events);
        player.play();
        player.step(&timeline).await;
        player.pause();
        let (outcome, _) = player.step(&timeline).await;
        assert_eq!(outcome, TickOutcome::Idle);
        assert!((player.time() - 0.05).abs() < 1e-9);
        assert_eq!(player.state(), PlaybackState::Paused);
    }

    #[test]
    fn test_seek_renders_synchronously() {
        let events = EventBus::new();
        let (timeline, mut player) = setup(&events);
        let status = player.seek(&timeline, 3.5);
        assert_eq!(
            status,
            FrameStatus::Painted {
                item_id: timeline.logo_card().unwrap().id
            }
        );
        assert_eq!(player.reset(&timeline), FrameStatus::Painted {
            item_id: timeline.items()[0].id
        });
        assert_eq!(player.time(), 0.0);
    }

    #[test]
    fn test_apply_releases_and_resizes() {
        let events = EventBus::new();
        let log = events.collector();
        let (mut timeline, mut player) = setup(&events);
        let card = timeline.items()[0].id;
        player.seek(&timeline, 0.5);

        player
            .apply(&mut timeline, TimelineCommand::Remove { item_id: card })
            .unwrap();
        assert!((player.clock().duration() - 3.0).abs() < 1e-9);
        assert!(log
            .lock()
            .unwrap()
            .contains(&ReelEvent::ResourceReleased { item_id: card.0 }));

        player
            .apply(
                &mut timeline,
                TimelineCommand::SetTransitionContext {
                    context: Some(TransitionContext {
                        location: Some("Oslo".into()),
                        theme_id: None,
                    }),
                },
            )
            .unwrap();
        assert!((player.clock().duration() - 7.0).abs() < 1e-9);
    }
}
