//! Playback clock: the global playhead and its transport state.
//!
//! The clock never reads wall time. Whoever drives it (the preview player,
//! the export session) feeds it the elapsed time of each tick.

/// Nominal spacing of preview ticks in seconds.
pub const DEFAULT_TICK_SECS: f64 = 0.05;

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// What a tick did to the playhead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not playing; time unchanged.
    Idle,
    Advanced { time: f64 },
    /// Passed the end and looped back.
    Wrapped { time: f64 },
    /// Reached the end of a non-looping pass. Time stays at the end.
    Completed,
}

/// The global playhead.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    state: PlaybackState,
    time: f64,
    duration: f64,
    looping: bool,
}

impl PlaybackClock {
    /// Create a stopped clock for a timeline of `duration` seconds.
    pub fn new(duration: f64, looping: bool) -> Self {
        Self {
            state: PlaybackState::Stopped,
            time: 0.0,
            duration: sanitize(duration),
            looping,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Enable or disable wrap-around at the end.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Update the duration after a timeline edit; the playhead is kept
    /// inside the new bounds.
    pub fn set_duration(&mut self, duration: f64) {
        self.duration = sanitize(duration);
        if self.time > self.duration {
            self.time = if self.looping { 0.0 } else { self.duration };
        }
    }

    /// Start or resume. A finished non-looping pass restarts from zero.
    pub fn play(&mut self) {
        if !self.looping && self.time >= self.duration {
            self.time = 0.0;
        }
        self.state = PlaybackState::Playing;
    }

    /// Halt advancement, keeping the playhead.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Move the playhead. Returns the time actually set.
    pub fn seek(&mut self, t: f64) -> f64 {
        let t = if t.is_finite() { t } else { 0.0 };
        self.time = t.clamp(0.0, self.duration);
        self.time
    }

    /// Back to zero, stopped.
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.state = PlaybackState::Stopped;
    }

    /// Advance by `dt` seconds if playing.
    pub fn tick(&mut self, dt: f64) -> TickOutcome {
        if self.state != PlaybackState::Playing {
            return TickOutcome::Idle;
        }
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let next = self.time + dt;

        if next < self.duration {
            self.time = next;
            return TickOutcome::Advanced { time: next };
        }
        if self.looping && self.duration > 0.0 {
            self.time = next.rem_euclid(self.duration);
            return TickOutcome::Wrapped { time: self.time };
        }
        self.time = self.duration;
        self.state = PlaybackState::Stopped;
        tracing::debug!(duration_secs = self.duration, "Playback pass completed");
        TickOutcome::Completed
    }
}

fn sanitize(duration: f64) -> f64 {
    if duration.is_finite() {
        duration.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_until_played() {
        let mut clock = PlaybackClock::new(8.0, true);
        assert_eq!(clock.tick(0.05), TickOutcome::Idle);
        assert_eq!(clock.time(), 0.0);

        clock.play();
        assert!(matches!(clock.tick(0.05), TickOutcome::Advanced { .. }));
        assert!((clock.time() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_pause_keeps_time() {
        let mut clock = PlaybackClock::new(8.0, true);
        clock.play();
        clock.tick(1.0);
        clock.pause();
        assert_eq!(clock.state(), PlaybackState::Paused);
        assert_eq!(clock.tick(1.0), TickOutcome::Idle);
        assert_eq!(clock.time(), 1.0);

        clock.play();
        clock.tick(0.5);
        assert_eq!(clock.time(), 1.5);
    }

    #[test]
    fn test_seek_clamps() {
        let mut clock = PlaybackClock::new(8.0, true);
        assert_eq!(clock.seek(3.25), 3.25);
        assert_eq!(clock.seek(99.0), 8.0);
        assert_eq!(clock.seek(-1.0), 0.0);
        assert_eq!(clock.seek(f64::NAN), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut clock = PlaybackClock::new(8.0, true);
        clock.play();
        clock.tick(2.0);
        clock.reset();
        assert_eq!(clock.time(), 0.0);
        assert_eq!(clock.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_preview_loops() {
        let mut clock = PlaybackClock::new(2.0, true);
        clock.play();
        clock.tick(1.5);
        match clock.tick(1.0) {
            TickOutcome::Wrapped { time } => assert!((time - 0.5).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }
        assert!(clock.is_playing());
    }

    #[test]
    fn test_export_pass_completes_once() {
        let mut clock = PlaybackClock::new(2.0, false);
        clock.play();
        clock.tick(1.5);
        assert_eq!(clock.tick(1.0), TickOutcome::Completed);
        assert_eq!(clock.time(), 2.0);
        assert_eq!(clock.state(), PlaybackState::Stopped);
        assert_eq!(clock.tick(1.0), TickOutcome::Idle);

        clock.play();
        assert_eq!(clock.time(), 0.0);
    }

    #[test]
    fn test_shrinking_duration_pulls_playhead_in() {
        let mut clock = PlaybackClock::new(10.0, false);
        clock.seek(9.0);
        clock.set_duration(4.0);
        assert_eq!(clock.time(), 4.0);
    }
}
