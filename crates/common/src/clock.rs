//! Tick sources and timing utilities.
//!
//! Preview playback and export capture are driven by a [`TickSource`]
//! rather than by wall-clock timers directly:
//! - [`VirtualTicker`] advances instantly and deterministically (tests,
//!   offline rendering)
//! - [`RealtimeTicker`] paces ticks with the tokio timer and reports the
//!   actual elapsed time between ticks

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// A cooperative source of frame ticks.
#[async_trait::async_trait]
pub trait TickSource: Send {
    /// Nominal spacing between ticks.
    fn interval(&self) -> Duration;

    /// Time elapsed since the source was created.
    fn now(&self) -> Duration;

    /// Wait for the next tick. Returns the time elapsed since the previous
    /// tick (or since creation for the first tick).
    async fn next_tick(&mut self) -> Duration;

    /// Wait for at least `duration`.
    async fn sleep(&mut self, duration: Duration);
}

/// Deterministic tick source: every tick advances virtual time by exactly
/// one interval, without waiting.
#[derive(Debug, Clone)]
pub struct VirtualTicker {
    interval: Duration,
    now: Duration,
    ticks: u64,
}

impl VirtualTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            now: Duration::ZERO,
            ticks: 0,
        }
    }

    /// Ticker at the given frame rate.
    pub fn from_hz(hz: u32) -> Self {
        Self::new(interval_for_hz(hz))
    }

    /// Number of ticks delivered so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[async_trait::async_trait]
impl TickSource for VirtualTicker {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn now(&self) -> Duration {
        self.now
    }

    async fn next_tick(&mut self) -> Duration {
        // Keep the loop cooperative even though no real time passes.
        tokio::task::yield_now().await;
        self.now += self.interval;
        self.ticks += 1;
        self.interval
    }

    async fn sleep(&mut self, duration: Duration) {
        tokio::task::yield_now().await;
        self.now += duration;
    }
}

/// Tick source backed by the tokio timer.
#[derive(Debug)]
pub struct RealtimeTicker {
    interval: Interval,
    period: Duration,
    started: Instant,
    last_tick: Option<Instant>,
}

impl RealtimeTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        // A late paint must not be followed by a burst of catch-up ticks.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            period,
            started: Instant::now(),
            last_tick: None,
        }
    }

    pub fn from_hz(hz: u32) -> Self {
        Self::new(interval_for_hz(hz))
    }
}

#[async_trait::async_trait]
impl TickSource for RealtimeTicker {
    fn interval(&self) -> Duration {
        self.period
    }

    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    async fn next_tick(&mut self) -> Duration {
        let tick = self.interval.tick().await;
        let previous = self.last_tick.replace(tick).unwrap_or(self.started);
        tick.saturating_duration_since(previous)
    }

    async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Interval between ticks at `hz` (a zero rate is treated as 1 Hz).
pub fn interval_for_hz(hz: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / hz.max(1) as u64)
}

/// Rate limiter for periodic notifications (progress, diagnostics).
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.target_interval_ns
    }
}
