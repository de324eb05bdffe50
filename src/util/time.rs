//! Time utilities for match pacing

use parking_lot::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Target cadence of the simulation loop
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

/// Monotonic time source for the match loop
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;
}

/// Clock backed by `tokio::time::Instant`, so paused-time tests see virtual time
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

/// Adaptive tick scheduling.
///
/// The simulation step uses the measured time since the previous tick, and the
/// sleep before the next tick is the target minus the time spent processing,
/// never below zero.
#[derive(Debug, Clone)]
pub struct TickPacer {
    target: Duration,
    last_tick: Option<Duration>,
}

impl TickPacer {
    pub fn new(target: Duration) -> Self {
        Self {
            target,
            last_tick: None,
        }
    }

    /// Mark the start of a tick and return the elapsed time since the last one.
    /// The very first tick reports the nominal target.
    pub fn begin_tick(&mut self, now: Duration) -> Duration {
        let elapsed = match self.last_tick {
            Some(last) => now.saturating_sub(last),
            None => self.target,
        };
        self.last_tick = Some(now);
        elapsed
    }

    /// Delay until the next tick given how long this tick took
    pub fn delay_after(&self, processing: Duration) -> Duration {
        self.target.saturating_sub(processing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_reports_target() {
        let mut pacer = TickPacer::new(Duration::from_millis(16));
        assert_eq!(pacer.begin_tick(Duration::from_millis(500)), Duration::from_millis(16));
    }

    #[test]
    fn elapsed_is_measured_between_ticks() {
        let clock = ManualClock::new();
        let mut pacer = TickPacer::new(Duration::from_millis(16));
        pacer.begin_tick(clock.now());
        clock.advance(Duration::from_millis(23));
        assert_eq!(pacer.begin_tick(clock.now()), Duration::from_millis(23));
        clock.advance(Duration::from_millis(9));
        assert_eq!(pacer.begin_tick(clock.now()), Duration::from_millis(9));
    }

    #[test]
    fn delay_never_negative() {
        let pacer = TickPacer::new(Duration::from_millis(16));
        assert_eq!(pacer.delay_after(Duration::from_millis(4)), Duration::from_millis(12));
        assert_eq!(pacer.delay_after(Duration::from_millis(40)), Duration::ZERO);
    }
}
