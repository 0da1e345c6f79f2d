use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::{window_slots, ConfigError};

/// Counts events inside a trailing time window.
///
/// Timestamps live in a fixed ring of `expected_max * window_ms` slots. When
/// more events than that arrive within one window the oldest slots are
/// overwritten and `count` undercounts; the counter saturates rather than
/// growing or failing.
#[derive(Clone)]
pub struct WindowedEventCounter<C: Clock> {
    clock: C,
    window: Duration,
    ring: Vec<Option<Instant>>,
    next: usize,
}

impl<C: Clock> WindowedEventCounter<C> {
    pub fn new(clock: C, window_ms: u64, expected_max: usize) -> Result<Self, ConfigError> {
        let capacity = window_slots(window_ms, expected_max)?;
        Ok(Self {
            clock,
            window: Duration::from_millis(window_ms),
            ring: vec![None; capacity],
            next: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn ping(&mut self) {
        let now = self.clock.now();
        self.ping_at(now);
    }

    pub fn ping_at(&mut self, at: Instant) {
        self.ring[self.next] = Some(at);
        self.next = (self.next + 1) % self.ring.len();
    }

    pub fn count(&self) -> usize {
        self.count_at(self.clock.now())
    }

    /// Events stamped strictly inside `(now - window, now]`.
    pub fn count_at(&self, now: Instant) -> usize {
        self.ring
            .iter()
            .flatten()
            .filter(|&&t| now.saturating_duration_since(t) < self.window)
            .count()
    }
}
