use std::time::Instant;

use crate::clock::Clock;
use crate::config::{tick_period, ConfigError, MonitorConfig};
use crate::rate::smoother::CriticallyDampedSmoother;
use crate::rate::window::WindowedEventCounter;
use crate::timer::Interval;

/// Windowed event count fed through a damped smoother.
///
/// At `tick_hz` the smoother is re-targeted with the current windowed count and
/// then stepped once, so `value` tracks "events per window" without the jitter
/// of the raw count.
#[derive(Clone)]
pub struct SmoothedRateCounter<C: Clock> {
    clock: C,
    window: WindowedEventCounter<C>,
    smoother: CriticallyDampedSmoother<C>,
    retarget: Interval,
}

impl<C: Clock> SmoothedRateCounter<C> {
    pub fn new(clock: C, cfg: &MonitorConfig) -> Result<Self, ConfigError> {
        let period = tick_period(cfg.tick_hz)?;
        let window = WindowedEventCounter::new(clock.clone(), cfg.window_ms, cfg.expected_max)?;
        let mut smoother = CriticallyDampedSmoother::new(clock.clone(), cfg.tick_hz, cfg.damping)?;
        // The combined task below drives the smoother; its own schedule stays idle.
        smoother.cancel();
        let retarget = Interval::start(period, clock.now());
        Ok(Self {
            clock,
            window,
            smoother,
            retarget,
        })
    }

    pub fn ping(&mut self) {
        self.window.ping();
    }

    pub fn ping_at(&mut self, at: Instant) {
        self.window.ping_at(at);
    }

    /// Smoothed events per window.
    pub fn value(&self) -> f64 {
        self.smoother.value()
    }

    pub fn per_minute(&self) -> f64 {
        let window_ms = self.window.window().as_secs_f64() * 1000.0;
        self.value() * 60_000.0 / window_ms
    }

    pub fn raw_count(&self) -> usize {
        self.window.count()
    }

    pub fn advance(&mut self, now: Instant) {
        for _ in 0..self.retarget.poll(now) {
            self.smoother.set_target(self.window.count_at(now) as f64);
            self.smoother.tick();
        }
    }

    pub fn advance_now(&mut self) {
        let now = self.clock.now();
        self.advance(now);
    }

    pub fn cancel(&mut self) {
        self.retarget.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.retarget.is_active()
    }

    /// Re-anchors the schedule so the next tick is one period after `now`.
    pub fn restart(&mut self, now: Instant) {
        self.retarget = Interval::start(self.retarget.period(), now);
    }
}
