use std::time::Instant;

use crate::clock::Clock;
use crate::config::{check_damping, tick_period, ConfigError};
use crate::timer::Interval;

/// Discrete critically damped follower.
///
/// Every tick moves `value` a fixed fraction (`1 / damping`) of the remaining
/// distance toward `target`, so it approaches without oscillating.
#[derive(Clone)]
pub struct CriticallyDampedSmoother<C: Clock> {
    clock: C,
    damping: f64,
    value: f64,
    velocity: f64,
    target: f64,
    ticker: Interval,
}

impl<C: Clock> CriticallyDampedSmoother<C> {
    pub fn new(clock: C, frequency_hz: f64, damping: f64) -> Result<Self, ConfigError> {
        let period = tick_period(frequency_hz)?;
        check_damping(damping)?;
        let ticker = Interval::start(period, clock.now());
        Ok(Self {
            clock,
            damping,
            value: 0.0,
            velocity: 0.0,
            target: 0.0,
            ticker,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    pub fn tick(&mut self) {
        self.velocity = (self.target - self.value) / self.damping;
        self.value += self.velocity;
    }

    /// Runs the ticks that fell due since the last call.
    pub fn advance(&mut self, now: Instant) {
        for _ in 0..self.ticker.poll(now) {
            self.tick();
        }
    }

    pub fn advance_now(&mut self) {
        let now = self.clock.now();
        self.advance(now);
    }

    pub fn cancel(&mut self) {
        self.ticker.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_active()
    }
}
