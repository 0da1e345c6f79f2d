use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::trace;

use crate::clock::Clock;
use crate::config::{tick_period, ConfigError, MonitorConfig};
use crate::rate::CriticallyDampedSmoother;
use crate::registry::SourceRegistry;
use crate::timer::Interval;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceSnapshot {
    pub name: String,
    pub rate: f64,
    pub per_minute: f64,
    pub history_max: f64,
    pub last_payload: Vec<String>,
}

/// Owns every source and the master tick that feeds their histories.
pub struct Monitor<C: Clock> {
    clock: C,
    cfg: MonitorConfig,
    registry: SourceRegistry<C>,
    master: Interval,
    // Shared vertical scale for all lanes, damped so rescaling doesn't jump.
    scale: CriticallyDampedSmoother<C>,
    shifts: u64,
}

impl<C: Clock> Monitor<C> {
    pub fn new(clock: C, cfg: MonitorConfig) -> Result<Self, ConfigError> {
        let registry = SourceRegistry::new(clock.clone(), cfg.clone())?;
        let mut scale = CriticallyDampedSmoother::new(clock.clone(), cfg.tick_hz, cfg.damping)?;
        // Ticked from the master schedule instead.
        scale.cancel();
        let master = Interval::start(tick_period(cfg.tick_hz)?, clock.now());
        Ok(Self {
            clock,
            cfg,
            registry,
            master,
            scale,
            shifts: 0,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.cfg
    }

    /// Period of the master schedule.
    pub fn tick_period(&self) -> Duration {
        self.master.period()
    }

    pub fn registry(&self) -> &SourceRegistry<C> {
        &self.registry
    }

    pub fn ping(&mut self, name: &str, payload: &str) {
        self.registry.ping(name, payload);
    }

    /// Logical ticks shifted into the histories so far.
    pub fn shifts(&self) -> u64 {
        self.shifts
    }

    /// Vertical extent shared by every lane; never below 1.
    pub fn scale(&self) -> f64 {
        self.scale.value().max(1.0)
    }

    /// Runs every periodic activity that fell due by `now`.
    pub fn advance(&mut self, now: Instant) {
        for source in self.registry.iter_mut() {
            source.counter.advance(now);
        }
        let due = self.master.poll(now);
        for _ in 0..due {
            self.master_tick();
        }
        if due > 0 {
            trace!(due, shifts = self.shifts, "Master tick");
        }
    }

    pub fn advance_now(&mut self) {
        let now = self.clock.now();
        self.advance(now);
    }

    fn master_tick(&mut self) {
        let mut max = 0.0_f64;
        for source in self.registry.iter_mut() {
            source.history.shift(source.counter.value());
            max = max.max(source.history.max_value());
        }
        self.shifts += 1;
        self.scale.set_target(max);
        self.scale.tick();
    }

    pub fn snapshot(&self) -> Vec<SourceSnapshot> {
        self.registry
            .iter()
            .map(|s| SourceSnapshot {
                name: s.name.clone(),
                rate: s.counter.value(),
                per_minute: s.counter.per_minute(),
                history_max: s.history.max_value(),
                last_payload: s.last_payload.clone(),
            })
            .collect()
    }

    /// Stops every schedule; later `advance` calls do nothing, even for
    /// sources first pinged after shutdown.
    pub fn shutdown(&mut self) {
        self.master.cancel();
        self.registry.shutdown();
    }
}
