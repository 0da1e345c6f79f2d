use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_TICK_HZ: f64 = 30.0;
pub const DEFAULT_WINDOW_MS: u64 = 1_000;
pub const DEFAULT_HISTORY_SIZE: usize = 10_000;
pub const DEFAULT_DAMPING: f64 = 5.0;
pub const DEFAULT_EXPECTED_MAX: usize = 10;
/// Upper bound on timestamp slots per source (`expected_max * window_ms`).
pub const MAX_WINDOW_SLOTS: u64 = 1 << 22;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("update frequency must give a tick period between 1 ns and the Duration limit, got {0} Hz")]
    Frequency(f64),
    #[error("count window must be at least 1 ms")]
    Window,
    #[error("window of {window_ms} ms at {expected_max} events/ms needs {slots} slots; at most {max} allowed")]
    WindowCapacity { window_ms: u64, expected_max: usize, slots: u128, max: u64 },
    #[error("damping must be at least 1.0 to avoid overshoot, got {0}")]
    Damping(f64),
    #[error("expected events per window millisecond must be at least 1")]
    ExpectedMax,
    #[error("history size must be greater than 1, got {0}")]
    HistorySize(usize),
    #[error("history base must be greater than 1, got {0}")]
    HistoryBase(f64),
    #[error("history of {size} ticks at base {base} yields {allocated} buckets; need at least 2")]
    TooFewBuckets { size: usize, base: f64, allocated: usize },
}

/// Every knob of the rate pipeline in one place.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonitorConfig {
    /// Frequency of smoother ticks, re-target polls and history shifts.
    pub tick_hz: f64,
    pub window_ms: u64,
    /// Logical capacity of each history, in ticks.
    pub history_size: usize,
    pub damping: f64,
    pub expected_max: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_hz: DEFAULT_TICK_HZ,
            window_ms: DEFAULT_WINDOW_MS,
            history_size: DEFAULT_HISTORY_SIZE,
            damping: DEFAULT_DAMPING,
            expected_max: DEFAULT_EXPECTED_MAX,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        tick_period(self.tick_hz)?;
        check_damping(self.damping)?;
        window_slots(self.window_ms, self.expected_max)?;
        crate::rate::history::allocated_size_for(self.history_size, crate::rate::history::BASE)?;
        Ok(())
    }
}

/// Period of one tick at `hz`. Rejects rates whose period is zero or does not
/// fit in a `Duration`.
pub(crate) fn tick_period(hz: f64) -> Result<Duration, ConfigError> {
    if !(hz.is_finite() && hz > 0.0) {
        return Err(ConfigError::Frequency(hz));
    }
    match Duration::try_from_secs_f64(1.0 / hz) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(ConfigError::Frequency(hz)),
    }
}

/// Ring size for a timestamp window, bounded by `MAX_WINDOW_SLOTS`.
pub(crate) fn window_slots(window_ms: u64, expected_max: usize) -> Result<usize, ConfigError> {
    if window_ms == 0 {
        return Err(ConfigError::Window);
    }
    if expected_max == 0 {
        return Err(ConfigError::ExpectedMax);
    }
    let slots = u128::from(window_ms) * expected_max as u128;
    if slots > u128::from(MAX_WINDOW_SLOTS) {
        return Err(ConfigError::WindowCapacity {
            window_ms,
            expected_max,
            slots,
            max: MAX_WINDOW_SLOTS,
        });
    }
    Ok(slots as usize)
}

pub(crate) fn check_damping(damping: f64) -> Result<(), ConfigError> {
    if damping.is_finite() && damping >= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Damping(damping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(MonitorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_frequency() {
        let cfg = MonitorConfig { tick_hz: 0.0, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::Frequency(0.0)));
    }

    #[test]
    fn rejects_underdamped_smoothing() {
        let cfg = MonitorConfig { damping: 0.5, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::Damping(0.5)));
    }

    #[test]
    fn rejects_degenerate_history() {
        let cfg = MonitorConfig { history_size: 1, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::HistorySize(1)));
    }

    #[test]
    fn rejects_frequency_too_low_for_a_duration() {
        let cfg = MonitorConfig { tick_hz: 1e-300, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::Frequency(1e-300)));
    }

    #[test]
    fn rejects_frequency_with_zero_period() {
        let cfg = MonitorConfig { tick_hz: 1e12, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::Frequency(1e12)));
        assert_eq!(tick_period(1000.0), Ok(Duration::from_millis(1)));
    }

    #[test]
    fn tick_period_matches_frequency() {
        assert_eq!(tick_period(10.0), Ok(Duration::from_millis(100)));
        assert!(tick_period(f64::NAN).is_err());
        assert!(tick_period(-3.0).is_err());
    }

    #[test]
    fn rejects_oversized_window_ring() {
        let cfg = MonitorConfig { window_ms: 10_000_000_000, ..Default::default() };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::WindowCapacity { slots: 100_000_000_000, .. })
        ));
        let at_limit = MonitorConfig {
            window_ms: MAX_WINDOW_SLOTS,
            expected_max: 1,
            ..Default::default()
        };
        assert_eq!(at_limit.validate(), Ok(()));
    }

    #[test]
    fn rejects_empty_window() {
        let cfg = MonitorConfig { window_ms: 0, ..Default::default() };
        assert_eq!(cfg.validate(), Err(ConfigError::Window));
    }
}
