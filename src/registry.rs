use std::collections::HashMap;

use crate::clock::Clock;
use crate::config::{ConfigError, MonitorConfig};
use crate::rate::{DecayingRateHistory, SmoothedRateCounter};

pub struct Source<C: Clock> {
    pub name: String,
    pub counter: SmoothedRateCounter<C>,
    pub history: DecayingRateHistory,
    /// Payload of the most recent ping, one entry per line.
    pub last_payload: Vec<String>,
}

/// Named sources in first-seen order. Entries are never removed.
pub struct SourceRegistry<C: Clock> {
    clock: C,
    // Fresh entries are cloned from these, so creation cannot fail after `new`.
    counter_template: SmoothedRateCounter<C>,
    history_template: DecayingRateHistory,
    sources: Vec<Source<C>>,
    index: HashMap<String, usize>,
}

impl<C: Clock> SourceRegistry<C> {
    pub fn new(clock: C, cfg: MonitorConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let counter_template = SmoothedRateCounter::new(clock.clone(), &cfg)?;
        let history_template = DecayingRateHistory::new(cfg.history_size)?;
        Ok(Self {
            clock,
            counter_template,
            history_template,
            sources: Vec::new(),
            index: HashMap::new(),
        })
    }

    pub fn get_or_create(&mut self, name: &str) -> &mut Source<C> {
        let idx = match self.index.get(name).copied() {
            Some(idx) => idx,
            None => {
                let idx = self.sources.len();
                let source = self.new_source(name);
                self.sources.push(source);
                self.index.insert(name.to_string(), idx);
                tracing::debug!(source = %name, "New source");
                idx
            }
        };
        &mut self.sources[idx]
    }

    pub fn ping(&mut self, name: &str, payload: &str) {
        let source = self.get_or_create(name);
        source.counter.ping();
        source.last_payload = payload.split('\n').map(str::to_string).collect();
    }

    pub fn get(&self, name: &str) -> Option<&Source<C>> {
        self.index.get(name).map(|&idx| &self.sources[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source<C>> {
        self.sources.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Source<C>> {
        self.sources.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Cancels every counter schedule, including those of sources created later.
    pub fn shutdown(&mut self) {
        self.counter_template.cancel();
        for source in &mut self.sources {
            source.counter.cancel();
        }
    }

    fn new_source(&self, name: &str) -> Source<C> {
        let mut counter = self.counter_template.clone();
        if counter.is_running() {
            counter.restart(self.clock.now());
        }
        Source {
            name: name.to_string(),
            counter,
            history: self.history_template.clone(),
            last_payload: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn registry() -> SourceRegistry<ManualClock> {
        SourceRegistry::new(ManualClock::new(), MonitorConfig::default()).unwrap()
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut reg = registry();
        let first = reg.get_or_create("builds") as *const Source<ManualClock>;
        let second = reg.get_or_create("builds") as *const Source<ManualClock>;
        assert_eq!(first, second);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn repeated_lookup_sees_same_state() {
        let mut reg = registry();
        reg.get_or_create("a").history.shift(7.0);
        assert_eq!(reg.get_or_create("a").history.latest(), 7.0);
    }

    #[test]
    fn iteration_keeps_first_seen_order() {
        let mut reg = registry();
        for name in ["zeta", "alpha", "mid", "alpha", "zeta"] {
            reg.ping(name, "");
        }
        let names: Vec<_> = reg.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn ping_counts_and_keeps_latest_payload_lines() {
        let mut reg = registry();
        reg.ping("deploy", "first");
        reg.ping("deploy", "line one\nline two\n");
        let src = reg.get("deploy").unwrap();
        assert_eq!(src.counter.raw_count(), 2);
        assert_eq!(src.last_payload, ["line one", "line two", ""]);
    }

    #[test]
    fn sources_created_after_shutdown_stay_idle() {
        let mut reg = registry();
        reg.ping("early", "");
        reg.shutdown();
        reg.ping("late", "");
        assert!(!reg.get("early").unwrap().counter.is_running());
        assert!(!reg.get("late").unwrap().counter.is_running());
        assert_eq!(reg.get("late").unwrap().counter.raw_count(), 1);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let cfg = MonitorConfig { history_size: 0, ..Default::default() };
        assert!(SourceRegistry::new(ManualClock::new(), cfg).is_err());
    }
}
