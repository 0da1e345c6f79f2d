use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use tracing::info;

use crate::cli::ReportFormat;
use crate::clock::Clock;
use crate::ingest::{drain_into, Ping};
use crate::monitor::{Monitor, SourceSnapshot};
use crate::timer::Interval;

/// Drives the monitor without a terminal, reporting every `every`.
pub fn run_headless<C: Clock>(
    monitor: &mut Monitor<C>,
    pings: Receiver<Ping>,
    every: Duration,
    format: ReportFormat,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let loop_period = monitor.tick_period().clamp(Duration::from_millis(5), Duration::from_millis(250));
    let mut reports = Interval::start(every, Instant::now());

    while !stop.load(Ordering::Relaxed) {
        drain_into(&pings, monitor);
        monitor.advance_now();
        if reports.poll(Instant::now()) > 0 {
            emit(&monitor.snapshot(), format)?;
        }
        thread::sleep(loop_period);
    }
    // final state on the way out
    emit(&monitor.snapshot(), format)
}

fn emit(snapshot: &[SourceSnapshot], format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Text => {
            for s in snapshot {
                info!(
                    source = %s.name,
                    per_minute = s.per_minute.floor() as u64,
                    rate = %format!("{:.2}", s.rate),
                    history_max = %format!("{:.2}", s.history_max),
                    "Rate"
                );
            }
        }
        ReportFormat::Json => println!("{}", render_json(snapshot)?),
    }
    Ok(())
}

pub fn render_json(snapshot: &[SourceSnapshot]) -> Result<String> {
    serde_json::to_string(snapshot).context("Serializing snapshot")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_snapshot_shape() {
        let snap = vec![SourceSnapshot {
            name: "jobs".into(),
            rate: 1.5,
            per_minute: 90.0,
            history_max: 2.0,
            last_payload: vec!["ok".into()],
        }];
        let out = render_json(&snap).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v[0]["name"], "jobs");
        assert_eq!(v[0]["per_minute"], 90.0);
        assert_eq!(v[0]["last_payload"][0], "ok");
    }

    #[test]
    fn headless_loop_stops_and_reports_final_state() {
        use crate::clock::SystemClock;
        use crate::config::MonitorConfig;
        use crossbeam_channel as channel;

        let mut monitor = Monitor::new(SystemClock, MonitorConfig::default()).unwrap();
        let (tx, rx) = channel::unbounded();
        tx.send(Ping { name: "x".into(), payload: String::new() }).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let stopper = {
            let stop = stop.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                stop.store(true, Ordering::Relaxed);
            })
        };
        run_headless(&mut monitor, rx, Duration::from_millis(50), ReportFormat::Text, stop).unwrap();
        stopper.join().unwrap();
        assert!(monitor.shifts() > 0);
        assert!(monitor.registry().get("x").unwrap().counter.value() > 0.0);
    }
}
