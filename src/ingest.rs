use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cli::LineFormat;
use crate::clock::Clock;
use crate::monitor::Monitor;

/// One observed event, ready for `Monitor::ping`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ping {
    pub name: String,
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty source name")]
    EmptyName,
    #[error("invalid json event: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct JsonEvent {
    name: String,
    #[serde(default)]
    data: String,
}

/// Parses one input line. Blank lines yield `Ok(None)`.
///
/// Text lines are `NAME` or `NAME<TAB>PAYLOAD`, with `\n` in the payload
/// standing for a line break. JSON lines are `{"name": .., "data": ..}`.
pub fn parse_line(line: &str, format: LineFormat) -> Result<Option<Ping>, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let (name, payload) = match format {
        LineFormat::Text => match line.split_once('\t') {
            Some((name, payload)) => (name.trim().to_string(), payload.replace("\\n", "\n")),
            None => (line.trim().to_string(), String::new()),
        },
        LineFormat::Json => {
            let ev: JsonEvent = serde_json::from_str(line)?;
            (ev.name.trim().to_string(), ev.data)
        }
    };
    if name.is_empty() {
        return Err(ParseError::EmptyName);
    }
    Ok(Some(Ping { name, payload }))
}

/// Hands every queued ping to the monitor without blocking.
pub fn drain_into<C: Clock>(rx: &Receiver<Ping>, monitor: &mut Monitor<C>) -> usize {
    let mut n = 0;
    while let Ok(ping) = rx.try_recv() {
        monitor.ping(&ping.name, &ping.payload);
        n += 1;
    }
    n
}

/// Forwards every parsable line of `reader` until EOF, stop, or the receiver
/// hangs up. Returns the number of pings sent.
pub fn forward_lines<R: BufRead>(
    reader: R,
    format: LineFormat,
    tx: &Sender<Ping>,
    stop: &AtomicBool,
    origin: &str,
) -> u64 {
    let mut sent = 0;
    for line in reader.lines() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(?e, %origin, "Read error");
                break;
            }
        };
        match parse_line(&line, format) {
            Ok(Some(ping)) => {
                if tx.send(ping).is_err() {
                    break;
                }
                sent += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, %origin, "Skipping malformed line"),
        }
    }
    debug!(%origin, sent, "Input closed");
    sent
}

pub fn spawn_stdin_reader(
    format: LineFormat,
    tx: Sender<Ping>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        forward_lines(stdin.lock(), format, &tx, &stop, "stdin");
    })
}

/// A synthetic source: fires `base_per_sec` events a second, with a burst of
/// `burst_per_sec` extra for `burst_len` out of every `burst_every` ticks.
#[derive(Clone, Debug)]
pub struct DemoSource {
    pub name: &'static str,
    pub base_per_sec: f64,
    pub burst_per_sec: f64,
    pub burst_every: u64,
    pub burst_len: u64,
}

pub const DEMO_SOURCES: [DemoSource; 3] = [
    DemoSource { name: "requests", base_per_sec: 6.0, burst_per_sec: 20.0, burst_every: 600, burst_len: 80 },
    DemoSource { name: "errors", base_per_sec: 0.5, burst_per_sec: 8.0, burst_every: 1500, burst_len: 40 },
    DemoSource { name: "deploys", base_per_sec: 0.0, burst_per_sec: 3.0, burst_every: 2400, burst_len: 30 },
];

pub const DEMO_TICK: Duration = Duration::from_millis(50);

impl DemoSource {
    fn rate_at(&self, tick: u64) -> f64 {
        let bursting = self.burst_every > 0 && tick % self.burst_every < self.burst_len;
        self.base_per_sec + if bursting { self.burst_per_sec } else { 0.0 }
    }
}

/// Deterministic event schedule: accumulates fractional events per source and
/// emits whole ones.
pub struct DemoFeed {
    sources: Vec<DemoSource>,
    carry: Vec<f64>,
    tick: u64,
}

impl DemoFeed {
    pub fn new(sources: Vec<DemoSource>) -> Self {
        let carry = vec![0.0; sources.len()];
        Self { sources, carry, tick: 0 }
    }

    /// Events due during the next `dt`.
    pub fn step(&mut self, dt: Duration) -> Vec<Ping> {
        let mut out = Vec::new();
        for (src, carry) in self.sources.iter().zip(self.carry.iter_mut()) {
            *carry += src.rate_at(self.tick) * dt.as_secs_f64();
            while *carry >= 1.0 {
                *carry -= 1.0;
                out.push(Ping {
                    name: src.name.to_string(),
                    payload: format!("{} event\ntick {}", src.name, self.tick),
                });
            }
        }
        self.tick += 1;
        out
    }
}

pub fn spawn_demo_feed(tx: Sender<Ping>, stop: Arc<AtomicBool>) -> thread::JoinHandle<Result<()>> {
    thread::spawn(move || -> Result<()> {
        let mut feed = DemoFeed::new(DEMO_SOURCES.to_vec());
        while !stop.load(Ordering::Relaxed) {
            for ping in feed.step(DEMO_TICK) {
                if tx.send(ping).is_err() {
                    return Ok(());
                }
            }
            thread::sleep(DEMO_TICK);
        }
        Ok(())
    })
}
