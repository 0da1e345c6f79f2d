use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel as channel;
use tracing::{info, warn};

use crate::cli::{Demo, Output, Watch};
use crate::clock::SystemClock;
use crate::config::MonitorConfig;
use crate::ingest::{spawn_demo_feed, spawn_stdin_reader, Ping};
use crate::monitor::Monitor;
use crate::report::run_headless;
use crate::server::{spawn_listener, FeedSink};
use crate::state::SharedState;
use crate::ui::overview::run_tui;

fn stop_on_ctrlc() -> Arc<AtomicBool> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop = stop_flag.clone();
    if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
        warn!(?e, "Could not install Ctrl+C handler");
    }
    stop_flag
}

fn build_monitor(cfg: MonitorConfig) -> Result<Monitor<SystemClock>> {
    cfg.validate().context("Invalid monitor configuration")?;
    let rendered = serde_json::to_string(&cfg).context("Serializing configuration")?;
    info!(config = %rendered, "Starting ratelines");
    Ok(Monitor::new(SystemClock, cfg)?)
}

pub fn run_watch(watch: Watch) -> Result<()> {
    let stop = stop_on_ctrlc();
    let mut monitor = build_monitor(MonitorConfig::from(&watch.tuning))?;

    let (ping_tx, ping_rx) = channel::unbounded::<Ping>();
    let (status_tx, status_rx) = channel::unbounded::<String>();
    let shared = Arc::new(SharedState::new());

    let listener = match watch.listen {
        Some(host) => {
            let sink = FeedSink {
                format: watch.input,
                pings: ping_tx.clone(),
                status: status_tx.clone(),
                shared: Arc::clone(&shared),
                stop: stop.clone(),
            };
            Some(spawn_listener(host, sink)?.1)
        }
        None => None,
    };

    let read_stdin = reads_stdin(&watch, std::io::stdin().is_terminal());
    if read_stdin {
        // Detached: a blocking stdin read cannot be interrupted.
        let _ = spawn_stdin_reader(watch.input, ping_tx.clone(), stop.clone());
    } else if !watch.no_stdin {
        warn!("stdin is the terminal driving the lanes; not reading events from it");
    }
    if !read_stdin && listener.is_none() {
        warn!("No inputs: stdin not read and no --listen address");
    }
    drop(ping_tx);
    drop(status_tx);

    let result = present(&mut monitor, ping_rx, status_rx, shared, &watch.output, stop.clone());

    stop.store(true, Ordering::Relaxed);
    monitor.shutdown();
    if let Some(handle) = listener {
        let _ = handle.join();
    }
    info!("Shutting down");
    result
}

/// Whether stdin carries events. An interactive stdin belongs to the key
/// reader of the terminal UI and is left alone.
fn reads_stdin(watch: &Watch, stdin_is_tty: bool) -> bool {
    !watch.no_stdin && (watch.output.headless || !stdin_is_tty)
}

pub fn run_demo(demo: Demo) -> Result<()> {
    let stop = stop_on_ctrlc();
    let mut monitor = build_monitor(MonitorConfig::from(&demo.tuning))?;

    let (ping_tx, ping_rx) = channel::unbounded::<Ping>();
    let (_status_tx, status_rx) = channel::unbounded::<String>();
    let feed = spawn_demo_feed(ping_tx, stop.clone());

    let result = present(
        &mut monitor,
        ping_rx,
        status_rx,
        Arc::new(SharedState::new()),
        &demo.output,
        stop.clone(),
    );

    stop.store(true, Ordering::Relaxed);
    monitor.shutdown();
    if let Err(e) = feed.join().unwrap_or(Ok(())) {
        warn!(?e, "Demo feed error on shutdown");
    }
    result
}

fn present(
    monitor: &mut Monitor<SystemClock>,
    pings: channel::Receiver<Ping>,
    status: channel::Receiver<String>,
    shared: Arc<SharedState>,
    output: &Output,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    if output.headless {
        let every = Duration::from_secs(output.report_secs.max(1));
        run_headless(monitor, pings, every, output.format, stop)
    } else {
        run_tui(monitor, pings, status, shared, stop)
    }
}
