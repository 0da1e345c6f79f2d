use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{
    MonitorConfig, DEFAULT_DAMPING, DEFAULT_EXPECTED_MAX, DEFAULT_HISTORY_SIZE, DEFAULT_TICK_HZ,
    DEFAULT_WINDOW_MS,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plot event rates read from stdin and/or TCP feeders
    Watch(Watch),
    /// Plot a built-in synthetic feed
    Demo(Demo),
}

#[derive(Parser, Clone, Debug)]
pub struct Watch {
    /// Accept line feeders on this TCP address
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Do not read events from stdin
    #[arg(long)]
    pub no_stdin: bool,

    /// Input line format
    #[arg(long, value_enum, default_value_t = LineFormat::Text)]
    pub input: LineFormat,

    #[command(flatten)]
    pub tuning: Tuning,

    #[command(flatten)]
    pub output: Output,
}

#[derive(Parser, Clone, Debug)]
pub struct Demo {
    #[command(flatten)]
    pub tuning: Tuning,

    #[command(flatten)]
    pub output: Output,
}

#[derive(Args, Clone, Debug)]
pub struct Tuning {
    /// Smoothing, polling and history shift frequency (Hz)
    #[arg(long, default_value_t = DEFAULT_TICK_HZ)]
    pub tick_hz: f64,

    /// Length of the event counting window (ms)
    #[arg(long, default_value_t = DEFAULT_WINDOW_MS)]
    pub window_ms: u64,

    /// Logical history capacity per source (ticks)
    #[arg(long, default_value_t = DEFAULT_HISTORY_SIZE)]
    pub history: usize,

    /// Damping constant of the rate smoother (>= 1)
    #[arg(long, default_value_t = DEFAULT_DAMPING)]
    pub damping: f64,

    /// Expected events per millisecond of window; sizes the timestamp ring
    #[arg(long, default_value_t = DEFAULT_EXPECTED_MAX)]
    pub expected_max: usize,
}

#[derive(Args, Clone, Debug)]
pub struct Output {
    /// Log periodic reports instead of drawing lanes
    #[arg(long)]
    pub headless: bool,

    /// Seconds between headless reports
    #[arg(long, default_value_t = 5)]
    pub report_secs: u64,

    /// Headless report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineFormat {
    /// NAME or NAME<TAB>PAYLOAD, with \n escapes in the payload
    Text,
    /// {"name": "...", "data": "..."}
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl From<&Tuning> for MonitorConfig {
    fn from(t: &Tuning) -> Self {
        MonitorConfig {
            tick_hz: t.tick_hz,
            window_ms: t.window_ms,
            history_size: t.history,
            damping: t.damping,
            expected_max: t.expected_max,
        }
    }
}
