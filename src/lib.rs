//! Live event-rate monitoring with bounded, logarithmically decaying history.
//!
//! [`rate`] holds the numeric pipeline: a windowed event counter, a damped
//! smoother on top of it, and [`rate::DecayingRateHistory`], which keeps an
//! unbounded run of samples in `O(log n)` buckets. [`monitor::Monitor`] ties
//! them to named sources and a master tick; the remaining modules feed it and
//! draw it.

pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod ingest;
pub mod monitor;
pub mod rate;
pub mod registry;
pub mod report;
pub mod server;
pub mod state;
pub mod timer;
pub mod ui;
