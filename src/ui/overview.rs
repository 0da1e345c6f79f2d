use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::Paragraph,
    Terminal,
};

use crate::clock::Clock;
use crate::ingest::{drain_into, Ping};
use crate::monitor::Monitor;
use crate::state::SharedState;
use crate::ui::lanes::render_lane;

pub const WAITING: &str = "Waiting for something to happen...";

pub fn run_tui<C: Clock>(
    monitor: &mut Monitor<C>,
    pings: Receiver<Ping>,
    status: Receiver<String>,
    shared: Arc<SharedState>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let frame_period = monitor.tick_period().clamp(Duration::from_millis(10), Duration::from_millis(250));
    let mut last_status = String::new();

    while !stop.load(Ordering::Relaxed) {
        drain_into(&pings, monitor);
        while let Ok(msg) = status.try_recv() {
            last_status = msg;
        }
        monitor.advance_now();

        let feeders = shared.summary();
        terminal.draw(|f| {
            let outer = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Min(0),    // Lanes
                    Constraint::Length(1), // Footer
                ].as_ref())
                .split(f.size());

            let registry = monitor.registry();
            if registry.is_empty() {
                let waiting = Paragraph::new(WAITING).style(Style::default().fg(Color::DarkGray));
                f.render_widget(waiting, outer[0]);
            } else {
                let n = registry.len() as u32;
                let constraints: Vec<Constraint> = (0..n).map(|_| Constraint::Ratio(1, n)).collect();
                let lanes = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints(constraints)
                    .split(outer[0]);
                for (source, area) in registry.iter().zip(lanes.iter()) {
                    render_lane(f, *area, source, monitor.scale());
                }
            }

            let total_lines: u64 = feeders.iter().map(|(_, n)| n).sum();
            let footer = Paragraph::new(format!(
                "q: quit | sources: {} | feeders: {} ({} lines) | {}",
                registry.len(),
                feeders.len(),
                total_lines,
                last_status
            ));
            f.render_widget(footer, outer[1]);
        })?;

        if event::poll(frame_period)? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q')
                    || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
                {
                    stop.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
