use ratatui::{
    layout::Rect,
    style::Color,
    symbols::Marker,
    text::Line,
    widgets::{
        canvas::{Canvas, Line as CanvasLine},
        Block, Borders, Paragraph,
    },
    Frame,
};

use crate::clock::Clock;
use crate::rate::DecayingRateHistory;
use crate::registry::Source;

/// Payload lines shown per lane at most.
pub const MAX_PAYLOAD_LINES: usize = 30;
/// Share of the lane height used by the linear history strip.
pub const LINEAR_STRIP: f64 = 0.1;

/// Logarithmic-time points in `[0, 1] x [0, avg]`, newest at the right edge.
pub fn log_points(history: &DecayingRateHistory) -> Vec<(f64, f64)> {
    let n = history.allocated_size() as f64;
    history
        .iter_logarithmic()
        .map(|(i, avg)| (1.0 - i as f64 / n, avg))
        .collect()
}

/// Linear-time points over the last `size` ticks, newest at the right edge.
/// Buckets older than the strip's span are dropped.
pub fn linear_points(history: &DecayingRateHistory) -> Vec<(f64, f64)> {
    let span = history.size() as f64;
    history
        .iter_logical()
        .take_while(|&(pos, _)| pos <= span)
        .map(|(pos, avg)| (1.0 - pos / span, avg))
        .collect()
}

pub fn lane_title(name: &str, per_minute: f64) -> String {
    format!("{name} {} per minute", per_minute.max(0.0).floor() as u64)
}

fn segments(points: &[(f64, f64)], y_scale: f64, color: Color) -> Vec<CanvasLine> {
    points
        .windows(2)
        .map(|w| CanvasLine {
            x1: w[0].0,
            y1: w[0].1 * y_scale,
            x2: w[1].0,
            y2: w[1].1 * y_scale,
            color,
        })
        .collect()
}

/// Draws one source: rate marker, linear strip, logarithmic history, title
/// and latest payload.
pub fn render_lane<C: Clock>(f: &mut Frame, area: Rect, source: &Source<C>, scale: f64) {
    let rate = source.counter.value();
    let log_lines = segments(&log_points(&source.history), 1.0, Color::White);
    let lin_lines = segments(&linear_points(&source.history), LINEAR_STRIP, Color::DarkGray);

    let canvas = Canvas::default()
        .block(
            Block::default()
                .borders(Borders::TOP)
                .title(lane_title(&source.name, source.counter.per_minute())),
        )
        .marker(Marker::Braille)
        .x_bounds([0.0, 1.0])
        .y_bounds([0.0, scale])
        .paint(|ctx| {
            ctx.draw(&CanvasLine {
                x1: 0.0,
                y1: rate,
                x2: 1.0,
                y2: rate,
                color: Color::Rgb(60, 60, 60),
            });
            for l in &lin_lines {
                ctx.draw(l);
            }
            for l in &log_lines {
                ctx.draw(l);
            }
        });
    f.render_widget(canvas, area);

    let text_height = area.height.saturating_sub(1) as usize;
    let shown = source.last_payload.len().min(MAX_PAYLOAD_LINES).min(text_height);
    if shown > 0 {
        let width = source
            .last_payload
            .iter()
            .take(shown)
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0)
            .min(area.width as usize / 3) as u16;
        let payload_area = Rect {
            x: area.x + area.width.saturating_sub(width),
            y: area.y + 1,
            width,
            height: shown as u16,
        };
        let lines: Vec<Line> = source
            .last_payload
            .iter()
            .take(shown)
            .map(|l| Line::raw(l.clone()))
            .collect();
        f.render_widget(Paragraph::new(lines), payload_area);
    }
}
