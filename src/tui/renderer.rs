//! TUI rendering logic using ratatui.
//!
//! Handles layout, formatting and color coding of the live monitor view.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Sparkline},
    Frame,
};

use super::progress::CheckPhase;
use super::state::{ErrorInfo, TuiState};
use crate::alg::AlgVerdict;
use crate::quality::{grade, QualityScore};

/// Get color for a latency value.
///
/// - Green: < 80 ms
/// - Yellow: 80-150 ms
/// - Red: >= 150 ms
pub fn latency_color(latency_ms: f64) -> Color {
    if latency_ms < 80.0 {
        Color::Green
    } else if latency_ms < 150.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Get color for a packet loss percentage.
pub fn loss_color(loss_percent: f64) -> Color {
    if loss_percent < 1.0 {
        Color::Green
    } else if loss_percent < 5.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub fn verdict_color(verdict: AlgVerdict) -> Color {
    match verdict {
        AlgVerdict::Unlikely => Color::Green,
        AlgVerdict::Possible => Color::Yellow,
        AlgVerdict::Likely => Color::Red,
    }
}

pub fn quality_color(score: QualityScore) -> Color {
    match score {
        QualityScore::Great | QualityScore::Good => Color::Green,
        QualityScore::Average => Color::Yellow,
        QualityScore::Poor => Color::Red,
    }
}

/// Format latency value with 2 decimal places.
pub fn format_latency(latency_ms: f64) -> String {
    format!("{:.2} ms", latency_ms)
}

/// Minimal mode threshold in columns.
const MINIMAL_MODE_THRESHOLD: u16 = 60;

/// Check if minimal mode should be used based on terminal width.
pub fn is_minimal_mode(width: u16) -> bool {
    width < MINIMAL_MODE_THRESHOLD
}

/// Render the TUI to the terminal.
///
/// Narrow terminals get a compact text-only layout.
pub fn render_frame(frame: &mut Frame, state: &TuiState) {
    if is_minimal_mode(frame.area().width) {
        render_minimal_frame(frame, state);
    } else {
        render_normal_frame(frame, state);
    }
}

fn render_normal_frame(frame: &mut Frame, state: &TuiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Header
            Constraint::Length(3), // Current phase
            Constraint::Length(8), // Statistics
            Constraint::Min(4),    // Sparkline
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_header(frame, chunks[0], state);
    render_phase_indicator(frame, chunks[1], state);
    if let Some(ref error) = state.error {
        render_error(frame, chunks[2], error);
    } else {
        render_stats(frame, chunks[2], state);
    }
    render_sparkline(frame, chunks[3], state);
    render_status_bar(frame, chunks[4], state);
}

/// Render the compact layout for narrow terminals.
pub fn render_minimal_frame(frame: &mut Frame, state: &TuiState) {
    let mut lines = Vec::new();

    if let Some(ref target) = state.target {
        lines.push(Line::from(format!("Target: {}", target)));
    }
    if let Some(ref alg) = state.alg {
        lines.push(Line::from(Span::styled(
            format!("SIP ALG (heuristic): {}", alg.verdict),
            Style::default().fg(verdict_color(alg.verdict)),
        )));
    }
    if let Some(ref snapshot) = state.snapshot {
        lines.push(Line::from(format!(
            "Avg {} Jit {}",
            format_latency(snapshot.avg_latency_ms),
            format_latency(snapshot.jitter_ms)
        )));
        lines.push(Line::from(Span::styled(
            format!(
                "Loss {:.2}% ({}/{})",
                snapshot.packet_loss_percent,
                snapshot.packets_lost(),
                snapshot.packets_sent
            ),
            Style::default().fg(loss_color(snapshot.packet_loss_percent)),
        )));
    }
    if let Some(ref error) = state.error {
        lines.push(Line::from(Span::styled(
            format!("Error: {}", error.message),
            Style::default().fg(Color::Red),
        )));
    }

    frame.render_widget(Paragraph::new(lines), frame.area());
}

fn label(text: &str) -> Span<'_> {
    Span::styled(
        text,
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )
}

/// Render target, probe strategy and ALG verdict.
pub fn render_header(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines = Vec::new();

    if let Some(ref target) = state.target {
        let strategy = state
            .strategy
            .map(|s| format!(" via {}", s))
            .unwrap_or_default();
        lines.push(Line::from(vec![
            label("Target: "),
            Span::styled(
                format!("{}{}", target, strategy),
                Style::default().fg(Color::Cyan),
            ),
        ]));
    }

    if let Some(ref alg) = state.alg {
        let local_ip = alg
            .local_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        lines.push(Line::from(vec![
            label("SIP ALG (heuristic): "),
            Span::styled(
                alg.verdict.to_string(),
                Style::default()
                    .fg(verdict_color(alg.verdict))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  (local IP {})", local_ip),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
    }

    frame.render_widget(Paragraph::new(lines), inner);
}

/// Render the current phase indicator.
pub fn render_phase_indicator(frame: &mut Frame, area: Rect, state: &TuiState) {
    let phase_text = match state.phase {
        CheckPhase::Initializing => "◐ Initializing...",
        CheckPhase::AlgCheck => "▶ SIP ALG Check",
        CheckPhase::Monitoring => "▶ Monitoring",
        CheckPhase::Complete => "✓ Complete",
    };

    let style = match state.phase {
        CheckPhase::Complete => {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        }
        _ => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    };

    let block = Block::default().borders(Borders::BOTTOM);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    frame.render_widget(Paragraph::new(phase_text).style(style), inner);
}

/// Render the latest statistics.
pub fn render_stats(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default().title(" Statistics ").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(ref snapshot) = state.snapshot else {
        frame.render_widget(
            Paragraph::new("Waiting for the first probe...")
                .style(Style::default().fg(Color::DarkGray)),
            inner,
        );
        return;
    };

    let last = match state.last_latency() {
        Some(ms) => {
            Span::styled(format_latency(ms), Style::default().fg(latency_color(ms)))
        }
        None if state.last_sequence > 0 => {
            Span::styled("timeout", Style::default().fg(Color::Red))
        }
        None => Span::raw("-"),
    };

    let mut lines = vec![
        Line::from(vec![label("Last:     "), last]),
        Line::from(vec![
            label("Latency:  "),
            Span::styled(
                format!(
                    "avg {}  min {}  max {}",
                    format_latency(snapshot.avg_latency_ms),
                    format_latency(snapshot.min_latency_ms),
                    format_latency(snapshot.max_latency_ms)
                ),
                Style::default().fg(latency_color(snapshot.avg_latency_ms)),
            ),
        ]),
        Line::from(vec![
            label("Jitter:   "),
            Span::raw(format_latency(snapshot.jitter_ms)),
        ]),
        Line::from(vec![
            label("Loss:     "),
            Span::styled(
                format!(
                    "{:.2}% ({} of {} lost)",
                    snapshot.packet_loss_percent,
                    snapshot.packets_lost(),
                    snapshot.packets_sent
                ),
                Style::default().fg(loss_color(snapshot.packet_loss_percent)),
            ),
        ]),
    ];

    if snapshot.has_samples() {
        let quality = grade(snapshot);
        lines.push(Line::from(vec![
            label("Call:     "),
            Span::styled(
                format!("{} (MOS {:.2})", quality.score.description(), quality.mos),
                Style::default().fg(quality_color(quality.score)),
            ),
        ]));
    }

    frame.render_widget(Paragraph::new(lines), inner);
}

/// Render recent latencies as a sparkline.
pub fn render_sparkline(frame: &mut Frame, area: Rect, state: &TuiState) {
    let data = state.sparkline_data();
    // Keep the newest samples that fit inside the borders.
    let width = area.width.saturating_sub(2) as usize;
    let visible = &data[data.len().saturating_sub(width)..];

    let sparkline = Sparkline::default()
        .block(Block::default().title(" Latency (ms) ").borders(Borders::ALL))
        .data(visible)
        .style(Style::default().fg(Color::Cyan));

    frame.render_widget(sparkline, area);
}

fn render_error(frame: &mut Frame, area: Rect, error: &ErrorInfo) {
    let mut lines = vec![Line::from(Span::styled(
        format!("✗ {}", error.message),
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    ))];

    if let Some(ref suggestion) = error.suggestion {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            suggestion.clone(),
            Style::default().fg(Color::Yellow),
        )));
    }

    let block = Block::default().title(" Error ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Render the status bar at the bottom.
pub fn render_status_bar(frame: &mut Frame, area: Rect, state: &TuiState) {
    let status_text = match state.phase {
        CheckPhase::Initializing => "Preparing probes...".to_string(),
        CheckPhase::AlgCheck => "Looking for SIP ALG evidence...".to_string(),
        CheckPhase::Monitoring => {
            format!("Probe #{}  |  press q to stop", state.last_sequence)
        }
        CheckPhase::Complete => "Check complete. Press any key to exit.".to_string(),
    };

    frame.render_widget(
        Paragraph::new(status_text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alg::{AlgEvidence, AlgReport};
    use crate::probe::ProbeStrategy;
    use crate::snapshot::{LatencyAggregates, Snapshot};
    use crate::tui::progress::ProgressEvent;
    use proptest::prelude::*;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn draw_to_string(width: u16, height: u16, state: &TuiState) -> String {
        let backend = TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend).unwrap();

        terminal.draw(|frame| render_frame(frame, state)).unwrap();

        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer.cell((x, y)).unwrap().symbol());
            }
            text.push('\n');
        }
        text
    }

    fn monitoring_state() -> TuiState {
        let mut state = TuiState::new();
        state.update_from_event(&ProgressEvent::MonitorStarted {
            target: "198.51.100.7".to_string(),
            strategy: ProbeStrategy::Icmp,
        });
        state.update_from_event(&ProgressEvent::AlgResult(AlgReport::from_evidence(
            &AlgEvidence {
                local_ip: Some("192.168.0.10".parse().unwrap()),
                behind_nat: true,
                sip_port_bind_failed: false,
            },
        )));
        state.update_from_event(&ProgressEvent::PhaseChange(CheckPhase::Monitoring));
        state.update_from_event(&ProgressEvent::Sample {
            sequence: 4,
            latency_ms: Some(23.0),
            snapshot: Snapshot::new(
                "198.51.100.7",
                4,
                3,
                25.0,
                LatencyAggregates { avg_ms: 21.0, min_ms: 19.0, max_ms: 23.0 },
                2.0,
            ),
        });
        state
    }

    #[test]
    fn test_latency_color_thresholds() {
        assert_eq!(latency_color(12.0), Color::Green);
        assert_eq!(latency_color(80.0), Color::Yellow);
        assert_eq!(latency_color(149.9), Color::Yellow);
        assert_eq!(latency_color(150.0), Color::Red);
    }

    #[test]
    fn test_loss_color_thresholds() {
        assert_eq!(loss_color(0.0), Color::Green);
        assert_eq!(loss_color(2.5), Color::Yellow);
        assert_eq!(loss_color(50.0), Color::Red);
    }

    #[test]
    fn test_minimal_mode_boundary() {
        assert!(is_minimal_mode(59));
        assert!(!is_minimal_mode(60));
    }

    #[test]
    fn test_full_frame_shows_statistics() {
        let text = draw_to_string(100, 24, &monitoring_state());

        assert!(text.contains("198.51.100.7"));
        assert!(text.contains("icmp"));
        assert!(text.contains("POSSIBLE"));
        assert!(text.contains("21.00 ms"));
        assert!(text.contains("25.00%"));
        assert!(text.contains("Probe #4"));
    }

    #[test]
    fn test_minimal_frame_shows_statistics() {
        let text = draw_to_string(40, 10, &monitoring_state());

        assert!(text.contains("Target: 198.51.100.7"));
        assert!(text.contains("Loss 25.00% (1/4)"));
    }

    #[test]
    fn test_error_is_rendered() {
        let mut state = monitoring_state();
        state.set_error("probe socket closed".to_string(), Some("retry".to_string()));

        let text = draw_to_string(100, 24, &state);
        assert!(text.contains("probe socket closed"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Property: formatted latency always has exactly 2 decimal places.
        #[test]
        fn prop_latency_formatting_precision(latency in 0.0f64..10_000.0) {
            let formatted = format_latency(latency);
            prop_assert!(formatted.ends_with(" ms"));
            let number = formatted.trim_end_matches(" ms");
            let decimals = number.split('.').nth(1).map(str::len);
            prop_assert_eq!(decimals, Some(2));
        }

        /// Property: latency colors only get worse as latency grows.
        #[test]
        fn prop_latency_color_monotonic(a in 0.0f64..1000.0, b in 0.0f64..1000.0) {
            let rank = |c: Color| match c {
                Color::Green => 0,
                Color::Yellow => 1,
                _ => 2,
            };
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(rank(latency_color(lo)) <= rank(latency_color(hi)));
        }
    }
}
