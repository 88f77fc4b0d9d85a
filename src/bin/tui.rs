mod tui_app;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use tui_app::{
    below_threshold, format_checked_at, format_dates, format_latency, format_price, format_status,
    truncate, AppState, ConnectionStatus, WindowView,
};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

    // Checks can take a full provider round trip plus retries.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut window_table_state = TableState::default();
    window_table_state.select(Some(0));

    let result = run_loop(&mut terminal, &mut app, &client, &mut window_table_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
    window_state: &mut TableState,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(5);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app, window_state))?;

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Char('c') | KeyCode::Char('C') => {
                            let selected = window_state
                                .selected()
                                .and_then(|i| app.windows.get(i))
                                .map(|w| w.id.clone());
                            if let Some(id) = selected {
                                app.check_window(client, &id).await;
                                last_tick = std::time::Instant::now();
                            }
                        }
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.windows.len().saturating_sub(1);
                            let next = window_state.selected().map_or(0, |i| (i + 1).min(max));
                            window_state.select(Some(next));
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let prev = window_state
                                .selected()
                                .map_or(0, |i| i.saturating_sub(1));
                            window_state.select(Some(prev));
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, window_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | body | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, window_state, chunks[1]);
    render_footer(f, app, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };

    let h = &app.health;
    let sweep = if h.sweep_running.unwrap_or(false) {
        "sweeping…".to_string()
    } else {
        format!("last sweep {}", format_checked_at(h.last_sweep_at))
    };
    let threshold = h
        .price_threshold
        .map_or("—".to_string(), |t| format!("< {:.0} {}", t, h.currency.as_deref().unwrap_or("")));

    let title_spans = vec![
        Span::styled(
            " Fare Monitor  ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            h.provider.clone().unwrap_or_else(|| "—".to_string()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(format!("alert {threshold}"), Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(sweep, Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(
            format!("{} alerts", h.alerts_fired.unwrap_or(0)),
            Style::default().fg(Color::Magenta),
        ),
    ];

    let paragraph = Paragraph::new(Line::from(title_spans))
        .block(Block::default().borders(Borders::ALL).border_style(
            Style::default().fg(Color::DarkGray),
        ));

    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, window_state: &mut TableState, area: Rect) {
    // Horizontal split: windows (60%) | selected window detail (40%)
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    render_windows_table(f, app, window_state, halves[0]);
    let selected = window_state.selected().and_then(|i| app.windows.get(i));
    render_detail(f, app, selected, halves[1]);
}

fn render_windows_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["Dates", "Status", "Best", "Airline", "Checked"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let cheapest_id = app.cheapest_window().map(|w| w.id.as_str());

    let rows: Vec<Row> = app
        .windows
        .iter()
        .map(|w| {
            let obs = &w.observation;
            let status_color = match obs.status.as_str() {
                "OK" => Color::Green,
                "NO_RESULTS" => Color::DarkGray,
                "RATE_LIMITED" => Color::Yellow,
                "ERROR" => Color::Red,
                _ => Color::White,
            };
            let price_color = if below_threshold(obs.best_price.as_ref(), app.health.price_threshold) {
                Color::Green
            } else {
                Color::White
            };
            let mut price = format_price(obs.best_price.as_ref());
            if cheapest_id == Some(w.id.as_str()) {
                price.push_str(" ★");
            }
            let airline = obs
                .offers
                .first()
                .map_or("—".to_string(), |o| o.airline.clone());

            Row::new(vec![
                Cell::from(format_dates(w.target.outbound_date, w.target.return_date)),
                Cell::from(format_status(&obs.status)).style(Style::default().fg(status_color)),
                Cell::from(price).style(Style::default().fg(price_color)),
                Cell::from(airline).style(Style::default().fg(Color::Cyan)),
                Cell::from(format_checked_at(obs.last_checked_at))
                    .style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let title = app
        .windows
        .first()
        .map_or(" WINDOWS ".to_string(), |w| {
            format!(" WINDOWS {}→{} ", w.target.origin, w.target.destination)
        });

    let table = Table::new(
        rows,
        [
            Constraint::Length(22),
            Constraint::Length(8),
            Constraint::Min(12),
            Constraint::Length(7),
            Constraint::Length(9),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, state);
}

fn render_detail(f: &mut Frame, app: &AppState, window: Option<&WindowView>, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();

    match window {
        None => lines.push(Line::from(Span::styled(
            "no window selected",
            Style::default().fg(Color::DarkGray),
        ))),
        Some(w) => {
            let obs = &w.observation;
            lines.push(Line::from(Span::styled(
                w.id.clone(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(format!(
                "via {} · max layover {} min",
                w.target.preferred_stopover.as_deref().unwrap_or("any"),
                w.target.max_stopover_minutes
            )));
            lines.push(Line::from(format!(
                "last alerted: {}",
                obs.last_alerted_price
                    .map_or("—".to_string(), |p| format!("{p:.2}"))
            )));
            if let Some(err) = &obs.last_error {
                lines.push(Line::from(Span::styled(
                    truncate(err, 60),
                    Style::default().fg(Color::Red),
                )));
            }
            lines.push(Line::raw(""));
            for offer in obs.offers.iter().take(5) {
                let marker = if offer.preferred_stop_matched { "●" } else { "○" };
                lines.push(Line::from(vec![
                    Span::styled(format!("{marker} "), Style::default().fg(Color::Yellow)),
                    Span::raw(format!("{:<3} ", offer.airline)),
                    Span::raw(format_price(Some(&offer.price))),
                ]));
            }
        }
    }

    lines.push(Line::raw(""));
    lines.push(Line::from(Span::styled(
        format!(
            "provider latency p50 {} · p99 {} ({} calls)",
            format_latency(app.latency.p50_ms),
            format_latency(app.latency.p99_ms),
            app.latency.samples
        ),
        Style::default().fg(Color::DarkGray),
    )));

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " DETAIL ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let mut spans = vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[c] ", Style::default().fg(Color::Yellow)),
        Span::raw("check now  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("select  "),
    ];
    match &app.last_action {
        Some(action) => spans.push(Span::styled(truncate(action, 60), Style::default().fg(Color::Cyan))),
        None => spans.push(Span::styled("auto-refresh: 5s", Style::default().fg(Color::DarkGray))),
    }
    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
