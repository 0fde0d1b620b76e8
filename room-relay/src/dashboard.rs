//! Terminal dashboard for the room relay
//!
//! One status line, a table of open rooms (host, members, song) and the
//! activity log, newest entry first.

use crate::metrics::{LogLevel, Metrics, ServerStatus};
use crate::rooms::RoomSummary;
use crate::server::{self, ServerEvent};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parking_lot::RwLock;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const TICK: Duration = Duration::from_millis(100);

/// Log lines skipped per PageUp/PageDown
const PAGE: usize = 10;

/// What the viewer is looking at
#[derive(Debug, Default)]
struct View {
    /// Log entries hidden above the top of the list (0 = following new entries)
    log_offset: usize,
}

impl View {
    /// Apply a key press. Returns true when the dashboard should quit.
    fn on_key(&mut self, key: KeyEvent, log_len: usize) -> bool {
        let last = log_len.saturating_sub(1);
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Down | KeyCode::Char('j') => self.log_offset = (self.log_offset + 1).min(last),
            KeyCode::Up | KeyCode::Char('k') => self.log_offset = self.log_offset.saturating_sub(1),
            KeyCode::PageDown => self.log_offset = (self.log_offset + PAGE).min(last),
            KeyCode::PageUp => self.log_offset = self.log_offset.saturating_sub(PAGE),
            KeyCode::Home | KeyCode::End => self.log_offset = 0,
            _ => {}
        }
        false
    }
}

/// Run the relay with the dashboard in the foreground
pub async fn run(metrics: Arc<RwLock<Metrics>>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(ratatui::backend::CrosstermBackend::new(out))?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    // Server failures are written to the activity log by the server itself
    tokio::spawn(server::run_with_dashboard(Arc::clone(&metrics), event_tx));

    let mut view = View::default();
    loop {
        while let Ok(event) = event_rx.try_recv() {
            if let ServerEvent::Ready { addr } = event {
                metrics.write().log(LogLevel::Info, format!("Accepting room channels on ws://{}", addr));
            }
        }

        terminal.draw(|f| draw(f, &metrics.read(), &view))?;

        if !event::poll(TICK)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            let log_len = metrics.read().logs.len();
            if key.kind == KeyEventKind::Press && view.on_key(key, log_len) {
                break;
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn draw(f: &mut Frame, m: &Metrics, view: &View) {
    let room_rows = m.rooms.len().max(1) as u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length((room_rows + 3).min(14)),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_status(f, chunks[0], m);
    draw_rooms(f, chunks[1], &m.rooms);
    draw_log(f, chunks[2], m, view);

    let help = Paragraph::new(" q quit   ↑/↓ PgUp/PgDn scroll log   End newest")
        .style(Style::default().fg(Color::DarkGray));
    f.render_widget(help, chunks[3]);
}

fn draw_status(f: &mut Frame, area: Rect, m: &Metrics) {
    let (label, color) = match m.status {
        ServerStatus::Starting => ("starting", Color::Yellow),
        ServerStatus::Running => ("running", Color::Green),
        ServerStatus::Error => ("stopped", Color::Red),
    };
    let addr = m.listen_addr.as_deref().unwrap_or("-");

    let line = Line::from(vec![
        Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::raw(format!("  ws://{}  up {}", addr, m.uptime())),
        Span::raw(format!(
            "  │  {} conns (peak {}, {} total)  │  {} members  {} joins  │  {} frames, {}",
            m.connections,
            m.peak_connections,
            m.total_connections,
            m.member_count(),
            m.total_joins,
            m.messages_relayed,
            human_bytes(m.bytes_relayed),
        )),
    ]);

    let status = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(" Room Relay "));
    f.render_widget(status, area);
}

fn draw_rooms(f: &mut Frame, area: Rect, rooms: &[RoomSummary]) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Rooms ({}) ", rooms.len()));

    if rooms.is_empty() {
        let empty = Paragraph::new("No open rooms").style(Style::default().fg(Color::DarkGray)).block(block);
        f.render_widget(empty, area);
        return;
    }

    let rows = rooms.iter().map(|r| Row::new(room_cells(r)));
    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(16),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Min(20),
        ],
    )
    .header(
        Row::new(["Room", "Host", "Members", "Conns", "Song"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(block);
    f.render_widget(table, area);
}

/// Table cells for one room
fn room_cells(room: &RoomSummary) -> [String; 5] {
    let song = match &room.song {
        Some(song) if room.playing => format!("▶ {}", song),
        Some(song) => format!("⏸ {}", song),
        None => "-".to_string(),
    };
    [
        room.room_id.clone(),
        room.host.clone().unwrap_or_else(|| "-".to_string()),
        room.members.to_string(),
        room.connections.to_string(),
        song,
    ]
}

fn draw_log(f: &mut Frame, area: Rect, m: &Metrics, view: &View) {
    let items: Vec<ListItem> = m
        .logs
        .iter()
        .rev()
        .skip(view.log_offset)
        .map(|entry| {
            let color = match entry.level {
                LogLevel::Info => Color::Blue,
                LogLevel::Warning => Color::Yellow,
                LogLevel::Error => Color::Red,
                LogLevel::Connection => Color::Green,
                LogLevel::Room => Color::Magenta,
            };
            ListItem::new(Line::from(vec![
                Span::styled(entry.timestamp.format("%H:%M:%S ").to_string(), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{:<5} ", entry.level.as_str()), Style::default().fg(color)),
                Span::raw(entry.message.as_str()),
            ]))
        })
        .collect();

    let title = match view.log_offset {
        0 => " Activity ".to_string(),
        n => format!(" Activity (+{} newer) ", n),
    };
    f.render_widget(List::new(items).block(Block::default().borders(Borders::ALL).title(title)), area);
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
