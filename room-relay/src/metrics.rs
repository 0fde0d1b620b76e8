//! Metrics tracking for the relay server

use crate::rooms::RoomSummary;
use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// Maximum number of log entries to keep
const MAX_LOG_ENTRIES: usize = 100;

/// A log entry for the dashboard
#[derive(Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Connection,
    Room,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Connection => "CONN",
            LogLevel::Room => "ROOM",
        }
    }
}

/// Server metrics
pub struct Metrics {
    /// Server start time
    pub start_time: DateTime<Local>,

    /// Address the server listens on
    pub listen_addr: Option<String>,

    /// Current number of open connections
    pub connections: usize,

    /// Total connections since start
    pub total_connections: u64,

    /// Peak simultaneous connections
    pub peak_connections: usize,

    /// Open rooms, ordered by id
    pub rooms: Vec<RoomSummary>,

    /// Total joins since start
    pub total_joins: u64,

    /// Frames sent to clients
    pub messages_relayed: u64,

    /// Bytes sent to clients
    pub bytes_relayed: u64,

    /// Log entries
    pub logs: VecDeque<LogEntry>,

    /// Server status
    pub status: ServerStatus,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ServerStatus {
    Starting,
    Running,
    Error,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Local::now(),
            listen_addr: None,
            connections: 0,
            total_connections: 0,
            peak_connections: 0,
            rooms: Vec::new(),
            total_joins: 0,
            messages_relayed: 0,
            bytes_relayed: 0,
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            status: ServerStatus::Starting,
        }
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });
    }

    pub fn connection_opened(&mut self, addr: &str) {
        self.connections += 1;
        self.total_connections += 1;
        if self.connections > self.peak_connections {
            self.peak_connections = self.connections;
        }
        self.log(LogLevel::Connection, format!("Connected: {}", addr));
    }

    pub fn connection_closed(&mut self, addr: &str) {
        self.connections = self.connections.saturating_sub(1);
        self.log(LogLevel::Connection, format!("Disconnected: {}", addr));
    }

    pub fn user_joined(&mut self, room_id: &str, display_name: &str) {
        self.total_joins += 1;
        self.log(LogLevel::Room, format!("{} joined {}", display_name, room_id));
    }

    /// Replace the room table with a fresh registry snapshot
    pub fn rooms_changed(&mut self, rooms: Vec<RoomSummary>) {
        self.rooms = rooms;
    }

    /// Users joined across all rooms
    pub fn member_count(&self) -> usize {
        self.rooms.iter().map(|r| r.members).sum()
    }

    pub fn frames_sent(&mut self, count: u64, bytes: u64) {
        self.messages_relayed += count;
        self.bytes_relayed += bytes;
    }

    /// Get uptime as formatted string
    pub fn uptime(&self) -> String {
        let duration = Local::now().signed_duration_since(self.start_time);
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            let hours = secs / 3600;
            let mins = (secs % 3600) / 60;
            format!("{}h {}m", hours, mins)
        }
    }
}
