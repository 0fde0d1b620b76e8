//! Test doubles shared by the channel and engine tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::channel::{ChannelError, Connector, Transport};
use crate::provider::{PlaybackProvider, ProviderError, QueueStore, StoreError};
use crate::queue::QueueEntry;
use crate::sync::{ChannelMessage, PlaybackSnapshot, Track, User};

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        avatar_url: None,
    }
}

pub fn track(id: &str, duration_ms: u64) -> Track {
    Track {
        id: id.to_string(),
        name: format!("Song {}", id),
        artists: vec!["Artist".to_string()],
        album_art_url: None,
        duration_ms,
    }
}

pub fn snapshot(track_id: &str, owner: &str, duration_ms: u64, progress_ms: u64) -> PlaybackSnapshot {
    PlaybackSnapshot {
        track: track(track_id, duration_ms),
        is_playing: true,
        progress_ms,
        owner_id: owner.to_string(),
    }
}

pub fn entry(track_id: &str) -> QueueEntry {
    QueueEntry {
        id: format!("doc-{}", track_id),
        track_id: track_id.to_string(),
        label: format!("Song {} - Artist", track_id),
        played: false,
    }
}

pub fn decode(frame: &str) -> ChannelMessage {
    ChannelMessage::from_frame(frame).unwrap()
}

pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Server side of an accepted mock connection
pub struct Remote {
    pub server_tx: mpsc::UnboundedSender<String>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<Mutex<bool>>,
}

impl Remote {
    pub fn push(&self, message: ChannelMessage) {
        self.server_tx.send(message.to_frame().unwrap()).unwrap();
    }

    pub fn sent_messages(&self) -> Vec<ChannelMessage> {
        self.sent.lock().iter().map(|f| decode(f)).collect()
    }
}

/// Scripted connection attempts, consumed in order; an empty script fails
#[derive(Clone, Default)]
pub struct MockConnector {
    attempts: Arc<Mutex<VecDeque<Option<MockTransport>>>>,
    /// How long each attempt takes
    delay: Duration,
    connects: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Connection attempts started so far
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn accept(&self) -> Remote {
        let (server_tx, incoming) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        self.attempts.lock().push_back(Some(MockTransport {
            incoming,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        }));
        Remote { server_tx, sent, closed }
    }

    pub fn refuse(&self) {
        self.attempts.lock().push_back(None);
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self) -> Result<MockTransport, ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.attempts.lock().pop_front();
        match next {
            Some(Some(transport)) => Ok(transport),
            _ => Err(ChannelError::Connect("connection refused".to_string())),
        }
    }
}

/// Provider whose answers the test changes between steps
#[derive(Default)]
pub struct MockProvider {
    /// `None` answers `Unauthorized`
    pub user: Mutex<Option<User>>,
    /// `None` answers `NothingPlaying`
    pub playback: Mutex<Option<PlaybackSnapshot>>,
    polls: AtomicUsize,
}

impl MockProvider {
    pub fn new(user: Option<User>, playback: Option<PlaybackSnapshot>) -> Self {
        Self {
            user: Mutex::new(user),
            playback: Mutex::new(playback),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackProvider for MockProvider {
    async fn get_user_data(&self, _token: &str) -> Result<User, ProviderError> {
        self.user.lock().clone().ok_or(ProviderError::Unauthorized)
    }

    async fn get_current_playback(&self, _token: &str, owner_id: &str) -> Result<PlaybackSnapshot, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut snapshot = self.playback.lock().clone().ok_or(ProviderError::NothingPlaying)?;
        snapshot.owner_id = owner_id.to_string();
        Ok(snapshot)
    }
}

#[derive(Default)]
pub struct MockStore {
    pub tracks: Mutex<Vec<QueueEntry>>,
    /// `(room_id, track_id)` of every played-status update
    pub played: Mutex<Vec<(String, String)>>,
}

impl MockStore {
    pub fn with_tracks(tracks: Vec<QueueEntry>) -> Self {
        Self {
            tracks: Mutex::new(tracks),
            played: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueueStore for MockStore {
    async fn get_tracks(&self, _room_id: &str) -> Result<Vec<QueueEntry>, StoreError> {
        Ok(self.tracks.lock().clone())
    }

    async fn update_track_played_status(&self, room_id: &str, track_id: &str) -> Result<(), StoreError> {
        self.played.lock().push((room_id.to_string(), track_id.to_string()));
        Ok(())
    }
}
