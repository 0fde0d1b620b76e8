//! Render-ready room view

use crate::queue::{PlayQueue, QueueView};
use crate::sync::{PlaybackSnapshot, RoomState, Track, User};

/// Artwork shown while nothing is playing
pub const PLACEHOLDER_ART: &str = "./images/logo.jpg";

/// Something the UI should tell the listener about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The access token could not be resolved to a user
    IdentityUnavailable,
    /// The last playback poll failed; polling resumes on acknowledge
    NotPlaying,
    /// The room channel gave up reconnecting
    ChannelLost,
}

/// Room channel connection state as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Waiting for identity, or first connection in progress
    Connecting,
    Connected,
    Reconnecting,
    /// Retries exhausted
    Lost,
    /// We left the room
    Closed,
}

/// A member row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberView {
    pub user: User,
    pub is_host: bool,
    pub is_local: bool,
}

/// The local "now playing" panel. Never empty: falls back to a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub track: Track,
    pub is_playing: bool,
    pub progress_ms: u64,
    /// True when `track` is the placeholder
    pub placeholder: bool,
}

impl NowPlaying {
    pub fn placeholder() -> Self {
        Self {
            track: Track {
                id: String::new(),
                name: String::new(),
                artists: Vec::new(),
                album_art_url: Some(PLACEHOLDER_ART.to_string()),
                duration_ms: 0,
            },
            is_playing: false,
            progress_ms: 0,
            placeholder: true,
        }
    }

    fn from_snapshot(snapshot: &PlaybackSnapshot) -> Self {
        let mut track = snapshot.track.clone();
        if track.album_art_url.is_none() {
            track.album_art_url = Some(PLACEHOLDER_ART.to_string());
        }
        Self {
            track,
            is_playing: snapshot.is_playing,
            progress_ms: snapshot.progress_ms,
            placeholder: false,
        }
    }
}

/// Everything the room screen renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    pub room_id: String,
    pub user: Option<User>,
    pub is_host: bool,
    pub members: Vec<MemberView>,
    pub now_playing: NowPlaying,
    pub room_song: Option<PlaybackSnapshot>,
    pub queue: QueueView,
    pub notice: Option<Notice>,
    pub channel: ChannelStatus,
}

impl RoomView {
    /// Project engine state into a view
    pub fn build(
        state: &RoomState,
        queue: &PlayQueue,
        notice: Option<Notice>,
        channel: ChannelStatus,
    ) -> Self {
        let local_id = state.local_user_id();
        let host_id = state.members.host_id();
        let members = state
            .members
            .iter()
            .map(|u| MemberView {
                user: u.clone(),
                is_host: Some(u.id.as_str()) == host_id,
                is_local: Some(u.id.as_str()) == local_id,
            })
            .collect();

        let now_playing = state
            .local_playback
            .as_ref()
            .map(NowPlaying::from_snapshot)
            .unwrap_or_else(NowPlaying::placeholder);

        let highlighted = state.local_playback.as_ref().map(|s| s.track.id.as_str());

        Self {
            room_id: state.room_id.clone(),
            user: state.local_user.clone(),
            is_host: state.is_host(),
            members,
            now_playing,
            room_song: state.room_song.snapshot().cloned(),
            queue: queue.render(highlighted),
            notice,
            channel,
        }
    }
}
