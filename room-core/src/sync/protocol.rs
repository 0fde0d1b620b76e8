//! Room Channel Messages

use serde::{Deserialize, Serialize};

/// A listener in a room, as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Provider user ID
    pub id: String,
    /// Display name shown in the member list
    pub display_name: String,
    /// Avatar image URL (users without a profile picture have none)
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Information about a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Provider track ID
    pub id: String,
    /// Track name
    pub name: String,
    /// Artist names, in credit order
    pub artists: Vec<String>,
    /// Album artwork URL
    #[serde(default)]
    pub album_art_url: Option<String>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl Track {
    /// Artists joined for display ("A, B")
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// What a user was listening to at poll time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub track: Track,
    /// Whether the provider reports playback as running. This is the only
    /// playing flag; the view and the player both read it.
    pub is_playing: bool,
    /// Elapsed position in the track, in milliseconds
    pub progress_ms: u64,
    /// User ID of the listener this snapshot was polled for
    pub owner_id: String,
}

/// Messages carried over the room channel.
///
/// Encoded as `{"event": "<name>", "data": {...}}` text frames. Event names
/// match the room backend's socket events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChannelMessage {
    /// Join (or re-join) a room. Sent first on every connection.
    #[serde(rename = "join room")]
    Join { room_id: String, user: User },

    /// Ordered member list of the room; the first member is the host
    #[serde(rename = "current users")]
    MemberList { members: Vec<User> },

    /// Host publishing what it is currently playing (`None` = nothing)
    #[serde(rename = "host song")]
    HostSong {
        room_id: String,
        song: Option<PlaybackSnapshot>,
    },

    /// The room's shared song, fanned out by the relay (`None` = nothing playing)
    #[serde(rename = "room song")]
    RoomSong { song: Option<PlaybackSnapshot> },

    /// Human-readable membership notice ("Alice joined the room")
    #[serde(rename = "user status")]
    UserStatus { message: String },
}

impl ChannelMessage {
    /// Encode to a JSON text frame
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON text frame
    pub fn from_frame(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    /// Event name, for logging
    pub fn event_name(&self) -> &'static str {
        match self {
            ChannelMessage::Join { .. } => "join room",
            ChannelMessage::MemberList { .. } => "current users",
            ChannelMessage::HostSong { .. } => "host song",
            ChannelMessage::RoomSong { .. } => "room song",
            ChannelMessage::UserStatus { .. } => "user status",
        }
    }
}
