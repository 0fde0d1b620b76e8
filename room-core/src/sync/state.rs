//! Room State Management

use std::collections::HashSet;

use super::protocol::{PlaybackSnapshot, User};

/// Ordered member list of a room.
///
/// Join order decides the host: the first member is always the host. The list
/// is only ever replaced wholesale from a `current users` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Members {
    list: Vec<User>,
    host_id: Option<String>,
}

impl Members {
    /// Build from a member list as received, dropping repeated user IDs
    pub fn from_list(members: Vec<User>) -> Self {
        let mut seen = HashSet::new();
        let list: Vec<User> = members
            .into_iter()
            .filter(|u| seen.insert(u.id.clone()))
            .collect();
        let host_id = list.first().map(|u| u.id.clone());
        Self { list, host_id }
    }

    /// Current host's user ID
    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    /// Current host
    pub fn host(&self) -> Option<&User> {
        self.list.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.list.iter()
    }
}

/// The room's shared "now playing"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RoomSong {
    #[default]
    Nothing,
    Playing(PlaybackSnapshot),
}

impl RoomSong {
    pub fn snapshot(&self) -> Option<&PlaybackSnapshot> {
        match self {
            RoomSong::Nothing => None,
            RoomSong::Playing(s) => Some(s),
        }
    }
}

impl From<Option<PlaybackSnapshot>> for RoomSong {
    fn from(song: Option<PlaybackSnapshot>) -> Self {
        song.map(RoomSong::Playing).unwrap_or_default()
    }
}

/// How a member-list update moved the host role, seen from the local user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostChange {
    /// Same host as before
    Unchanged,
    /// We are the new host and must start publishing
    BecameHost,
    /// We were the host and must stop publishing
    LostHost,
    /// Host moved between two other members
    HostSwitched,
}

/// Everything the room view knows about the room
#[derive(Debug, Clone)]
pub struct RoomState {
    /// Room identifier from the launch parameters
    pub room_id: String,
    /// Our identity (unknown until the identity fetch completes)
    pub local_user: Option<User>,
    /// Ordered member list
    pub members: Members,
    /// Shared song (the host's snapshot)
    pub room_song: RoomSong,
    /// Our own playback, from the latest successful poll
    pub local_playback: Option<PlaybackSnapshot>,
}

impl RoomState {
    pub fn new(room_id: String) -> Self {
        Self {
            room_id,
            local_user: None,
            members: Members::default(),
            room_song: RoomSong::Nothing,
            local_playback: None,
        }
    }

    /// Our user ID, if identity is known
    pub fn local_user_id(&self) -> Option<&str> {
        self.local_user.as_ref().map(|u| u.id.as_str())
    }

    /// Check if we are the host. Always false while identity is unknown.
    pub fn is_host(&self) -> bool {
        match (self.local_user_id(), self.members.host_id()) {
            (Some(local), Some(host)) => local == host,
            _ => false,
        }
    }

    /// Record our identity. Returns `BecameHost` if a member list received
    /// before identity already named us as host.
    ///
    /// A snapshot polled before identity was known is attributed to us now.
    pub fn set_local_user(&mut self, user: User) -> HostChange {
        let was_host = self.is_host();
        if let Some(playback) = self.local_playback.as_mut() {
            playback.owner_id = user.id.clone();
        }
        self.local_user = Some(user);
        if !was_host && self.is_host() {
            self.room_song = RoomSong::from(self.local_playback.clone());
            HostChange::BecameHost
        } else {
            HostChange::Unchanged
        }
    }

    /// Replace the member list and recompute the host.
    ///
    /// Any change of host identity clears the room song until the new host
    /// publishes. When we become host our own playback is the room song.
    pub fn apply_member_list(&mut self, members: Vec<User>) -> HostChange {
        let was_host = self.is_host();
        let old_host = self.members.host_id().map(str::to_owned);

        self.members = Members::from_list(members);

        let new_host = self.members.host_id();
        if old_host.as_deref() == new_host {
            return HostChange::Unchanged;
        }

        self.room_song = RoomSong::Nothing;

        match (was_host, self.is_host()) {
            (false, true) => {
                self.room_song = RoomSong::from(self.local_playback.clone());
                HostChange::BecameHost
            }
            (true, false) => HostChange::LostHost,
            _ => HostChange::HostSwitched,
        }
    }

    /// Apply a room song from the channel.
    ///
    /// Returns false (and leaves state untouched) when the song is attributed
    /// to someone other than the current host, or when we are the host
    /// ourselves (our own polls are authoritative then).
    pub fn apply_room_song(&mut self, song: Option<PlaybackSnapshot>) -> bool {
        if self.is_host() {
            return false;
        }
        if let Some(s) = &song {
            if self.members.host_id() != Some(s.owner_id.as_str()) {
                return false;
            }
        }
        self.room_song = RoomSong::from(song);
        true
    }

    /// Record the result of a poll. As host, our snapshot is the room song.
    pub fn update_local_playback(&mut self, snapshot: Option<PlaybackSnapshot>) {
        if self.is_host() {
            self.room_song = RoomSong::from(snapshot.clone());
        }
        self.local_playback = snapshot;
    }

    /// The snapshot we should publish, if we are the host and playing anything
    pub fn publishable_song(&self) -> Option<&PlaybackSnapshot> {
        if self.is_host() {
            self.local_playback.as_ref()
        } else {
            None
        }
    }
}
