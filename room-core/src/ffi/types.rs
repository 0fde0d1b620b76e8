//! FFI types exposed via uniffi

use crate::config::LaunchError;
use crate::engine::{
    ChannelStatus as InternalChannelStatus, EngineError, MemberView, Notice as InternalNotice,
    NowPlaying as InternalNowPlaying, RoomView as InternalRoomView,
};
use crate::queue::{QueueRow as InternalQueueRow, QueueRowStyle, QueueView as InternalQueueView};
use crate::sync::{PlaybackSnapshot, Track, User as InternalUser};

/// Error types exposed via FFI
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CoreError {
    #[error("Invalid launch parameters: {0}")]
    InvalidLaunch(String),

    #[error("No room is mounted")]
    NotMounted,

    #[error("A room is already mounted")]
    AlreadyMounted,

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<LaunchError> for CoreError {
    fn from(e: LaunchError) -> Self {
        CoreError::InvalidLaunch(e.to_string())
    }
}

impl From<EngineError> for CoreError {
    fn from(_: EngineError) -> Self {
        CoreError::NotMounted
    }
}

/// A room member exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<InternalUser> for User {
    fn from(u: InternalUser) -> Self {
        Self {
            id: u.id,
            display_name: u.display_name,
            avatar_url: u.avatar_url,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct Member {
    pub user: User,
    pub is_host: bool,
    /// This member is us
    pub is_local: bool,
}

impl From<MemberView> for Member {
    fn from(m: MemberView) -> Self {
        Self {
            user: User::from(m.user),
            is_host: m.is_host,
            is_local: m.is_local,
        }
    }
}

/// Track information exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct TrackInfo {
    pub track_id: String,
    pub name: String,
    /// Artists joined for display
    pub artist: String,
    pub artwork_url: Option<String>,
    pub duration_ms: u64,
}

impl From<Track> for TrackInfo {
    fn from(t: Track) -> Self {
        Self {
            artist: t.artist_line(),
            track_id: t.id,
            name: t.name,
            artwork_url: t.album_art_url,
            duration_ms: t.duration_ms,
        }
    }
}

/// Our own playback panel
#[derive(Debug, Clone, uniffi::Record)]
pub struct NowPlaying {
    pub track: TrackInfo,
    pub is_playing: bool,
    pub progress_ms: u64,
    /// Nothing has been polled yet, or the last poll failed
    pub placeholder: bool,
}

impl From<InternalNowPlaying> for NowPlaying {
    fn from(np: InternalNowPlaying) -> Self {
        Self {
            track: TrackInfo::from(np.track),
            is_playing: np.is_playing,
            progress_ms: np.progress_ms,
            placeholder: np.placeholder,
        }
    }
}

/// The host's song as shared with the room
#[derive(Debug, Clone, uniffi::Record)]
pub struct RoomSong {
    pub track: TrackInfo,
    pub is_playing: bool,
    pub progress_ms: u64,
    pub owner_id: String,
}

impl From<PlaybackSnapshot> for RoomSong {
    fn from(s: PlaybackSnapshot) -> Self {
        Self {
            track: TrackInfo::from(s.track),
            is_playing: s.is_playing,
            progress_ms: s.progress_ms,
            owner_id: s.owner_id,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct QueueRow {
    pub entry_id: String,
    pub track_id: String,
    pub label: String,
    pub played: bool,
    /// Highlight this row as the track playing now
    pub now_playing: bool,
}

impl From<InternalQueueRow> for QueueRow {
    fn from(r: InternalQueueRow) -> Self {
        Self {
            entry_id: r.entry_id,
            track_id: r.track_id,
            label: r.label,
            played: r.played,
            now_playing: r.style == QueueRowStyle::NowPlaying,
        }
    }
}

#[derive(Debug, Clone, uniffi::Enum)]
pub enum QueueView {
    /// Empty queue; show `text` instead of rows
    Placeholder { text: String },
    Rows { rows: Vec<QueueRow> },
}

impl From<InternalQueueView> for QueueView {
    fn from(q: InternalQueueView) -> Self {
        match q {
            InternalQueueView::Placeholder(text) => QueueView::Placeholder { text },
            InternalQueueView::Rows(rows) => QueueView::Rows {
                rows: rows.into_iter().map(QueueRow::from).collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum Notice {
    IdentityUnavailable,
    NotPlaying,
    ChannelLost,
}

impl From<InternalNotice> for Notice {
    fn from(n: InternalNotice) -> Self {
        match n {
            InternalNotice::IdentityUnavailable => Notice::IdentityUnavailable,
            InternalNotice::NotPlaying => Notice::NotPlaying,
            InternalNotice::ChannelLost => Notice::ChannelLost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ChannelStatus {
    Connecting,
    Connected,
    Reconnecting,
    Lost,
    Closed,
}

impl From<InternalChannelStatus> for ChannelStatus {
    fn from(s: InternalChannelStatus) -> Self {
        match s {
            InternalChannelStatus::Connecting => ChannelStatus::Connecting,
            InternalChannelStatus::Connected => ChannelStatus::Connected,
            InternalChannelStatus::Reconnecting => ChannelStatus::Reconnecting,
            InternalChannelStatus::Lost => ChannelStatus::Lost,
            InternalChannelStatus::Closed => ChannelStatus::Closed,
        }
    }
}

/// Room view exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct RoomView {
    pub room_id: String,
    pub user: Option<User>,
    pub is_host: bool,
    pub members: Vec<Member>,
    pub now_playing: NowPlaying,
    pub room_song: Option<RoomSong>,
    pub queue: QueueView,
    pub notice: Option<Notice>,
    pub channel: ChannelStatus,
}

impl From<InternalRoomView> for RoomView {
    fn from(v: InternalRoomView) -> Self {
        Self {
            room_id: v.room_id,
            user: v.user.map(User::from),
            is_host: v.is_host,
            members: v.members.into_iter().map(Member::from).collect(),
            now_playing: NowPlaying::from(v.now_playing),
            room_song: v.room_song.map(RoomSong::from),
            queue: QueueView::from(v.queue),
            notice: v.notice.map(Notice::from),
            channel: ChannelStatus::from(v.channel),
        }
    }
}

/// Callback interface for room view updates
#[uniffi::export(callback_interface)]
pub trait RoomViewCallback: Send + Sync {
    fn on_view_changed(&self, view: RoomView);
    /// The room was unmounted and no further views will arrive
    fn on_unmounted(&self);
}
