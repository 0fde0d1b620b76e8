//! Types for playback provider API responses

use serde::Deserialize;

use crate::sync::{PlaybackSnapshot, Track, User};

/// An image reference (profile picture, album art)
#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Response for the current-user endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub id: String,
    /// Users without a display name get their ID shown instead
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

impl From<UserResponse> for User {
    fn from(r: UserResponse) -> Self {
        Self {
            display_name: r.display_name.unwrap_or_else(|| r.id.clone()),
            avatar_url: r.images.into_iter().next().map(|i| i.url),
            id: r.id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Track object as returned inside the player state
#[derive(Debug, Clone, Deserialize)]
pub struct TrackItem {
    /// Local files have no ID
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: Option<Album>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl From<TrackItem> for Track {
    fn from(item: TrackItem) -> Self {
        Self {
            id: item.id.unwrap_or_default(),
            name: item.name,
            artists: item.artists.into_iter().map(|a| a.name).collect(),
            album_art_url: item
                .album
                .and_then(|a| a.images.into_iter().next())
                .map(|i| i.url),
            duration_ms: item.duration_ms,
        }
    }
}

/// Response for the player-state endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerResponse {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    /// Absent during ads or when nothing is loaded
    #[serde(default)]
    pub item: Option<TrackItem>,
}

impl PlayerResponse {
    /// Convert into a snapshot for `owner_id`. `None` when no track is loaded.
    pub fn into_snapshot(self, owner_id: &str) -> Option<PlaybackSnapshot> {
        let item = self.item?;
        Some(PlaybackSnapshot {
            track: Track::from(item),
            is_playing: self.is_playing,
            progress_ms: self.progress_ms.unwrap_or(0),
            owner_id: owner_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_response() {
        let json = r#"{
            "id": "alice",
            "display_name": "Alice",
            "images": [{"url": "https://img/alice.jpg", "width": 64, "height": 64}]
        }"#;
        let user = User::from(serde_json::from_str::<UserResponse>(json).unwrap());
        assert_eq!(user.id, "alice");
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.avatar_url.as_deref(), Some("https://img/alice.jpg"));
    }

    #[test]
    fn test_user_without_name_or_avatar() {
        let user = User::from(serde_json::from_str::<UserResponse>(r#"{"id":"bob","display_name":null,"images":[]}"#).unwrap());
        assert_eq!(user.display_name, "bob");
        assert!(user.avatar_url.is_none());
    }

    #[test]
    fn test_player_response() {
        let json = r#"{
            "is_playing": true,
            "progress_ms": 30000,
            "item": {
                "id": "t1",
                "name": "Song",
                "artists": [{"name": "A"}, {"name": "B"}],
                "album": {"name": "Album", "images": [{"url": "https://img/album.jpg"}]},
                "duration_ms": 200000
            }
        }"#;
        let snapshot = serde_json::from_str::<PlayerResponse>(json)
            .unwrap()
            .into_snapshot("alice")
            .unwrap();
        assert_eq!(snapshot.track.artist_line(), "A, B");
        assert_eq!(snapshot.track.album_art_url.as_deref(), Some("https://img/album.jpg"));
        assert_eq!(snapshot.progress_ms, 30_000);
        assert_eq!(snapshot.owner_id, "alice");
        assert!(snapshot.is_playing);
    }

    #[test]
    fn test_player_without_item() {
        let response: PlayerResponse = serde_json::from_str(r#"{"is_playing":false,"item":null}"#).unwrap();
        assert!(response.into_snapshot("alice").is_none());
    }
}
