//! Play queue cache and rendering

use serde::{Deserialize, Serialize};

/// Text shown when no track has been added yet
pub const EMPTY_QUEUE_TEXT: &str = "Add a track to get started...";

/// A track added to the room's play queue, as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Store document ID
    #[serde(rename = "_id")]
    pub id: String,
    /// Provider track ID
    #[serde(rename = "spotifyId")]
    pub track_id: String,
    /// Display text ("Song - Artist")
    #[serde(rename = "info")]
    pub label: String,
    #[serde(default)]
    pub played: bool,
}

/// How a queue row is highlighted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRowStyle {
    NowPlaying,
    Queued,
}

/// A render-ready queue row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRow {
    pub entry_id: String,
    pub track_id: String,
    pub label: String,
    pub played: bool,
    pub style: QueueRowStyle,
}

/// What the queue panel shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueView {
    Placeholder(String),
    Rows(Vec<QueueRow>),
}

/// Cached, ordered copy of the room's queue
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    entries: Vec<QueueEntry>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache with a fresh fetch
    pub fn replace(&mut self, entries: Vec<QueueEntry>) {
        self.entries = entries;
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Mark every entry for `track_id` as played. Returns whether anything changed.
    pub fn mark_played(&mut self, track_id: &str) -> bool {
        let mut changed = false;
        for entry in self.entries.iter_mut().filter(|e| e.track_id == track_id) {
            if !entry.played {
                entry.played = true;
                changed = true;
            }
        }
        changed
    }

    /// Render the queue, highlighting entries of the track now playing
    pub fn render(&self, now_playing: Option<&str>) -> QueueView {
        if self.entries.is_empty() {
            return QueueView::Placeholder(EMPTY_QUEUE_TEXT.to_string());
        }

        let rows = self
            .entries
            .iter()
            .map(|e| QueueRow {
                entry_id: e.id.clone(),
                track_id: e.track_id.clone(),
                label: e.label.clone(),
                played: e.played,
                style: if Some(e.track_id.as_str()) == now_playing {
                    QueueRowStyle::NowPlaying
                } else {
                    QueueRowStyle::Queued
                },
            })
            .collect();

        QueueView::Rows(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> QueueEntry {
        QueueEntry {
            id: format!("doc-{}", id),
            track_id: id.to_string(),
            label: format!("Song {}", id),
            played: false,
        }
    }

    #[test]
    fn test_empty_queue_placeholder() {
        let queue = PlayQueue::new();
        assert_eq!(queue.render(Some("1")), QueueView::Placeholder(EMPTY_QUEUE_TEXT.to_string()));
    }

    #[test]
    fn test_now_playing_highlighted() {
        let mut queue = PlayQueue::new();
        queue.replace(vec![entry("1"), entry("2")]);

        let QueueView::Rows(rows) = queue.render(Some("1")) else {
            panic!("expected rows");
        };
        assert_eq!(rows[0].style, QueueRowStyle::NowPlaying);
        assert_eq!(rows[1].style, QueueRowStyle::Queued);
    }

    #[test]
    fn test_nothing_playing_all_queued() {
        let mut queue = PlayQueue::new();
        queue.replace(vec![entry("1"), entry("2")]);
        let QueueView::Rows(rows) = queue.render(None) else {
            panic!("expected rows");
        };
        assert!(rows.iter().all(|r| r.style == QueueRowStyle::Queued));
    }

    #[test]
    fn test_mark_played() {
        let mut queue = PlayQueue::new();
        queue.replace(vec![entry("1"), entry("2")]);
        assert!(queue.mark_played("1"));
        assert!(!queue.mark_played("1"));
        assert!(queue.entries()[0].played);
        assert!(!queue.entries()[1].played);
    }

    #[test]
    fn test_store_document_shape() {
        let json = r#"{"_id":"abc","spotifyId":"t1","info":"Song - Artist","played":true}"#;
        let entry: QueueEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.track_id, "t1");
        assert_eq!(entry.label, "Song - Artist");
        assert!(entry.played);
    }
}
