//! Backend store client (room play queues)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::queue::QueueEntry;

/// Default backend URL
pub const DEFAULT_STORE_URL: &str = "http://127.0.0.1:3001";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when talking to the backend store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Api(String),
}

/// Queue persistence the room reads and updates
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Fetch the room's queue in play order
    async fn get_tracks(&self, room_id: &str) -> Result<Vec<QueueEntry>, StoreError>;

    /// Flag a track of the room's queue as played
    async fn update_track_played_status(&self, room_id: &str, track_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracksResponse {
    #[serde(default)]
    added_tracks: Vec<QueueEntry>,
}

/// HTTP client for the room backend
#[derive(Debug, Clone)]
pub struct StoreClient {
    http: Client,
    base_url: String,
}

impl StoreClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_STORE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn tracks_url(&self, room_id: &str) -> String {
        format!("{}/api/rooms/{}/tracks", self.base_url, room_id)
    }
}

#[async_trait]
impl QueueStore for StoreClient {
    #[instrument(skip(self))]
    async fn get_tracks(&self, room_id: &str) -> Result<Vec<QueueEntry>, StoreError> {
        let resp = self.http.get(self.tracks_url(room_id)).send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::Api(format!("HTTP {}", resp.status().as_u16())));
        }

        let body: TracksResponse = resp.json().await?;
        debug!("Fetched {} queued tracks", body.added_tracks.len());
        Ok(body.added_tracks)
    }

    #[instrument(skip(self))]
    async fn update_track_played_status(&self, room_id: &str, track_id: &str) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.tracks_url(room_id), track_id);
        self.http
            .put(&url)
            .json(&serde_json::json!({ "played": true }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl Default for StoreClient {
    fn default() -> Self {
        Self::new()
    }
}
