//! Playback provider HTTP client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::types::*;
use crate::sync::{PlaybackSnapshot, User};

/// Default provider API base URL
pub const DEFAULT_PROVIDER_URL: &str = "https://api.spotify.com";

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when talking to the playback provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Access token rejected")]
    Unauthorized,

    #[error("No active playback")]
    NothingPlaying,

    #[error("API error: {0}")]
    Api(String),
}

/// Identity and playback queries the room needs from the provider
#[async_trait]
pub trait PlaybackProvider: Send + Sync + 'static {
    /// Fetch the user the access token belongs to
    async fn get_user_data(&self, token: &str) -> Result<User, ProviderError>;

    /// Fetch what the user is playing right now.
    ///
    /// Fails with [`ProviderError::NothingPlaying`] when there is no active
    /// device or no track loaded.
    async fn get_current_playback(&self, token: &str, owner_id: &str) -> Result<PlaybackSnapshot, ProviderError>;
}

/// Client for the provider's Web API
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: Client,
    base_url: String,
}

impl ProviderClient {
    /// Create a client for the default provider URL
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_PROVIDER_URL)
    }

    /// Create a client for a custom base URL (mock servers, proxies)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECTION_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/v1{}", self.base_url, path);
        self.http.get(&url).bearer_auth(token)
    }

    fn check_status(status: StatusCode) -> Result<(), ProviderError> {
        match status.as_u16() {
            200..=299 => Ok(()),
            401 | 403 => Err(ProviderError::Unauthorized),
            code => Err(ProviderError::Api(format!("Unexpected response (HTTP {})", code))),
        }
    }
}

#[async_trait]
impl PlaybackProvider for ProviderClient {
    #[instrument(skip(self, token), fields(base_url = %self.base_url))]
    async fn get_user_data(&self, token: &str) -> Result<User, ProviderError> {
        let resp = self.get("/me", token).send().await?;
        Self::check_status(resp.status())?;

        let user: UserResponse = resp.json().await?;
        debug!("Identity: {} ({})", user.id, user.display_name.as_deref().unwrap_or("-"));
        Ok(User::from(user))
    }

    #[instrument(skip(self, token), fields(base_url = %self.base_url))]
    async fn get_current_playback(&self, token: &str, owner_id: &str) -> Result<PlaybackSnapshot, ProviderError> {
        let resp = self.get("/me/player", token).send().await?;

        // No active device
        if resp.status() == StatusCode::NO_CONTENT {
            return Err(ProviderError::NothingPlaying);
        }
        Self::check_status(resp.status())?;

        let player: PlayerResponse = resp.json().await.map_err(|e| {
            warn!("Unreadable player state: {}", e);
            ProviderError::Api(format!("Unreadable player state ({})", e))
        })?;

        player.into_snapshot(owner_id).ok_or(ProviderError::NothingPlaying)
    }
}

impl Default for ProviderClient {
    fn default() -> Self {
        Self::new()
    }
}
