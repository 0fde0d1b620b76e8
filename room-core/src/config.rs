//! Session configuration and launch parameters

use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::form_urlencoded;

use crate::channel::{ChannelConfig, RoomId};
use crate::poller::DEFAULT_MIN_DELAY;
use crate::provider::{DEFAULT_PROVIDER_URL, DEFAULT_STORE_URL};

/// Environment variable overriding the provider API URL
pub const ENV_PROVIDER_URL: &str = "ROOM_PROVIDER_URL";
/// Environment variable overriding the backend store URL
pub const ENV_STORE_URL: &str = "ROOM_STORE_URL";
/// Environment variable overriding the room channel URL
pub const ENV_CHANNEL_URL: &str = "ROOM_CHANNEL_URL";

/// Where the session's collaborators live and how it paces itself
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub provider_url: String,
    pub store_url: String,
    pub channel: ChannelConfig,
    /// Lower bound between two playback polls
    pub min_poll_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            store_url: DEFAULT_STORE_URL.to_string(),
            channel: ChannelConfig::default(),
            min_poll_delay: DEFAULT_MIN_DELAY,
        }
    }
}

impl SessionConfig {
    /// Defaults, with URLs overridden from the environment when set
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_PROVIDER_URL) {
            config.provider_url = url;
        }
        if let Some(url) = non_empty(ENV_STORE_URL) {
            config.store_url = url;
        }
        if let Some(url) = non_empty(ENV_CHANNEL_URL) {
            config.channel.url = url;
        }
        config
    }
}

/// Why launch parameters were rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("access_token is missing")]
    MissingToken,

    #[error("room_id is missing")]
    MissingRoom,

    #[error("room_id {0:?} is not a valid room")]
    InvalidRoom(String),
}

/// Parameters the room view is opened with (`?access_token=…&room_id=…`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    pub access_token: String,
    pub room_id: RoomId,
}

impl LaunchParams {
    /// Parse a query string, with or without the leading `?`
    pub fn from_query(query: &str) -> Result<Self, LaunchError> {
        let query = query.trim().trim_start_matches('?');

        let mut access_token = None;
        let mut room_id = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                "access_token" => access_token = Some(value.into_owned()),
                "room_id" => room_id = Some(value.into_owned()),
                other => warn!("Ignoring unknown launch parameter {}", other),
            }
        }

        let access_token = access_token
            .filter(|t| !t.is_empty())
            .ok_or(LaunchError::MissingToken)?;
        let raw_room = room_id.ok_or(LaunchError::MissingRoom)?;
        let room_id = RoomId::parse(&raw_room).ok_or(LaunchError::InvalidRoom(raw_room))?;

        Ok(Self { access_token, room_id })
    }
}
