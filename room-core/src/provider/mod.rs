//! External services
//!
//! Clients for the playback provider (identity + player state) and the room
//! backend store (play queue).

mod client;
mod store;
mod types;

pub use client::{PlaybackProvider, ProviderClient, ProviderError, DEFAULT_PROVIDER_URL};
pub use store::{QueueStore, StoreClient, StoreError, DEFAULT_STORE_URL};
pub use types::*;
