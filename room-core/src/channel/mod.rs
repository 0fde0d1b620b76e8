//! Room Channel
//!
//! Realtime connection to the room relay: membership and host-song events.

mod backoff;
mod connection;
mod room_id;
mod transport;

pub use backoff::{Backoff, ReconnectConfig};
pub use connection::{
    ChannelConfig, ChannelError, ChannelEvent, ChannelHandle, ChannelManager, DEFAULT_CHANNEL_URL,
};
pub use room_id::RoomId;
pub use transport::{Connector, Transport, WsConnector, WsTransport};
