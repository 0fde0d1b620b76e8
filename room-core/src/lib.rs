//! Listening Room - Core Library
//!
//! Keeps a listening room in sync: tracks who is in the room (the first
//! member hosts), polls the local player and shares the host's song with
//! everyone over the room channel.

pub mod channel;
pub mod config;
pub mod engine;
pub mod ffi;
pub mod poller;
pub mod provider;
pub mod queue;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::{LaunchParams, SessionConfig};
pub use engine::{EngineHandle, RoomEngine, RoomView};
pub use sync::{ChannelMessage, RoomState};

// Setup uniffi scaffolding
uniffi::setup_scaffolding!();
