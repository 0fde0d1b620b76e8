//! Sync Engine
//!
//! Room membership, host election and the shared room song.

mod protocol;
mod state;

pub use protocol::*;
pub use state::*;
