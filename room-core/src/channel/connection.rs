//! Room channel connection
//!
//! One long-lived connection per room membership:
//! - opened once when the session knows who we are
//! - `join room` is the first frame on every (re)connection, so a reconnect
//!   re-joins the room with the same identity
//! - transport failures reconnect with exponential backoff; the backoff only
//!   resets once the relay has answered on a connection
//! - `leave()` closes the connection and ends the task

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backoff::{Backoff, ReconnectConfig};
use super::transport::{Connector, Transport};
use crate::sync::{ChannelMessage, PlaybackSnapshot, User};

/// Default room channel URL
pub const DEFAULT_CHANNEL_URL: &str = "ws://127.0.0.1:4000";

/// Channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket URL of the room relay
    pub url: String,
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CHANNEL_URL.to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Channel-related errors
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel task closed")]
    Closed,

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Events emitted by the channel task
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connected and `join room` sent
    Connected,
    /// Waiting before the next connection attempt
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// Message from the relay
    Message(ChannelMessage),
    /// Connection lost or closed (`None` = we left)
    Disconnected { reason: Option<String> },
    /// Retries exhausted; the task has ended
    GaveUp { reason: String },
}

/// Commands sent to the channel task
#[derive(Debug)]
enum ChannelCommand {
    Publish { message: ChannelMessage },
    Leave,
}

/// Handle to the running channel task
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    command_tx: mpsc::UnboundedSender<ChannelCommand>,
    room_id: String,
}

impl ChannelHandle {
    /// Broadcast the host's current song to the room (`None` = nothing playing)
    pub fn publish_host_song(&self, song: Option<PlaybackSnapshot>) -> Result<(), ChannelError> {
        self.command_tx
            .send(ChannelCommand::Publish {
                message: ChannelMessage::HostSong {
                    room_id: self.room_id.clone(),
                    song,
                },
            })
            .map_err(|_| ChannelError::Closed)
    }

    /// Leave the room and close the connection
    pub fn leave(&self) {
        let _ = self.command_tx.send(ChannelCommand::Leave);
    }
}

/// How a connected session ended
enum SessionEnd {
    Left,
    Lost(String),
}

/// Owns the room connection - runs in a background task
pub struct ChannelManager<C: Connector> {
    connector: C,
    reconnect: ReconnectConfig,
    room_id: String,
    user: User,
}

impl<C: Connector> ChannelManager<C> {
    pub fn new(connector: C, reconnect: ReconnectConfig, room_id: impl Into<String>, user: User) -> Self {
        Self {
            connector,
            reconnect,
            room_id: room_id.into(),
            user,
        }
    }

    /// Start the channel task and return a handle plus its event stream
    pub fn start(self) -> (ChannelHandle, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let handle = ChannelHandle {
            command_tx,
            room_id: self.room_id.clone(),
        };

        tokio::spawn(self.run(event_tx, command_rx));

        (handle, event_rx)
    }

    async fn run(
        self,
        event_tx: mpsc::UnboundedSender<ChannelEvent>,
        mut command_rx: mpsc::UnboundedReceiver<ChannelCommand>,
    ) {
        info!("Channel task started for room {}", self.room_id);
        let mut backoff = Backoff::new(self.reconnect.clone());

        loop {
            let Some(connected) = self.connect(&event_tx, &mut command_rx).await else {
                return;
            };

            let failure = match connected {
                Ok(mut transport) => {
                    match self.serve(&mut transport, &mut backoff, &event_tx, &mut command_rx).await {
                        SessionEnd::Left => {
                            if let Err(e) = transport.close().await {
                                debug!("Close failed: {}", e);
                            }
                            info!("Left room {}", self.room_id);
                            let _ = event_tx.send(ChannelEvent::Disconnected { reason: None });
                            return;
                        }
                        SessionEnd::Lost(reason) => {
                            warn!("Channel connection lost: {}", reason);
                            let _ = event_tx.send(ChannelEvent::Disconnected {
                                reason: Some(reason.clone()),
                            });
                            reason
                        }
                    }
                }
                Err(e) => {
                    warn!("Channel connect failed: {}", e);
                    e.to_string()
                }
            };

            let Some(delay) = backoff.next_delay() else {
                warn!("Giving up on room channel after {} attempts", backoff.attempt());
                let _ = event_tx.send(ChannelEvent::GaveUp { reason: failure });
                return;
            };

            let _ = event_tx.send(ChannelEvent::Reconnecting {
                attempt: backoff.attempt(),
                delay_ms: delay.as_millis() as u64,
            });

            if !self.wait(delay, &event_tx, &mut command_rx).await {
                return;
            }
        }
    }

    /// One connection attempt. Commands arriving meanwhile do not restart it.
    /// Returns `None` if we left before it finished.
    async fn connect(
        &self,
        event_tx: &mpsc::UnboundedSender<ChannelEvent>,
        command_rx: &mut mpsc::UnboundedReceiver<ChannelCommand>,
    ) -> Option<Result<C::Transport, ChannelError>> {
        let attempt = self.connector.connect();
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => return Some(result),
                cmd = command_rx.recv() => match cmd {
                    Some(ChannelCommand::Publish { message }) => {
                        debug!("Not connected, dropping {}", message.event_name());
                    }
                    Some(ChannelCommand::Leave) | None => {
                        info!("Left room {} while connecting", self.room_id);
                        let _ = event_tx.send(ChannelEvent::Disconnected { reason: None });
                        return None;
                    }
                },
            }
        }
    }

    /// Sleep before reconnecting. Returns false if we left meanwhile.
    async fn wait(
        &self,
        delay: Duration,
        event_tx: &mpsc::UnboundedSender<ChannelEvent>,
        command_rx: &mut mpsc::UnboundedReceiver<ChannelCommand>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = command_rx.recv() => match cmd {
                    Some(ChannelCommand::Publish { message }) => {
                        debug!("Not connected, dropping {}", message.event_name());
                    }
                    Some(ChannelCommand::Leave) | None => {
                        info!("Left room {} while reconnecting", self.room_id);
                        let _ = event_tx.send(ChannelEvent::Disconnected { reason: None });
                        return false;
                    }
                },
            }
        }
    }

    /// Drive one connected transport until it fails or we leave
    async fn serve(
        &self,
        transport: &mut C::Transport,
        backoff: &mut Backoff,
        event_tx: &mpsc::UnboundedSender<ChannelEvent>,
        command_rx: &mut mpsc::UnboundedReceiver<ChannelCommand>,
    ) -> SessionEnd {
        let join = ChannelMessage::Join {
            room_id: self.room_id.clone(),
            user: self.user.clone(),
        };
        if let Err(e) = send_message(transport, &join).await {
            return SessionEnd::Lost(e.to_string());
        }

        info!("Joined room {} as {}", self.room_id, self.user.display_name);
        let _ = event_tx.send(ChannelEvent::Connected);

        loop {
            tokio::select! {
                biased;

                cmd = command_rx.recv() => match cmd {
                    Some(ChannelCommand::Publish { message }) => {
                        if let Err(e) = send_message(transport, &message).await {
                            return SessionEnd::Lost(e.to_string());
                        }
                    }
                    Some(ChannelCommand::Leave) | None => return SessionEnd::Left,
                },
                incoming = transport.recv() => match incoming {
                    Some(Ok(frame)) => match ChannelMessage::from_frame(&frame) {
                        Ok(message) => {
                            debug!("Received {}", message.event_name());
                            // The relay answered: this connection is healthy
                            backoff.reset();
                            let _ = event_tx.send(ChannelEvent::Message(message));
                        }
                        Err(e) => warn!("Skipping malformed frame: {} - raw: {}", e, frame),
                    },
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("closed by server".to_string()),
                },
            }
        }
    }
}

async fn send_message<T: Transport>(transport: &mut T, message: &ChannelMessage) -> Result<(), ChannelError> {
    let frame = message.to_frame()?;
    debug!("Sending {}", message.event_name());
    transport.send(frame).await
}
