//! WebSocket room server

use crate::metrics::{LogLevel, Metrics, ServerStatus};
use crate::rooms::{ConnId, Outbound, Registry};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use room_core::sync::ChannelMessage;
use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Default listen address
const DEFAULT_ADDR: &str = "0.0.0.0:4000";

/// Events sent from the server to the dashboard
#[derive(Debug)]
pub enum ServerEvent {
    Ready { addr: String },
    Activity,
}

/// Registry plus the outgoing queue of every open connection
struct Hub {
    registry: Registry,
    peers: HashMap<ConnId, mpsc::UnboundedSender<String>>,
}

impl Hub {
    /// Send messages, returning (frames, bytes) delivered
    fn deliver(&self, outbound: Vec<Outbound>) -> (u64, u64) {
        let mut frames = 0;
        let mut bytes = 0;
        for Outbound { to, message } in outbound {
            let frame = match message.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Failed to encode {}: {}", message.event_name(), e);
                    continue;
                }
            };
            if let Some(tx) = self.peers.get(&to) {
                bytes += frame.len() as u64;
                frames += 1;
                let _ = tx.send(frame);
            }
        }
        (frames, bytes)
    }
}

struct Shared {
    hub: Mutex<Hub>,
    metrics: Arc<RwLock<Metrics>>,
    events: Option<mpsc::UnboundedSender<ServerEvent>>,
    next_id: AtomicU64,
}

impl Shared {
    /// Run a registry operation and deliver what it produced
    fn apply(&self, op: impl FnOnce(&mut Registry) -> Vec<Outbound>) {
        let (sent, rooms) = {
            let mut hub = self.hub.lock();
            let outbound = op(&mut hub.registry);
            let sent = hub.deliver(outbound);
            (sent, hub.registry.summaries())
        };

        let mut m = self.metrics.write();
        m.frames_sent(sent.0, sent.1);
        m.rooms_changed(rooms);
    }

    fn notify(&self) {
        if let Some(events) = &self.events {
            let _ = events.send(ServerEvent::Activity);
        }
    }
}

/// Listen address from `RELAY_ADDR`, or the default
fn listen_addr() -> String {
    std::env::var("RELAY_ADDR")
        .ok()
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

/// Run the server with dashboard integration. Errors are also written to
/// the activity log, since the dashboard owns the terminal.
pub async fn run_with_dashboard(
    metrics: Arc<RwLock<Metrics>>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let result = run(Arc::clone(&metrics), Some(event_tx)).await;
    if let Err(e) = &result {
        let mut m = metrics.write();
        m.status = ServerStatus::Error;
        m.log(LogLevel::Error, format!("Relay stopped: {}", e));
    }
    result
}

/// Run with plain logging (no dashboard)
pub async fn run_with_logging(metrics: Arc<RwLock<Metrics>>) -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("room_relay=info".parse()?)
                .add_directive("tungstenite=warn".parse()?),
        )
        .init();

    run(metrics, None).await
}

async fn run(
    metrics: Arc<RwLock<Metrics>>,
    events: Option<mpsc::UnboundedSender<ServerEvent>>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = listen_addr();
    info!("Room relay starting on {}", addr);

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Failed to bind {}: {}", addr, e);
            return Err(format!("failed to bind {}: {}", addr, e).into());
        }
    };

    let local = listener.local_addr()?.to_string();
    {
        let mut m = metrics.write();
        m.listen_addr = Some(local.clone());
        m.status = ServerStatus::Running;
        m.log(LogLevel::Info, format!("Listening on ws://{}", local));
    }
    if let Some(events) = &events {
        let _ = events.send(ServerEvent::Ready { addr: local });
    }

    serve(listener, metrics, events).await;
    Ok(())
}

/// Accept connections until the listener fails
pub async fn serve(
    listener: TcpListener,
    metrics: Arc<RwLock<Metrics>>,
    events: Option<mpsc::UnboundedSender<ServerEvent>>,
) {
    let shared = Arc::new(Shared {
        hub: Mutex::new(Hub {
            registry: Registry::new(),
            peers: HashMap::new(),
        }),
        metrics,
        events,
        next_id: AtomicU64::new(1),
    });

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let conn = shared.next_id.fetch_add(1, Ordering::Relaxed);
                tokio::spawn(handle_connection(stream, addr, conn, Arc::clone(&shared)));
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
                shared.metrics.write().log(LogLevel::Warning, format!("Accept failed: {}", e));
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, conn: ConnId, shared: Arc<Shared>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let peer = addr.to_string();
    info!("Connection {} from {}", conn, peer);
    shared.metrics.write().connection_opened(&peer);
    shared.notify();

    let (mut sink, mut incoming) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    shared.hub.lock().peers.insert(conn, tx);

    // Writer: drains the outgoing queue until the hub drops our sender
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = incoming.next().await {
        match msg {
            Ok(Message::Text(text)) => match ChannelMessage::from_frame(&text) {
                Ok(message) => handle_message(conn, message, &shared),
                Err(e) => {
                    warn!("Malformed frame from {}: {}", peer, e);
                    shared
                        .metrics
                        .write()
                        .log(LogLevel::Warning, format!("Malformed frame from {}", peer));
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Connection {} errored: {}", conn, e);
                break;
            }
        }
    }

    shared.apply(|registry| registry.disconnect(conn));
    shared.hub.lock().peers.remove(&conn);
    let _ = writer.await;

    info!("Connection {} closed", conn);
    shared.metrics.write().connection_closed(&peer);
    shared.notify();
}

fn handle_message(conn: ConnId, message: ChannelMessage, shared: &Shared) {
    match message {
        ChannelMessage::Join { room_id, user } => {
            info!("{} ({}) joined room {}", user.display_name, user.id, room_id);
            shared.metrics.write().user_joined(&room_id, &user.display_name);
            shared.apply(|registry| registry.join(conn, &room_id, user));
        }
        ChannelMessage::HostSong { room_id, song } => {
            debug!("Host song for {} from connection {}", room_id, conn);
            shared.apply(|registry| registry.host_song(conn, &room_id, song));
        }
        other => debug!("Ignoring {} from connection {}", other.event_name(), conn),
    }
    shared.notify();
}
