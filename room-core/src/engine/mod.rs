//! Room engine
//!
//! One task owns everything about a mounted room: the room state, the
//! playback poller and its timer, the cached queue and the room channel.
//! Inputs are processed one at a time from a single `select!` loop:
//! - commands from the UI ([`EngineHandle`])
//! - results of provider/store calls, which run in spawned tasks
//! - room channel events
//! - the poll timer
//!
//! After every input the engine projects its state into a [`RoomView`] and
//! emits it if anything visible changed.

mod handlers;
mod view;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ChannelHandle, Connector, ReconnectConfig};
use crate::config::{LaunchParams, SessionConfig};
use crate::poller::{PollTrigger, Poller};
use crate::provider::{PlaybackProvider, QueueStore};
use crate::queue::PlayQueue;
use crate::sync::RoomState;

use handlers::Outcome;

pub use view::{ChannelStatus, MemberView, Notice, NowPlaying, RoomView, PLACEHOLDER_ART};

/// How long unmount waits for the channel to close
const LEAVE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Room engine is not running")]
    Stopped,
}

/// Commands sent to the engine task
#[derive(Debug)]
enum EngineCommand {
    /// User dismissed the "not playing" notice and wants polling to resume
    AcknowledgeReady,
    /// The queue changed elsewhere; fetch it again
    RefreshQueue,
    /// Playback changed elsewhere; poll now instead of waiting for the timer
    RefreshPlayback,
    Unmount,
}

/// Handle to a running room engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    command_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    pub fn acknowledge_ready(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::AcknowledgeReady)
    }

    pub fn refresh_queue(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::RefreshQueue)
    }

    pub fn refresh_playback(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::RefreshPlayback)
    }

    /// Leave the room and stop the engine. The view stream ends afterwards.
    pub fn unmount(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Unmount)
    }

    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }

    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.command_tx.send(command).map_err(|_| EngineError::Stopped)
    }
}

/// Owns a mounted room - runs in a background task
pub struct RoomEngine<C: Connector> {
    params: LaunchParams,
    provider: Arc<dyn PlaybackProvider>,
    store: Arc<dyn QueueStore>,
    /// Opens the channel once identity is known, and again after it was lost
    connector: C,
    reconnect: ReconnectConfig,

    state: RoomState,
    queue: PlayQueue,
    poller: Poller,

    channel: Option<ChannelHandle>,
    channel_events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    channel_status: ChannelStatus,

    identity_pending: bool,
    identity_failed: bool,

    timer: Option<Pin<Box<Sleep>>>,
    /// Track that was playing when the timer was armed
    ending_track: Option<String>,

    outcome_tx: mpsc::UnboundedSender<Outcome>,
    outcome_rx: mpsc::UnboundedReceiver<Outcome>,
}

impl<C: Connector + Clone> RoomEngine<C> {
    pub fn new(
        params: LaunchParams,
        config: &SessionConfig,
        provider: Arc<dyn PlaybackProvider>,
        store: Arc<dyn QueueStore>,
        connector: C,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let state = RoomState::new(params.room_id.to_string());

        Self {
            params,
            provider,
            store,
            connector,
            reconnect: config.channel.reconnect.clone(),
            state,
            queue: PlayQueue::new(),
            poller: Poller::new(config.min_poll_delay),
            channel: None,
            channel_events: None,
            channel_status: ChannelStatus::Connecting,
            identity_pending: false,
            identity_failed: false,
            timer: None,
            ending_track: None,
            outcome_tx,
            outcome_rx,
        }
    }

    /// Mount the room: start the engine task and return a handle plus the
    /// stream of views
    pub fn start(self) -> (EngineHandle, mpsc::UnboundedReceiver<RoomView>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = mpsc::unbounded_channel();

        tokio::spawn(self.run(command_rx, view_tx));

        (EngineHandle { command_tx }, view_rx)
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<EngineCommand>,
        view_tx: mpsc::UnboundedSender<RoomView>,
    ) {
        info!("Mounting room {}", self.params.room_id);

        self.fetch_identity();
        self.fetch_queue();
        self.start_poll(PollTrigger::Mount);

        let mut last_view = None;
        loop {
            self.emit_view(&view_tx, &mut last_view);

            tokio::select! {
                cmd = command_rx.recv() => match cmd {
                    Some(EngineCommand::Unmount) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(outcome) = self.outcome_rx.recv() => self.handle_outcome(outcome),
                event = next_event(&mut self.channel_events) => match event {
                    Some(event) => self.handle_channel_event(event),
                    None => {
                        debug!("Channel task ended");
                        self.channel_events = None;
                    }
                },
                _ = expire(&mut self.timer) => {
                    self.timer = None;
                    self.on_track_end();
                }
            }
        }

        self.shutdown().await;
        self.emit_view(&view_tx, &mut last_view);
        info!("Unmounted room {}", self.params.room_id);
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        debug!("Engine command: {:?}", cmd);
        match cmd {
            EngineCommand::AcknowledgeReady => {
                if self.state.local_user.is_none() {
                    self.fetch_identity();
                }
                self.reopen_channel();
                self.start_poll(PollTrigger::Ready);
            }
            EngineCommand::RefreshQueue => self.fetch_queue(),
            EngineCommand::RefreshPlayback => self.start_poll(PollTrigger::Refresh),
            EngineCommand::Unmount => {}
        }
    }

    /// Stop polling, drop the timer and leave the channel
    async fn shutdown(&mut self) {
        self.poller.stop();
        self.timer = None;
        self.ending_track = None;

        if let Some(channel) = self.channel.take() {
            channel.leave();
            if let Some(mut events) = self.channel_events.take() {
                let drained = tokio::time::timeout(LEAVE_TIMEOUT, async {
                    while events.recv().await.is_some() {}
                })
                .await;
                if drained.is_err() {
                    warn!("Channel did not close within {:?}", LEAVE_TIMEOUT);
                }
            }
        }
        self.channel_status = ChannelStatus::Closed;
    }

    fn notice(&self) -> Option<Notice> {
        if self.identity_failed {
            Some(Notice::IdentityUnavailable)
        } else if self.poller.shows_not_playing() {
            Some(Notice::NotPlaying)
        } else if self.channel_status == ChannelStatus::Lost {
            Some(Notice::ChannelLost)
        } else {
            None
        }
    }

    fn emit_view(&self, view_tx: &mpsc::UnboundedSender<RoomView>, last: &mut Option<RoomView>) {
        let view = RoomView::build(&self.state, &self.queue, self.notice(), self.channel_status);
        if last.as_ref() == Some(&view) {
            return;
        }
        if view_tx.send(view.clone()).is_err() {
            debug!("View receiver dropped");
        }
        *last = Some(view);
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<ChannelEvent>>) -> Option<ChannelEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn expire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelConfig, RoomId};
    use crate::queue::{QueueRowStyle, QueueView};
    use crate::sync::ChannelMessage;
    use crate::testing::{entry, snapshot, user, MockConnector, MockProvider, MockStore, Remote};

    struct Harness {
        handle: EngineHandle,
        views: mpsc::UnboundedReceiver<RoomView>,
        provider: Arc<MockProvider>,
        store: Arc<MockStore>,
        connector: MockConnector,
        remote: Remote,
    }

    fn config() -> SessionConfig {
        SessionConfig {
            channel: ChannelConfig {
                url: "ws://unused".to_string(),
                reconnect: ReconnectConfig {
                    base_delay: Duration::from_millis(100),
                    max_delay: Duration::from_secs(1),
                    max_retries: 3,
                    jitter: false,
                },
            },
            ..SessionConfig::default()
        }
    }

    fn mount(provider: MockProvider, store: MockStore) -> Harness {
        let provider = Arc::new(provider);
        let store = Arc::new(store);
        let connector = MockConnector::default();
        let remote = connector.accept();

        let params = LaunchParams {
            access_token: "token".to_string(),
            room_id: RoomId::parse("room-1").unwrap(),
        };
        let engine = RoomEngine::new(
            params,
            &config(),
            Arc::clone(&provider) as Arc<dyn PlaybackProvider>,
            Arc::clone(&store) as Arc<dyn QueueStore>,
            connector.clone(),
        );
        let (handle, views) = engine.start();

        Harness {
            handle,
            views,
            provider,
            store,
            connector,
            remote,
        }
    }

    async fn view_until(views: &mut mpsc::UnboundedReceiver<RoomView>, pred: impl Fn(&RoomView) -> bool) -> RoomView {
        tokio::time::timeout(Duration::from_secs(3600), async {
            loop {
                let view = views.recv().await.expect("engine stopped");
                if pred(&view) {
                    return view;
                }
            }
        })
        .await
        .expect("view never matched")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn host_songs(remote: &Remote) -> Vec<Option<crate::sync::PlaybackSnapshot>> {
        remote
            .sent_messages()
            .into_iter()
            .filter_map(|m| match m {
                ChannelMessage::HostSong { song, .. } => Some(song),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_member_takes_over_when_host_leaves() {
        let playing = snapshot("t1", "", 200_000, 0);
        let mut h = mount(MockProvider::new(Some(user("b")), Some(playing)), MockStore::default());

        view_until(&mut h.views, |v| v.channel == ChannelStatus::Connected && !v.now_playing.placeholder).await;

        h.remote.push(ChannelMessage::MemberList { members: vec![user("a"), user("b")] });
        let view = view_until(&mut h.views, |v| v.members.len() == 2).await;
        assert!(!view.is_host);

        h.remote.push(ChannelMessage::RoomSong { song: Some(snapshot("t9", "a", 100_000, 10)) });
        let view = view_until(&mut h.views, |v| v.room_song.is_some()).await;
        assert_eq!(view.room_song.unwrap().track.id, "t9");
        settle().await;
        assert!(host_songs(&h.remote).is_empty());

        h.remote.push(ChannelMessage::MemberList { members: vec![user("b")] });
        let view = view_until(&mut h.views, |v| v.is_host).await;
        let room_song = view.room_song.unwrap();
        assert_eq!(room_song.track.id, "t1");
        assert_eq!(room_song.owner_id, "b");

        settle().await;
        let sent = h.remote.sent_messages();
        assert!(matches!(&sent[0], ChannelMessage::Join { user, .. } if user.id == "b"));
        let published = host_songs(&h.remote);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].as_ref().map(|s| s.owner_id.as_str()), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_member_list_publishes_once() {
        let playing = snapshot("t1", "", 200_000, 0);
        let mut h = mount(MockProvider::new(Some(user("a")), Some(playing)), MockStore::default());
        view_until(&mut h.views, |v| v.channel == ChannelStatus::Connected && !v.now_playing.placeholder).await;

        h.remote.push(ChannelMessage::MemberList { members: vec![user("a"), user("b")] });
        view_until(&mut h.views, |v| v.is_host).await;
        settle().await;
        assert_eq!(host_songs(&h.remote).len(), 1);

        h.remote.push(ChannelMessage::MemberList { members: vec![user("a"), user("b")] });
        settle().await;
        assert_eq!(host_songs(&h.remote).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_clears_song_once_when_playback_stops() {
        let playing = snapshot("t1", "", 200_000, 0);
        let mut h = mount(MockProvider::new(Some(user("a")), Some(playing)), MockStore::default());
        view_until(&mut h.views, |v| v.channel == ChannelStatus::Connected && !v.now_playing.placeholder).await;

        h.remote.push(ChannelMessage::MemberList { members: vec![user("a")] });
        view_until(&mut h.views, |v| v.is_host).await;
        settle().await;
        assert_eq!(host_songs(&h.remote).len(), 1);

        *h.provider.playback.lock() = None;
        h.handle.refresh_playback().unwrap();
        let view = view_until(&mut h.views, |v| v.notice == Some(Notice::NotPlaying)).await;
        assert!(view.room_song.is_none());
        settle().await;
        let published = host_songs(&h.remote);
        assert_eq!(published.len(), 2);
        assert_eq!(published[1], None);

        // Still nothing playing: no second clear
        let polls = h.provider.polls();
        h.handle.acknowledge_ready().unwrap();
        settle().await;
        assert_eq!(h.provider.polls(), polls + 1);
        assert_eq!(host_songs(&h.remote).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_host_without_playback_clears_song() {
        let mut h = mount(MockProvider::new(Some(user("b")), None), MockStore::default());
        view_until(&mut h.views, |v| v.channel == ChannelStatus::Connected && v.notice == Some(Notice::NotPlaying)).await;

        h.remote.push(ChannelMessage::MemberList { members: vec![user("a"), user("b")] });
        view_until(&mut h.views, |v| v.members.len() == 2).await;
        settle().await;
        assert!(host_songs(&h.remote).is_empty());

        h.remote.push(ChannelMessage::MemberList { members: vec![user("b")] });
        view_until(&mut h.views, |v| v.is_host).await;
        settle().await;
        assert_eq!(host_songs(&h.remote), vec![None]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_channel_reopened_on_acknowledge() {
        let playing = snapshot("t1", "", 200_000, 0);
        let mut h = mount(MockProvider::new(Some(user("a")), Some(playing)), MockStore::default());
        view_until(&mut h.views, |v| v.channel == ChannelStatus::Connected).await;

        // Relay goes away and every reconnect is refused
        drop(h.remote);
        let view = view_until(&mut h.views, |v| v.channel == ChannelStatus::Lost).await;
        assert_eq!(view.notice, Some(Notice::ChannelLost));

        let second = h.connector.accept();
        h.handle.acknowledge_ready().unwrap();
        let view = view_until(&mut h.views, |v| v.channel == ChannelStatus::Connected).await;
        assert_eq!(view.notice, None);
        assert!(matches!(&second.sent_messages()[0], ChannelMessage::Join { user, .. } if user.id == "a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_halts_until_acknowledged() {
        let mut h = mount(MockProvider::new(Some(user("a")), None), MockStore::default());

        let view = view_until(&mut h.views, |v| v.notice == Some(Notice::NotPlaying)).await;
        assert!(view.now_playing.placeholder);

        let polls = h.provider.polls();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.provider.polls(), polls);

        *h.provider.playback.lock() = Some(snapshot("t1", "", 200_000, 0));
        h.handle.acknowledge_ready().unwrap();
        let view = view_until(&mut h.views, |v| v.notice.is_none()).await;
        assert_eq!(view.now_playing.track.id, "t1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_end_marks_played_and_polls_again() {
        let store = MockStore::with_tracks(vec![entry("t1"), entry("t2")]);
        let playing = snapshot("t1", "", 10_000, 4_000);
        let mut h = mount(MockProvider::new(Some(user("a")), Some(playing)), store);

        let view = view_until(&mut h.views, |v| matches!(&v.queue, QueueView::Rows(r) if r[0].style == QueueRowStyle::NowPlaying)).await;
        let QueueView::Rows(rows) = view.queue else { unreachable!() };
        assert!(!rows[0].played);

        *h.provider.playback.lock() = Some(snapshot("t2", "", 10_000, 0));
        let view = view_until(&mut h.views, |v| v.now_playing.track.id == "t2").await;
        let QueueView::Rows(rows) = view.queue else { panic!("expected rows") };
        assert!(rows[0].played);
        assert_eq!(rows[0].style, QueueRowStyle::Queued);
        assert_eq!(rows[1].style, QueueRowStyle::NowPlaying);

        settle().await;
        assert_eq!(h.store.played.lock().clone(), vec![("room-1".to_string(), "t1".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_failure_retried_on_acknowledge() {
        let playing = snapshot("t1", "", 200_000, 0);
        let mut h = mount(MockProvider::new(None, Some(playing)), MockStore::default());

        let view = view_until(&mut h.views, |v| v.notice == Some(Notice::IdentityUnavailable)).await;
        assert_eq!(view.channel, ChannelStatus::Connecting);
        assert!(h.remote.sent_messages().is_empty());

        *h.provider.user.lock() = Some(user("a"));
        h.handle.acknowledge_ready().unwrap();
        let view = view_until(&mut h.views, |v| v.channel == ChannelStatus::Connected).await;
        assert_eq!(view.notice, None);
        assert_eq!(view.user.map(|u| u.id), Some("a".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_leaves_room() {
        let playing = snapshot("t1", "", 200_000, 0);
        let mut h = mount(MockProvider::new(Some(user("a")), Some(playing)), MockStore::default());
        view_until(&mut h.views, |v| v.channel == ChannelStatus::Connected).await;

        h.handle.unmount().unwrap();
        let mut last = None;
        while let Some(view) = h.views.recv().await {
            last = Some(view);
        }
        assert_eq!(last.map(|v| v.channel), Some(ChannelStatus::Closed));
        assert!(*h.remote.closed.lock());
        assert!(h.handle.refresh_queue().is_err());

        let polls = h.provider.polls();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.provider.polls(), polls);
    }
}
