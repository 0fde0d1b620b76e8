//! Engine input handlers: provider/store results and channel events

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{ChannelStatus, RoomEngine};
use crate::channel::{ChannelEvent, ChannelManager, Connector};
use crate::poller::PollTrigger;
use crate::provider::{ProviderError, StoreError};
use crate::queue::QueueEntry;
use crate::sync::{ChannelMessage, HostChange, PlaybackSnapshot, User};

/// Result of a call made from a spawned task
pub(super) enum Outcome {
    Identity(Result<User, ProviderError>),
    Playback {
        generation: u64,
        result: Result<PlaybackSnapshot, ProviderError>,
    },
    Queue(Result<Vec<QueueEntry>, StoreError>),
}

impl<C: Connector + Clone> RoomEngine<C> {
    pub(super) fn fetch_identity(&mut self) {
        if self.identity_pending {
            return;
        }
        self.identity_pending = true;

        let provider = Arc::clone(&self.provider);
        let token = self.params.access_token.clone();
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = provider.get_user_data(&token).await;
            let _ = tx.send(Outcome::Identity(result));
        });
    }

    pub(super) fn fetch_queue(&mut self) {
        let store = Arc::clone(&self.store);
        let room_id = self.params.room_id.as_str().to_string();
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = store.get_tracks(&room_id).await;
            let _ = tx.send(Outcome::Queue(result));
        });
    }

    /// Start a playback poll unless one is already in flight. Cancels the timer.
    pub(super) fn start_poll(&mut self, trigger: PollTrigger) {
        let Some(generation) = self.poller.begin(trigger) else {
            return;
        };
        self.timer = None;
        self.ending_track = None;

        let provider = Arc::clone(&self.provider);
        let token = self.params.access_token.clone();
        let owner_id = self.state.local_user_id().unwrap_or_default().to_string();
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = provider.get_current_playback(&token, &owner_id).await;
            let _ = tx.send(Outcome::Playback { generation, result });
        });
    }

    /// The scheduled poll time arrived: the track that was playing is over
    pub(super) fn on_track_end(&mut self) {
        if let Some(track_id) = self.ending_track.take() {
            if self.queue.mark_played(&track_id) {
                self.report_played(track_id);
            }
        }
        self.start_poll(PollTrigger::Wake);
    }

    fn report_played(&self, track_id: String) {
        info!("Marking {} as played", track_id);
        let store = Arc::clone(&self.store);
        let room_id = self.params.room_id.as_str().to_string();
        tokio::spawn(async move {
            if let Err(e) = store.update_track_played_status(&room_id, &track_id).await {
                warn!("Failed to mark {} as played: {}", track_id, e);
            }
        });
    }

    pub(super) fn handle_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Identity(result) => self.on_identity(result),
            Outcome::Playback { generation, result } => self.on_playback(generation, result),
            Outcome::Queue(Ok(entries)) => {
                debug!("Queue has {} tracks", entries.len());
                self.queue.replace(entries);
            }
            Outcome::Queue(Err(e)) => warn!("Failed to fetch queue, keeping cached copy: {}", e),
        }
    }

    fn on_identity(&mut self, result: Result<User, ProviderError>) {
        self.identity_pending = false;
        match result {
            Ok(user) => {
                info!("Signed in as {} ({})", user.display_name, user.id);
                self.identity_failed = false;
                if self.state.set_local_user(user.clone()) == HostChange::BecameHost {
                    info!("We are the host of room {}", self.params.room_id);
                }
                self.open_channel(user);
            }
            Err(e) => {
                warn!("Failed to fetch identity: {}", e);
                self.identity_failed = true;
            }
        }
    }

    fn open_channel(&mut self, user: User) {
        if self.channel.is_some() {
            debug!("Channel already open");
            return;
        }
        let manager = ChannelManager::new(
            self.connector.clone(),
            self.reconnect.clone(),
            self.params.room_id.as_str(),
            user,
        );
        let (handle, events) = manager.start();
        self.channel = Some(handle);
        self.channel_events = Some(events);
        self.channel_status = ChannelStatus::Connecting;
    }

    /// Start over with a fresh channel after reconnecting gave up
    pub(super) fn reopen_channel(&mut self) {
        if self.channel_status != ChannelStatus::Lost {
            return;
        }
        if let Some(user) = self.state.local_user.clone() {
            info!("Reopening room channel for {}", self.params.room_id);
            self.open_channel(user);
        }
    }

    fn on_playback(&mut self, generation: u64, result: Result<PlaybackSnapshot, ProviderError>) {
        if !self.poller.is_current(generation) {
            debug!("Dropping stale poll #{}", generation);
            return;
        }

        match result {
            Ok(mut snapshot) => {
                if let Some(id) = self.state.local_user_id() {
                    snapshot.owner_id = id.to_string();
                }
                let delay = self
                    .poller
                    .poll_succeeded(snapshot.track.duration_ms, snapshot.progress_ms);
                debug!(
                    "Now playing {} - {} ({}/{}ms), next poll in {:?}",
                    snapshot.track.name,
                    snapshot.track.artist_line(),
                    snapshot.progress_ms,
                    snapshot.track.duration_ms,
                    delay
                );

                self.ending_track = snapshot.is_playing.then(|| snapshot.track.id.clone());
                self.timer = Some(Box::pin(tokio::time::sleep(delay)));
                self.state.update_local_playback(Some(snapshot));
                self.publish_song();
            }
            Err(e) => {
                warn!("Playback poll failed: {}", e);
                self.poller.poll_failed();
                self.timer = None;
                self.ending_track = None;

                let had_playback = self.state.local_playback.is_some();
                self.state.update_local_playback(None);
                if had_playback {
                    self.publish_song();
                }
            }
        }
    }

    /// Publish our playback as the room song. No-op unless we are the host.
    fn publish_song(&self) {
        if !self.state.is_host() {
            return;
        }
        let Some(channel) = &self.channel else {
            return;
        };
        let song = self.state.publishable_song().cloned();
        if let Err(e) = channel.publish_host_song(song) {
            debug!("Could not publish host song: {}", e);
        }
    }

    pub(super) fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                info!("Room channel connected");
                self.channel_status = ChannelStatus::Connected;
                // The relay may have lost the room song while we were away
                self.publish_song();
            }
            ChannelEvent::Reconnecting { attempt, delay_ms } => {
                debug!("Reconnecting (attempt {}) in {}ms", attempt, delay_ms);
                self.channel_status = ChannelStatus::Reconnecting;
            }
            ChannelEvent::Disconnected { reason: Some(reason) } => {
                warn!("Room channel disconnected: {}", reason);
                self.channel_status = ChannelStatus::Reconnecting;
            }
            ChannelEvent::Disconnected { reason: None } => {
                self.channel_status = ChannelStatus::Closed;
            }
            ChannelEvent::GaveUp { reason } => {
                warn!("Room channel lost: {}", reason);
                self.channel_status = ChannelStatus::Lost;
                self.channel = None;
            }
            ChannelEvent::Message(message) => self.handle_message(message),
        }
    }

    fn handle_message(&mut self, message: ChannelMessage) {
        match message {
            ChannelMessage::MemberList { members } => {
                let count = members.len();
                match self.state.apply_member_list(members) {
                    HostChange::BecameHost => {
                        info!("We are now the host of room {}", self.params.room_id);
                        self.publish_song();
                    }
                    HostChange::LostHost | HostChange::HostSwitched => {
                        info!(
                            "Host is now {}",
                            self.state.members.host().map(|u| u.display_name.as_str()).unwrap_or("nobody")
                        );
                    }
                    HostChange::Unchanged => debug!("Member list updated ({} members)", count),
                }
            }
            ChannelMessage::RoomSong { song } => {
                if !self.state.apply_room_song(song) {
                    debug!("Ignoring room song not from the current host");
                }
            }
            ChannelMessage::UserStatus { message } => info!("{}", message),
            other => debug!("Ignoring {} from relay", other.event_name()),
        }
    }
}
