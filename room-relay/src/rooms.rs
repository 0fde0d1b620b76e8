//! Room registry
//!
//! Pure bookkeeping for the relay: who is in which room, in join order, and
//! what the room's host is playing. Every operation returns the messages to
//! deliver; the server does the actual sending.

use std::collections::HashMap;

use room_core::sync::{ChannelMessage, PlaybackSnapshot, User};
use tracing::{debug, warn};

/// Server-assigned connection ID
pub type ConnId = u64;

/// A message addressed to one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: ConnId,
    pub message: ChannelMessage,
}

#[derive(Debug)]
struct Member {
    user: User,
    /// Connections this user joined with (a user may have several tabs open)
    conns: Vec<ConnId>,
}

#[derive(Debug, Default)]
struct Room {
    /// Join order; the first member is the host
    members: Vec<Member>,
    song: Option<PlaybackSnapshot>,
}

impl Room {
    fn host_id(&self) -> Option<&str> {
        self.members.first().map(|m| m.user.id.as_str())
    }

    fn conns(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.members.iter().flat_map(|m| m.conns.iter().copied())
    }

    fn member_list(&self) -> ChannelMessage {
        ChannelMessage::MemberList {
            members: self.members.iter().map(|m| m.user.clone()).collect(),
        }
    }

    fn broadcast(&self, message: ChannelMessage, out: &mut Vec<Outbound>) {
        out.extend(self.conns().map(|to| Outbound {
            to,
            message: message.clone(),
        }));
    }
}

/// One room as shown on the dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSummary {
    pub room_id: String,
    pub members: usize,
    pub connections: usize,
    pub host: Option<String>,
    /// "Track - Artist" of the host's song
    pub song: Option<String>,
    pub playing: bool,
}

/// Where a connection is joined
#[derive(Debug, Clone)]
struct Membership {
    room_id: String,
    user_id: String,
}

#[derive(Debug, Default)]
pub struct Registry {
    rooms: HashMap<String, Room>,
    joined: HashMap<ConnId, Membership>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every room, ordered by id
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .map(|(room_id, room)| RoomSummary {
                room_id: room_id.clone(),
                members: room.members.len(),
                connections: room.conns().count(),
                host: room.members.first().map(|m| m.user.display_name.clone()),
                song: room
                    .song
                    .as_ref()
                    .map(|s| format!("{} - {}", s.track.name, s.track.artist_line())),
                playing: room.song.as_ref().is_some_and(|s| s.is_playing),
            })
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }

    /// Handle `join room`. Re-joining with a user already in the room keeps
    /// their position in the member list.
    pub fn join(&mut self, conn: ConnId, room_id: &str, user: User) -> Vec<Outbound> {
        let mut out = Vec::new();

        let same_membership = self
            .joined
            .get(&conn)
            .map(|previous| previous.room_id == room_id && previous.user_id == user.id);
        match same_membership {
            Some(true) => debug!("Connection {} re-sent join for {}", conn, room_id),
            Some(false) => out.extend(self.disconnect(conn)),
            None => {}
        }

        let room = self.rooms.entry(room_id.to_string()).or_default();
        let is_new = match room.members.iter_mut().find(|m| m.user.id == user.id) {
            Some(member) => {
                if !member.conns.contains(&conn) {
                    member.conns.push(conn);
                }
                // Profile may have changed since the first join
                member.user = user.clone();
                false
            }
            None => {
                room.members.push(Member {
                    user: user.clone(),
                    conns: vec![conn],
                });
                true
            }
        };

        self.joined.insert(
            conn,
            Membership {
                room_id: room_id.to_string(),
                user_id: user.id.clone(),
            },
        );

        room.broadcast(room.member_list(), &mut out);
        if is_new {
            room.broadcast(
                ChannelMessage::UserStatus {
                    message: format!("{} joined the room", user.display_name),
                },
                &mut out,
            );
        }
        if let Some(song) = &room.song {
            out.push(Outbound {
                to: conn,
                message: ChannelMessage::RoomSong {
                    song: Some(song.clone()),
                },
            });
        }

        out
    }

    /// Handle `host song`. Only the room's host may set the song.
    pub fn host_song(&mut self, conn: ConnId, room_id: &str, song: Option<PlaybackSnapshot>) -> Vec<Outbound> {
        let mut out = Vec::new();

        let Some(membership) = self.joined.get(&conn) else {
            warn!("Connection {} sent host song without joining", conn);
            return out;
        };
        if membership.room_id != room_id {
            warn!("Connection {} sent host song for {} but is in {}", conn, room_id, membership.room_id);
            return out;
        }
        let Some(room) = self.rooms.get_mut(room_id) else {
            return out;
        };
        if room.host_id() != Some(membership.user_id.as_str()) {
            debug!("Ignoring host song from non-host {}", membership.user_id);
            return out;
        }

        let song = song.map(|mut s| {
            s.owner_id = membership.user_id.clone();
            s
        });
        room.song = song.clone();
        room.broadcast(ChannelMessage::RoomSong { song }, &mut out);
        out
    }

    /// Handle a closed connection
    pub fn disconnect(&mut self, conn: ConnId) -> Vec<Outbound> {
        let mut out = Vec::new();

        let Some(membership) = self.joined.remove(&conn) else {
            return out;
        };
        let Some(room) = self.rooms.get_mut(&membership.room_id) else {
            return out;
        };
        let Some(index) = room.members.iter().position(|m| m.user.id == membership.user_id) else {
            return out;
        };

        let member = &mut room.members[index];
        member.conns.retain(|c| *c != conn);
        if !member.conns.is_empty() {
            // Still connected elsewhere
            return out;
        }

        let left = room.members.remove(index);
        if room.members.is_empty() {
            debug!("Room {} is empty, dropping it", membership.room_id);
            self.rooms.remove(&membership.room_id);
            return out;
        }

        room.broadcast(room.member_list(), &mut out);
        room.broadcast(
            ChannelMessage::UserStatus {
                message: format!("{} left the room", left.user.display_name),
            },
            &mut out,
        );
        if index == 0 {
            room.song = None;
            room.broadcast(ChannelMessage::RoomSong { song: None }, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use room_core::sync::Track;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            avatar_url: None,
        }
    }

    fn song(owner: &str) -> PlaybackSnapshot {
        PlaybackSnapshot {
            track: Track {
                id: "t1".to_string(),
                name: "Song".to_string(),
                artists: vec!["Artist".to_string()],
                album_art_url: None,
                duration_ms: 100_000,
            },
            is_playing: true,
            progress_ms: 1_000,
            owner_id: owner.to_string(),
        }
    }

    fn to(out: &[Outbound], conn: ConnId) -> Vec<ChannelMessage> {
        out.iter().filter(|o| o.to == conn).map(|o| o.message.clone()).collect()
    }

    fn member_ids(message: &ChannelMessage) -> Vec<String> {
        match message {
            ChannelMessage::MemberList { members } => members.iter().map(|u| u.id.clone()).collect(),
            other => panic!("expected member list, got {:?}", other),
        }
    }

    #[test]
    fn test_join_order_decides_host() {
        let mut registry = Registry::new();
        registry.join(1, "room", user("a"));
        let out = registry.join(2, "room", user("b"));

        let to_a = to(&out, 1);
        assert_eq!(member_ids(&to_a[0]), vec!["a", "b"]);
        assert_eq!(
            to_a[1],
            ChannelMessage::UserStatus { message: "B joined the room".to_string() }
        );
        assert_eq!(to(&out, 2).len(), 2);
        assert_eq!(registry.summaries()[0].members, 2);
    }

    #[test]
    fn test_rejoin_keeps_position() {
        let mut registry = Registry::new();
        registry.join(1, "room", user("a"));
        registry.join(2, "room", user("b"));

        // a reconnects on a new connection before the old one is noticed as dead
        let out = registry.join(3, "room", user("a"));
        assert_eq!(member_ids(&to(&out, 3)[0]), vec!["a", "b"]);
        assert!(!out.iter().any(|o| matches!(o.message, ChannelMessage::UserStatus { .. })));

        // Old connection closing does not remove a
        assert!(registry.disconnect(1).is_empty());
        let summary = &registry.summaries()[0];
        assert_eq!((summary.members, summary.connections), (2, 2));
    }

    #[test]
    fn test_only_host_sets_song() {
        let mut registry = Registry::new();
        registry.join(1, "room", user("a"));
        registry.join(2, "room", user("b"));

        assert!(registry.host_song(2, "room", Some(song("b"))).is_empty());

        let out = registry.host_song(1, "room", Some(song("spoofed")));
        let to_b = to(&out, 2);
        match &to_b[0] {
            ChannelMessage::RoomSong { song: Some(s) } => assert_eq!(s.owner_id, "a"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_joiner_receives_current_song() {
        let mut registry = Registry::new();
        registry.join(1, "room", user("a"));
        registry.host_song(1, "room", Some(song("a")));

        let out = registry.join(2, "room", user("b"));
        let to_b = to(&out, 2);
        assert_eq!(to_b.last(), Some(&ChannelMessage::RoomSong { song: Some(song("a")) }));
    }

    #[test]
    fn test_host_leaving_clears_song() {
        let mut registry = Registry::new();
        registry.join(1, "room", user("a"));
        registry.join(2, "room", user("b"));
        registry.host_song(1, "room", Some(song("a")));

        let out = registry.disconnect(1);
        let to_b = to(&out, 2);
        assert_eq!(member_ids(&to_b[0]), vec!["b"]);
        assert_eq!(
            to_b[1],
            ChannelMessage::UserStatus { message: "A left the room".to_string() }
        );
        assert_eq!(to_b[2], ChannelMessage::RoomSong { song: None });

        // New host's joiners get no stale song
        let out = registry.join(3, "room", user("c"));
        assert!(!to(&out, 3).iter().any(|m| matches!(m, ChannelMessage::RoomSong { .. })));
    }

    #[test]
    fn test_empty_room_dropped() {
        let mut registry = Registry::new();
        registry.join(1, "room", user("a"));
        assert_eq!(registry.summaries().len(), 1);

        assert!(registry.disconnect(1).is_empty());
        assert!(registry.summaries().is_empty());
        assert!(registry.disconnect(1).is_empty());
    }

    #[test]
    fn test_summary_shows_host_and_song() {
        let mut registry = Registry::new();
        registry.join(1, "room", user("a"));
        registry.join(2, "room", user("b"));
        registry.host_song(1, "room", Some(song("a")));

        let summary = registry.summaries().remove(0);
        assert_eq!(summary.host.as_deref(), Some("A"));
        assert_eq!(summary.song.as_deref(), Some("Song - Artist"));
        assert!(summary.playing);
    }

    #[test]
    fn test_switching_rooms_leaves_previous() {
        let mut registry = Registry::new();
        registry.join(1, "one", user("a"));
        registry.join(2, "one", user("b"));

        let out = registry.join(1, "two", user("a"));
        assert_eq!(member_ids(&to(&out, 2)[0]), vec!["b"]);
        let rooms: Vec<String> = registry.summaries().into_iter().map(|r| r.room_id).collect();
        assert_eq!(rooms, vec!["one", "two"]);
    }
}
