use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::actor::Role;
use crate::observability::metrics::Metrics;
use crate::realtime::events::OutboundEvent;

pub type SessionId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Room {
    Request(Uuid),
    User(Uuid),
    Area(String),
    Admins,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Request(id) => write!(f, "request:{id}"),
            Room::User(id) => write!(f, "user:{id}"),
            Room::Area(cell) => write!(f, "area:{cell}"),
            Room::Admins => f.write_str("admins"),
        }
    }
}

struct SessionEntry {
    user_id: Uuid,
    rooms: HashSet<Room>,
    tx: mpsc::Sender<OutboundEvent>,
}

/// Lock order is sessions, then rooms. Delivery is at most once and never
/// blocks: a full session queue drops the frame.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    rooms: DashMap<Room, HashSet<SessionId>>,
    buffer_size: usize,
    metrics: Metrics,
}

impl SessionRegistry {
    pub fn new(buffer_size: usize, metrics: Metrics) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            buffer_size: buffer_size.max(1),
            metrics,
        }
    }

    /// Registers a session and puts it in its `user:<id>` room (plus
    /// `admins` for admins). The receiver drains that session's frames.
    pub fn connect(&self, user_id: Uuid, role: Role) -> (SessionId, mpsc::Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let session_id = Uuid::new_v4();

        self.sessions.insert(
            session_id,
            SessionEntry {
                user_id,
                rooms: HashSet::new(),
                tx,
            },
        );
        self.metrics.connected_sessions.inc();

        self.join(session_id, Room::User(user_id));
        if role == Role::Admin {
            self.join(session_id, Room::Admins);
        }

        info!(session_id = %session_id, user_id = %user_id, role = %role, "session connected");
        (session_id, rx)
    }

    pub fn disconnect(&self, session_id: SessionId) {
        let Some((_, entry)) = self.sessions.remove(&session_id) else {
            return;
        };
        self.metrics.connected_sessions.dec();

        for room in &entry.rooms {
            if let Some(mut members) = self.rooms.get_mut(room) {
                members.remove(&session_id);
            }
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }

        info!(session_id = %session_id, user_id = %entry.user_id, "session disconnected");
    }

    /// Returns whether the session was newly added. Joining twice or joining
    /// with an unknown session is a no-op.
    pub fn join(&self, session_id: SessionId, room: Room) -> bool {
        let Some(mut entry) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        if !entry.rooms.insert(room.clone()) {
            return false;
        }
        self.rooms.entry(room.clone()).or_default().insert(session_id);
        debug!(session_id = %session_id, room = %room, "joined room");
        true
    }

    /// Returns whether the session was a member. Leaving a room you are not
    /// in is a no-op.
    pub fn leave(&self, session_id: SessionId, room: &Room) -> bool {
        let Some(mut entry) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        if !entry.rooms.remove(room) {
            return false;
        }
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&session_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
        debug!(session_id = %session_id, room = %room, "left room");
        true
    }

    /// Moves the session out of every `area:*` room and, if given, into
    /// `area:<cell>`.
    pub fn switch_area(&self, session_id: SessionId, cell: Option<String>) {
        let current: Vec<Room> = self
            .sessions
            .get(&session_id)
            .map(|entry| {
                entry
                    .rooms
                    .iter()
                    .filter(|room| matches!(room, Room::Area(_)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let target = cell.map(Room::Area);
        for room in current {
            if Some(&room) != target.as_ref() {
                self.leave(session_id, &room);
            }
        }
        if let Some(room) = target {
            self.join(session_id, room);
        }
    }

    /// Best-effort fan-out to every session currently in `room`. Returns the
    /// number of sessions the frame was queued for.
    pub fn publish<T: Serialize>(&self, room: &Room, event: &str, payload: &T) -> usize {
        let frame = match OutboundEvent::new(event, payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, event, "failed to serialize event");
                return 0;
            }
        };

        let members: Vec<SessionId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for session_id in members {
            let Some(tx) = self.sessions.get(&session_id).map(|entry| entry.tx.clone()) else {
                continue;
            };
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(session_id = %session_id, room = %room, event, "session queue full; frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session_id = %session_id, room = %room, "session channel closed");
                }
            }
        }

        self.metrics
            .broadcast_deliveries_total
            .with_label_values(&[event])
            .inc_by(delivered as u64);
        delivered
    }

    /// Sends one frame to a single session.
    pub fn send_to<T: Serialize>(&self, session_id: SessionId, event: &str, payload: &T) -> bool {
        let Ok(frame) = OutboundEvent::new(event, payload) else {
            return false;
        };
        self.sessions
            .get(&session_id)
            .map(|entry| entry.tx.clone())
            .is_some_and(|tx| tx.try_send(frame).is_ok())
    }

    pub fn members(&self, room: &Room) -> Vec<SessionId> {
        let mut members: Vec<SessionId> = self
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub fn is_member(&self, session_id: SessionId, room: &Room) -> bool {
        self.sessions
            .get(&session_id)
            .is_some_and(|entry| entry.rooms.contains(room))
    }

    pub fn following_area(&self, session_id: SessionId) -> bool {
        self.sessions
            .get(&session_id)
            .is_some_and(|entry| entry.rooms.iter().any(|room| matches!(room, Room::Area(_))))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
