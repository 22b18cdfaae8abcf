use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::{RoomId, UserId};

use super::{
    ConnId, OUTBOX_CAPACITY, Outbox,
    msg::{JoinRoom, Problem, ProblemCode, Relayed, ServerEvent},
    presence::Presence,
    room::{Mailbox, Room, RoomCommand},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("join-room needs a non-empty {0}")]
    MissingField(&'static str),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("not joined to room {0}")]
    NotJoined(RoomId),

    #[error("malformed event: {0}")]
    Malformed(String),

    #[error("room {0} went away")]
    RoomClosed(RoomId),
}

impl RelayError {
    pub fn problem(&self) -> Problem {
        use RelayError::*;
        let code = match self {
            MissingField(_) | Malformed(_) => ProblemCode::ProtocolViolation,
            RoomFull(_) => ProblemCode::RoomFull,
            NotJoined(_) | RoomClosed(_) => ProblemCode::NotJoined,
        };
        Problem {
            code,
            message: self.to_string(),
        }
    }
}

/// Room id -> mailbox of the actor owning that room.
///
/// Joins are sent while holding the lock, and an actor only retires after
/// checking its mailbox is empty under the same lock, so a join can never
/// land in a retired room.
#[derive(Clone, Default)]
pub(crate) struct Directory {
    rooms: Arc<Mutex<HashMap<RoomId, Mailbox>>>,
}

impl Directory {
    fn send_join(&self, room_id: &str, capacity: usize, command: RoomCommand) -> Mailbox {
        let mut rooms = self.rooms.lock();
        let mailbox = rooms
            .entry(room_id.to_owned())
            .or_insert_with(|| Room::spawn(room_id.to_owned(), capacity, self.clone()));

        match mailbox.send(command) {
            Ok(()) => mailbox.clone(),
            Err(mpsc::error::SendError(command)) => {
                // the actor died without retiring
                let fresh = Room::spawn(room_id.to_owned(), capacity, self.clone());
                let _ = fresh.send(command);
                *mailbox = fresh.clone();
                fresh
            }
        }
    }

    pub(crate) fn retire(&self, room_id: &str, rx: &mpsc::UnboundedReceiver<RoomCommand>) -> bool {
        let mut rooms = self.rooms.lock();
        if !rx.is_empty() {
            return false;
        }
        rooms.remove(room_id);
        true
    }

    fn len(&self) -> usize {
        self.rooms.lock().len()
    }
}

struct Joined {
    room_id: RoomId,
    user_id: UserId,
    mailbox: Mailbox,
}

/// One transport's view of the relay.
pub struct Connection {
    id: ConnId,
    outbox: Outbox,
    joined: Option<Joined>,
}

impl Connection {
    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn room_id(&self) -> Option<&str> {
        self.joined.as_ref().map(|j| j.room_id.as_str())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.joined.as_ref().map(|j| j.user_id.as_str())
    }

    /// Tell this transport something went wrong.
    pub fn report(&self, error: &RelayError) {
        let _ = self.outbox.try_send(ServerEvent::Error(error.problem()));
    }
}

/// Routes signaling and chat traffic between the occupants of a room.
#[derive(Clone)]
pub struct Relay {
    directory: Directory,
    presence: Arc<Presence>,
    capacity: usize,
}

impl Relay {
    pub fn new(capacity: usize) -> Self {
        Self {
            directory: Directory::default(),
            presence: Arc::new(Presence::new()),
            capacity,
        }
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.directory.len()
    }

    /// Register a new transport. Events for it arrive on the returned receiver.
    pub fn connect(&self) -> (Connection, mpsc::Receiver<ServerEvent>) {
        let (outbox, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let conn = Connection {
            id: ConnId::new(),
            outbox,
            joined: None,
        };
        debug!(conn = %conn.id, "transport connected");
        (conn, rx)
    }

    pub async fn join(&self, conn: &mut Connection, join: JoinRoom) -> Result<(), RelayError> {
        let user_id = join
            .user_id
            .filter(|u| !u.is_empty())
            .ok_or(RelayError::MissingField("userId"))?;
        let room_id = join
            .room_id
            .filter(|r| !r.is_empty())
            .ok_or(RelayError::MissingField("roomId"))?;

        let (reply, joined) = oneshot::channel();
        let mailbox = self.directory.send_join(
            &room_id,
            self.capacity,
            RoomCommand::Join {
                conn: conn.id,
                user_id: user_id.clone(),
                outbox: conn.outbox.clone(),
                reply,
            },
        );
        joined
            .await
            .map_err(|_| RelayError::RoomClosed(room_id.clone()))??;

        let previous = conn.joined.replace(Joined {
            room_id: room_id.clone(),
            user_id: user_id.clone(),
            mailbox,
        });
        if let Some(previous) = previous {
            self.presence.remove_conn(conn.id);
            if previous.room_id != room_id {
                let _ = previous.mailbox.send(RoomCommand::Leave { conn: conn.id });
            }
        }
        self.presence.record(&user_id, conn.id, &room_id);

        info!(
            %user_id,
            %room_id,
            present = ?self.presence.occupants(&room_id),
            "user joining room"
        );
        Ok(())
    }

    /// Hand `event` to every other occupant of the room named in `routing`.
    pub fn forward(&self, conn: &Connection, routing: &Relayed, event: ServerEvent) -> Result<(), RelayError> {
        let joined = conn
            .joined
            .as_ref()
            .filter(|j| j.room_id == routing.room_id)
            .ok_or_else(|| RelayError::NotJoined(routing.room_id.clone()))?;

        debug!(room_id = %routing.room_id, user_id = %routing.user_id, "relaying message");
        joined
            .mailbox
            .send(RoomCommand::Forward { from: conn.id, event })
            .map_err(|_| RelayError::RoomClosed(routing.room_id.clone()))
    }

    pub fn disconnect(&self, conn: Connection) {
        for (user_id, room_id) in self.presence.remove_conn(conn.id) {
            info!(%user_id, %room_id, "user disconnected");
        }
        if let Some(joined) = conn.joined {
            let _ = joined.mailbox.send(RoomCommand::Leave { conn: conn.id });
        }
        debug!(conn = %conn.id, "transport closed");
    }
}
