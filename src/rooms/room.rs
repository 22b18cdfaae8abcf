use std::collections::HashMap;

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, info, warn};

use crate::{RoomId, UserId};

use super::{
    ConnId, Outbox,
    msg::{Peer, ServerEvent},
    relay::{Directory, RelayError},
};

pub(crate) type Mailbox = mpsc::UnboundedSender<RoomCommand>;

#[derive(Debug)]
pub(crate) enum RoomCommand {
    Join {
        conn: ConnId,
        user_id: UserId,
        outbox: Outbox,
        reply: oneshot::Sender<Result<(), RelayError>>,
    },
    Forward {
        from: ConnId,
        event: ServerEvent,
    },
    Leave {
        conn: ConnId,
    },
}

struct Member {
    user_id: UserId,
    outbox: Outbox,
}

/// Owns the member set of one room. Runs until the last member leaves.
pub(crate) struct Room {
    id: RoomId,
    capacity: usize,
    members: HashMap<ConnId, Member>,
}

impl Room {
    pub(crate) fn spawn(id: RoomId, capacity: usize, directory: Directory) -> Mailbox {
        let (tx, rx) = mpsc::unbounded_channel();
        let room = Room {
            id,
            capacity,
            members: HashMap::new(),
        };
        tokio::spawn(room.run(rx, directory));
        tx
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCommand>, directory: Directory) {
        debug!(room_id = %self.id, "room opened");
        while let Some(command) = rx.recv().await {
            match command {
                RoomCommand::Join { conn, user_id, outbox, reply } => {
                    let _ = reply.send(self.join(conn, user_id, outbox));
                }
                RoomCommand::Forward { from, event } => self.forward(from, event),
                RoomCommand::Leave { conn } => self.leave(conn),
            }

            if self.members.is_empty() && directory.retire(&self.id, &rx) {
                break;
            }
        }
        info!(room_id = %self.id, "room is now empty");
    }

    fn join(&mut self, conn: ConnId, user_id: UserId, outbox: Outbox) -> Result<(), RelayError> {
        // a user coming back on a fresh transport takes over their old seat
        let stale: Vec<ConnId> = self
            .members
            .iter()
            .filter(|(c, m)| **c != conn && m.user_id == user_id)
            .map(|(c, _)| *c)
            .collect();
        for c in &stale {
            self.members.remove(c);
        }

        if !self.members.contains_key(&conn) && self.members.len() >= self.capacity {
            warn!(room_id = %self.id, %user_id, "room is full, join rejected");
            return Err(RelayError::RoomFull(self.id.clone()));
        }

        self.members.insert(conn, Member { user_id: user_id.clone(), outbox });
        info!(
            room_id = %self.id,
            %user_id,
            occupants = self.members.len(),
            "user joined room"
        );
        self.broadcast(conn, ServerEvent::PeerJoined(Peer { user_id }));
        Ok(())
    }

    fn forward(&mut self, from: ConnId, event: ServerEvent) {
        if !self.members.contains_key(&from) {
            debug!(room_id = %self.id, %from, "dropping message from non-member");
            return;
        }
        self.broadcast(from, event);
    }

    fn leave(&mut self, conn: ConnId) {
        let Some(member) = self.members.remove(&conn) else {
            return;
        };
        info!(room_id = %self.id, user_id = %member.user_id, "user left room");
        self.broadcast(conn, ServerEvent::PeerLeft(Peer { user_id: member.user_id }));
    }

    /// Send to every member except `from`.
    fn broadcast(&self, from: ConnId, event: ServerEvent) {
        for (conn, member) in &self.members {
            if *conn == from {
                continue;
            }
            match member.outbox.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(room_id = %self.id, %conn, user_id = %member.user_id, "outbox full, event dropped");
                }
                Err(TrySendError::Closed(_)) => debug!(room_id = %self.id, %conn, "outbox closed"),
            }
        }
    }
}
