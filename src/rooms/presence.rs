use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{RoomId, UserId};

use super::ConnId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub conn: ConnId,
    pub room_id: RoomId,
}

/// Which live transport belongs to which user, and in which room.
#[derive(Default)]
pub struct Presence {
    entries: Mutex<HashMap<UserId, PresenceEntry>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `user` on `conn` in `room_id`, replacing whatever they had before.
    pub fn record(&self, user: &str, conn: ConnId, room_id: &str) -> Option<PresenceEntry> {
        self.entries.lock().insert(
            user.to_owned(),
            PresenceEntry {
                conn,
                room_id: room_id.to_owned(),
            },
        )
    }

    pub fn get(&self, user: &str) -> Option<PresenceEntry> {
        self.entries.lock().get(user).cloned()
    }

    /// Remove every entry held by `conn`.
    pub fn remove_conn(&self, conn: ConnId) -> Vec<(UserId, RoomId)> {
        let mut entries = self.entries.lock();
        let mut removed = Vec::new();
        entries.retain(|user, entry| {
            if entry.conn == conn {
                removed.push((user.clone(), entry.room_id.clone()));
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn occupants(&self, room_id: &str) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, e)| e.room_id == room_id)
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_conn_leaves_others_alone() {
        let presence = Presence::new();
        let (a, b) = (ConnId::new(), ConnId::new());
        presence.record("u1", a, "r1");
        presence.record("u2", b, "r1");
        presence.record("u3", b, "r2");

        let mut removed = presence.remove_conn(b);
        removed.sort();
        assert_eq!(
            removed,
            vec![("u2".to_owned(), "r1".to_owned()), ("u3".to_owned(), "r2".to_owned())]
        );
        assert_eq!(presence.get("u1"), Some(PresenceEntry { conn: a, room_id: "r1".to_owned() }));
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn test_record_replaces_previous_transport() {
        let presence = Presence::new();
        let (old, new) = (ConnId::new(), ConnId::new());
        presence.record("u1", old, "r1");
        let previous = presence.record("u1", new, "r1").unwrap();
        assert_eq!(previous.conn, old);

        // the stale transport going away must not drop the live entry
        assert!(presence.remove_conn(old).is_empty());
        assert_eq!(presence.get("u1").unwrap().conn, new);
    }

    #[test]
    fn test_occupants() {
        let presence = Presence::new();
        presence.record("u2", ConnId::new(), "r1");
        presence.record("u1", ConnId::new(), "r1");
        presence.record("u3", ConnId::new(), "r2");
        assert_eq!(presence.occupants("r1"), vec!["u1".to_owned(), "u2".to_owned()]);
        assert!(presence.occupants("r9").is_empty());
    }
}
