//! Users who asked for a match and got parked in a fresh room.
//!
//! The registry is a trait so the in-process map can be swapped for a
//! shared store. Any backend must make [`WaitingRegistry::take_other`] a
//! single compare-and-remove step: two requests must never walk away with
//! the same waiting user.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{RoomId, UserId};

pub trait WaitingRegistry: Send + Sync {
    /// Park `user` in `room_id`. A user who is already waiting keeps the
    /// room they were given first; that room is returned.
    fn enqueue(&self, user: &str, room_id: &str) -> RoomId;

    /// Atomically remove and return the longest-waiting user other than `user`.
    fn take_other(&self, user: &str) -> Option<(UserId, RoomId)>;

    /// Put a user taken by [`take_other`](Self::take_other) back at the head of the line.
    fn requeue(&self, user: &str, room_id: &str);

    fn remove(&self, user: &str) -> Option<RoomId>;

    fn room_of(&self, user: &str) -> Option<RoomId>;

    /// Drop entries that have been waiting for longer than `age`.
    fn evict_older_than(&self, age: Duration) -> Vec<UserId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Waiting {
    user: UserId,
    room_id: RoomId,
    since: Instant,
}

/// In-process registry, oldest entry first.
#[derive(Default)]
pub struct MemoryWaiting {
    queue: Mutex<VecDeque<Waiting>>,
}

impl MemoryWaiting {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitingRegistry for MemoryWaiting {
    fn enqueue(&self, user: &str, room_id: &str) -> RoomId {
        let mut queue = self.queue.lock();
        if let Some(existing) = queue.iter().find(|w| w.user == user) {
            return existing.room_id.clone();
        }
        queue.push_back(Waiting {
            user: user.to_owned(),
            room_id: room_id.to_owned(),
            since: Instant::now(),
        });
        room_id.to_owned()
    }

    fn take_other(&self, user: &str) -> Option<(UserId, RoomId)> {
        let mut queue = self.queue.lock();
        let pos = queue.iter().position(|w| w.user != user)?;
        queue.remove(pos).map(|w| (w.user, w.room_id))
    }

    fn requeue(&self, user: &str, room_id: &str) {
        let mut queue = self.queue.lock();
        if queue.iter().any(|w| w.user == user) {
            return;
        }
        queue.push_front(Waiting {
            user: user.to_owned(),
            room_id: room_id.to_owned(),
            since: Instant::now(),
        });
    }

    fn remove(&self, user: &str) -> Option<RoomId> {
        let mut queue = self.queue.lock();
        let pos = queue.iter().position(|w| w.user == user)?;
        queue.remove(pos).map(|w| w.room_id)
    }

    fn room_of(&self, user: &str) -> Option<RoomId> {
        self.queue
            .lock()
            .iter()
            .find(|w| w.user == user)
            .map(|w| w.room_id.clone())
    }

    fn evict_older_than(&self, age: Duration) -> Vec<UserId> {
        let mut queue = self.queue.lock();
        let mut evicted = Vec::new();
        queue.retain(|w| {
            if w.since.elapsed() > age {
                evicted.push(w.user.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_take_other_is_fcfs_and_skips_self() {
        let waiting = MemoryWaiting::new();
        waiting.enqueue("u1", "r1");
        waiting.enqueue("u2", "r2");

        assert_eq!(waiting.take_other("u1"), Some(("u2".to_owned(), "r2".to_owned())));
        assert_eq!(waiting.take_other("u1"), None);
        assert_eq!(waiting.take_other("u3"), Some(("u1".to_owned(), "r1".to_owned())));
        assert!(waiting.is_empty());
    }

    #[test]
    fn test_enqueue_keeps_first_room() {
        let waiting = MemoryWaiting::new();
        assert_eq!(waiting.enqueue("u1", "r1"), "r1");
        assert_eq!(waiting.enqueue("u1", "r9"), "r1");
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting.room_of("u1").as_deref(), Some("r1"));
    }

    #[test]
    fn test_requeue_goes_to_front() {
        let waiting = MemoryWaiting::new();
        waiting.enqueue("u1", "r1");
        waiting.enqueue("u2", "r2");
        let (user, room) = waiting.take_other("x").unwrap();
        assert_eq!(user, "u1");

        waiting.requeue(&user, &room);
        assert_eq!(waiting.take_other("x").unwrap().0, "u1");
    }

    #[test]
    fn test_remove() {
        let waiting = MemoryWaiting::new();
        waiting.enqueue("u1", "r1");
        assert_eq!(waiting.remove("u1").as_deref(), Some("r1"));
        assert_eq!(waiting.remove("u1"), None);
        assert_eq!(waiting.room_of("u1"), None);
    }

    #[test]
    fn test_evict_older_than() {
        let waiting = MemoryWaiting::new();
        waiting.enqueue("u1", "r1");
        assert!(waiting.evict_older_than(Duration::from_secs(60)).is_empty());

        thread::sleep(Duration::from_millis(5));
        assert_eq!(waiting.evict_older_than(Duration::ZERO), vec!["u1".to_owned()]);
        assert!(waiting.is_empty());
    }

    #[test]
    fn test_concurrent_take_hands_out_each_user_once() {
        let waiting = Arc::new(MemoryWaiting::new());
        waiting.enqueue("parked", "r0");

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let waiting = waiting.clone();
                thread::spawn(move || waiting.take_other(&format!("caller{i}")))
            })
            .collect();

        let winners = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();
        assert_eq!(winners, 1);
    }
}
