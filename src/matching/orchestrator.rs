use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    RoomId, UserId,
    connections::ConnectionStore,
    similarity::SimilaritySearch,
    waiting::WaitingRegistry,
};

use super::MatchError;

/// Result of one match request. `peer` is `None` while the user waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub room_id: RoomId,
    pub peer: Option<UserId>,
}

impl MatchOutcome {
    fn paired(room_id: impl Into<RoomId>, peer: impl Into<UserId>) -> Self {
        Self {
            room_id: room_id.into(),
            peer: Some(peer.into()),
        }
    }
}

/// Decides who gets paired with whom.
///
/// Tiers, first hit wins: an existing connection, then the oldest waiting
/// user, then the geographically nearest user among those with similar
/// interests, and finally a fresh room to wait in.
///
/// Every read-decide-write step on shared pairing state runs under
/// `pairing`. Similarity lookups happen outside it, so the commit phase
/// re-reads whatever it depends on.
pub struct Matcher {
    connections: Arc<dyn ConnectionStore>,
    waiting: Arc<dyn WaitingRegistry>,
    search: Arc<dyn SimilaritySearch>,
    top_k: usize,
    pairing: Mutex<()>,
}

fn new_room() -> RoomId {
    Uuid::new_v4().to_string()
}

impl Matcher {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        waiting: Arc<dyn WaitingRegistry>,
        search: Arc<dyn SimilaritySearch>,
        top_k: usize,
    ) -> Self {
        Self {
            connections,
            waiting,
            search,
            top_k,
            pairing: Mutex::new(()),
        }
    }

    pub async fn find_match(&self, user: &str) -> Result<MatchOutcome, MatchError> {
        if user.is_empty() {
            return Err(MatchError::BadRequest("userId is required"));
        }

        {
            let _pairing = self.pairing.lock().await;

            if let Some(existing) = self.connections.find_by_owner(user).await? {
                info!(%user, room_id = %existing.room_id, "already connected");
                return Ok(MatchOutcome::paired(existing.room_id, existing.peer));
            }

            if let Some(outcome) = self.pair_with_waiting(user).await? {
                return Ok(outcome);
            }
        }

        let candidate = self.nearest_similar(user).await?;

        let _pairing = self.pairing.lock().await;

        // someone may have paired with us while we were searching
        if let Some(existing) = self.connections.find_by_owner(user).await? {
            return Ok(MatchOutcome::paired(existing.room_id, existing.peer));
        }

        // or started waiting, and waiting users still go first
        if let Some(outcome) = self.pair_with_waiting(user).await? {
            return Ok(outcome);
        }

        let Some(candidate) = candidate else {
            let room_id = self.waiting.enqueue(user, &new_room());
            info!(%user, %room_id, "no match yet, waiting");
            return Ok(MatchOutcome { room_id, peer: None });
        };

        if let Some(theirs) = self.connections.find_by_owner(&candidate).await? {
            // the candidate's own record keeps pointing at whoever they were paired with
            self.connections.create(user, &candidate, &theirs.room_id).await?;
            self.waiting.remove(user);
            info!(%user, %candidate, room_id = %theirs.room_id, "joined candidate's existing room");
            return Ok(MatchOutcome::paired(theirs.room_id, candidate));
        }

        let mine = self.waiting.remove(user);
        let theirs = self.waiting.remove(&candidate);
        let room_id = theirs.clone().or_else(|| mine.clone()).unwrap_or_else(new_room);

        if let Err(e) = self.connections.create_pair(user, &candidate, &room_id).await {
            if let Some(room) = theirs {
                self.waiting.requeue(&candidate, &room);
            }
            if let Some(room) = mine {
                self.waiting.requeue(user, &room);
            }
            return Err(e.into());
        }

        info!(%user, %candidate, %room_id, "paired by similarity");
        Ok(MatchOutcome::paired(room_id, candidate))
    }

    /// First-come-first-served pairing with whoever has waited longest.
    async fn pair_with_waiting(&self, user: &str) -> Result<Option<MatchOutcome>, MatchError> {
        let Some((peer, room_id)) = self.waiting.take_other(user) else {
            return Ok(None);
        };

        if let Err(e) = self.connections.create_pair(user, &peer, &room_id).await {
            self.waiting.requeue(&peer, &room_id);
            return Err(e.into());
        }
        self.waiting.remove(user);

        info!(%user, %peer, %room_id, "paired with waiting user");
        Ok(Some(MatchOutcome::paired(room_id, peer)))
    }

    /// Narrow to users with similar interests, then pick the closest one on
    /// the map. Similarity rank only decides who is eligible.
    async fn nearest_similar(&self, user: &str) -> Result<Option<UserId>, MatchError> {
        let mut profile = self.search.fetch_by_ids(&[user.to_owned()]).await?;
        let Some(record) = profile.remove(user) else {
            return Err(MatchError::NotFound(user.to_owned()));
        };
        let Some(metadata) = record.metadata else {
            return Err(MatchError::NotFound(user.to_owned()));
        };
        let Some(here) = metadata.location() else {
            return Err(MatchError::InvalidState(user.to_owned()));
        };

        if record.values.is_empty() {
            debug!(%user, "stored profile has no interest vector");
            return Ok(None);
        }

        let neighbors = self.search.query_nearest(&record.values, self.top_k, true).await?;
        let nearest = neighbors
            .into_iter()
            .filter(|n| n.id != user)
            .filter_map(|n| {
                let there = n.metadata.as_ref()?.location()?;
                Some((here.distance_km(&there), n.id))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));

        if let Some((km, id)) = &nearest {
            debug!(%user, candidate = %id, km, "nearest similar user");
        }
        Ok(nearest.map(|(_, id)| id))
    }
}
