use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::{RoomId, UserId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection store: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("connection store: bad timestamp: {0}")]
    Timestamp(#[from] time::error::ComponentRange),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One directed pairing: `owner` was matched with `peer` in `room_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRecord {
    pub owner: UserId,
    pub peer: UserId,
    pub room_id: RoomId,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Durable pairing records, shared by every instance of the service.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Write a single directed record.
    async fn create(&self, owner: &str, peer: &str, room_id: &str) -> StoreResult<ConnectionRecord>;

    /// Write both directions of a pairing atomically.
    async fn create_pair(&self, a: &str, b: &str, room_id: &str) -> StoreResult<()>;

    /// Newest unexpired record owned by `user`.
    async fn find_by_owner(&self, user: &str) -> StoreResult<Option<ConnectionRecord>>;

    /// Delete every record whose expiry is at or before `now`. Returns how many went.
    async fn purge_expired(&self, now: OffsetDateTime) -> StoreResult<u64>;
}

#[derive(Clone)]
pub struct SqliteConnections {
    db_pool: SqlitePool,
    ttl: Duration,
}

type Row = (String, String, String, i64, i64);

impl SqliteConnections {
    pub fn new(db_pool: SqlitePool, ttl: Duration) -> Self {
        Self { db_pool, ttl }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS connections (
                owner TEXT NOT NULL,
                peer TEXT NOT NULL,
                room_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
        )
        .execute(&self.db_pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS connections_owner ON connections (owner)")
            .execute(&self.db_pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS connections_expires_at ON connections (expires_at)")
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    fn stamps(&self) -> (i64, i64) {
        let created_at = OffsetDateTime::now_utc().unix_timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        (created_at, created_at.saturating_add(ttl))
    }
}

const INSERT: &str =
    "INSERT INTO connections (owner,peer,room_id,created_at,expires_at) VALUES (?,?,?,?,?)";

fn to_record((owner, peer, room_id, created_at, expires_at): Row) -> StoreResult<ConnectionRecord> {
    Ok(ConnectionRecord {
        owner,
        peer,
        room_id,
        created_at: OffsetDateTime::from_unix_timestamp(created_at)?,
        expires_at: OffsetDateTime::from_unix_timestamp(expires_at)?,
    })
}

#[async_trait]
impl ConnectionStore for SqliteConnections {
    async fn create(&self, owner: &str, peer: &str, room_id: &str) -> StoreResult<ConnectionRecord> {
        let (created_at, expires_at) = self.stamps();
        sqlx::query(INSERT)
            .bind(owner)
            .bind(peer)
            .bind(room_id)
            .bind(created_at)
            .bind(expires_at)
            .execute(&self.db_pool)
            .await?;

        info!(%owner, %peer, %room_id, "stored connection");
        to_record((owner.to_owned(), peer.to_owned(), room_id.to_owned(), created_at, expires_at))
    }

    async fn create_pair(&self, a: &str, b: &str, room_id: &str) -> StoreResult<()> {
        let (created_at, expires_at) = self.stamps();
        let mut tx = self.db_pool.begin().await?;
        for (owner, peer) in [(a, b), (b, a)] {
            sqlx::query(INSERT)
                .bind(owner)
                .bind(peer)
                .bind(room_id)
                .bind(created_at)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(%a, %b, %room_id, "stored connection pair");
        Ok(())
    }

    async fn find_by_owner(&self, user: &str) -> StoreResult<Option<ConnectionRecord>> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let row: Option<Row> = sqlx::query_as(
            "SELECT owner,peer,room_id,created_at,expires_at FROM connections
             WHERE owner=? AND expires_at>?
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(user)
        .bind(now)
        .fetch_optional(&self.db_pool)
        .await?;

        row.map(to_record).transpose()
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM connections WHERE expires_at<=?")
            .bind(now.unix_timestamp())
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected())
    }
}
