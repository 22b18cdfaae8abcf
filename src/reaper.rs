use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::{connections::ConnectionStore, waiting::WaitingRegistry};

/// Ages out pairings and waiting users past their time-to-live.
pub struct Reaper {
    pub connections: Arc<dyn ConnectionStore>,
    pub waiting: Arc<dyn WaitingRegistry>,
    pub ttl: Duration,
}

impl Reaper {
    pub async fn sweep(&self) {
        match self.connections.purge_expired(OffsetDateTime::now_utc()).await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "expired connections removed"),
            Err(e) => error!(error = %e, "could not purge expired connections"),
        }

        let evicted = self.waiting.evict_older_than(self.ttl);
        if !evicted.is_empty() {
            info!(?evicted, "stale waiting users evicted");
        }
    }

    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                self.sweep().await;
            }
        })
    }
}
