mod msg;
mod presence;
mod relay;
mod room;
mod ws;

use std::fmt;

use axum::{Router, routing::get};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::AppState;

pub use msg::{ClientEvent, JoinRoom, Peer, Problem, ProblemCode, Relayed, ServerEvent};
pub use presence::{Presence, PresenceEntry};
pub use relay::{Connection, Relay, RelayError};

/// Identity of one live transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Events queued for one transport before its writer falls behind.
pub(crate) const OUTBOX_CAPACITY: usize = 64;

pub(crate) type Outbox = mpsc::Sender<ServerEvent>;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::room_ws))
}
