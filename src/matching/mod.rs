mod find;
mod orchestrator;

use axum::{Router, http::StatusCode, routing::post};
use thiserror::Error;

use crate::{AppState, UserId, connections::StoreError, similarity::SearchError};

pub use find::{FindMatchRequest, FindMatchResponse};
pub use orchestrator::{MatchOutcome, Matcher};

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("no stored profile for user {0}")]
    NotFound(UserId),

    #[error("no location on file for user {0}")]
    InvalidState(UserId),

    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl MatchError {
    pub fn status(&self) -> StatusCode {
        use MatchError::*;
        match self {
            NotFound(_) => StatusCode::NOT_FOUND,
            InvalidState(_) | BadRequest(_) => StatusCode::BAD_REQUEST,
            Store(_) | Search(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/findmatch", post(find::find_match))
}
