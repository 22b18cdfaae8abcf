use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{State, rejection::JsonRejection},
};
use tracing::debug;
use serde::{Deserialize, Serialize};

use crate::{AppResult, RoomId, UserId};

use super::{MatchError, Matcher};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindMatchRequest {
    #[serde(default)]
    pub user_id: UserId,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FindMatchResponse {
    pub success: bool,
    pub room_id: RoomId,
    pub matched_user_id: Option<UserId>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn find_match(
    State(matcher): State<Arc<Matcher>>,
    body: Result<Json<FindMatchRequest>, JsonRejection>,
) -> AppResult<Json<FindMatchResponse>> {
    let Json(FindMatchRequest { user_id }) = body.map_err(|rejection| {
        debug!(%rejection, "unreadable findmatch body");
        MatchError::BadRequest("expected a JSON body with a userId")
    })?;
    let outcome = matcher.find_match(user_id.trim()).await?;

    Ok(Json(FindMatchResponse {
        success: true,
        room_id: outcome.room_id,
        matched_user_id: outcome.peer,
    }))
}
