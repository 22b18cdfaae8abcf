use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde_json::json;
use tracing::error;

use crate::matching::MatchError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.0
            .downcast_ref::<MatchError>()
            .map_or(StatusCode::INTERNAL_SERVER_ERROR, MatchError::status)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self.0, "request failed");
        }

        // store/search details stay in the log
        let message = if status.is_server_error() {
            "internal server error".to_owned()
        } else {
            self.0.to_string()
        };

        (
            status,
            Json(json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
