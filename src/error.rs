use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::console::ConsoleError;
use crate::db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Console(#[from] ConsoleError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_)
            | ApiError::Store(StoreError::RowOutOfRange(_))
            | ApiError::Console(ConsoleError::Store(StoreError::RowOutOfRange(_))) => {
                StatusCode::NOT_FOUND
            }
            // upstream services failed, not the request
            ApiError::Store(_) | ApiError::Console(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
