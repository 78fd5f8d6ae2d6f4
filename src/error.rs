//! Error handling

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info, warn};

use crate::upstream::UpstreamError;

/// Errors the relay hands back to its callers.
#[derive(Debug)]
pub enum RelayError {
    /// When you didn't send the right fields
    BadRequest(String),
    /// When the platform (or the way to it) failed
    Upstream(UpstreamError),
    /// When the request body is over the configured limit
    PayloadTooLarge(String),
    /// When DB operations fail
    DatabaseError(sea_orm::DbErr),
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        RelayError::Upstream(err)
    }
}

impl From<sea_orm::DbErr> for RelayError {
    fn from(err: sea_orm::DbErr) -> Self {
        RelayError::DatabaseError(err)
    }
}

impl From<axum::extract::multipart::MultipartError> for RelayError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        RelayError::rejected(err.status(), err.body_text())
    }
}

impl RelayError {
    /// A rejected request body. Keeps 413 apart from every other 4xx.
    pub fn rejected(status: StatusCode, message: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            RelayError::PayloadTooLarge(message)
        } else {
            RelayError::BadRequest(message)
        }
    }

    /// Status the caller sees
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Upstream(err) => err.relay_status(),
            RelayError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let detail = match self {
            RelayError::BadRequest(message) => {
                info!("Bad request received: {}", message);
                message
            }
            RelayError::PayloadTooLarge(message) => {
                warn!("Oversized request rejected: {}", message);
                message
            }
            RelayError::Upstream(err) => {
                if status.is_server_error() {
                    error!("Upstream failure: {}", err);
                } else {
                    warn!("Upstream lookup failed: {}", err);
                }
                err.to_string()
            }
            RelayError::DatabaseError(err) => {
                error!("Database error: {}", err);
                "Database error".to_string()
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
