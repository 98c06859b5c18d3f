use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::domain::DomainError;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

/// Domain error as seen by an HTTP client. Internals are logged, never sent.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ApiError(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::ValidationError(_) => StatusCode::BAD_REQUEST,
            DomainError::MissingWriteKey | DomainError::InvalidWriteKey => {
                StatusCode::UNAUTHORIZED
            }
            DomainError::PublishError(_)
            | DomainError::Timeout(_)
            | DomainError::RepositoryError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match &self.0 {
            DomainError::ValidationError(_) => "Invalid input",
            DomainError::MissingWriteKey => "Missing write key.",
            DomainError::InvalidWriteKey => "Invalid write key.",
            DomainError::PublishError(_)
            | DomainError::Timeout(_)
            | DomainError::RepositoryError(_) => "Internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if self.0.is_client_error() {
            warn!(status = status.as_u16(), error = %self.0, "rejected request");
        } else {
            error!(status = status.as_u16(), error = %self.0, "request failed");
        }

        let body = MessageBody {
            message: self.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
