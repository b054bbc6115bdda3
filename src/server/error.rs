use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::MediaGrabError;

/// Plain-text error response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<MediaGrabError> for ApiError {
    fn from(err: MediaGrabError) -> Self {
        match err {
            // Clients cannot tell a missing task from an unfinished one
            MediaGrabError::NotFound | MediaGrabError::NotReady => {
                Self::new(StatusCode::NOT_FOUND, MediaGrabError::NotReady.to_string())
            }
            MediaGrabError::InvalidMode(_) => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            MediaGrabError::Extraction(_) | MediaGrabError::NoArtifact => {
                Self::internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}
