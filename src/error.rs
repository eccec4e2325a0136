use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::provider::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("{0}")]
    Validation(String),

    #[error("Tests have already run or are in progress. Restart the harness to run again")]
    AlreadyRunning,

    #[error("Invalid test markup: {0}")]
    Markup(#[from] MarkupError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal failure while preparing a session. Logged, halts the run, never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SetupError {
    #[error("Init failure: {0}")]
    Initialize(ProviderError),

    #[error("launch error: {0}")]
    RequestSession(ProviderError),

    #[error("no existing media found. Launch the sender app, play media, then run these tests again")]
    NoExistingMedia,

    #[error("Error loading media - {0}. Check the media URL and content type")]
    LoadMedia(ProviderError),

    #[error("setup ended without reporting a session")]
    Interrupted,
}

#[derive(Debug, thiserror::Error)]
pub enum MarkupError {
    #[error("unknown test id {0:?}")]
    UnknownTest(String),

    #[error("duplicate test id {0:?}")]
    DuplicateTest(String),

    #[error("{0}")]
    Parse(#[from] serde_json::Error),
}

impl IntoResponse for HarnessError {
    fn into_response(self) -> Response {
        let status = match &self {
            HarnessError::Validation(_) => StatusCode::BAD_REQUEST,
            HarnessError::AlreadyRunning => StatusCode::CONFLICT,
            HarnessError::Markup(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HarnessError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
