//! RFC9457-style API error wrapper.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use riptide_api_models::ProblemDetails;
use riptide_core::error::ControlError;

pub(crate) const PROBLEM_NOT_FOUND: &str = "https://riptide.dev/problems/not-found";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://riptide.dev/problems/bad-request";
pub(crate) const PROBLEM_CONFLICT: &str = "https://riptide.dev/problems/conflict";
pub(crate) const PROBLEM_INTERNAL: &str = "https://riptide.dev/problems/internal";

/// Structured API error rendered as a problem document.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) kind: &'static str,
    title: &'static str,
    detail: Option<String>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            PROBLEM_NOT_FOUND,
            "resource not found",
        )
        .with_detail(detail)
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, PROBLEM_BAD_REQUEST, "bad request").with_detail(detail)
    }

    pub(crate) fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, PROBLEM_CONFLICT, "conflict").with_detail(detail)
    }

    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            PROBLEM_INTERNAL,
            "internal server error",
        )
        .with_detail(detail)
    }

    /// Map a controller error onto its problem document, keeping the
    /// discrimination structural rather than message-based.
    pub(crate) fn from_control(error: &ControlError) -> Self {
        match error {
            ControlError::NotFound { torrent_id } => {
                Self::not_found(format!("torrent {torrent_id} is not tracked"))
            }
            ControlError::InvalidSpec { source } => Self::bad_request(source.to_string()),
            ControlError::Duplicate { existing, .. } => Self::conflict(format!(
                "info-hash already tracked by torrent {existing}"
            )),
            ControlError::Conflict { reason, .. } => Self::conflict(*reason),
            ControlError::Internal { operation, .. } => {
                Self::internal(format!("{operation} failed in the transport engine"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}
