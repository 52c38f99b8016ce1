//! JSON API for the password helper page.
//!
//! - Client rule listing and password generation
//! - Admin-gated rule management
//! - Encrypted zip downloads

pub mod archive;
pub mod clients;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use monozip_core::{ArchiveError, ClientRuleError};
use serde::Serialize;

use crate::AppState;

/// Multipart framing on top of the raw file bytes.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Create the API router. The zip route gets its own body limit sized from
/// the configured upload cap.
pub fn router(state: &AppState) -> Router<AppState> {
    let body_limit: usize = state
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES)
        .try_into()
        .unwrap_or(usize::MAX);

    Router::new()
        .merge(clients::router())
        .merge(archive::router().layer(DefaultBodyLimit::max(body_limit)))
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ApiError {
    error: String,
    message: String,
}

impl ApiError {
    fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Map a store error to its HTTP status and body. Server-side failures are
/// logged here and reported with a generic message.
pub fn client_rule_error_response(err: ClientRuleError) -> Response {
    let (status, body) = match &err {
        ClientRuleError::InvalidInput(msg) | ClientRuleError::ImmutableRule(msg) => {
            (StatusCode::BAD_REQUEST, ApiError::bad_request(msg.clone()))
        }
        ClientRuleError::RuleNotFound(_) => (
            StatusCode::NOT_FOUND,
            ApiError::new("not_found", "The selected client is not registered."),
        ),
        ClientRuleError::DuplicateRule(msg) => {
            (StatusCode::CONFLICT, ApiError::new("conflict", msg.clone()))
        }
        ClientRuleError::CorruptStore(_) | ClientRuleError::Persistence(_) => {
            tracing::error!(error = %err, "client rule store failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal("The client list could not be read or saved."),
            )
        }
        ClientRuleError::BackendUnavailable(_) => {
            tracing::error!(error = %err, "client rule backend unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::new(
                    "service_unavailable",
                    "The client rule database is unavailable.",
                ),
            )
        }
    };
    body.into_response_with(status)
}

pub fn archive_error_response(err: ArchiveError) -> Response {
    match err {
        ArchiveError::InvalidInput(msg) => {
            ApiError::bad_request(msg).into_response_with(StatusCode::BAD_REQUEST)
        }
        ArchiveError::NoFiles => ApiError::bad_request("Select at least one non-empty file.")
            .into_response_with(StatusCode::BAD_REQUEST),
        ArchiveError::TooLarge { limit } => ApiError::new(
            "payload_too_large",
            format!("The uploaded files exceed the {} MB limit.", limit / (1024 * 1024)),
        )
        .into_response_with(StatusCode::PAYLOAD_TOO_LARGE),
        ArchiveError::Build(detail) => {
            tracing::error!(error = %detail, "failed to build archive");
            ApiError::internal("The zip file could not be created.")
                .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Check the `admin_password` sent with a management request.
pub fn check_admin(expected: &str, supplied: Option<&str>) -> Result<(), Response> {
    let supplied = supplied.unwrap_or_default();
    if supplied.is_empty() {
        return Err(ApiError::bad_request("Enter the admin password.")
            .into_response_with(StatusCode::BAD_REQUEST));
    }
    if expected.is_empty() || !constant_time_eq(supplied.as_bytes(), expected.as_bytes()) {
        tracing::warn!("rejected rule management request with wrong admin password");
        return Err(ApiError::unauthorized("The admin password is incorrect.")
            .into_response_with(StatusCode::UNAUTHORIZED));
    }
    Ok(())
}

/// Byte comparison whose running time does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
