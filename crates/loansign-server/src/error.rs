//! HTTP error types for the `LoanSign` server.
//!
//! Maps domain errors from `loansign-core` into HTTP responses. API routes
//! return [`AppError`], which renders a JSON body with a machine-readable
//! `error` field and a human-readable `message`. Workflow pages return
//! [`PageError`], which renders the same status as an HTML page.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use loansign_core::error::{
    AuditError, DocumentError, RegistryError, SigningError, StampError,
};

use crate::html;

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Requested resource not found.
    NotFound(String),
    /// Client sent invalid input.
    BadRequest(String),
    /// The request conflicts with current state (already signed, locked).
    Conflict(String),
    /// Request body exceeds the configured limit.
    PayloadTooLarge(String),
    /// Internal server error.
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = self.parts();
        if status.is_server_error() {
            error!(error = %message, "request failed");
        }
        let body = ErrorBody {
            error: error_type,
            message,
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<StampError> for AppError {
    fn from(err: StampError) -> Self {
        match err {
            StampError::InvalidDataUrl { .. }
            | StampError::ImageDecode { .. }
            | StampError::NotPdf
            | StampError::PdfParse { .. }
            | StampError::EmptyDocument => Self::BadRequest(err.to_string()),

            StampError::MalformedPage { .. }
            | StampError::Compression { .. }
            | StampError::PdfWrite { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotFound { .. } => Self::NotFound(err.to_string()),
            DocumentError::Io { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AgreementNotFound { .. } | RegistryError::BorrowerNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            RegistryError::InvalidBorrower { .. } | RegistryError::InvalidBorrowerCount { .. } => {
                Self::BadRequest(err.to_string())
            }
            RegistryError::Serialization { .. } | RegistryError::Storage(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<AuditError> for AppError {
    fn from(err: AuditError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<SigningError> for AppError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::NotAcknowledged => Self::BadRequest(err.to_string()),
            SigningError::AlreadySigned { .. } | SigningError::DocumentLocked { .. } => {
                Self::Conflict(err.to_string())
            }
            SigningError::NoDocument { .. } => Self::NotFound(err.to_string()),
            SigningError::Stamp(inner) => inner.into(),
            SigningError::Registry(inner) => inner.into(),
            SigningError::Document(inner) => inner.into(),
            SigningError::Audit(inner) => inner.into(),
            SigningError::Internal { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        let message = err.body_text();
        match err.status() {
            StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge(message),
            status if status.is_server_error() => Self::Internal(message),
            _ => Self::BadRequest(message),
        }
    }
}

/// Error rendered as an HTML page, for the browser-facing workflow.
#[derive(Debug)]
pub struct PageError(pub AppError);

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, _, message) = self.0.parts();
        if status.is_server_error() {
            error!(error = %message, "page request failed");
        }
        let title = status.canonical_reason().unwrap_or("Error");
        let shown = if status.is_server_error() {
            "Something went wrong while processing your request."
        } else {
            message
        };
        let body = format!(
            "<h1>{}</h1><p class=\"error\">{}</p>",
            html::escape(title),
            html::escape(shown),
        );
        (status, Html(html::page(title, &body))).into_response()
    }
}

impl From<AppError> for PageError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<SigningError> for PageError {
    fn from(err: SigningError) -> Self {
        Self(err.into())
    }
}

impl From<RegistryError> for PageError {
    fn from(err: RegistryError) -> Self {
        Self(err.into())
    }
}

impl From<MultipartError> for PageError {
    fn from(err: MultipartError) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn signing_errors_map_to_statuses() {
        let id = Uuid::new_v4();
        let cases = [
            (SigningError::NotAcknowledged, StatusCode::BAD_REQUEST),
            (
                SigningError::AlreadySigned {
                    borrower_name: "A".to_owned(),
                },
                StatusCode::CONFLICT,
            ),
            (
                SigningError::DocumentLocked {
                    agreement_id: id,
                    signatures: 1,
                },
                StatusCode::CONFLICT,
            ),
            (SigningError::NoDocument { agreement_id: id }, StatusCode::NOT_FOUND),
            (
                SigningError::Registry(RegistryError::AgreementNotFound { agreement_id: id }),
                StatusCode::NOT_FOUND,
            ),
            (SigningError::Stamp(StampError::NotPdf), StatusCode::BAD_REQUEST),
            (
                SigningError::Audit(AuditError::AllBackendsFailed),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn page_error_hides_internal_detail() {
        let response =
            PageError(AppError::Internal("disk at /srv/media failed".to_owned())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("/srv/media"));
        assert!(text.contains("Internal Server Error"));
    }
}
