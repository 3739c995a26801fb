//! HTTP route handlers for `LoanSign`.
//!
//! Routes are organized by audience:
//! - `process`: Operator workflow (borrower count, details, upload, links)
//! - `borrower`: Borrower pages (view, acknowledge, sign, download)
//! - `agreements`: JSON summary of an agreement
//! - `sys`: Health check

use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::state::AppState;

pub mod agreements;
pub mod borrower;
pub mod process;
pub mod sys;

/// Base URL for absolute links: the configured public URL, else `http://{Host}`.
pub(crate) fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.public_url {
        return url.clone();
    }
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|host| format!("http://{host}"))
        .unwrap_or_default()
}

/// Path of a borrower's entry page.
pub(crate) fn borrower_path(agreement_id: Uuid, borrower_id: Uuid) -> String {
    format!("/agreements/{agreement_id}/borrowers/{borrower_id}")
}

/// Serve PDF bytes inline under `file_name`.
pub(crate) fn pdf_response(bytes: Vec<u8>, file_name: &str) -> Response {
    let disposition = HeaderValue::from_str(&format!("inline; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}
