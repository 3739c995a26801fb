//! Shared application state for the `LoanSign` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use loansign_core::signing::SigningService;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Workflow operations over agreements and documents.
    pub signing: Arc<SigningService>,
    /// Base URL for signing links (`None` derives it from `Host`).
    pub public_url: Option<String>,
    /// Whether `X-Forwarded-For` identifies the client.
    pub trust_proxy: bool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("public_url", &self.public_url)
            .field("trust_proxy", &self.trust_proxy)
            .finish_non_exhaustive()
    }
}
