//! Application assembly: state bootstrap and router.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::http::header;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use loansign_core::audit::AuditManager;
use loansign_core::audit_file::FileAuditBackend;
use loansign_core::document::DocumentStore;
use loansign_core::layout::SignatureGrid;
use loansign_core::registry::AgreementRegistry;
use loansign_core::signing::SigningService;
use loansign_storage::{MemoryBackend, StorageBackend};

use crate::config::{ServerConfig, StorageBackendType};
use crate::routes;
use crate::state::AppState;

/// Build the shared application state from `config`.
///
/// # Errors
///
/// Returns an error if the storage backend cannot be opened.
pub async fn build_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let storage: Arc<dyn StorageBackend> = match &config.storage_backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            Arc::new(MemoryBackend::new())
        }
        #[cfg(feature = "redb-backend")]
        StorageBackendType::Redb { path } => {
            info!(path = %path, "using redb storage");
            Arc::new(
                loansign_storage::RedbBackend::open(path)
                    .context("failed to open redb storage")?,
            )
        }
        #[cfg(not(feature = "redb-backend"))]
        StorageBackendType::Redb { .. } => {
            anyhow::bail!("redb backend requested but feature 'redb-backend' is not enabled");
        }
    };

    // Mobile numbers in the audit log are HMAC'd under a per-instance key.
    let audit = Arc::new(AuditManager::with_random_key());
    if let Some(ref audit_path) = config.audit_file_path {
        audit
            .add_backend(Arc::new(FileAuditBackend::new(audit_path)))
            .await;
        info!(path = %audit_path, "file audit backend registered");
    }
    if !audit.has_backends().await {
        warn!("no audit backend configured, workflow events will not be recorded");
    }

    let registry = Arc::new(AgreementRegistry::new(storage, config.max_borrowers));
    let documents = DocumentStore::new(&config.media_dir);
    info!(media_dir = %config.media_dir.display(), "document store ready");

    let signing = Arc::new(SigningService::new(
        registry,
        documents,
        audit,
        SignatureGrid::default(),
    ));

    Ok(Arc::new(AppState {
        signing,
        public_url: config.public_url.clone(),
        trust_proxy: config.trust_proxy,
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(routes::process::router(max_upload_bytes))
        .nest("/agreements", routes::borrower::router())
        .nest("/v1/agreements", routes::agreements::router())
        .nest("/v1/sys", routes::sys::router())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        // The borrower page embeds the document in a same-origin iframe.
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
