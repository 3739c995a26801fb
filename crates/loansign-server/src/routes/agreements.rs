//! Agreement summary route: `/v1/agreements/*`
//!
//! Read-only JSON view for operators and integrations.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use loansign_core::model::{DocumentInfo, SignatureRecord};

use crate::error::AppError;
use crate::routes::{base_url, borrower_path};
use crate::state::AppState;

/// Build the `/v1/agreements` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{agreement_id}", get(get_agreement))
}

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AgreementResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub document: Option<DocumentInfo>,
    pub borrowers: Vec<BorrowerResponse>,
    pub signatures: Vec<SignatureRecord>,
}

/// Borrower as exposed over the API. The mobile number is withheld.
#[derive(Debug, Serialize)]
pub struct BorrowerResponse {
    pub id: Uuid,
    pub position: u32,
    pub loan_id: String,
    pub name: String,
    pub signed: bool,
    pub signing_link: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn get_agreement(
    State(state): State<Arc<AppState>>,
    Path(agreement_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<AgreementResponse>, AppError> {
    let overview = state.signing.overview(agreement_id).await?;
    let base = base_url(&state, &headers);

    let borrowers = overview
        .borrowers
        .iter()
        .map(|b| BorrowerResponse {
            id: b.id,
            position: b.position,
            loan_id: b.loan_id.clone(),
            name: b.name.clone(),
            signed: overview.has_signed(b.id),
            signing_link: format!("{base}{}", borrower_path(agreement_id, b.id)),
        })
        .collect();

    Ok(Json(AgreementResponse {
        id: overview.agreement.id,
        created_at: overview.agreement.created_at,
        document: overview.agreement.document,
        borrowers,
        signatures: overview.signatures,
    }))
}
