//! Borrower pages: `/agreements/{agreement_id}/*`
//!
//! Each borrower follows their link to the document view, acknowledges it,
//! draws a signature, and can then download the signed agreement.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::Utc;
use serde::Deserialize;
use tower::limit::ConcurrencyLimitLayer;
use tracing::info;
use uuid::Uuid;

use loansign_core::error::RegistryError;
use loansign_core::model::Borrower;
use loansign_core::signing::SignRequest;

use crate::client_ip::ClientIp;
use crate::error::{AppError, PageError};
use crate::html;
use crate::routes::{borrower_path, pdf_response};
use crate::state::AppState;

/// Concurrent signature submissions accepted at once.
const SIGN_CONCURRENCY: usize = 8;

/// Build the `/agreements` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{agreement_id}/document", get(current_document))
        .route(
            "/{agreement_id}/borrowers/{borrower_id}",
            get(view_document).post(acknowledge),
        )
        .route(
            "/{agreement_id}/borrowers/{borrower_id}/sign",
            post(submit_signature)
                .layer(ConcurrencyLimitLayer::new(SIGN_CONCURRENCY))
                .get(sign_page),
        )
        .route(
            "/{agreement_id}/borrowers/{borrower_id}/success",
            get(success_page),
        )
        .route(
            "/{agreement_id}/borrowers/{borrower_id}/signed",
            get(signed_document),
        )
}

// ── Forms ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct AcknowledgeForm {
    acknowledge_checkbox: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SignatureForm {
    signature: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// The agreement as it currently stands.
async fn current_document(
    State(state): State<Arc<AppState>>,
    Path(agreement_id): Path<Uuid>,
) -> Result<Response, PageError> {
    let bytes = state.signing.signed_document(agreement_id).await?;
    Ok(pdf_response(bytes, &format!("{agreement_id}.pdf")))
}

async fn view_document(
    State(state): State<Arc<AppState>>,
    Path((agreement_id, borrower_id)): Path<(Uuid, Uuid)>,
) -> Result<Html<String>, PageError> {
    let borrower = borrower_with_document(&state, agreement_id, borrower_id).await?;
    let path = borrower_path(agreement_id, borrower_id);
    let body = format!(
        r#"<h1>Loan agreement</h1>
<p>Hello {name}, please read the agreement for loan <strong>{loan_id}</strong> before signing.</p>
<iframe src="/agreements/{agreement_id}/document" title="Loan agreement"></iframe>
<form method="post" action="{path}">
<label><input type="checkbox" name="acknowledge_checkbox" value="on" required/> I have read and understood this agreement.</label>
<button type="submit">Continue to sign</button>
</form>"#,
        name = html::escape(&borrower.name),
        loan_id = html::escape(&borrower.loan_id),
    );
    Ok(Html(html::page("Loan agreement", &body)))
}

async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path((agreement_id, borrower_id)): Path<(Uuid, Uuid)>,
    ClientIp(ip): ClientIp,
    Form(form): Form<AcknowledgeForm>,
) -> Result<Redirect, PageError> {
    let acknowledged = form
        .acknowledge_checkbox
        .is_some_and(|v| !v.trim().is_empty());
    state
        .signing
        .acknowledge(agreement_id, borrower_id, acknowledged, &ip)
        .await?;
    Ok(Redirect::to(&format!(
        "{}/sign",
        borrower_path(agreement_id, borrower_id)
    )))
}

async fn sign_page(
    State(state): State<Arc<AppState>>,
    Path((agreement_id, borrower_id)): Path<(Uuid, Uuid)>,
) -> Result<Html<String>, PageError> {
    let overview = state.signing.overview(agreement_id).await?;
    let Some(borrower) = overview.borrowers.iter().find(|b| b.id == borrower_id) else {
        return Err(RegistryError::BorrowerNotFound {
            agreement_id,
            borrower_id,
        }
        .into());
    };
    if overview.has_signed(borrower_id) {
        return Ok(Html(already_signed_page(agreement_id, borrower)));
    }
    if overview.agreement.document.is_none() {
        return Err(AppError::NotFound("This agreement is not ready for signing yet.".to_owned()).into());
    }

    let path = borrower_path(agreement_id, borrower_id);
    let mut body = format!(
        r#"<h1>Sign the agreement</h1>
<p>{name}, draw your signature below. It will be placed on every page together with your loan ID, IP address, and the time of signing.</p>
<form id="sign-form" method="post" action="{path}/sign">
<canvas id="pad" width="400" height="200"></canvas>
<input type="hidden" id="signature" name="signature"/>
<div><button type="button" id="clear" class="btn-light">Clear</button> <button type="submit">Sign agreement</button></div>
</form>"#,
        name = html::escape(&borrower.name),
    );
    body.push_str(html::SIGNATURE_PAD_SCRIPT);
    Ok(Html(html::page("Sign the agreement", &body)))
}

async fn submit_signature(
    State(state): State<Arc<AppState>>,
    Path((agreement_id, borrower_id)): Path<(Uuid, Uuid)>,
    ClientIp(ip): ClientIp,
    Form(form): Form<SignatureForm>,
) -> Result<Response, PageError> {
    let Some(signature_data_url) = form.signature.filter(|s| !s.trim().is_empty()) else {
        return Err(AppError::BadRequest("Please provide your signature.".to_owned()).into());
    };

    let record = state
        .signing
        .sign(SignRequest {
            agreement_id,
            borrower_id,
            signature_data_url,
            ip_address: ip,
            signed_at: Utc::now(),
        })
        .await?;

    info!(
        %agreement_id,
        %borrower_id,
        slot = record.slot,
        "borrower signed agreement"
    );
    Ok(Redirect::to(&format!(
        "{}/success",
        borrower_path(agreement_id, borrower_id)
    ))
    .into_response())
}

async fn success_page(
    State(state): State<Arc<AppState>>,
    Path((agreement_id, borrower_id)): Path<(Uuid, Uuid)>,
) -> Result<Html<String>, PageError> {
    let borrower = state
        .signing
        .registry()
        .get_borrower(agreement_id, borrower_id)
        .await?;
    let path = borrower_path(agreement_id, borrower_id);
    let body = format!(
        r#"<h1>Thank you, {name}</h1>
<p>Your signature has been added to the agreement for loan <strong>{loan_id}</strong>.</p>
<a class="btn" href="{path}/signed" target="_blank">View signed agreement</a>"#,
        name = html::escape(&borrower.name),
        loan_id = html::escape(&borrower.loan_id),
    );
    Ok(Html(html::page("Agreement signed", &body)))
}

async fn signed_document(
    State(state): State<Arc<AppState>>,
    Path((agreement_id, borrower_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, PageError> {
    state
        .signing
        .registry()
        .get_borrower(agreement_id, borrower_id)
        .await?;
    let bytes = state.signing.signed_document(agreement_id).await?;
    Ok(pdf_response(bytes, &format!("signed-{agreement_id}.pdf")))
}

// ── Helpers ──────────────────────────────────────────────────────────

async fn borrower_with_document(
    state: &AppState,
    agreement_id: Uuid,
    borrower_id: Uuid,
) -> Result<Borrower, PageError> {
    let borrower = state
        .signing
        .registry()
        .get_borrower(agreement_id, borrower_id)
        .await?;
    let agreement = state.signing.registry().get_agreement(agreement_id).await?;
    if agreement.document.is_none() {
        return Err(AppError::NotFound("This agreement is not ready for signing yet.".to_owned()).into());
    }
    Ok(borrower)
}

fn already_signed_page(agreement_id: Uuid, borrower: &Borrower) -> String {
    let mut body = String::from("<h1>Already signed</h1>");
    let _ = write!(
        body,
        r#"<p>{} has already signed this agreement.</p>
<a class="btn" href="{}/signed" target="_blank">View signed agreement</a>"#,
        html::escape(&borrower.name),
        borrower_path(agreement_id, borrower.id),
    );
    html::page("Already signed", &body)
}
