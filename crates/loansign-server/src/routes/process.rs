//! Operator workflow: `/loan-process*`
//!
//! Four steps, selected by the `step` parameter: choose the number of
//! borrowers, enter their details, upload the agreement PDF, and hand out
//! the per-borrower signing links.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use tower::limit::ConcurrencyLimitLayer;
use uuid::Uuid;

use loansign_core::error::{RegistryError, SigningError};
use loansign_core::model::NewBorrower;

use crate::client_ip::ClientIp;
use crate::error::{AppError, PageError};
use crate::html;
use crate::routes::{base_url, borrower_path};
use crate::state::AppState;

/// Concurrent uploads accepted at once.
const UPLOAD_CONCURRENCY: usize = 4;

/// Build the workflow router. `max_upload_bytes` caps the upload body.
pub fn router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/loan-process") }))
        .route("/loan-process", get(show_step).post(submit_step))
        .route(
            "/loan-process/upload",
            post(upload)
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(UPLOAD_CONCURRENCY))
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}

// ── Steps ────────────────────────────────────────────────────────────

/// Workflow step named by the `step` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Step {
    #[default]
    NumberOfBorrowers,
    BorrowerDetails,
    UploadAgreement,
    GenerateLinks,
}

impl Step {
    /// Parse a `step` value. Unknown or missing values yield `None`.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw?.trim() {
            "number_of_borrowers" => Some(Self::NumberOfBorrowers),
            "borrower_details" => Some(Self::BorrowerDetails),
            "upload_agreement" => Some(Self::UploadAgreement),
            "generate_links" => Some(Self::GenerateLinks),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StepQuery {
    step: Option<String>,
    num_borrowers: Option<String>,
    agreement_id: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn show_step(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<StepQuery>,
) -> Result<Html<String>, PageError> {
    let max = state.signing.registry().max_borrowers();
    match Step::parse(query.step.as_deref()).unwrap_or_default() {
        Step::NumberOfBorrowers => Ok(Html(number_page(max))),
        Step::BorrowerDetails => {
            let count = parse_count(query.num_borrowers.as_deref(), max)?;
            Ok(Html(details_page(count, &HashMap::new(), None)))
        }
        Step::UploadAgreement => {
            let agreement_id = parse_agreement_id(query.agreement_id.as_deref())?;
            state.signing.registry().get_agreement(agreement_id).await?;
            Ok(Html(upload_page(agreement_id, None)))
        }
        Step::GenerateLinks => {
            let agreement_id = parse_agreement_id(query.agreement_id.as_deref())?;
            let overview = state.signing.overview(agreement_id).await?;
            let base = base_url(&state, &headers);
            let links: Vec<(String, String, bool)> = overview
                .borrowers
                .iter()
                .map(|b| {
                    (
                        b.name.clone(),
                        format!("{base}{}", borrower_path(agreement_id, b.id)),
                        overview.has_signed(b.id),
                    )
                })
                .collect();
            Ok(Html(links_page(
                agreement_id,
                overview.agreement.document.is_some(),
                &links,
            )))
        }
    }
}

async fn submit_step(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Response, PageError> {
    let max = state.signing.registry().max_borrowers();
    match Step::parse(fields.get("step").map(String::as_str)) {
        Some(Step::NumberOfBorrowers) => {
            let count = parse_count(fields.get("num_borrowers").map(String::as_str), max)?;
            Ok(Redirect::to(&format!(
                "/loan-process?step=borrower_details&num_borrowers={count}"
            ))
            .into_response())
        }
        Some(Step::BorrowerDetails) => {
            let count = parse_count(fields.get("num_borrowers").map(String::as_str), max)?;
            let borrowers = (0..count)
                .map(|i| NewBorrower {
                    loan_id: form_value(&fields, i, "loan_id"),
                    name: form_value(&fields, i, "name"),
                    mobile_number: form_value(&fields, i, "mobile_number"),
                })
                .collect();

            match state.signing.create_agreement(borrowers, &ip).await {
                Ok((agreement, _)) => Ok(Redirect::to(&format!(
                    "/loan-process?step=upload_agreement&agreement_id={}",
                    agreement.id
                ))
                .into_response()),
                Err(SigningError::Registry(
                    err @ (RegistryError::InvalidBorrower { .. }
                    | RegistryError::InvalidBorrowerCount { .. }),
                )) => Ok((
                    StatusCode::BAD_REQUEST,
                    Html(details_page(count, &fields, Some(&err.to_string()))),
                )
                    .into_response()),
                Err(err) => Err(err.into()),
            }
        }
        Some(Step::UploadAgreement | Step::GenerateLinks) | None => {
            Ok(Redirect::to("/loan-process").into_response())
        }
    }
}

async fn upload(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    mut multipart: Multipart,
) -> Result<Response, PageError> {
    let mut agreement_id = None;
    let mut document = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("agreement_id") => agreement_id = Some(field.text().await?),
            Some("document") => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                document = Some((file_name, field.bytes().await?));
            }
            _ => {}
        }
    }

    let agreement_id = parse_agreement_id(agreement_id.as_deref())?;
    let Some((file_name, bytes)) = document.filter(|(_, bytes)| !bytes.is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Html(upload_page(agreement_id, Some("Please choose a PDF to upload."))),
        )
            .into_response());
    };

    match state
        .signing
        .upload_document(agreement_id, &file_name, bytes.to_vec(), &ip)
        .await
    {
        Ok(_) => Ok(Redirect::to(&format!(
            "/loan-process?step=generate_links&agreement_id={agreement_id}"
        ))
        .into_response()),
        Err(SigningError::Stamp(err)) => Ok((
            StatusCode::BAD_REQUEST,
            Html(upload_page(agreement_id, Some(&err.to_string()))),
        )
            .into_response()),
        Err(err) => Err(err.into()),
    }
}

// ── Parameter parsing ────────────────────────────────────────────────

fn parse_count(raw: Option<&str>, max: usize) -> Result<usize, AppError> {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| (1..=max).contains(n))
        .ok_or_else(|| {
            AppError::BadRequest(format!("Number of borrowers must be between 1 and {max}."))
        })
}

fn parse_agreement_id(raw: Option<&str>) -> Result<Uuid, AppError> {
    raw.and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| AppError::BadRequest("Missing or invalid agreement ID.".to_owned()))
}

fn form_value(fields: &HashMap<String, String>, index: usize, name: &str) -> String {
    fields
        .get(&format!("form-{index}-{name}"))
        .cloned()
        .unwrap_or_default()
}

// ── Pages ────────────────────────────────────────────────────────────

fn number_page(max: usize) -> String {
    let body = format!(
        r#"<h1>New loan agreement</h1>
<form method="post" action="/loan-process">
<input type="hidden" name="step" value="number_of_borrowers"/>
<label for="num_borrowers">Number of borrowers</label>
<input type="number" id="num_borrowers" name="num_borrowers" min="1" max="{max}" value="1" required/>
<button type="submit">Continue</button>
</form>"#
    );
    html::page("New loan agreement", &body)
}

fn details_page(count: usize, values: &HashMap<String, String>, error: Option<&str>) -> String {
    let mut body = String::from("<h1>Borrower details</h1>");
    if let Some(error) = error {
        let _ = write!(body, r#"<p class="error">{}</p>"#, html::escape(error));
    }
    let _ = write!(
        body,
        r#"<form method="post" action="/loan-process">
<input type="hidden" name="step" value="borrower_details"/>
<input type="hidden" name="num_borrowers" value="{count}"/>"#
    );
    for i in 0..count {
        let value = |name: &str| html::escape(&form_value(values, i, name));
        let _ = write!(
            body,
            r#"<fieldset><legend>Borrower {n}</legend>
<label for="form-{i}-loan_id">Loan ID</label>
<input type="text" id="form-{i}-loan_id" name="form-{i}-loan_id" maxlength="64" value="{loan_id}" required/>
<label for="form-{i}-name">Name</label>
<input type="text" id="form-{i}-name" name="form-{i}-name" maxlength="120" value="{name}" required/>
<label for="form-{i}-mobile_number">Mobile number</label>
<input type="tel" id="form-{i}-mobile_number" name="form-{i}-mobile_number" maxlength="20" value="{mobile}" required/>
</fieldset>"#,
            n = i + 1,
            loan_id = value("loan_id"),
            name = value("name"),
            mobile = value("mobile_number"),
        );
    }
    body.push_str(r#"<button type="submit">Save borrowers</button></form>"#);
    html::page("Borrower details", &body)
}

fn upload_page(agreement_id: Uuid, error: Option<&str>) -> String {
    let mut body = String::from("<h1>Upload agreement</h1>");
    if let Some(error) = error {
        let _ = write!(body, r#"<p class="error">{}</p>"#, html::escape(error));
    }
    let _ = write!(
        body,
        r#"<form method="post" action="/loan-process/upload" enctype="multipart/form-data">
<input type="hidden" name="agreement_id" value="{agreement_id}"/>
<label for="document">Agreement PDF</label>
<input type="file" id="document" name="document" accept="application/pdf,.pdf" required/>
<button type="submit">Upload</button>
</form>"#
    );
    html::page("Upload agreement", &body)
}

fn links_page(agreement_id: Uuid, has_document: bool, links: &[(String, String, bool)]) -> String {
    let mut body = String::from("<h1>Signing links</h1>");
    if !has_document {
        let _ = write!(
            body,
            r#"<p class="error">No agreement uploaded yet. <a href="/loan-process?step=upload_agreement&amp;agreement_id={agreement_id}">Upload it</a> before sharing these links.</p>"#
        );
    }
    body.push_str("<table><thead><tr><th>Borrower</th><th>Link</th><th>Status</th></tr></thead><tbody>");
    for (name, link, signed) in links {
        let link = html::escape(link);
        let _ = write!(
            body,
            r#"<tr><td>{}</td><td><a href="{link}">{link}</a></td><td>{}</td></tr>"#,
            html::escape(name),
            if *signed { "Signed" } else { "Pending" },
        );
    }
    body.push_str("</tbody></table>");
    if has_document {
        let _ = write!(
            body,
            r#"<a class="btn btn-light" href="/agreements/{agreement_id}/document" target="_blank">View current document</a>"#
        );
    }
    html::page("Signing links", &body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn step_parsing() {
        assert_eq!(Step::parse(Some("borrower_details")), Some(Step::BorrowerDetails));
        assert_eq!(Step::parse(Some("generate_links")), Some(Step::GenerateLinks));
        assert_eq!(Step::parse(Some("bogus")), None);
        assert_eq!(Step::parse(None).unwrap_or_default(), Step::NumberOfBorrowers);
    }

    #[test]
    fn borrower_count_bounds() {
        assert_eq!(parse_count(Some(" 3 "), 25).unwrap(), 3);
        assert!(parse_count(Some("0"), 25).is_err());
        assert!(parse_count(Some("26"), 25).is_err());
        assert!(parse_count(Some("two"), 25).is_err());
        assert!(parse_count(None, 25).is_err());
    }

    #[test]
    fn details_page_keeps_submitted_values() {
        let mut values = HashMap::new();
        values.insert("form-1-name".to_owned(), "<Ann>".to_owned());
        let page = details_page(2, &values, Some("borrower #2: bad"));
        assert!(page.contains(r#"name="form-1-name" maxlength="120" value="&lt;Ann&gt;""#));
        assert!(page.contains("borrower #2: bad"));
        assert!(page.contains(r#"name="form-0-loan_id""#));
    }
}
