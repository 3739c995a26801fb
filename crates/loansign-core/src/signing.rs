//! The signing service.
//!
//! Orchestrates the registry, document store, stamper, and audit trail for
//! each workflow step. Operations that touch an agreement's document (upload
//! and sign) hold a per-agreement lock, so two borrowers signing at once are
//! given consecutive grid slots instead of racing for the same one.
//! Different agreements never contend.
//!
//! Every mutating step audits before it commits. A failed audit write, a bad
//! signature image, or an unparsable PDF leaves no trace in the registry or
//! on disk, and no grid slot is consumed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use crate::audit::{AuditBorrower, AuditEntry, AuditEvent, AuditManager};
use crate::data_url;
use crate::document::DocumentStore;
use crate::error::{DocumentError, SigningError};
use crate::layout::SignatureGrid;
use crate::model::{Borrower, DocumentInfo, LoanAgreement, NewBorrower, SignatureRecord};
use crate::registry::AgreementRegistry;
use crate::stamp::{self, SignatureImage, SignatureMark};

const MAX_FILE_NAME_CHARS: usize = 200;
const DEFAULT_FILE_NAME: &str = "agreement.pdf";

/// A borrower's request to sign.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub agreement_id: Uuid,
    pub borrower_id: Uuid,
    /// `data:image/png;base64,...` from the signature pad.
    pub signature_data_url: String,
    pub ip_address: String,
    pub signed_at: DateTime<Utc>,
}

/// Everything known about an agreement.
#[derive(Debug, Clone)]
pub struct AgreementOverview {
    pub agreement: LoanAgreement,
    pub borrowers: Vec<Borrower>,
    pub signatures: Vec<SignatureRecord>,
}

impl AgreementOverview {
    /// Whether `borrower_id` has signed.
    #[must_use]
    pub fn has_signed(&self, borrower_id: Uuid) -> bool {
        self.signatures.iter().any(|s| s.borrower_id == borrower_id)
    }
}

/// Workflow operations over agreements and their documents.
pub struct SigningService {
    registry: Arc<AgreementRegistry>,
    documents: DocumentStore,
    audit: Arc<AuditManager>,
    grid: SignatureGrid,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for SigningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningService")
            .field("documents", &self.documents)
            .field("grid", &self.grid)
            .finish_non_exhaustive()
    }
}

impl SigningService {
    #[must_use]
    pub fn new(
        registry: Arc<AgreementRegistry>,
        documents: DocumentStore,
        audit: Arc<AuditManager>,
        grid: SignatureGrid,
    ) -> Self {
        Self {
            registry,
            documents,
            audit,
            grid,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &AgreementRegistry {
        &self.registry
    }

    /// Create an agreement and its borrowers.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Registry`] on validation or storage failure and
    /// [`SigningError::Audit`] if auditing fails (nothing is written).
    pub async fn create_agreement(
        &self,
        borrowers: Vec<NewBorrower>,
        remote_addr: &str,
    ) -> Result<(LoanAgreement, Vec<Borrower>), SigningError> {
        let (agreement, created) = self.registry.prepare_agreement(&borrowers)?;

        let audited = created
            .iter()
            .map(|b| AuditBorrower {
                borrower_id: b.id,
                loan_id: b.loan_id.clone(),
                mobile_hmac: self.audit.hmac_field(&b.mobile_number),
            })
            .collect();
        self.audit
            .log(&AuditEntry::new(
                agreement.id,
                None,
                remote_addr,
                AuditEvent::AgreementCreated { borrowers: audited },
            ))
            .await?;

        self.registry.insert_agreement(&agreement, &created).await?;
        Ok((agreement, created))
    }

    /// Agreement, borrowers, and signatures in one read.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Registry`] if the agreement does not exist.
    pub async fn overview(&self, agreement_id: Uuid) -> Result<AgreementOverview, SigningError> {
        let agreement = self.registry.get_agreement(agreement_id).await?;
        let borrowers = self.registry.list_borrowers(agreement_id).await?;
        let signatures = self.registry.list_signatures(agreement_id).await?;
        Ok(AgreementOverview {
            agreement,
            borrowers,
            signatures,
        })
    }

    /// Store the agreement's PDF.
    ///
    /// # Errors
    ///
    /// - [`SigningError::DocumentLocked`] once any borrower has signed.
    /// - [`SigningError::Stamp`] if the bytes are not a usable PDF.
    /// - [`SigningError::Registry`], [`SigningError::Document`],
    ///   [`SigningError::Audit`] on lookup, disk, or audit failure.
    pub async fn upload_document(
        &self,
        agreement_id: Uuid,
        original_name: &str,
        bytes: Vec<u8>,
        remote_addr: &str,
    ) -> Result<LoanAgreement, SigningError> {
        let lock = self.agreement_lock(agreement_id).await;
        let _guard = lock.lock().await;

        self.registry.get_agreement(agreement_id).await?;
        let signatures = self.registry.signature_count(agreement_id).await?;
        if signatures > 0 {
            return Err(SigningError::DocumentLocked {
                agreement_id,
                signatures,
            });
        }

        let (summary, bytes) = tokio::task::spawn_blocking(move || {
            stamp::inspect(&bytes).map(|summary| (summary, bytes))
        })
        .await
        .map_err(|e| SigningError::Internal {
            reason: format!("PDF inspection task failed: {e}"),
        })??;

        let info = DocumentInfo {
            original_name: clean_file_name(original_name),
            size_bytes: bytes.len() as u64,
            page_count: summary.page_count,
            sha256: sha256_hex(&bytes),
            uploaded_at: Utc::now(),
        };

        self.audit
            .log(&AuditEntry::new(
                agreement_id,
                None,
                remote_addr,
                AuditEvent::DocumentUploaded {
                    original_name: info.original_name.clone(),
                    size_bytes: info.size_bytes,
                    page_count: info.page_count,
                    sha256: info.sha256.clone(),
                },
            ))
            .await?;

        let previous = match self.documents.read(agreement_id).await {
            Ok(bytes) => Some(bytes),
            Err(DocumentError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        self.documents.write(agreement_id, &bytes).await?;
        let agreement = match self.registry.attach_document(agreement_id, info).await {
            Ok(agreement) => agreement,
            Err(err) => {
                self.restore_document(agreement_id, previous.as_deref()).await;
                return Err(err.into());
            }
        };

        info!(
            %agreement_id,
            pages = summary.page_count,
            size_bytes = bytes.len(),
            "agreement document uploaded"
        );
        Ok(agreement)
    }

    /// Record that the borrower has read the unsigned document.
    ///
    /// # Errors
    ///
    /// - [`SigningError::Registry`] if the agreement or borrower is unknown.
    /// - [`SigningError::NotAcknowledged`] if `acknowledged` is false.
    /// - [`SigningError::Audit`] if auditing fails.
    pub async fn acknowledge(
        &self,
        agreement_id: Uuid,
        borrower_id: Uuid,
        acknowledged: bool,
        remote_addr: &str,
    ) -> Result<Borrower, SigningError> {
        let borrower = self.registry.get_borrower(agreement_id, borrower_id).await?;
        if !acknowledged {
            return Err(SigningError::NotAcknowledged);
        }
        self.audit
            .log(&AuditEntry::new(
                agreement_id,
                Some(borrower_id),
                remote_addr,
                AuditEvent::DocumentAcknowledged,
            ))
            .await?;
        Ok(borrower)
    }

    /// Stamp the borrower's signature onto every page of the agreement.
    ///
    /// # Errors
    ///
    /// - [`SigningError::Registry`] if the agreement or borrower is unknown.
    /// - [`SigningError::NoDocument`] if nothing was uploaded yet.
    /// - [`SigningError::AlreadySigned`] if the borrower signed before.
    /// - [`SigningError::Stamp`] for a bad data URL, image, or PDF.
    /// - [`SigningError::Audit`] / [`SigningError::Document`] on audit or disk failure.
    pub async fn sign(&self, request: SignRequest) -> Result<SignatureRecord, SigningError> {
        let agreement_id = request.agreement_id;
        let lock = self.agreement_lock(agreement_id).await;
        let _guard = lock.lock().await;

        let borrower = self
            .registry
            .get_borrower(agreement_id, request.borrower_id)
            .await?;
        let agreement = self.registry.get_agreement(agreement_id).await?;
        if agreement.document.is_none() {
            return Err(SigningError::NoDocument { agreement_id });
        }
        if self
            .registry
            .find_signature(agreement_id, borrower.id)
            .await?
            .is_some()
        {
            return Err(SigningError::AlreadySigned {
                borrower_name: borrower.name,
            });
        }

        let existing = self.registry.signature_count(agreement_id).await?;
        let slot = u32::try_from(existing).map_err(|_| SigningError::Internal {
            reason: format!("signature count {existing} overflows u32"),
        })?;
        let position = self.grid.position(slot);

        let image_bytes = data_url::decode_signature(&request.signature_data_url)?;
        let original = self.documents.read(agreement_id).await?;

        let mark = SignatureMark {
            slot,
            position,
            loan_id: borrower.loan_id.clone(),
            ip_address: request.ip_address.clone(),
            signed_at: request.signed_at,
        };
        let (stamped, original) = tokio::task::spawn_blocking(move || {
            let image = SignatureImage::decode(&image_bytes)?;
            stamp::stamp_signature(&original, &image, &mark).map(|out| (out, original))
        })
        .await
        .map_err(|e| SigningError::Internal {
            reason: format!("stamping task failed: {e}"),
        })??;

        let record = SignatureRecord {
            agreement_id,
            borrower_id: borrower.id,
            borrower_name: borrower.name.clone(),
            loan_id: borrower.loan_id.clone(),
            slot,
            x: position.x,
            y: position.y,
            ip_address: request.ip_address,
            signed_at: request.signed_at,
            document_sha256: sha256_hex(&stamped),
        };

        self.audit
            .log(&AuditEntry::new(
                agreement_id,
                Some(borrower.id),
                record.ip_address.clone(),
                AuditEvent::SignatureApplied {
                    slot,
                    x: position.x,
                    y: position.y,
                    loan_id: record.loan_id.clone(),
                    document_sha256: record.document_sha256.clone(),
                },
            ))
            .await?;

        self.documents.write(agreement_id, &stamped).await?;
        if let Err(err) = self
            .registry
            .commit_signature(&record, stamped.len() as u64)
            .await
        {
            // Put the unsigned bytes back so the next signer reuses this slot.
            self.restore_document(agreement_id, Some(&original)).await;
            return Err(err.into());
        }

        info!(
            %agreement_id,
            borrower_id = %borrower.id,
            slot,
            x = position.x,
            y = position.y,
            "signature applied"
        );
        Ok(record)
    }

    /// The agreement's current document, including applied signatures.
    ///
    /// # Errors
    ///
    /// - [`SigningError::Registry`] if the agreement is unknown.
    /// - [`SigningError::NoDocument`] if nothing was uploaded yet.
    pub async fn signed_document(&self, agreement_id: Uuid) -> Result<Vec<u8>, SigningError> {
        let agreement = self.registry.get_agreement(agreement_id).await?;
        if agreement.document.is_none() {
            return Err(SigningError::NoDocument { agreement_id });
        }
        Ok(self.documents.read(agreement_id).await?)
    }

    /// Roll the document back to `previous`, or delete it if there was none.
    async fn restore_document(&self, agreement_id: Uuid, previous: Option<&[u8]>) {
        let restored = match previous {
            Some(bytes) => self.documents.write(agreement_id, bytes).await,
            None => self.documents.remove(agreement_id).await,
        };
        if let Err(e) = restored {
            error!(
                %agreement_id,
                error = %e,
                "failed to roll back document after registry failure"
            );
        }
    }

    async fn agreement_lock(&self, agreement_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // Entries held only by the map are idle and safe to drop here.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(agreement_id).or_default())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn clean_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    if cleaned.is_empty() {
        DEFAULT_FILE_NAME.to_owned()
    } else {
        cleaned
    }
}
