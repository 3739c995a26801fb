//! Error types for `loansign-core`.
//!
//! Each variant carries the identifiers needed to diagnose the failure
//! without a debugger. Borrower mobile numbers never appear in errors.

use loansign_storage::StorageError;
use uuid::Uuid;

/// Errors from decoding signatures and stamping PDF documents.
#[derive(Debug, thiserror::Error)]
pub enum StampError {
    /// The signature was not a usable `data:image/...;base64,` URL.
    #[error("invalid signature data URL: {reason}")]
    InvalidDataUrl { reason: String },

    /// The signature image bytes could not be decoded.
    #[error("failed to decode signature image: {reason}")]
    ImageDecode { reason: String },

    /// The uploaded bytes do not start with a PDF header.
    #[error("document is not a PDF")]
    NotPdf,

    /// The PDF could not be parsed.
    #[error("failed to parse PDF: {reason}")]
    PdfParse { reason: String },

    /// The PDF parsed but has no pages to stamp.
    #[error("PDF has no pages")]
    EmptyDocument,

    /// The page tree or resources were not shaped as expected.
    #[error("malformed PDF page {page}: {reason}")]
    MalformedPage { page: u32, reason: String },

    /// Compressing an overlay stream failed.
    #[error("failed to compress overlay stream: {reason}")]
    Compression { reason: String },

    /// Serializing the stamped PDF failed.
    #[error("failed to write PDF: {reason}")]
    PdfWrite { reason: String },
}

/// Errors from the on-disk document store.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// No document has been stored for the agreement.
    #[error("no document stored for agreement {agreement_id}")]
    NotFound { agreement_id: Uuid },

    /// A filesystem operation failed.
    #[error("document I/O failed at '{path}': {reason}")]
    Io { path: String, reason: String },
}

/// Errors from the agreement registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The agreement does not exist.
    #[error("agreement not found: {agreement_id}")]
    AgreementNotFound { agreement_id: Uuid },

    /// The borrower does not exist or belongs to another agreement.
    #[error("borrower {borrower_id} not found on agreement {agreement_id}")]
    BorrowerNotFound { agreement_id: Uuid, borrower_id: Uuid },

    /// Borrower details failed validation.
    #[error("borrower #{position}: {reason}")]
    InvalidBorrower { position: usize, reason: String },

    /// Too few or too many borrowers were submitted.
    #[error("borrower count must be between 1 and {max}, got {count}")]
    InvalidBorrowerCount { count: usize, max: usize },

    /// A stored record could not be (de)serialized.
    #[error("record serialization failed for '{key}': {reason}")]
    Serialization { key: String, reason: String },

    /// The storage backend returned an error.
    #[error("registry storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from audit operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Every configured audit backend failed, so the operation must not proceed.
    #[error("all audit backends failed (fail-closed)")]
    AllBackendsFailed,

    /// A specific audit backend failed.
    #[error("audit backend '{name}' failed: {reason}")]
    BackendFailure { name: String, reason: String },

    /// Serialization of the audit entry failed.
    #[error("audit serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Errors from the signing workflow.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The borrower did not tick the acknowledgement box.
    #[error("Please acknowledge the document.")]
    NotAcknowledged,

    /// The borrower already has a signature on this agreement.
    #[error("{borrower_name} has already signed this agreement")]
    AlreadySigned { borrower_name: String },

    /// Signing was attempted before a document was uploaded.
    #[error("agreement {agreement_id} has no uploaded document")]
    NoDocument { agreement_id: Uuid },

    /// The document cannot be replaced once signatures exist.
    #[error("agreement {agreement_id} already carries {signatures} signature(s); document is locked")]
    DocumentLocked { agreement_id: Uuid, signatures: usize },

    /// The submitted signature or document could not be processed.
    #[error(transparent)]
    Stamp(#[from] StampError),

    /// The registry returned an error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The document store returned an error.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Auditing failed; nothing was committed.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// A background stamping task did not complete.
    #[error("signing task failed: {reason}")]
    Internal { reason: String },
}
