//! Audit trail for the signing workflow.
//!
//! Every state change (agreement created, document uploaded, document
//! acknowledged, signature applied) produces an [`AuditEntry`] before it is
//! committed. If every configured backend fails to write, the change is
//! refused (fail-closed). With no backends configured auditing is a no-op.
//!
//! Borrower mobile numbers are HMAC'd with a per-instance key so entries
//! can be correlated without storing the numbers themselves.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::error::AuditError;

type HmacSha256 = Hmac<Sha256>;

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub agreement_id: Uuid,
    pub borrower_id: Option<Uuid>,
    /// Client IP address as seen by the server.
    pub remote_addr: String,
    pub event: AuditEvent,
}

impl AuditEntry {
    /// Build an entry stamped with a fresh ID and the current time.
    #[must_use]
    pub fn new(
        agreement_id: Uuid,
        borrower_id: Option<Uuid>,
        remote_addr: impl Into<String>,
        event: AuditEvent,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agreement_id,
            borrower_id,
            remote_addr: remote_addr.into(),
            event,
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    AgreementCreated {
        borrowers: Vec<AuditBorrower>,
    },
    DocumentUploaded {
        original_name: String,
        size_bytes: u64,
        page_count: u32,
        sha256: String,
    },
    DocumentAcknowledged,
    SignatureApplied {
        slot: u32,
        x: u32,
        y: u32,
        loan_id: String,
        document_sha256: String,
    },
}

/// Borrower identity as recorded in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditBorrower {
    pub borrower_id: Uuid,
    pub loan_id: String,
    /// Hex HMAC-SHA256 of the mobile number.
    pub mobile_hmac: String,
}

/// Trait for audit log backends.
#[async_trait::async_trait]
pub trait AuditBackend: Send + Sync {
    /// The backend's name (for error reporting).
    fn name(&self) -> &str;

    /// Persist an entry. Must not silently drop entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be persisted.
    async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Fans entries out to every registered backend.
pub struct AuditManager {
    backends: RwLock<Vec<Arc<dyn AuditBackend>>>,
    hmac_key: Vec<u8>,
}

impl AuditManager {
    /// Create a manager with no backends and the given HMAC key.
    #[must_use]
    pub fn new(hmac_key: Vec<u8>) -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
            hmac_key,
        }
    }

    /// Create a manager with a random 32-byte HMAC key.
    #[must_use]
    pub fn with_random_key() -> Self {
        // Two v4 UUIDs are 32 bytes from the OS CSPRNG.
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        Self::new(key)
    }

    /// Register an audit backend.
    pub async fn add_backend(&self, backend: Arc<dyn AuditBackend>) {
        self.backends.write().await.push(backend);
    }

    /// Whether any backend is registered.
    pub async fn has_backends(&self) -> bool {
        !self.backends.read().await.is_empty()
    }

    /// Log an entry to all backends.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AllBackendsFailed`] if every backend fails.
    pub async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let backends = self.backends.read().await;
        if backends.is_empty() {
            return Ok(());
        }

        let mut any_success = false;
        for backend in backends.iter() {
            match backend.log(entry).await {
                Ok(()) => any_success = true,
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        entry_id = %entry.id,
                        error = %e,
                        "audit backend failed"
                    );
                }
            }
        }

        if any_success {
            Ok(())
        } else {
            Err(AuditError::AllBackendsFailed)
        }
    }

    /// Hex HMAC-SHA256 of `value` under this manager's key.
    #[must_use]
    pub fn hmac_field(&self, value: &str) -> String {
        // HMAC accepts keys of any length, so this branch is unreachable.
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.hmac_key) else {
            return String::new();
        };
        mac.update(value.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for AuditManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditManager")
            .field("hmac_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Backend that records entries or fails on demand.
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        pub fail: bool,
        pub entries: std::sync::Mutex<Vec<AuditEntry>>,
        pub attempts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AuditBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AuditError::BackendFailure {
                    name: "recording".to_owned(),
                    reason: "forced failure".to_owned(),
                });
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    fn entry() -> AuditEntry {
        AuditEntry::new(Uuid::new_v4(), None, "127.0.0.1", AuditEvent::DocumentAcknowledged)
    }

    #[tokio::test]
    async fn no_backends_is_a_noop() {
        let mgr = AuditManager::with_random_key();
        assert!(!mgr.has_backends().await);
        mgr.log(&entry()).await.unwrap();
    }

    #[tokio::test]
    async fn one_success_is_enough() {
        let mgr = AuditManager::with_random_key();
        let ok = Arc::new(RecordingBackend::default());
        let bad = Arc::new(RecordingBackend {
            fail: true,
            ..RecordingBackend::default()
        });
        mgr.add_backend(bad.clone()).await;
        mgr.add_backend(ok.clone()).await;

        mgr.log(&entry()).await.unwrap();
        assert_eq!(ok.entries.lock().unwrap().len(), 1);
        assert_eq!(bad.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_failing_is_fail_closed() {
        let mgr = AuditManager::with_random_key();
        mgr.add_backend(Arc::new(RecordingBackend {
            fail: true,
            ..RecordingBackend::default()
        }))
        .await;
        let err = mgr.log(&entry()).await.unwrap_err();
        assert!(matches!(err, AuditError::AllBackendsFailed));
    }

    #[test]
    fn hmac_is_stable_per_key() {
        let mgr = AuditManager::new(b"fixed-key".to_vec());
        let a = mgr.hmac_field("+919845012345");
        assert_eq!(a, mgr.hmac_field("+919845012345"));
        assert_ne!(a, mgr.hmac_field("+919845012346"));
        assert_eq!(a.len(), 64);

        let other = AuditManager::new(b"other-key".to_vec());
        assert_ne!(a, other.hmac_field("+919845012345"));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(AuditEvent::SignatureApplied {
            slot: 2,
            x: 265,
            y: 25,
            loan_id: "LN-9".to_owned(),
            document_sha256: "ab".to_owned(),
        })
        .unwrap();
        assert_eq!(json["type"], "signature_applied");
        assert_eq!(json["x"], 265);
    }
}
