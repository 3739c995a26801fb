//! Agreement registry.
//!
//! Persists agreements, borrowers, and applied signatures as JSON records in
//! the storage backend:
//!
//! - `agreements/{agreement_id}`
//! - `borrowers/{agreement_id}/{borrower_id}`
//! - `signatures/{agreement_id}/{borrower_id}`
//!
//! Keying signatures by borrower means a borrower can hold at most one
//! signature per agreement.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use loansign_storage::StorageBackend;

use crate::error::RegistryError;
use crate::model::{Borrower, DocumentInfo, LoanAgreement, NewBorrower, SignatureRecord};

/// Default cap on borrowers per agreement.
pub const DEFAULT_MAX_BORROWERS: usize = 25;

/// Typed access to workflow records.
pub struct AgreementRegistry {
    storage: Arc<dyn StorageBackend>,
    max_borrowers: usize,
}

impl std::fmt::Debug for AgreementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementRegistry")
            .field("max_borrowers", &self.max_borrowers)
            .finish_non_exhaustive()
    }
}

fn agreement_key(id: Uuid) -> String {
    format!("agreements/{id}")
}

fn borrower_prefix(agreement_id: Uuid) -> String {
    format!("borrowers/{agreement_id}/")
}

fn signature_prefix(agreement_id: Uuid) -> String {
    format!("signatures/{agreement_id}/")
}

impl AgreementRegistry {
    /// Create a registry over `storage` allowing up to `max_borrowers` per agreement.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, max_borrowers: usize) -> Self {
        Self {
            storage,
            max_borrowers: max_borrowers.max(1),
        }
    }

    /// Maximum borrowers accepted by [`prepare_agreement`](Self::prepare_agreement).
    #[must_use]
    pub fn max_borrowers(&self) -> usize {
        self.max_borrowers
    }

    /// Validate borrowers and assign identifiers without writing anything.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidBorrowerCount`] for zero or too many borrowers.
    /// - [`RegistryError::InvalidBorrower`] naming the first invalid row (1-based).
    pub fn prepare_agreement(
        &self,
        borrowers: &[NewBorrower],
    ) -> Result<(LoanAgreement, Vec<Borrower>), RegistryError> {
        if borrowers.is_empty() || borrowers.len() > self.max_borrowers {
            return Err(RegistryError::InvalidBorrowerCount {
                count: borrowers.len(),
                max: self.max_borrowers,
            });
        }

        let now = Utc::now();
        let agreement = LoanAgreement {
            id: Uuid::new_v4(),
            created_at: now,
            document: None,
        };

        let mut created = Vec::with_capacity(borrowers.len());
        for (index, raw) in borrowers.iter().enumerate() {
            let clean = raw
                .validate()
                .map_err(|reason| RegistryError::InvalidBorrower {
                    position: index + 1,
                    reason,
                })?;
            created.push(Borrower {
                id: Uuid::new_v4(),
                agreement_id: agreement.id,
                position: u32::try_from(index).unwrap_or(u32::MAX),
                loan_id: clean.loan_id,
                name: clean.name,
                mobile_number: clean.mobile_number,
                created_at: now,
            });
        }
        Ok((agreement, created))
    }

    /// Write an agreement and its borrowers in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the batch cannot be written.
    pub async fn insert_agreement(
        &self,
        agreement: &LoanAgreement,
        borrowers: &[Borrower],
    ) -> Result<(), RegistryError> {
        let mut entries = Vec::with_capacity(borrowers.len() + 1);
        let key = agreement_key(agreement.id);
        entries.push((key.clone(), encode(&key, agreement)?));
        for borrower in borrowers {
            let key = format!("{}{}", borrower_prefix(agreement.id), borrower.id);
            entries.push((key.clone(), encode(&key, borrower)?));
        }
        self.storage.put_batch(&entries).await?;

        tracing::info!(
            agreement_id = %agreement.id,
            borrowers = borrowers.len(),
            "agreement created"
        );
        Ok(())
    }

    /// Fetch an agreement.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgreementNotFound`] if it does not exist.
    pub async fn get_agreement(&self, agreement_id: Uuid) -> Result<LoanAgreement, RegistryError> {
        self.read(&agreement_key(agreement_id))
            .await?
            .ok_or(RegistryError::AgreementNotFound { agreement_id })
    }

    /// Borrowers of an agreement in the order the operator entered them.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgreementNotFound`] if the agreement does not exist.
    pub async fn list_borrowers(&self, agreement_id: Uuid) -> Result<Vec<Borrower>, RegistryError> {
        self.get_agreement(agreement_id).await?;
        let mut borrowers: Vec<Borrower> = self.read_prefix(&borrower_prefix(agreement_id)).await?;
        borrowers.sort_by_key(|b| b.position);
        Ok(borrowers)
    }

    /// Fetch a borrower, which must belong to `agreement_id`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::AgreementNotFound`] if the agreement does not exist.
    /// - [`RegistryError::BorrowerNotFound`] if the borrower is unknown or
    ///   attached to a different agreement.
    pub async fn get_borrower(
        &self,
        agreement_id: Uuid,
        borrower_id: Uuid,
    ) -> Result<Borrower, RegistryError> {
        self.get_agreement(agreement_id).await?;
        let key = format!("{}{borrower_id}", borrower_prefix(agreement_id));
        self.read(&key)
            .await?
            .ok_or(RegistryError::BorrowerNotFound {
                agreement_id,
                borrower_id,
            })
    }

    /// Record metadata of a newly uploaded document.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AgreementNotFound`] if the agreement does not exist.
    pub async fn attach_document(
        &self,
        agreement_id: Uuid,
        document: DocumentInfo,
    ) -> Result<LoanAgreement, RegistryError> {
        let mut agreement = self.get_agreement(agreement_id).await?;
        agreement.document = Some(document);
        self.write(&agreement_key(agreement_id), &agreement).await?;
        Ok(agreement)
    }

    /// Signatures applied to an agreement, ordered by slot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the backend fails.
    pub async fn list_signatures(
        &self,
        agreement_id: Uuid,
    ) -> Result<Vec<SignatureRecord>, RegistryError> {
        let mut signatures: Vec<SignatureRecord> =
            self.read_prefix(&signature_prefix(agreement_id)).await?;
        signatures.sort_by_key(|s| s.slot);
        Ok(signatures)
    }

    /// Number of signatures applied to an agreement.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the backend fails.
    pub async fn signature_count(&self, agreement_id: Uuid) -> Result<usize, RegistryError> {
        Ok(self
            .storage
            .list(&signature_prefix(agreement_id))
            .await?
            .len())
    }

    /// The signature a borrower applied, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the backend fails.
    pub async fn find_signature(
        &self,
        agreement_id: Uuid,
        borrower_id: Uuid,
    ) -> Result<Option<SignatureRecord>, RegistryError> {
        self.read(&format!("{}{borrower_id}", signature_prefix(agreement_id)))
            .await
    }

    /// Persist an applied signature together with the digest of the
    /// rewritten document.
    ///
    /// The agreement and the signature are written in one batch, so either
    /// both reflect the signed document or neither does.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::AgreementNotFound`] if the agreement does not exist.
    /// - [`RegistryError::Storage`] if the batch cannot be written.
    pub async fn commit_signature(
        &self,
        record: &SignatureRecord,
        size_bytes: u64,
    ) -> Result<LoanAgreement, RegistryError> {
        let mut agreement = self.get_agreement(record.agreement_id).await?;
        if let Some(document) = agreement.document.as_mut() {
            document.size_bytes = size_bytes;
            document.sha256.clone_from(&record.document_sha256);
        }

        let agreement_key = agreement_key(record.agreement_id);
        let signature_key = format!(
            "{}{}",
            signature_prefix(record.agreement_id),
            record.borrower_id
        );
        let entries = vec![
            (agreement_key.clone(), encode(&agreement_key, &agreement)?),
            (signature_key.clone(), encode(&signature_key, record)?),
        ];
        self.storage.put_batch(&entries).await?;
        Ok(agreement)
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RegistryError> {
        match self.storage.get(key).await? {
            Some(bytes) => decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn read_prefix<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, RegistryError> {
        let keys = self.storage.list(prefix).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            // A key listed a moment ago may be gone by now.
            if let Some(record) = self.read(&key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), RegistryError> {
        let bytes = encode(key, value)?;
        self.storage.put(key, &bytes).await?;
        Ok(())
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, RegistryError> {
    serde_json::to_vec(value).map_err(|e| RegistryError::Serialization {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, RegistryError> {
    serde_json::from_slice(bytes).map_err(|e| RegistryError::Serialization {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use loansign_storage::MemoryBackend;

    use super::*;

    fn registry() -> AgreementRegistry {
        AgreementRegistry::new(Arc::new(MemoryBackend::new()), 3)
    }

    fn new_borrower(loan_id: &str, name: &str) -> NewBorrower {
        NewBorrower {
            loan_id: loan_id.to_owned(),
            name: name.to_owned(),
            mobile_number: "9845012345".to_owned(),
        }
    }

    async fn create(
        reg: &AgreementRegistry,
        borrowers: &[NewBorrower],
    ) -> Result<(LoanAgreement, Vec<Borrower>), RegistryError> {
        let (agreement, created) = reg.prepare_agreement(borrowers)?;
        reg.insert_agreement(&agreement, &created).await?;
        Ok((agreement, created))
    }

    fn document(sha256: &str) -> DocumentInfo {
        DocumentInfo {
            original_name: "loan.pdf".to_owned(),
            size_bytes: 10,
            page_count: 2,
            sha256: sha256.to_owned(),
            uploaded_at: Utc::now(),
        }
    }

    fn signature(agreement_id: Uuid, borrower: &Borrower, slot: u32, sha256: &str) -> SignatureRecord {
        SignatureRecord {
            agreement_id,
            borrower_id: borrower.id,
            borrower_name: borrower.name.clone(),
            loan_id: borrower.loan_id.clone(),
            slot,
            x: 25,
            y: 25,
            ip_address: "127.0.0.1".to_owned(),
            signed_at: Utc::now(),
            document_sha256: sha256.to_owned(),
        }
    }

    // ── prepare / insert ─────────────────────────────────────────────

    #[tokio::test]
    async fn insert_keeps_entry_order() {
        let reg = registry();
        let (agreement, created) = create(
            &reg,
            &[
                new_borrower("LN-1", "Zed"),
                new_borrower("LN-2", "Amy"),
                new_borrower("LN-3", "Kim"),
            ],
        )
        .await
        .unwrap();
        assert!(agreement.document.is_none());

        let listed = reg.list_borrowers(agreement.id).await.unwrap();
        let names: Vec<_> = listed.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Zed", "Amy", "Kim"]);
        assert_eq!(listed, created);
    }

    #[test]
    fn prepare_rejects_bad_counts() {
        let reg = registry();
        let err = reg.prepare_agreement(&[]).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidBorrowerCount { count: 0, max: 3 }));

        let four: Vec<_> = (0..4).map(|i| new_borrower(&format!("LN-{i}"), "X")).collect();
        let err = reg.prepare_agreement(&four).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidBorrowerCount { count: 4, .. }));
    }

    #[tokio::test]
    async fn invalid_row_writes_nothing() {
        let storage = Arc::new(MemoryBackend::new());
        let reg = AgreementRegistry::new(storage.clone(), 5);
        let err = create(&reg, &[new_borrower("LN-1", "Amy"), new_borrower("", "Kim")])
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidBorrower { position: 2, .. }));
        assert!(storage.is_empty().await);
    }

    // ── lookups ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn borrower_must_belong_to_agreement() {
        let reg = registry();
        let (first, first_borrowers) = create(&reg, &[new_borrower("LN-1", "Amy")]).await.unwrap();
        let (second, _) = create(&reg, &[new_borrower("LN-2", "Kim")]).await.unwrap();

        let amy = first_borrowers[0].id;
        assert_eq!(reg.get_borrower(first.id, amy).await.unwrap().name, "Amy");
        let err = reg.get_borrower(second.id, amy).await.unwrap_err();
        assert!(matches!(err, RegistryError::BorrowerNotFound { .. }));
    }

    #[tokio::test]
    async fn unknown_agreement_is_not_found() {
        let reg = registry();
        let err = reg.get_agreement(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RegistryError::AgreementNotFound { .. }));
        assert!(reg.list_borrowers(Uuid::new_v4()).await.is_err());
    }

    // ── documents and signatures ─────────────────────────────────────

    #[tokio::test]
    async fn commit_updates_digest_with_signature() {
        let reg = registry();
        let (agreement, borrowers) = create(&reg, &[new_borrower("LN-1", "Amy")]).await.unwrap();
        reg.attach_document(agreement.id, document("aa")).await.unwrap();

        let committed = reg
            .commit_signature(&signature(agreement.id, &borrowers[0], 0, "bb"), 20)
            .await
            .unwrap();

        let doc = reg.get_agreement(agreement.id).await.unwrap().document.unwrap();
        assert_eq!(committed.document.as_ref(), Some(&doc));
        assert_eq!(doc.size_bytes, 20);
        assert_eq!(doc.sha256, "bb");
        assert_eq!(doc.page_count, 2);
        let record = reg
            .find_signature(agreement.id, borrowers[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.document_sha256, "bb");
    }

    #[tokio::test]
    async fn signatures_are_ordered_by_slot() {
        let reg = registry();
        let (agreement, borrowers) = create(
            &reg,
            &[new_borrower("LN-1", "Amy"), new_borrower("LN-2", "Kim")],
        )
        .await
        .unwrap();
        reg.attach_document(agreement.id, document("aa")).await.unwrap();

        reg.commit_signature(&signature(agreement.id, &borrowers[1], 0, "bb"), 20)
            .await
            .unwrap();
        reg.commit_signature(&signature(agreement.id, &borrowers[0], 1, "cc"), 30)
            .await
            .unwrap();

        assert_eq!(reg.signature_count(agreement.id).await.unwrap(), 2);
        let slots: Vec<_> = reg
            .list_signatures(agreement.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.slot, s.borrower_name))
            .collect();
        assert_eq!(slots, vec![(0, "Kim".to_owned()), (1, "Amy".to_owned())]);
        let doc = reg.get_agreement(agreement.id).await.unwrap().document.unwrap();
        assert_eq!(doc.sha256, "cc");
    }
}
