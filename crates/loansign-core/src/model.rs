//! Workflow records: agreements, borrowers, and applied signatures.
//!
//! Every record is stored as JSON through the registry. Identifiers are
//! random UUID v4 values because they appear in the signing links handed
//! to borrowers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_LOAN_ID_CHARS: usize = 64;
const MAX_NAME_CHARS: usize = 120;
const MIN_MOBILE_DIGITS: usize = 7;
const MAX_MOBILE_DIGITS: usize = 15;

/// A loan agreement awaiting or carrying borrower signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanAgreement {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// The uploaded document, once the operator has provided one.
    pub document: Option<DocumentInfo>,
}

/// Metadata for the agreement's current PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// File name as uploaded by the operator.
    pub original_name: String,
    pub size_bytes: u64,
    pub page_count: u32,
    /// Hex SHA-256 of the current bytes. Changes after every signature.
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A borrower attached to an agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    pub id: Uuid,
    pub agreement_id: Uuid,
    /// Zero-based order in which the operator entered the borrower.
    pub position: u32,
    pub loan_id: String,
    pub name: String,
    pub mobile_number: String,
    pub created_at: DateTime<Utc>,
}

/// Borrower details as submitted by the operator, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBorrower {
    pub loan_id: String,
    pub name: String,
    pub mobile_number: String,
}

impl NewBorrower {
    /// Validate and normalize the submitted fields.
    ///
    /// Trims surrounding whitespace and strips spaces and dashes from the
    /// mobile number.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when a field is empty, too long, or
    /// not a plausible phone number.
    pub fn validate(&self) -> Result<Self, String> {
        let loan_id = self.loan_id.trim();
        if loan_id.is_empty() {
            return Err("loan ID is required".to_owned());
        }
        if loan_id.chars().count() > MAX_LOAN_ID_CHARS {
            return Err(format!("loan ID exceeds {MAX_LOAN_ID_CHARS} characters"));
        }
        if loan_id.chars().any(char::is_control) {
            return Err("loan ID contains control characters".to_owned());
        }

        let name = self.name.trim();
        if name.is_empty() {
            return Err("name is required".to_owned());
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(format!("name exceeds {MAX_NAME_CHARS} characters"));
        }
        if name.chars().any(char::is_control) {
            return Err("name contains control characters".to_owned());
        }

        let mobile_number = normalize_mobile(&self.mobile_number)?;

        Ok(Self {
            loan_id: loan_id.to_owned(),
            name: name.to_owned(),
            mobile_number,
        })
    }
}

fn normalize_mobile(raw: &str) -> Result<String, String> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);

    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err("mobile number may only contain digits, spaces, '-' and a leading '+'".to_owned());
    }
    if !(MIN_MOBILE_DIGITS..=MAX_MOBILE_DIGITS).contains(&digits.len()) {
        return Err(format!(
            "mobile number must have {MIN_MOBILE_DIGITS} to {MAX_MOBILE_DIGITS} digits"
        ));
    }
    Ok(compact)
}

/// A signature stamped onto an agreement's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub agreement_id: Uuid,
    pub borrower_id: Uuid,
    pub borrower_name: String,
    pub loan_id: String,
    /// Zero-based grid slot; equals the number of earlier signatures.
    pub slot: u32,
    pub x: u32,
    pub y: u32,
    pub ip_address: String,
    pub signed_at: DateTime<Utc>,
    /// Hex SHA-256 of the document right after this signature was applied.
    pub document_sha256: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn borrower(loan_id: &str, name: &str, mobile: &str) -> NewBorrower {
        NewBorrower {
            loan_id: loan_id.to_owned(),
            name: name.to_owned(),
            mobile_number: mobile.to_owned(),
        }
    }

    #[test]
    fn validate_trims_and_normalizes() {
        let clean = borrower("  LN-1001 ", " Asha Rao ", "+91 98450-12345")
            .validate()
            .unwrap();
        assert_eq!(clean.loan_id, "LN-1001");
        assert_eq!(clean.name, "Asha Rao");
        assert_eq!(clean.mobile_number, "+919845012345");
    }

    #[test]
    fn validate_rejects_empty_fields() {
        assert!(borrower("", "A", "9845012345").validate().is_err());
        assert!(borrower("LN-1", "   ", "9845012345").validate().is_err());
        assert!(borrower("LN-1", "A", "").validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_mobile_numbers() {
        assert!(borrower("LN-1", "A", "12345").validate().is_err());
        assert!(borrower("LN-1", "A", "98450abc45").validate().is_err());
        assert!(borrower("LN-1", "A", "1234567890123456").validate().is_err());
        assert!(borrower("LN-1", "A", "++9845012345").validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_loan_id() {
        let long = "L".repeat(65);
        assert!(borrower(&long, "A", "9845012345").validate().is_err());
    }
}
