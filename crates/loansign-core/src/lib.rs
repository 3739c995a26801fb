//! Core library for `LoanSign`.
//!
//! Contains the workflow data model, the agreement registry, the signature
//! grid, the PDF signature stamper, the on-disk document store, audit
//! logging, and the signing service that ties them together. This crate
//! depends on `loansign-storage` for the storage backend trait and knows
//! nothing about HTTP.

pub mod audit;
pub mod audit_file;
pub mod data_url;
pub mod document;
pub mod error;
pub mod layout;
pub mod model;
pub mod registry;
pub mod signing;
pub mod stamp;
