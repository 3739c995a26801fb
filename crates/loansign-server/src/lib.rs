//! `LoanSign` HTTP server.
//!
//! Wires the core library and storage backend into an Axum server. Serves
//! the operator workflow at `/loan-process`, borrower signing pages under
//! `/agreements`, and a small JSON API under `/v1`.

pub mod app;
pub mod client_ip;
pub mod config;
pub mod error;
pub mod html;
pub mod routes;
pub mod state;
