//! Server configuration for `LoanSign`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `LOANSIGN_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use loansign_core::registry::DEFAULT_MAX_BORROWERS;

/// Default request body cap (covers the agreement upload).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const DEFAULT_PORT: u16 = 8300;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend for agreement records.
    pub storage_backend: StorageBackendType,
    /// Directory holding agreement PDFs.
    pub media_dir: PathBuf,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Path to the audit log file (if file audit is enabled).
    pub audit_file_path: Option<String>,
    /// Base URL used for signing links. Derived from `Host` when unset.
    pub public_url: Option<String>,
    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,
    /// Largest number of borrowers on one agreement.
    pub max_borrowers: usize,
    /// Trust `X-Forwarded-For` for the client address.
    pub trust_proxy: bool,
}

/// Supported storage backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// Redb persistent storage.
    Redb { path: String },
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            storage_backend: StorageBackendType::Redb {
                path: "./data/loansign.redb".to_owned(),
            },
            media_dir: PathBuf::from("./media"),
            log_level: "info".to_owned(),
            audit_file_path: None,
            public_url: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_borrowers: DEFAULT_MAX_BORROWERS,
            trust_proxy: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on (binds to `0.0.0.0`)
    /// - `LOANSIGN_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:8300`)
    /// - `LOANSIGN_STORAGE`: `memory` or `redb` (default: `redb`)
    /// - `LOANSIGN_STORAGE_PATH`: redb file (default: `./data/loansign.redb`)
    /// - `LOANSIGN_MEDIA_DIR`: agreement PDF directory (default: `./media`)
    /// - `LOANSIGN_LOG_LEVEL`: log filter (default: `info`)
    /// - `LOANSIGN_AUDIT_FILE`: path to audit log file (optional)
    /// - `LOANSIGN_PUBLIC_URL`: base URL for signing links (optional)
    /// - `LOANSIGN_MAX_UPLOAD_BYTES`: request body cap (default: 20 MiB)
    /// - `LOANSIGN_MAX_BORROWERS`: borrowers per agreement (default: `25`)
    /// - `LOANSIGN_TRUST_PROXY`: use `X-Forwarded-For` (default: `false`)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // Priority: LOANSIGN_BIND_ADDR > PORT > default 127.0.0.1:8300
        let bind_addr = if let Ok(addr) = std::env::var("LOANSIGN_BIND_ADDR") {
            addr.parse().unwrap_or(defaults.bind_addr)
        } else if let Ok(port_str) = std::env::var("PORT") {
            let port: u16 = port_str.parse().unwrap_or(DEFAULT_PORT);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            defaults.bind_addr
        };

        let storage_path = std::env::var("LOANSIGN_STORAGE_PATH")
            .unwrap_or_else(|_| "./data/loansign.redb".to_owned());

        let storage_backend = match std::env::var("LOANSIGN_STORAGE")
            .unwrap_or_else(|_| "redb".to_owned())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackendType::Memory,
            _ => StorageBackendType::Redb { path: storage_path },
        };

        let media_dir = std::env::var("LOANSIGN_MEDIA_DIR")
            .map_or(defaults.media_dir, PathBuf::from);

        let log_level = std::env::var("LOANSIGN_LOG_LEVEL").unwrap_or(defaults.log_level);

        let audit_file_path = std::env::var("LOANSIGN_AUDIT_FILE").ok();

        let public_url = std::env::var("LOANSIGN_PUBLIC_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_owned())
            .filter(|url| !url.is_empty());

        let max_upload_bytes = std::env::var("LOANSIGN_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_upload_bytes);

        let max_borrowers = std::env::var("LOANSIGN_MAX_BORROWERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_borrowers);

        let trust_proxy = std::env::var("LOANSIGN_TRUST_PROXY")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            bind_addr,
            storage_backend,
            media_dir,
            log_level,
            audit_file_path,
            public_url,
            max_upload_bytes,
            max_borrowers,
            trust_proxy,
        }
    }
}
