//! crates/ar_io/src/lib.rs
//! I/O crate for the reconciliation engine.
//!
//! - Shared error type (`IoError`) with `From` conversions used across modules.
//! - Local files only: manifest, allocation lines (CSV), source targets (JSON),
//!   engine config (TOML).
//! - Canonical JSON + SHA-256 for digests and run ids.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Unified error for ar_io.
#[derive(Debug, Error)]
pub enum IoError {
    /// Filesystem / path errors (open, create_dir_all, rename, ...).
    #[error("io/path error: {0}")]
    Path(String),

    /// JSON serialization/deserialization errors with a location hint.
    #[error("json error at {pointer}: {msg}")]
    Json { pointer: String, msg: String },

    /// CSV decoding errors; `line` is 1-based including the header row.
    #[error("csv error at line {line}, column {column}: {msg}")]
    Csv { line: u64, column: String, msg: String },

    #[error("config error: {0}")]
    Toml(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("hash error: {0}")]
    Hash(String),

    /// Generic validation / invariants.
    #[error("invalid: {0}")]
    Invalid(String),
}

/* ---------------- From conversions (used by file modules) ---------------- */

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Path(e.to_string())
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        // serde_json reports line/column, not a pointer.
        IoError::Json {
            pointer: format!("line {} column {}", e.line(), e.column()),
            msg: e.to_string(),
        }
    }
}

impl From<toml::de::Error> for IoError {
    fn from(e: toml::de::Error) -> Self {
        IoError::Toml(e.to_string())
    }
}

impl From<manifest::ManifestError> for IoError {
    fn from(e: manifest::ManifestError) -> Self {
        IoError::Manifest(e.to_string())
    }
}

impl From<hasher::HashError> for IoError {
    fn from(e: hasher::HashError) -> Self {
        IoError::Hash(e.to_string())
    }
}

pub mod canonical_json;
pub mod hasher;
pub mod loader;
pub mod manifest;

/// Returns true if `s` looks like a URL (any `<scheme>://`, including `file://`).
#[inline]
pub fn looks_like_url_strict(s: &str) -> bool {
    s.trim().contains("://")
}
