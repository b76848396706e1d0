//! crates/ar_io/src/hasher.rs
//!
//! Deterministic hashing and ID builders for canonical artifacts.
//!
//! - Canonical JSON hashing: UTF-8, **sorted object keys**, array order preserved.
//! - `RUN:<ts>:<hex>` ids use an RFC 3339 UTC timestamp (normalized to
//!   seconds + `Z`) plus a hash of the canonical run bytes.
//! - Hex digests are **lowercase**.
//!
//! Use `sha256_canonical(..)` for values/structs and `sha256_hex(..)` /
//! `sha256_file(..)` for raw bytes (CSV, TOML and JSON inputs are hashed as
//! they sit on disk).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::canonical_json::to_canonical_bytes;

#[derive(Error, Debug)]
pub enum HashError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("canonicalization error: {0}")]
    Canonical(String),

    #[error("invalid timestamp (expected RFC3339 UTC like 2025-08-12T10:00:00Z): {0}")]
    InvalidTimestamp(String),
}

/// True for a lowercase 64-character hex digest.
#[inline]
pub fn is_lower_hex_64(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/* ---------------------------- Canonical hashing ---------------------------- */

/// SHA-256 over **canonical JSON bytes** of any serializable value.
pub fn sha256_canonical<T: Serialize>(value: &T) -> Result<String, HashError> {
    let bytes = to_canonical_bytes(value).map_err(|e| HashError::Canonical(e.to_string()))?;
    Ok(sha256_hex(&bytes))
}

/* ------------------------------- Raw hashing ------------------------------- */

/// SHA-256 over raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 over a reader stream (raw, not canonicalized).
pub fn sha256_stream<R: Read>(reader: &mut R) -> Result<String, HashError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 over a file's raw bytes.
pub fn sha256_file(path: &Path) -> Result<String, HashError> {
    let f = File::open(path)?;
    let mut r = BufReader::new(f);
    sha256_stream(&mut r)
}

/* --------------------------------- RUN IDs --------------------------------- */

/// Normalize an RFC 3339 timestamp with a zero UTC offset to `YYYY-MM-DDTHH:MM:SSZ`.
/// Fractional seconds are dropped; non-UTC offsets are rejected.
pub fn normalize_rfc3339_utc_seconds(ts: &str) -> Result<String, HashError> {
    let parsed: DateTime<FixedOffset> =
        DateTime::parse_from_rfc3339(ts.trim()).map_err(|_| HashError::InvalidTimestamp(ts.to_string()))?;
    if parsed.offset().local_minus_utc() != 0 {
        return Err(HashError::InvalidTimestamp(ts.to_string()));
    }
    let utc: DateTime<Utc> = parsed.with_timezone(&Utc);
    Ok(utc.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// `RUN:<timestamp>:<hex>`; `run_bytes_canonical` must be canonical bytes of
/// the run payload.
pub fn run_id_from_bytes(timestamp_utc: &str, run_bytes_canonical: &[u8]) -> Result<String, HashError> {
    let ts = normalize_rfc3339_utc_seconds(timestamp_utc)?;
    Ok(format!("RUN:{ts}:{}", sha256_hex(run_bytes_canonical)))
}

/// Convenience: build a RUN id from a serializable run payload (canonicalized internally).
pub fn run_id_from_canonical<T: Serialize>(timestamp_utc: &str, run_value: &T) -> Result<String, HashError> {
    let bytes = to_canonical_bytes(run_value).map_err(|e| HashError::Canonical(e.to_string()))?;
    run_id_from_bytes(timestamp_utc, &bytes)
}

/* ------------------------------------ Tests ------------------------------------ */
