//! ar_core — Core types, configuration domains, rounding and ordering helpers.
//!
//! This crate is **I/O-free**. It defines stable types/APIs used across the
//! engine (`ar_io`, `ar_algo`, `ar_pipeline`, `ar_report`, `ar_cli`).
//!
//! - Identifier tokens: `StoreId`, `SourceName`
//! - Entities: `Dimensions`, `GroupKey`, `KpiValues`, `AllocationLine`
//! - Engine configuration (`EngineConfig`) with fail-fast validation
//! - Integer rounding helpers for signed reals
//! - Deterministic ordering helpers

#![forbid(unsafe_code)]

pub mod config;
pub mod determinism;
pub mod entities;
pub mod ids;

pub mod errors {
    use core::fmt;

    /// Minimal error set for core-domain parsing.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum CoreError {
        InvalidToken,
        EmptyToken,
    }

    impl fmt::Display for CoreError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                CoreError::InvalidToken => write!(f, "invalid token"),
                CoreError::EmptyToken => write!(f, "empty token"),
            }
        }
    }

    impl std::error::Error for CoreError {}
}

pub mod rounding {
    //! Signed real → integer helpers used by target resolution and apportionment.
    //!
    //! Casts saturate at the `i64` range; NaN maps to 0 (Rust `as` semantics).

    /// Truncate toward zero: `2.6 → 2`, `-1.2 → -1`.
    #[inline]
    pub fn trunc_toward_zero(x: f64) -> i64 {
        x.trunc() as i64
    }

    /// Round half away from zero: `2.5 → 3`, `-2.5 → -3`, `2.4 → 2`.
    #[inline]
    pub fn round_half_away_from_zero(x: f64) -> i64 {
        // f64::round already rounds half-way cases away from 0.0.
        x.round() as i64
    }

    /// Fractional part carrying the sign of `x` (magnitude in `[0, 1)`).
    #[inline]
    pub fn signed_remainder(x: f64) -> f64 {
        x - x.trunc()
    }

    /// True iff `x` is finite and has no fractional part.
    #[inline]
    pub fn is_whole(x: f64) -> bool {
        x.is_finite() && x.fract() == 0.0
    }

}

pub use config::{ConfigError, EngineConfig, KpiWeights};
pub use entities::{AllocationLine, Dimensions, GroupKey, Kpi, KpiValues};
pub use ids::{SourceName, StoreId};
