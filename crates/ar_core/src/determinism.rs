//! Determinism utilities: total-order float comparison for scores.
//!
//! `-0.0` and `0.0` compare equal so a sign flip from arithmetic never
//! reorders rows. Group keys order through their derived `Ord`
//! (dimensional before fallback, fields lexicographic).

use core::cmp::Ordering;

/* -------------------------------------------------------------------------- */
/*                               Float ordering                               */
/* -------------------------------------------------------------------------- */

/// Map `-0.0` to `0.0` so equality and `total_cmp` agree.
#[inline]
pub fn canonical_zero(x: f64) -> f64 {
    if x == 0.0 { 0.0 } else { x }
}

/// Total ascending order over finite scores (`-0.0 == 0.0`).
#[inline]
pub fn cmp_f64_asc(a: f64, b: f64) -> Ordering {
    canonical_zero(a).total_cmp(&canonical_zero(b))
}

/// Total descending order over finite scores.
#[inline]
pub fn cmp_f64_desc(a: f64, b: f64) -> Ordering {
    cmp_f64_asc(b, a)
}

/* ---------------------------------- Tests --------------------------------- */
