//! Signed Largest Remainder (Hamilton) apportionment for one group.
//!
//! Contract:
//! - Bases are `trunc(v_i)` (toward zero); remainders are `v_i - trunc(v_i)`
//!   and carry the sign of `v_i`.
//! - `D = target - Σ base_i`.
//! - `D > 0` → +1 by remainder ↓, then input order ↑.
//! - `D < 0` → -1 by remainder ↑, then input order ↑.
//! - `|D| > n` → the ranking is applied cyclically, so every line receives
//!   `⌊|D|/n⌋` and the first `|D| mod n` in ranking order one more.
//! - Postcondition: `Σ out_i == target` for every non-empty input.
//!
//! Determinism:
//! - No RNG and no hashing; ties resolve by input order only.
//! - Remainders are compared on a 1e-9 grid, so `2.6 - 2.0` and `0.6` tie.

use core::cmp::Ordering;

use ar_core::rounding::{signed_remainder, trunc_toward_zero};

use super::{AllocError, Apportioner, Apportionment};

/// The engine's apportionment method.
#[derive(Clone, Copy, Debug, Default)]
pub struct LargestRemainder;

impl Apportioner for LargestRemainder {
    fn name(&self) -> &'static str {
        "largest_remainder"
    }

    fn apportion(&self, values: &[f64], target: i64) -> Result<Apportionment, AllocError> {
        allocate_largest_remainder(values, target)
    }
}

/// Public API expected by the pipeline (kept stable).
pub fn allocate_largest_remainder(values: &[f64], target: i64) -> Result<Apportionment, AllocError> {
    if values.is_empty() {
        return if target == 0 {
            Ok(Apportionment::default())
        } else {
            Err(AllocError::NoLines { target })
        };
    }

    let (mut alloc, remainders) = bases_and_remainders(values);
    let keys: Vec<i64> = remainders.iter().map(|&r| remainder_key(r)).collect();

    let sum_bases: i128 = alloc.iter().map(|&b| b as i128).sum();
    let adjustment = target as i128 - sum_bases;

    let tie_broken_by_order = match adjustment.cmp(&0) {
        Ordering::Greater => distribute(adjustment as u128, 1, &mut alloc, &keys, Direction::Up),
        Ordering::Less => distribute(adjustment.unsigned_abs(), -1, &mut alloc, &keys, Direction::Down),
        Ordering::Equal => false,
    };

    // Always recompute final sum to avoid stale assertions.
    let sum: i128 = alloc.iter().map(|&q| q as i128).sum();
    debug_assert_eq!(sum, target as i128);

    Ok(Apportionment {
        quantities: alloc,
        adjustment: clamp_i64(adjustment),
        tie_broken_by_order,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    /// Most positive remainder first.
    Up,
    /// Most negative remainder first.
    Down,
}

fn bases_and_remainders(values: &[f64]) -> (Vec<i64>, Vec<f64>) {
    let mut bases = Vec::with_capacity(values.len());
    let mut rems = Vec::with_capacity(values.len());
    for &v in values {
        let v = if v.is_finite() { v } else { 0.0 };
        bases.push(trunc_toward_zero(v));
        rems.push(signed_remainder(v));
    }
    (bases, rems)
}

/// Steps per unit on the remainder grid.
const REMAINDER_GRID: f64 = 1e9;

/// Remainder snapped to the grid. Float noise from `v - trunc(v)` is far
/// below one grid step, so decimally equal remainders get equal keys.
#[inline]
fn remainder_key(r: f64) -> i64 {
    (r * REMAINDER_GRID).round() as i64
}

/// Stable ranking of line indices for the given direction. `sort_by` is
/// stable, so equal keys keep input order.
fn ranking(keys: &[i64], dir: Direction) -> Vec<usize> {
    let mut ix: Vec<usize> = (0..keys.len()).collect();
    match dir {
        Direction::Up => ix.sort_by(|&a, &b| keys[b].cmp(&keys[a])),
        Direction::Down => ix.sort_by(|&a, &b| keys[a].cmp(&keys[b])),
    }
    ix
}

/// Apply `units` steps of `step` (+1 / -1) over the ranking. Returns true
/// when the cut fell between two equal remainder keys, i.e. input order
/// decided which line received the last unit.
fn distribute(units: u128, step: i64, alloc: &mut [i64], keys: &[i64], dir: Direction) -> bool {
    let n = alloc.len() as u128;
    let order = ranking(keys, dir);

    let per_line = units / n;
    let extra = (units % n) as usize;

    if per_line > 0 {
        let delta = clamp_i64(per_line as i128 * step as i128);
        for q in alloc.iter_mut() {
            *q = q.saturating_add(delta);
        }
    }
    for &i in order.iter().take(extra) {
        alloc[i] = alloc[i].saturating_add(step);
    }

    extra > 0 && extra < order.len() && keys[order[extra - 1]] == keys[order[extra]]
}

#[inline]
fn clamp_i64(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
