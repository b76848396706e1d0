//! Deterministic ordering and dense ranking of final rows.
//!
//! Sort key (ascending, stable): `(partition, -score, -quantity)`.
//! Rows equal on all three keep their relative input order.
//! Dense rank: 1-based, ties share a rank, no gaps; computed per partition
//! over `score` descending.

use core::cmp::Ordering;

use ar_core::determinism::{canonical_zero, cmp_f64_desc};

/// The sortable projection of one row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankKey {
    /// Partition order (Add → 0, Reduce → 1, No-Change → 2).
    pub partition: u8,
    pub score: f64,
    pub quantity: i64,
}

impl RankKey {
    #[inline]
    pub fn new(partition: u8, score: f64, quantity: i64) -> Self {
        Self { partition, score: canonical_zero(score), quantity }
    }
}

/// Total order used by `stable_rank_order`.
pub fn cmp_rank_keys(a: &RankKey, b: &RankKey) -> Ordering {
    a.partition
        .cmp(&b.partition)
        .then_with(|| cmp_f64_desc(a.score, b.score))
        .then_with(|| b.quantity.cmp(&a.quantity))
}

/// Permutation of row indices in output order.
pub fn stable_rank_order(keys: &[RankKey]) -> Vec<usize> {
    let mut ix: Vec<usize> = (0..keys.len()).collect();
    // slice::sort_by is stable
    ix.sort_by(|&a, &b| cmp_rank_keys(&keys[a], &keys[b]));
    ix
}

/// Dense rank of `score` descending within each partition; result is
/// aligned with `keys`.
pub fn dense_ranks_by_partition(keys: &[RankKey]) -> Vec<u32> {
    let mut ranks = vec![0u32; keys.len()];
    let order = stable_rank_order(keys);

    let mut current: Option<(u8, f64)> = None;
    let mut rank = 0u32;
    for &i in &order {
        let k = &keys[i];
        match current {
            Some((p, s)) if p == k.partition && cmp_f64_desc(s, k.score) == Ordering::Equal => {}
            Some((p, _)) if p == k.partition => rank += 1,
            _ => rank = 1,
        }
        current = Some((k.partition, k.score));
        ranks[i] = rank;
    }
    ranks
}
