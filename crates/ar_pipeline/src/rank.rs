//! crates/ar_pipeline/src/rank.rs
//! Stable ordering by `(action, -priority, -quantity)` and dense per-action ranks.

use ar_algo::ranking::{dense_ranks_by_partition, stable_rank_order, RankKey};

use crate::tag::TaggedLine;

#[derive(Clone, Debug, PartialEq)]
pub struct RankedLine {
    pub tagged: TaggedLine,
    /// Dense, 1-based within the action partition.
    pub action_rank: u32,
}

pub fn rank(lines: Vec<TaggedLine>) -> Vec<RankedLine> {
    let keys: Vec<RankKey> = lines
        .iter()
        .map(|t| RankKey::new(t.action.order(), t.scored.priority_score, t.scored.reconciled.rounded_quantity))
        .collect();
    let ranks = dense_ranks_by_partition(&keys);
    let order = stable_rank_order(&keys);

    let mut slots: Vec<Option<TaggedLine>> = lines.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take().map(|tagged| RankedLine { tagged, action_rank: ranks[i] }))
        .collect()
}
