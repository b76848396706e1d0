//! crates/ar_pipeline/src/build_result.rs
//! Flatten ranked lines into the published table and the side report.
//!
//! `FinalLine` is the wire shape of one row; the table digest is taken over the
//! canonical JSON of the rows so two runs can be compared by `table_sha256`.

use serde::Serialize;

use ar_core::entities::{AllocationLine, GroupKey};
use ar_core::ids::StoreId;
use ar_io::hasher::{sha256_canonical, HashError};

use crate::rank::RankedLine;
use crate::reconcile::NonReconcilableGroup;
use crate::tag::Action;

/// One published row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FinalLine {
    pub store_id: StoreId,
    pub group_name: String,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub group_key: GroupKey,
    pub raw_quantity: Option<f64>,
    pub rounded_quantity: i64,
    /// Same value as `rounded_quantity`, emitted as a number.
    pub target_quantity: f64,
    pub priority_score: f64,
    pub action: Action,
    pub instruction: String,
    pub tag_bundle: Vec<String>,
    pub action_rank: u32,
    pub quantity_source_provenance: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FinalTable {
    pub rows: Vec<FinalLine>,
}

impl FinalTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn count_action(&self, action: Action) -> usize {
        self.rows.iter().filter(|r| r.action == action).count()
    }
}

/// Groups excluded from the table, in canonical group order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SideReport {
    pub non_reconcilable_groups: Vec<NonReconcilableGroup>,
}

pub fn final_line(r: RankedLine) -> FinalLine {
    let RankedLine { tagged, action_rank } = r;
    let scored = tagged.scored;
    let reconciled = scored.reconciled;
    let AllocationLine { store_id, dimensions, group_key, raw_quantity, .. } = reconciled.line;
    let q = reconciled.rounded_quantity;

    FinalLine {
        store_id,
        group_name: dimensions.group_name,
        category: dimensions.category,
        subcategory: dimensions.subcategory,
        group_key,
        raw_quantity,
        rounded_quantity: q,
        target_quantity: q as f64,
        priority_score: scored.priority_score,
        action: tagged.action,
        instruction: tagged.instruction,
        tag_bundle: tagged.tag_bundle,
        action_rank,
        quantity_source_provenance: reconciled.provenance.to_string(),
    }
}

pub fn build_table(ranked: Vec<RankedLine>) -> FinalTable {
    FinalTable { rows: ranked.into_iter().map(final_line).collect() }
}

/// SHA-256 over the canonical JSON of the rows.
pub fn table_sha256(table: &FinalTable) -> Result<String, HashError> {
    sha256_canonical(&table.rows)
}
