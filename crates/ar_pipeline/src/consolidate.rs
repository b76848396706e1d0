//! crates/ar_pipeline/src/consolidate.rs
//! Merge reconciled lines sharing the output key `(store_id, group_key, tag_bundle)`.
//!
//! Both rows always sit in the same group, so summing quantities keeps every
//! group total intact. The first occurrence keeps its position; its KPI
//! readings win and later rows only fill gaps.

use std::collections::BTreeMap;

use tracing::debug;

use ar_core::entities::GroupKey;
use ar_core::ids::StoreId;

use crate::reconcile::ReconciledLine;

/// Output de-duplication key.
pub type OutputKey = (StoreId, GroupKey, Vec<String>);

pub fn output_key(r: &ReconciledLine) -> OutputKey {
    (r.line.store_id.clone(), r.line.group_key.clone(), r.line.tag_bundle())
}

/// Returns the merged lines and the number of rows folded into an earlier one.
pub fn consolidate(lines: Vec<ReconciledLine>) -> (Vec<ReconciledLine>, usize) {
    let mut index: BTreeMap<OutputKey, usize> = BTreeMap::new();
    let mut out: Vec<ReconciledLine> = Vec::with_capacity(lines.len());
    let mut merged = 0usize;

    for r in lines {
        let key = output_key(&r);
        match index.get(&key) {
            Some(&i) => {
                let kept = &mut out[i];
                kept.rounded_quantity = kept.rounded_quantity.saturating_add(r.rounded_quantity);
                kept.line.raw_quantity = match (kept.line.raw_quantity, r.line.raw_quantity) {
                    (None, None) => None,
                    _ => Some(kept.line.raw() + r.line.raw()),
                };
                kept.line.kpi_values = kept.line.kpi_values.filled_from(&r.line.kpi_values);
                merged += 1;
            }
            None => {
                index.insert(key, out.len());
                out.push(r);
            }
        }
    }

    if merged > 0 {
        debug!(merged, rows = out.len(), "duplicate output keys consolidated");
    }
    (out, merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ar_core::entities::{AllocationLine, Dimensions, KpiValues};
    use crate::resolve_provenance::Provenance;

    fn rl(store: &str, attrs: Vec<Option<String>>, raw: Option<f64>, q: i64, eb: Option<f64>, seq: usize) -> ReconciledLine {
        ReconciledLine {
            line: AllocationLine::new(
                store.parse().unwrap(),
                Dimensions::new("G", Some("c".into()), Some("s".into())),
                raw,
                KpiValues { expected_benefit: eb, ..Default::default() },
                attrs,
                seq,
            ),
            rounded_quantity: q,
            provenance: Provenance::SelfSumFallback,
        }
    }

    #[test]
    fn merges_same_key_and_preserves_sums() {
        let rows = vec![
            rl("S1", vec![Some("winter".into())], Some(1.4), 1, None, 0),
            rl("S2", vec![], Some(0.5), 1, Some(0.2), 1),
            rl("S1", vec![Some("winter".into()), Some("winter".into())], Some(2.2), 2, Some(0.9), 2),
        ];
        let total: i64 = rows.iter().map(|r| r.rounded_quantity).sum();
        let (out, merged) = consolidate(rows);
        assert_eq!(merged, 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].line.store_id.as_str(), "S1");
        assert_eq!(out[0].rounded_quantity, 3);
        assert!((out[0].line.raw() - 3.6).abs() < 1e-12);
        // gap filled from the later row
        assert_eq!(out[0].line.kpi_values.expected_benefit, Some(0.9));
        assert_eq!(out.iter().map(|r| r.rounded_quantity).sum::<i64>(), total);
    }

    #[test]
    fn different_tags_stay_separate() {
        let rows = vec![
            rl("S1", vec![Some("winter".into())], Some(1.0), 1, None, 0),
            rl("S1", vec![Some("summer".into())], Some(1.0), 1, None, 1),
        ];
        let (out, merged) = consolidate(rows);
        assert_eq!(merged, 0);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn first_kpi_reading_wins() {
        let rows = vec![
            rl("S1", vec![], Some(1.0), 1, Some(0.1), 0),
            rl("S1", vec![], None, 0, Some(0.8), 1),
        ];
        let (out, _) = consolidate(rows);
        assert_eq!(out[0].line.kpi_values.expected_benefit, Some(0.1));
        assert_eq!(out[0].line.raw_quantity, Some(1.0));
    }
}
