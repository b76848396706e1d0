//! crates/ar_pipeline/src/reconcile.rs
//! Per-group integer reconciliation.
//!
//! Groups are independent once targets are resolved: each task reads its own
//! lines and target and returns fresh `ReconciledLine`s. With `parallel` the
//! groups run on the rayon pool; results are concatenated in canonical group
//! order (then input order within a group) either way.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use ar_algo::allocation::{AllocError, Apportioner};
use ar_core::entities::{AllocationLine, GroupKey};
use ar_core::rounding::round_half_away_from_zero;

use crate::resolve_provenance::{self_sum, Provenance, ResolvedTargets};

/// AllocationLine plus its integer quantity.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconciledLine {
    pub line: AllocationLine,
    pub rounded_quantity: i64,
    pub provenance: Provenance,
}

/// A group that could not be reconciled; excluded from the final table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NonReconcilableGroup {
    pub group_key: GroupKey,
    pub target_int: i64,
    pub provenance: Provenance,
    pub line_count: usize,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub lines: Vec<ReconciledLine>,
    pub non_reconcilable: Vec<NonReconcilableGroup>,
    /// Groups where input order decided the last unit.
    pub tie_broken_groups: usize,
}

enum GroupResult {
    Done { lines: Vec<ReconciledLine>, tie_broken: bool },
    Failed(NonReconcilableGroup),
}

pub fn reconcile(
    lines: &[AllocationLine],
    targets: &ResolvedTargets,
    apportioner: &dyn Apportioner,
    parallel: bool,
) -> ReconcileOutcome {
    let mut groups: BTreeMap<&GroupKey, Vec<&AllocationLine>> = BTreeMap::new();
    for l in lines {
        groups.entry(&l.group_key).or_default().push(l);
    }
    let groups: Vec<(&GroupKey, Vec<&AllocationLine>)> = groups.into_iter().collect();

    let results: Vec<GroupResult> = if parallel {
        groups
            .par_iter()
            .map(|(k, ls)| reconcile_group(k, ls, targets, apportioner))
            .collect()
    } else {
        groups
            .iter()
            .map(|(k, ls)| reconcile_group(k, ls, targets, apportioner))
            .collect()
    };

    let mut out = ReconcileOutcome::default();
    for r in results {
        match r {
            GroupResult::Done { lines, tie_broken } => {
                out.tie_broken_groups += usize::from(tie_broken);
                out.lines.extend(lines);
            }
            GroupResult::Failed(g) => out.non_reconcilable.push(g),
        }
    }

    // Targeted groups that have no lines at all.
    for (key, t) in &targets.targets {
        if t.target_int != 0 && groups.binary_search_by(|(k, _)| (*k).cmp(key)).is_err() {
            out.non_reconcilable.push(NonReconcilableGroup {
                group_key: key.clone(),
                target_int: t.target_int,
                provenance: t.provenance.clone(),
                line_count: 0,
                reason: AllocError::NoLines { target: t.target_int }.to_string(),
            });
        }
    }
    out.non_reconcilable.sort_by(|a, b| a.group_key.cmp(&b.group_key));

    for g in &out.non_reconcilable {
        warn!(group = %g.group_key, target = g.target_int, reason = %g.reason, "non-reconcilable group excluded");
    }
    debug!(
        apportioner = apportioner.name(),
        groups = groups.len(),
        lines = out.lines.len(),
        tie_broken_groups = out.tie_broken_groups,
        parallel,
        "groups reconciled"
    );
    out
}

fn reconcile_group(
    key: &GroupKey,
    lines: &[&AllocationLine],
    targets: &ResolvedTargets,
    apportioner: &dyn Apportioner,
) -> GroupResult {
    let (target_int, provenance) = match targets.get(key) {
        Some(t) => (t.target_int, t.provenance.clone()),
        None => {
            warn!(group = %key, "group has no resolved target; using its own sum");
            (round_half_away_from_zero(self_sum(lines.iter().copied())), Provenance::SelfSumFallback)
        }
    };

    let values: Vec<f64> = lines.iter().map(|l| l.raw()).collect();
    match apportioner.apportion(&values, target_int) {
        Ok(app) => GroupResult::Done {
            lines: lines
                .iter()
                .zip(app.quantities)
                .map(|(l, q)| ReconciledLine {
                    line: (*l).clone(),
                    rounded_quantity: q,
                    provenance: provenance.clone(),
                })
                .collect(),
            tie_broken: app.tie_broken_by_order,
        },
        Err(e) => GroupResult::Failed(NonReconcilableGroup {
            group_key: key.clone(),
            target_int,
            provenance,
            line_count: lines.len(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ar_algo::allocation::LargestRemainder;
    use ar_core::config::EngineConfig;
    use ar_core::entities::{Dimensions, KpiValues};
    use ar_core::ids::SourceName;
    use ar_io::loader::{SourceTargets, TargetEntry};

    use crate::resolve_provenance::resolve_provenance;

    fn line(group: &str, store: &str, raw: f64, seq: usize) -> AllocationLine {
        AllocationLine::new(
            store.parse().unwrap(),
            Dimensions::new(group, Some("c".into()), Some("s".into())),
            Some(raw),
            KpiValues::default(),
            vec![],
            seq,
        )
    }

    fn target(group: &str, v: f64) -> TargetEntry {
        TargetEntry {
            group_name: group.into(),
            category: Some("c".into()),
            subcategory: Some("s".into()),
            tags: vec![],
            target: Some(v),
        }
    }

    fn primary(entries: Vec<TargetEntry>) -> Vec<SourceTargets> {
        vec![SourceTargets { source: SourceName::from_static("primary"), entries }]
    }

    #[test]
    fn scenario_group_reconciles_exactly() {
        let lines = vec![line("G", "S1", 2.6, 0), line("G", "S2", 2.6, 1), line("G", "S3", -1.2, 2)];
        let t = resolve_provenance(&lines, &primary(vec![target("G", 4.0)]), &EngineConfig::default());
        let out = reconcile(&lines, &t, &LargestRemainder, false);
        let q: Vec<i64> = out.lines.iter().map(|r| r.rounded_quantity).collect();
        assert_eq!(q, vec![3, 2, -1]);
        assert_eq!(out.tie_broken_groups, 1);
        assert!(out.non_reconcilable.is_empty());
    }

    #[test]
    fn single_line_group_takes_the_target() {
        let lines = vec![line("G", "S1", 0.3, 0)];
        let t = resolve_provenance(&lines, &primary(vec![target("G", 7.0)]), &EngineConfig::default());
        let out = reconcile(&lines, &t, &LargestRemainder, true);
        assert_eq!(out.lines[0].rounded_quantity, 7);
        assert_eq!(out.lines[0].provenance.as_str(), "primary");
    }

    #[test]
    fn group_without_lines_is_reported() {
        let lines = vec![line("G", "S1", 1.0, 0)];
        let t = resolve_provenance(&lines, &primary(vec![target("G", 1.0), target("Ghost", 5.0), target("Zero", 0.0)]), &EngineConfig::default());
        let out = reconcile(&lines, &t, &LargestRemainder, false);
        assert_eq!(out.non_reconcilable.len(), 1);
        assert_eq!(out.non_reconcilable[0].group_key.group_name(), "Ghost");
        assert_eq!(out.non_reconcilable[0].target_int, 5);
        assert_eq!(out.non_reconcilable[0].line_count, 0);
    }

    #[test]
    fn output_is_grouped_in_canonical_order() {
        let lines = vec![line("B", "S1", 1.0, 0), line("A", "S2", 1.0, 1), line("B", "S3", 1.0, 2)];
        let t = resolve_provenance(&lines, &[], &EngineConfig::default());
        let out = reconcile(&lines, &t, &LargestRemainder, false);
        let stores: Vec<&str> = out.lines.iter().map(|r| r.line.store_id.as_str()).collect();
        assert_eq!(stores, vec!["S2", "S1", "S3"]);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let lines: Vec<AllocationLine> = (0..200)
            .map(|i| line(&format!("G{}", i % 13), &format!("S{i}"), (i as f64 * 0.37).sin() * 9.0, i))
            .collect();
        let t = resolve_provenance(&lines, &[], &EngineConfig::default());
        let a = reconcile(&lines, &t, &LargestRemainder, true);
        let b = reconcile(&lines, &t, &LargestRemainder, false);
        assert_eq!(a, b);
    }
}
