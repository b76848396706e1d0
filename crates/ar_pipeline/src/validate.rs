//! crates/ar_pipeline/src/validate.rs
//! Post-hoc invariant checks over the final table. Reads only; never mutates.
//!
//! Fatal checks (any failure blocks publication):
//! - `group_sum_check`: Σ rounded per group == `target_int`
//! - `integer_type_check`: `target_quantity` is whole and equals `rounded_quantity`
//! - `duplicate_key_check`: `(store_id, group_key, tag_bundle)` is unique
//!
//! Informational: missing-field counts over the input lines, plus the
//! provenance audit carried through from resolution.

use std::collections::BTreeMap;

use serde::Serialize;

use ar_core::entities::{AllocationLine, GroupKey, Kpi};
use ar_core::ids::StoreId;
use ar_core::rounding::is_whole;

use crate::build_result::FinalLine;
use crate::resolve_provenance::{DuplicateSourceEntry, ProvenanceMismatch, ResolvedTargets};

/// Issue severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// One finding, flattened for logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
}

/* ------------------------------ Check shapes ------------------------------ */

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Check<T> {
    pub passed: bool,
    pub violations: Vec<T>,
}

impl<T> Check<T> {
    fn from_violations(violations: Vec<T>) -> Self {
        Self { passed: violations.is_empty(), violations }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupSumViolation {
    pub group_key: GroupKey,
    /// `None` when the group has no canonical target.
    pub expected: Option<i64>,
    pub actual: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntegerTypeViolation {
    pub row: usize,
    pub store_id: StoreId,
    pub rounded_quantity: i64,
    pub target_quantity: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DuplicateKey {
    pub store_id: StoreId,
    pub group_key: GroupKey,
    pub tag_bundle: Vec<String>,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MissingFieldCount {
    pub field: &'static str,
    pub missing: usize,
}

/// QA report. Field order is the published key order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QaReport {
    pub passed: bool,
    pub group_sum_check: Check<GroupSumViolation>,
    pub integer_type_check: Check<IntegerTypeViolation>,
    pub duplicate_key_check: Check<DuplicateKey>,
    pub missing_required_field_report: Vec<MissingFieldCount>,
    pub provenance_mismatches: Vec<ProvenanceMismatch>,
    pub duplicate_source_entries: Vec<DuplicateSourceEntry>,
    pub consolidated_rows: usize,
    pub non_reconcilable_groups: usize,
    /// Set only once the table is cleared for publication.
    pub table_sha256: Option<String>,
}

/// Counters gathered upstream of the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuditCounts {
    pub consolidated_rows: usize,
    pub non_reconcilable_groups: usize,
}

pub fn validate(
    input_lines: &[AllocationLine],
    targets: &ResolvedTargets,
    rows: &[FinalLine],
    audit: AuditCounts,
) -> QaReport {
    let group_sum_check = Check::from_violations(check_group_sums(rows, targets));
    let integer_type_check = Check::from_violations(check_integer_types(rows));
    let duplicate_key_check = Check::from_violations(check_duplicate_keys(rows));

    QaReport {
        passed: group_sum_check.passed && integer_type_check.passed && duplicate_key_check.passed,
        group_sum_check,
        integer_type_check,
        duplicate_key_check,
        missing_required_field_report: missing_field_report(input_lines),
        provenance_mismatches: targets.mismatches.clone(),
        duplicate_source_entries: targets.duplicates.clone(),
        consolidated_rows: audit.consolidated_rows,
        non_reconcilable_groups: audit.non_reconcilable_groups,
        table_sha256: None,
    }
}

impl QaReport {
    /// All findings, errors first, then by code and message.
    pub fn issues(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for v in &self.group_sum_check.violations {
            let message = match v.expected {
                Some(e) => format!("group {} sums to {} but target is {e}", v.group_key, v.actual),
                None => format!("group {} has rows but no canonical target", v.group_key),
            };
            issues.push(ValidationIssue { severity: Severity::Error, code: "Qa.GroupSum", message });
        }
        for v in &self.integer_type_check.violations {
            issues.push(ValidationIssue {
                severity: Severity::Error,
                code: "Qa.IntegerType",
                message: format!(
                    "row {} ({}): target_quantity {} does not equal rounded_quantity {}",
                    v.row, v.store_id, v.target_quantity, v.rounded_quantity
                ),
            });
        }
        for d in &self.duplicate_key_check.violations {
            issues.push(ValidationIssue {
                severity: Severity::Error,
                code: "Qa.DuplicateKey",
                message: format!("{} rows share store {} in group {} [{}]", d.count, d.store_id, d.group_key, d.tag_bundle.join("|")),
            });
        }
        for m in &self.provenance_mismatches {
            issues.push(ValidationIssue {
                severity: Severity::Warning,
                code: "Provenance.Mismatch",
                message: format!(
                    "group {}: {}={} chosen over {}={}",
                    m.group_key, m.chosen_source, m.chosen_value, m.other_source, m.other_value
                ),
            });
        }
        for d in &self.duplicate_source_entries {
            issues.push(ValidationIssue {
                severity: Severity::Warning,
                code: "Provenance.DuplicateEntry",
                message: format!("source {} lists group {} more than once", d.source, d.group_key),
            });
        }
        sort_issues_stably(&mut issues);
        issues
    }
}

fn sort_issues_stably(issues: &mut [ValidationIssue]) {
    issues.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.code.cmp(b.code))
            .then_with(|| a.message.cmp(&b.message))
    });
}

/* --------------------------------- Checks --------------------------------- */

fn check_group_sums(rows: &[FinalLine], targets: &ResolvedTargets) -> Vec<GroupSumViolation> {
    let mut sums: BTreeMap<&GroupKey, i128> = BTreeMap::new();
    for r in rows {
        *sums.entry(&r.group_key).or_insert(0) += i128::from(r.rounded_quantity);
    }

    let mut out = Vec::new();
    for (key, sum) in sums {
        let actual = i64::try_from(sum).unwrap_or(if sum < 0 { i64::MIN } else { i64::MAX });
        match targets.get(key) {
            Some(t) if i128::from(t.target_int) == sum => {}
            Some(t) => out.push(GroupSumViolation { group_key: key.clone(), expected: Some(t.target_int), actual }),
            None => out.push(GroupSumViolation { group_key: key.clone(), expected: None, actual }),
        }
    }
    out
}

fn check_integer_types(rows: &[FinalLine]) -> Vec<IntegerTypeViolation> {
    rows.iter()
        .enumerate()
        .filter(|(_, r)| !(is_whole(r.target_quantity) && r.target_quantity == r.rounded_quantity as f64))
        .map(|(i, r)| IntegerTypeViolation {
            row: i,
            store_id: r.store_id.clone(),
            rounded_quantity: r.rounded_quantity,
            target_quantity: r.target_quantity,
        })
        .collect()
}

fn check_duplicate_keys(rows: &[FinalLine]) -> Vec<DuplicateKey> {
    let mut counts: BTreeMap<(&StoreId, &GroupKey, &[String]), usize> = BTreeMap::new();
    for r in rows {
        *counts.entry((&r.store_id, &r.group_key, r.tag_bundle.as_slice())).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|((s, g, t), count)| DuplicateKey {
            store_id: s.clone(),
            group_key: g.clone(),
            tag_bundle: t.to_vec(),
            count,
        })
        .collect()
}

fn count_where(lines: &[AllocationLine], pred: impl Fn(&AllocationLine) -> bool) -> usize {
    lines.iter().filter(|l| pred(l)).count()
}

/// Missing counts per required field over the input lines.
pub fn missing_field_report(lines: &[AllocationLine]) -> Vec<MissingFieldCount> {
    // Blank store ids are rejected at load time.
    let mut out = vec![
        MissingFieldCount { field: "store_id", missing: 0 },
        MissingFieldCount { field: "category", missing: count_where(lines, |l| l.dimensions.category.is_none()) },
        MissingFieldCount { field: "subcategory", missing: count_where(lines, |l| l.dimensions.subcategory.is_none()) },
        MissingFieldCount {
            field: "raw_quantity",
            missing: count_where(lines, |l| !l.raw_quantity.is_some_and(f64::is_finite)),
        },
    ];
    for kpi in Kpi::ALL {
        out.push(MissingFieldCount {
            field: kpi.as_str(),
            missing: count_where(lines, |l| !l.kpi_values.get(kpi).is_some_and(f64::is_finite)),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ar_core::entities::{Dimensions, KpiValues};
    use ar_core::config::EngineConfig;

    use crate::resolve_provenance::resolve_provenance;
    use crate::tag::Action;

    fn input(store: &str, raw: Option<f64>, cat: Option<&str>) -> AllocationLine {
        AllocationLine::new(
            store.parse().unwrap(),
            Dimensions::new("G", cat.map(String::from), Some("s".into())),
            raw,
            KpiValues { expected_benefit: Some(0.3), ..Default::default() },
            vec![],
            0,
        )
    }

    fn row(line: &AllocationLine, q: i64) -> FinalLine {
        FinalLine {
            store_id: line.store_id.clone(),
            group_name: line.dimensions.group_name.clone(),
            category: line.dimensions.category.clone(),
            subcategory: line.dimensions.subcategory.clone(),
            group_key: line.group_key.clone(),
            raw_quantity: line.raw_quantity,
            rounded_quantity: q,
            target_quantity: q as f64,
            priority_score: 0.5,
            action: Action::from_quantity(q),
            instruction: String::new(),
            tag_bundle: line.tag_bundle(),
            action_rank: 1,
            quantity_source_provenance: "self_sum_fallback".into(),
        }
    }

    #[test]
    fn clean_table_passes() {
        let lines = vec![input("S1", Some(1.4), Some("c")), input("S2", Some(1.4), Some("c"))];
        let t = resolve_provenance(&lines, &[], &EngineConfig::default());
        let rows = vec![row(&lines[0], 2), row(&lines[1], 1)];
        let qa = validate(&lines, &t, &rows, AuditCounts::default());
        assert!(qa.passed);
        assert!(qa.issues().is_empty());
    }

    #[test]
    fn sum_drift_is_fatal() {
        let lines = vec![input("S1", Some(1.4), Some("c")), input("S2", Some(1.4), Some("c"))];
        let t = resolve_provenance(&lines, &[], &EngineConfig::default());
        let rows = vec![row(&lines[0], 1), row(&lines[1], 1)];
        let qa = validate(&lines, &t, &rows, AuditCounts::default());
        assert!(!qa.passed);
        assert_eq!(qa.group_sum_check.violations[0].expected, Some(3));
        assert_eq!(qa.group_sum_check.violations[0].actual, 2);
        assert_eq!(qa.issues()[0].code, "Qa.GroupSum");
    }

    #[test]
    fn untargeted_group_is_fatal() {
        let lines = vec![input("S1", Some(1.0), Some("c"))];
        let rows = vec![row(&lines[0], 1)];
        let qa = validate(&lines, &ResolvedTargets::default(), &rows, AuditCounts::default());
        assert!(!qa.group_sum_check.passed);
        assert_eq!(qa.group_sum_check.violations[0].expected, None);
    }

    #[test]
    fn fractional_target_quantity_is_fatal() {
        let lines = vec![input("S1", Some(1.0), Some("c"))];
        let t = resolve_provenance(&lines, &[], &EngineConfig::default());
        let mut r = row(&lines[0], 1);
        r.target_quantity = 1.5;
        let qa = validate(&lines, &t, &[r], AuditCounts::default());
        assert!(!qa.integer_type_check.passed);
        assert!(qa.group_sum_check.passed);
    }

    #[test]
    fn duplicate_keys_are_fatal() {
        let lines = vec![input("S1", Some(1.0), Some("c")), input("S1", Some(1.0), Some("c"))];
        let t = resolve_provenance(&lines, &[], &EngineConfig::default());
        let rows = vec![row(&lines[0], 1), row(&lines[1], 1)];
        let qa = validate(&lines, &t, &rows, AuditCounts::default());
        assert!(!qa.passed);
        assert_eq!(qa.duplicate_key_check.violations[0].count, 2);
    }

    #[test]
    fn missing_fields_are_counted() {
        let lines = vec![input("S1", None, None), input("S2", Some(1.0), Some("c"))];
        let report = missing_field_report(&lines);
        let get = |f: &str| report.iter().find(|m| m.field == f).map(|m| m.missing);
        assert_eq!(get("store_id"), Some(0));
        assert_eq!(get("category"), Some(1));
        assert_eq!(get("subcategory"), Some(0));
        assert_eq!(get("raw_quantity"), Some(1));
        assert_eq!(get("expected_benefit"), Some(0));
        assert_eq!(get("capacity_utilization"), Some(2));
        assert_eq!(report.len(), 8);
    }
}
