//! crates/ar_pipeline/src/resolve_provenance.rs
//! Merge per-source group targets into one canonical integer target per group.
//!
//! Rules:
//! - Sources are consulted in preference order; unlisted sources follow, by name.
//! - The first source with a value wins. Every other source whose value differs
//!   by more than `epsilon` yields a `ProvenanceMismatch` record.
//! - A group with lines but no sourced value falls back to `Σ raw_quantity`.
//! - A source listing the same group twice keeps the first entry.
//! - `target_int = round_half_away_from_zero(canonical)`.
//!
//! Never fails; every finding is data.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use ar_core::config::EngineConfig;
use ar_core::entities::{AllocationLine, GroupKey};
use ar_core::ids::SourceName;
use ar_core::rounding::round_half_away_from_zero;
use ar_io::loader::SourceTargets;

pub const SELF_SUM_FALLBACK: &str = "self_sum_fallback";

/// Which resolution path produced a group's target.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Provenance {
    Source(SourceName),
    SelfSumFallback,
}

impl Provenance {
    pub fn as_str(&self) -> &str {
        match self {
            Provenance::Source(s) => s.as_str(),
            Provenance::SelfSumFallback => SELF_SUM_FALLBACK,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Provenance {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Canonical target of one group.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedTarget {
    pub group_key: GroupKey,
    pub target_canonical: f64,
    pub target_int: i64,
    pub provenance: Provenance,
}

/// Two sources disagree on a group's target.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProvenanceMismatch {
    pub group_key: GroupKey,
    pub chosen_source: SourceName,
    pub chosen_value: f64,
    pub other_source: SourceName,
    pub other_value: f64,
}

/// A later entry for a group a source had already listed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DuplicateSourceEntry {
    pub source: SourceName,
    pub group_key: GroupKey,
    pub kept_value: Option<f64>,
    pub ignored_value: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedTargets {
    pub targets: BTreeMap<GroupKey, ResolvedTarget>,
    pub mismatches: Vec<ProvenanceMismatch>,
    pub duplicates: Vec<DuplicateSourceEntry>,
}

impl ResolvedTargets {
    pub fn get(&self, key: &GroupKey) -> Option<&ResolvedTarget> {
        self.targets.get(key)
    }
}

/// Σ raw over the lines of one group (missing raw reads 0.0).
pub fn self_sum<'a, I: IntoIterator<Item = &'a AllocationLine>>(lines: I) -> f64 {
    lines.into_iter().map(AllocationLine::raw).sum()
}

pub fn resolve_provenance(lines: &[AllocationLine], sources: &[SourceTargets], cfg: &EngineConfig) -> ResolvedTargets {
    let mut out = ResolvedTargets::default();

    // Sources in consultation order.
    let mut ordered: Vec<&SourceTargets> = sources.iter().collect();
    ordered.sort_by(|a, b| {
        cfg.preference_rank(&a.source)
            .cmp(&cfg.preference_rank(&b.source))
            .then_with(|| a.source.cmp(&b.source))
    });

    // Per-source first-wins maps.
    let mut per_source: Vec<(&SourceName, BTreeMap<GroupKey, Option<f64>>)> = Vec::with_capacity(ordered.len());
    for st in &ordered {
        let mut m: BTreeMap<GroupKey, Option<f64>> = BTreeMap::new();
        for e in &st.entries {
            let key = e.group_key();
            match m.get(&key) {
                Some(kept) => {
                    warn!(source = %st.source, group = %key, "duplicate target entry ignored");
                    out.duplicates.push(DuplicateSourceEntry {
                        source: st.source.clone(),
                        group_key: key,
                        kept_value: *kept,
                        ignored_value: e.value(),
                    });
                }
                None => {
                    m.insert(key, e.value());
                }
            }
        }
        per_source.push((&st.source, m));
    }

    // Line groups, in canonical order.
    let mut line_groups: BTreeMap<&GroupKey, Vec<&AllocationLine>> = BTreeMap::new();
    for l in lines {
        line_groups.entry(&l.group_key).or_default().push(l);
    }

    // Universe of keys: every line group plus every sourced key.
    let mut keys: Vec<GroupKey> = line_groups.keys().map(|k| (*k).clone()).collect();
    for (_, m) in &per_source {
        keys.extend(m.keys().cloned());
    }
    keys.sort();
    keys.dedup();

    let eps = cfg.provenance.epsilon;
    for key in keys {
        let candidates: Vec<(&SourceName, f64)> = per_source
            .iter()
            .filter_map(|(src, m)| m.get(&key).copied().flatten().map(|v| (*src, v)))
            .collect();

        let (canonical, provenance) = match candidates.first() {
            Some(&(chosen_src, chosen_v)) => {
                for &(other_src, other_v) in &candidates[1..] {
                    if (other_v - chosen_v).abs() > eps {
                        warn!(
                            group = %key,
                            chosen = %chosen_src,
                            chosen_value = chosen_v,
                            other = %other_src,
                            other_value = other_v,
                            "target mismatch between sources"
                        );
                        out.mismatches.push(ProvenanceMismatch {
                            group_key: key.clone(),
                            chosen_source: chosen_src.clone(),
                            chosen_value: chosen_v,
                            other_source: other_src.clone(),
                            other_value: other_v,
                        });
                    }
                }
                (chosen_v, Provenance::Source(chosen_src.clone()))
            }
            None => match line_groups.get(&key) {
                Some(ls) => (self_sum(ls.iter().copied()), Provenance::SelfSumFallback),
                // Sourced key without any value and without lines: nothing to reconcile.
                None => continue,
            },
        };

        out.targets.insert(
            key.clone(),
            ResolvedTarget {
                group_key: key,
                target_canonical: canonical,
                target_int: round_half_away_from_zero(canonical),
                provenance,
            },
        );
    }

    debug!(
        groups = out.targets.len(),
        mismatches = out.mismatches.len(),
        duplicates = out.duplicates.len(),
        "provenance resolved"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ar_core::entities::{Dimensions, KpiValues};
    use ar_io::loader::TargetEntry;

    fn line(store: &str, raw: f64, seq: usize) -> AllocationLine {
        AllocationLine::new(
            store.parse().unwrap(),
            Dimensions::new("G1", Some("Shoes".into()), Some("Boots".into())),
            Some(raw),
            KpiValues::default(),
            vec![],
            seq,
        )
    }

    fn entry(target: Option<f64>) -> TargetEntry {
        TargetEntry {
            group_name: "G1".into(),
            category: Some("Shoes".into()),
            subcategory: Some("Boots".into()),
            tags: vec![],
            target,
        }
    }

    fn src(name: &'static str, entries: Vec<TargetEntry>) -> SourceTargets {
        SourceTargets { source: SourceName::from_static(name), entries }
    }

    #[test]
    fn preferred_source_wins_and_mismatch_is_recorded() {
        let lines = vec![line("S1", 4.0, 0)];
        // listed out of preference order on purpose
        let sources = vec![src("secondary", vec![entry(Some(12.0))]), src("primary", vec![entry(Some(10.0))])];
        let r = resolve_provenance(&lines, &sources, &EngineConfig::default());
        let t = r.get(&lines[0].group_key).unwrap();
        assert_eq!(t.target_canonical, 10.0);
        assert_eq!(t.target_int, 10);
        assert_eq!(t.provenance.as_str(), "primary");
        assert_eq!(r.mismatches.len(), 1);
        let m = &r.mismatches[0];
        assert_eq!((m.chosen_source.as_str(), m.chosen_value), ("primary", 10.0));
        assert_eq!((m.other_source.as_str(), m.other_value), ("secondary", 12.0));
    }

    #[test]
    fn differences_within_epsilon_are_not_mismatches() {
        let lines = vec![line("S1", 1.0, 0)];
        let sources = vec![src("primary", vec![entry(Some(10.0))]), src("secondary", vec![entry(Some(10.0 + 1e-12))])];
        let r = resolve_provenance(&lines, &sources, &EngineConfig::default());
        assert!(r.mismatches.is_empty());
    }

    #[test]
    fn missing_preferred_value_falls_through_to_next_source() {
        let lines = vec![line("S1", 1.0, 0)];
        let sources = vec![src("primary", vec![entry(None)]), src("secondary", vec![entry(Some(7.4))])];
        let r = resolve_provenance(&lines, &sources, &EngineConfig::default());
        let t = r.get(&lines[0].group_key).unwrap();
        assert_eq!(t.provenance.as_str(), "secondary");
        assert_eq!(t.target_int, 7);
        assert!(r.mismatches.is_empty());
    }

    #[test]
    fn no_source_falls_back_to_self_sum() {
        let lines = vec![line("S1", 2.6, 0), line("S2", 2.6, 1), line("S3", -1.2, 2)];
        let r = resolve_provenance(&lines, &[], &EngineConfig::default());
        let t = r.get(&lines[0].group_key).unwrap();
        assert_eq!(t.provenance, Provenance::SelfSumFallback);
        assert_eq!(t.target_int, 4);
        assert_eq!(serde_json::to_value(&t.provenance).unwrap(), "self_sum_fallback");
    }

    #[test]
    fn half_targets_round_away_from_zero() {
        let lines = vec![line("S1", 0.0, 0)];
        let r = resolve_provenance(&lines, &[src("primary", vec![entry(Some(-2.5))])], &EngineConfig::default());
        assert_eq!(r.get(&lines[0].group_key).unwrap().target_int, -3);
    }

    #[test]
    fn unlisted_sources_rank_after_listed_ones_by_name() {
        let lines = vec![line("S1", 0.0, 0)];
        let sources = vec![
            src("zeta", vec![entry(Some(3.0))]),
            src("alpha", vec![entry(Some(2.0))]),
            src("secondary", vec![entry(Some(1.0))]),
        ];
        let r = resolve_provenance(&lines, &sources, &EngineConfig::default());
        assert_eq!(r.get(&lines[0].group_key).unwrap().provenance.as_str(), "secondary");
        let others: Vec<&str> = r.mismatches.iter().map(|m| m.other_source.as_str()).collect();
        assert_eq!(others, vec!["alpha", "zeta"]);
    }

    #[test]
    fn duplicate_entries_keep_the_first() {
        let lines = vec![line("S1", 0.0, 0)];
        let sources = vec![src("primary", vec![entry(Some(5.0)), entry(Some(9.0))])];
        let r = resolve_provenance(&lines, &sources, &EngineConfig::default());
        assert_eq!(r.get(&lines[0].group_key).unwrap().target_int, 5);
        assert_eq!(r.duplicates.len(), 1);
        assert_eq!(r.duplicates[0].ignored_value, Some(9.0));
    }

    #[test]
    fn targets_without_lines_are_kept_for_reporting() {
        let mut e = entry(Some(6.0));
        e.group_name = "Ghost".into();
        let r = resolve_provenance(&[], &[src("primary", vec![e.clone()])], &EngineConfig::default());
        assert_eq!(r.get(&e.group_key()).unwrap().target_int, 6);
    }
}
