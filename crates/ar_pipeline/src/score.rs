//! crates/ar_pipeline/src/score.rs
//! Dataset-wide KPI normalization followed by per-row composite scoring.
//!
//! Normalization reads the whole reconciled table before any score exists, so
//! this stage is the barrier after the per-group reconciliation fan-out.

use serde::Serialize;
use tracing::debug;

use ar_algo::scoring::{column_stats, composite_score, normalize, ColumnStats, NormalizedKpis};
use ar_core::config::KpiWeights;
use ar_core::entities::Kpi;

use crate::reconcile::ReconciledLine;

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredLine {
    pub reconciled: ReconciledLine,
    pub normalized: NormalizedKpis,
    /// In `[0, 1]`.
    pub priority_score: f64,
}

/// Observed range of one KPI column.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KpiColumnSummary {
    pub kpi: Kpi,
    pub present: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub degenerate: bool,
}

pub fn score(lines: Vec<ReconciledLine>, weights: &KpiWeights) -> (Vec<ScoredLine>, Vec<KpiColumnSummary>) {
    // Barrier: statistics over the full table first.
    let stats: Vec<(Kpi, Option<ColumnStats>)> = Kpi::ALL
        .iter()
        .map(|&k| (k, column_stats(lines.iter().map(|r| r.line.kpi_values.get(k)))))
        .collect();

    let summary: Vec<KpiColumnSummary> = stats
        .iter()
        .map(|(k, s)| KpiColumnSummary {
            kpi: *k,
            present: s.map_or(0, |s| s.present),
            min: s.map(|s| s.min),
            max: s.map(|s| s.max),
            degenerate: s.map_or(false, |s| s.is_degenerate()),
        })
        .collect();

    let scored: Vec<ScoredLine> = lines
        .into_iter()
        .map(|r| {
            let mut n = NormalizedKpis::default();
            for (k, s) in &stats {
                n.set(*k, normalize(r.line.kpi_values.get(*k), s.as_ref()));
            }
            let priority_score = composite_score(&n, weights);
            ScoredLine { reconciled: r, normalized: n, priority_score }
        })
        .collect();

    debug!(
        rows = scored.len(),
        degenerate_columns = summary.iter().filter(|c| c.degenerate).count(),
        "priority scores computed"
    );
    (scored, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ar_core::entities::{AllocationLine, Dimensions, KpiValues};
    use crate::resolve_provenance::Provenance;

    fn rl(eb: Option<f64>, cu: Option<f64>, seq: usize) -> ReconciledLine {
        ReconciledLine {
            line: AllocationLine::new(
                format!("S{seq}").parse().unwrap(),
                Dimensions::new("G", None, None),
                Some(1.0),
                KpiValues { expected_benefit: eb, capacity_utilization: cu, ..Default::default() },
                vec![],
                seq,
            ),
            rounded_quantity: 1,
            provenance: Provenance::SelfSumFallback,
        }
    }

    #[test]
    fn constant_column_normalizes_to_half() {
        let rows = vec![rl(Some(5.0), None, 0), rl(Some(5.0), None, 1), rl(Some(5.0), None, 2)];
        let (scored, summary) = score(rows, &KpiWeights::default());
        for s in &scored {
            assert_eq!(s.normalized.get(Kpi::ExpectedBenefit), Some(0.5));
            // every component neutral
            assert!((s.priority_score - 0.5).abs() < 1e-12);
        }
        assert!(summary[0].degenerate);
        assert_eq!(summary[1].present, 0);
    }

    #[test]
    fn all_missing_everywhere_scores_neutral() {
        let rows = vec![rl(None, None, 0), rl(None, None, 1)];
        let (scored, _) = score(rows, &KpiWeights::default());
        assert!(scored.iter().all(|s| (s.priority_score - 0.5).abs() < 1e-12));
    }

    #[test]
    fn lower_utilization_scores_higher() {
        let rows = vec![rl(Some(1.0), Some(0.9), 0), rl(Some(1.0), Some(0.1), 1)];
        let (scored, _) = score(rows, &KpiWeights::default());
        assert!(scored[1].priority_score > scored[0].priority_score);
        // 0.45*0.5 + 0.25*0.5 + 0.20*0.5 + 0.10*1.0
        assert!((scored[1].priority_score - 0.55).abs() < 1e-12);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let rows: Vec<ReconciledLine> = (0..20).map(|i| rl(Some(i as f64 * 3.0 - 20.0), Some(i as f64), i)).collect();
        let (scored, _) = score(rows, &KpiWeights::default());
        assert!(scored.iter().all(|s| (0.0..=1.0).contains(&s.priority_score)));
    }
}
