//! Min-max normalization of one KPI column with degenerate handling.
//!
//! - `norm(x) = (x - min) / (max - min)` over the present values.
//! - `max == min` (constant or single-valued column) → 0.5 for every present value.
//! - Every value missing → no statistics; every row normalizes to missing.
//! - Missing / non-finite inputs stay missing (callers substitute the neutral value).

/// Observed range of one column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColumnStats {
    pub min: f64,
    pub max: f64,
    pub present: usize,
}

impl ColumnStats {
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.max == self.min
    }
}

/// Min/max over the finite values; `None` when none are present.
pub fn column_stats<I>(values: I) -> Option<ColumnStats>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut stats: Option<ColumnStats> = None;
    for v in values.into_iter().flatten().filter(|v| v.is_finite()) {
        stats = Some(match stats {
            None => ColumnStats { min: v, max: v, present: 1 },
            Some(s) => ColumnStats { min: s.min.min(v), max: s.max.max(v), present: s.present + 1 },
        });
    }
    stats
}

/// Normalize a single reading against the column statistics.
pub fn normalize(x: Option<f64>, stats: Option<&ColumnStats>) -> Option<f64> {
    let (x, s) = match (x.filter(|v| v.is_finite()), stats) {
        (Some(x), Some(s)) => (x, s),
        _ => return None,
    };
    if s.is_degenerate() {
        return Some(0.5);
    }
    let n = (x - s.min) / (s.max - s.min);
    // A range that overflows to infinity cannot be normalized meaningfully.
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize_column(values: &[Option<f64>]) -> Vec<Option<f64>> {
        let stats = column_stats(values.iter().copied());
        values.iter().map(|v| normalize(*v, stats.as_ref())).collect()
    }

    #[test]
    fn spreads_to_unit_interval() {
        let out = normalize_column(&[Some(2.0), Some(4.0), Some(6.0)]);
        assert_eq!(out, vec![Some(0.0), Some(0.5), Some(1.0)]);
    }

    #[test]
    fn constant_column_is_neutral() {
        let out = normalize_column(&[Some(5.0), Some(5.0), None, Some(5.0)]);
        assert_eq!(out, vec![Some(0.5), Some(0.5), None, Some(0.5)]);
    }

    #[test]
    fn single_value_is_neutral() {
        assert_eq!(normalize_column(&[None, Some(-3.0)]), vec![None, Some(0.5)]);
    }

    #[test]
    fn all_missing_stays_missing() {
        assert_eq!(column_stats([None, None]), None);
        assert_eq!(normalize_column(&[None, None]), vec![None, None]);
    }

    #[test]
    fn non_finite_is_ignored_in_stats_and_output() {
        let out = normalize_column(&[Some(f64::NAN), Some(1.0), Some(3.0), Some(f64::INFINITY)]);
        assert_eq!(out, vec![None, Some(0.0), Some(1.0), None]);
    }

    #[test]
    fn negative_ranges_work() {
        let out = normalize_column(&[Some(-10.0), Some(0.0), Some(10.0)]);
        assert_eq!(out, vec![Some(0.0), Some(0.5), Some(1.0)]);
    }
}
