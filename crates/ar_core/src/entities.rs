//! Domain entities shared by every stage.
//!
//! An `AllocationLine` is created once per engine invocation from upstream
//! input and never mutated afterwards; later stages wrap it in derived views.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::StoreId;

/* -------------------------------------------------------------------------- */
/*                                    KPIs                                    */
/* -------------------------------------------------------------------------- */

/// The KPI columns consumed by priority scoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kpi {
    ExpectedBenefit,
    ConfidenceScore,
    SellThroughImprovement,
    CapacityUtilization,
}

impl Kpi {
    /// Column order used for loading, normalization and reporting.
    pub const ALL: [Kpi; 4] = [
        Kpi::ExpectedBenefit,
        Kpi::ConfidenceScore,
        Kpi::SellThroughImprovement,
        Kpi::CapacityUtilization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kpi::ExpectedBenefit => "expected_benefit",
            Kpi::ConfidenceScore => "confidence_score",
            Kpi::SellThroughImprovement => "sell_through_improvement",
            Kpi::CapacityUtilization => "capacity_utilization",
        }
    }
}

impl fmt::Display for Kpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional KPI readings for one line (missing-at-random).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiValues {
    #[serde(default)]
    pub expected_benefit: Option<f64>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub sell_through_improvement: Option<f64>,
    #[serde(default)]
    pub capacity_utilization: Option<f64>,
}

impl KpiValues {
    /// Reading for `kpi`; non-finite values read as missing.
    pub fn get(&self, kpi: Kpi) -> Option<f64> {
        let v = match kpi {
            Kpi::ExpectedBenefit => self.expected_benefit,
            Kpi::ConfidenceScore => self.confidence_score,
            Kpi::SellThroughImprovement => self.sell_through_improvement,
            Kpi::CapacityUtilization => self.capacity_utilization,
        };
        v.filter(|x| x.is_finite())
    }

    pub fn set(&mut self, kpi: Kpi, value: Option<f64>) {
        let slot = match kpi {
            Kpi::ExpectedBenefit => &mut self.expected_benefit,
            Kpi::ConfidenceScore => &mut self.confidence_score,
            Kpi::SellThroughImprovement => &mut self.sell_through_improvement,
            Kpi::CapacityUtilization => &mut self.capacity_utilization,
        };
        *slot = value;
    }

    /// Keep `self` where present, take `other` where `self` is missing.
    pub fn filled_from(&self, other: &KpiValues) -> KpiValues {
        let mut out = *self;
        for kpi in Kpi::ALL {
            if out.get(kpi).is_none() {
                out.set(kpi, other.get(kpi));
            }
        }
        out
    }
}

/* -------------------------------------------------------------------------- */
/*                              Group dimensions                              */
/* -------------------------------------------------------------------------- */

/// Raw dimension values of a line as supplied upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub group_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
}

impl Dimensions {
    pub fn new(group_name: impl Into<String>, category: Option<String>, subcategory: Option<String>) -> Self {
        Self {
            group_name: group_name.into(),
            category: clean_opt(category),
            subcategory: clean_opt(subcategory),
        }
    }
}

/// Composite key over which totals reconcile.
///
/// `Dimensional` requires both category and subcategory; otherwise the key
/// falls back to `(group_name, tag-set)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupKey {
    Dimensional {
        group_name: String,
        category: String,
        subcategory: String,
    },
    Fallback {
        group_name: String,
        tags: Vec<String>,
    },
}

impl GroupKey {
    /// Derive the key for a line (or a target entry) from its dimensions and tag-set.
    pub fn derive(dims: &Dimensions, tags: &[String]) -> Self {
        match (&dims.category, &dims.subcategory) {
            (Some(c), Some(s)) => GroupKey::Dimensional {
                group_name: dims.group_name.clone(),
                category: c.clone(),
                subcategory: s.clone(),
            },
            _ => GroupKey::Fallback {
                group_name: dims.group_name.clone(),
                tags: tags.to_vec(),
            },
        }
    }

    pub fn group_name(&self) -> &str {
        match self {
            GroupKey::Dimensional { group_name, .. } | GroupKey::Fallback { group_name, .. } => group_name,
        }
    }

    /// Label used in instructions: `category/subcategory` or the group name.
    pub fn dims_label(&self) -> String {
        match self {
            GroupKey::Dimensional { category, subcategory, .. } => format!("{category}/{subcategory}"),
            GroupKey::Fallback { group_name, .. } => group_name.clone(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Dimensional { group_name, category, subcategory } => {
                write!(f, "{group_name}/{category}/{subcategory}")
            }
            GroupKey::Fallback { group_name, tags } => write!(f, "{group_name}[{}]", tags.join("|")),
        }
    }
}

/* -------------------------------------------------------------------------- */
/*                                   Lines                                    */
/* -------------------------------------------------------------------------- */

/// One candidate recommendation row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub store_id: StoreId,
    pub dimensions: Dimensions,
    pub group_key: GroupKey,
    /// Fractional delta from upstream. `None` when the source cell was empty.
    pub raw_quantity: Option<f64>,
    pub kpi_values: KpiValues,
    pub descriptive_attributes: Vec<Option<String>>,
    /// Position in the input table; the tie-breaker of last resort.
    pub seq: usize,
}

impl AllocationLine {
    pub fn new(
        store_id: StoreId,
        dimensions: Dimensions,
        raw_quantity: Option<f64>,
        kpi_values: KpiValues,
        descriptive_attributes: Vec<Option<String>>,
        seq: usize,
    ) -> Self {
        let descriptive_attributes: Vec<Option<String>> =
            descriptive_attributes.into_iter().map(clean_opt).collect();
        let tags = tag_bundle(&descriptive_attributes);
        let group_key = GroupKey::derive(&dimensions, &tags);
        Self {
            store_id,
            dimensions,
            group_key,
            raw_quantity,
            kpi_values,
            descriptive_attributes,
            seq,
        }
    }

    /// Raw quantity with missing / non-finite read as 0.0.
    #[inline]
    pub fn raw(&self) -> f64 {
        self.raw_quantity.filter(|x| x.is_finite()).unwrap_or(0.0)
    }

    pub fn tag_bundle(&self) -> Vec<String> {
        tag_bundle(&self.descriptive_attributes)
    }
}

/// Ordered, de-duplicated, non-missing attribute values (first occurrence wins).
pub fn tag_bundle(attrs: &[Option<String>]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(attrs.len());
    for a in attrs.iter().flatten() {
        let t = a.trim();
        if t.is_empty() {
            continue;
        }
        if !out.iter().any(|seen| seen == t) {
            out.push(t.to_string());
        }
    }
    out
}

/// Blank strings are missing values.
fn clean_opt(v: Option<String>) -> Option<String> {
    v.and_then(|s| {
        let t = s.trim();
        if t.is_empty() { None } else { Some(t.to_string()) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> StoreId {
        s.parse().unwrap()
    }

    #[test]
    fn tag_bundle_drops_missing_and_dedups_in_order() {
        let attrs = vec![
            Some("winter".to_string()),
            None,
            Some("women".to_string()),
            Some("winter".to_string()),
            Some("  ".to_string()),
            Some("urban".to_string()),
        ];
        assert_eq!(tag_bundle(&attrs), vec!["winter", "women", "urban"]);
        assert!(tag_bundle(&[None, None]).is_empty());
    }

    #[test]
    fn key_is_dimensional_only_with_both_levels() {
        let d = Dimensions::new("G1", Some("Shoes".into()), Some("Boots".into()));
        assert!(matches!(GroupKey::derive(&d, &[]), GroupKey::Dimensional { .. }));

        let d = Dimensions::new("G1", Some("Shoes".into()), None);
        let k = GroupKey::derive(&d, &["winter".to_string()]);
        assert_eq!(
            k,
            GroupKey::Fallback { group_name: "G1".into(), tags: vec!["winter".into()] }
        );
        assert_eq!(k.dims_label(), "G1");
    }

    #[test]
    fn blank_dimensions_are_missing() {
        let d = Dimensions::new("G1", Some(" ".into()), Some("Boots".into()));
        assert_eq!(d.category, None);
    }

    #[test]
    fn lines_share_fallback_group_iff_tags_match() {
        let dims = Dimensions::new("G2", None, None);
        let a = AllocationLine::new(sid("S1"), dims.clone(), Some(1.0), KpiValues::default(), vec![Some("a".into()), Some("b".into())], 0);
        let b = AllocationLine::new(sid("S2"), dims.clone(), Some(1.0), KpiValues::default(), vec![Some("a".into()), None, Some("b".into()), Some("a".into())], 1);
        let c = AllocationLine::new(sid("S3"), dims, Some(1.0), KpiValues::default(), vec![Some("b".into()), Some("a".into())], 2);
        assert_eq!(a.group_key, b.group_key);
        assert_ne!(a.group_key, c.group_key);
    }

    #[test]
    fn non_finite_kpi_reads_missing() {
        let mut k = KpiValues::default();
        k.set(Kpi::ConfidenceScore, Some(f64::NAN));
        assert_eq!(k.get(Kpi::ConfidenceScore), None);
        k.set(Kpi::ConfidenceScore, Some(0.7));
        assert_eq!(k.get(Kpi::ConfidenceScore), Some(0.7));
    }

    #[test]
    fn fill_prefers_existing_values() {
        let a = KpiValues { expected_benefit: Some(1.0), ..Default::default() };
        let b = KpiValues { expected_benefit: Some(9.0), confidence_score: Some(0.3), ..Default::default() };
        let m = a.filled_from(&b);
        assert_eq!(m.expected_benefit, Some(1.0));
        assert_eq!(m.confidence_score, Some(0.3));
        assert_eq!(m.capacity_utilization, None);
    }

    #[test]
    fn missing_raw_reads_zero() {
        let l = AllocationLine::new(sid("S1"), Dimensions::new("G", None, None), None, KpiValues::default(), vec![], 0);
        assert_eq!(l.raw(), 0.0);
    }
}
