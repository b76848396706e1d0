//! config.rs — Engine configuration with safe defaults and fail-fast validation.
//!
//! Every field has a default so an empty TOML document is a valid config.
//! `EngineConfig::validate` must pass before any data is processed.

use core::fmt;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entities::Kpi;
use crate::ids::SourceName;

/// Tolerance for `Σ weights == 1.0`.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Default epsilon under which two source targets are considered equal.
pub const DEFAULT_MISMATCH_EPSILON: f64 = 1e-9;

/// ------------ Sections ------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvenanceConfig {
    /// Highest-priority source first.
    pub preference: Vec<SourceName>,
    pub epsilon: f64,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            preference: vec![
                SourceName::from_static("primary"),
                SourceName::from_static("secondary"),
            ],
            epsilon: DEFAULT_MISMATCH_EPSILON,
        }
    }
}

/// Composite-score weights. Must be finite, non-negative and sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KpiWeights {
    pub expected_benefit: f64,
    pub confidence_score: f64,
    pub sell_through_improvement: f64,
    /// Applied to `1 - norm(capacity_utilization)`.
    pub suitability: f64,
}

impl Default for KpiWeights {
    fn default() -> Self {
        Self {
            expected_benefit: 0.45,
            confidence_score: 0.25,
            sell_through_improvement: 0.20,
            suitability: 0.10,
        }
    }
}

impl KpiWeights {
    /// Weight applied to the component derived from `kpi`.
    pub fn for_kpi(&self, kpi: Kpi) -> f64 {
        match kpi {
            Kpi::ExpectedBenefit => self.expected_benefit,
            Kpi::ConfidenceScore => self.confidence_score,
            Kpi::SellThroughImprovement => self.sell_through_improvement,
            Kpi::CapacityUtilization => self.suitability,
        }
    }

    pub fn sum(&self) -> f64 {
        Kpi::ALL.iter().map(|k| self.for_kpi(*k)).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub weights: KpiWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Reconcile groups on the rayon pool. Output is identical either way.
    pub parallel: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Descriptive attribute columns, in tag order.
    pub attribute_columns: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            attribute_columns: ["season", "gender", "location", "temperature_band", "fashion_profile"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// ------------ Root ------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub provenance: ProvenanceConfig,
    pub scoring: ScoringConfig,
    pub reconcile: ReconcileConfig,
    pub input: InputConfig,
}

/// -------- Validation --------

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Weights do not sum to 1.0 within tolerance.
    InvalidWeightConfiguration { sum: f64 },
    /// A single weight is negative or non-finite.
    InvalidWeight { kpi: Kpi, value: f64 },
    InvalidEpsilon(f64),
    DuplicatePreference(String),
    InvalidAttributeColumn(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConfigError::*;
        match self {
            InvalidWeightConfiguration { sum } => {
                write!(f, "KPI weights must sum to 1.0 (±{WEIGHT_SUM_TOLERANCE}), got {sum}")
            }
            InvalidWeight { kpi, value } => {
                write!(f, "weight for {kpi} must be finite and non-negative, got {value}")
            }
            InvalidEpsilon(e) => write!(f, "provenance epsilon must be finite and >= 0, got {e}"),
            DuplicatePreference(s) => write!(f, "source listed twice in preference order: {s}"),
            InvalidAttributeColumn(c) => write!(f, "invalid attribute column name: {c:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Validate numeric domains and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.scoring.weights;
        for kpi in Kpi::ALL {
            let v = w.for_kpi(kpi);
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::InvalidWeight { kpi, value: v });
            }
        }
        let sum = w.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvalidWeightConfiguration { sum });
        }

        let eps = self.provenance.epsilon;
        if !eps.is_finite() || eps < 0.0 {
            return Err(ConfigError::InvalidEpsilon(eps));
        }

        let mut seen = BTreeSet::new();
        for s in &self.provenance.preference {
            if !seen.insert(s.as_str()) {
                return Err(ConfigError::DuplicatePreference(s.to_string()));
            }
        }

        let mut cols = BTreeSet::new();
        for c in &self.input.attribute_columns {
            if c.trim().is_empty() || c.trim() != c || !cols.insert(c.as_str()) {
                return Err(ConfigError::InvalidAttributeColumn(c.clone()));
            }
        }

        Ok(())
    }

    /// Rank of `source` in the preference order; unlisted sources rank last.
    pub fn preference_rank(&self, source: &SourceName) -> usize {
        self.provenance
            .preference
            .iter()
            .position(|s| s == source)
            .unwrap_or(usize::MAX)
    }
}
