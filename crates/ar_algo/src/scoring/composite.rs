//! Composite priority score from normalized KPI components.
//!
//! `priority = Σ w_k · fill(component_k)` where the capacity component is
//! `suitability = 1 - norm(capacity_utilization)` and `fill(missing) = 0.5`.
//! The result is clipped to `[0, 1]`.

use ar_core::config::KpiWeights;
use ar_core::determinism::canonical_zero;
use ar_core::entities::Kpi;

/// Substitute for a missing normalized component.
pub const NEUTRAL: f64 = 0.5;

/// Normalized readings for one row, indexed in `Kpi::ALL` order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NormalizedKpis(pub [Option<f64>; 4]);

impl NormalizedKpis {
    pub fn get(&self, kpi: Kpi) -> Option<f64> {
        self.0[kpi_index(kpi)]
    }

    pub fn set(&mut self, kpi: Kpi, v: Option<f64>) {
        self.0[kpi_index(kpi)] = v;
    }

    /// The weighted component for `kpi`, before neutral fill.
    pub fn component(&self, kpi: Kpi) -> Option<f64> {
        match kpi {
            Kpi::CapacityUtilization => suitability(self.get(kpi)),
            _ => self.get(kpi),
        }
    }
}

#[inline]
fn kpi_index(kpi: Kpi) -> usize {
    match kpi {
        Kpi::ExpectedBenefit => 0,
        Kpi::ConfidenceScore => 1,
        Kpi::SellThroughImprovement => 2,
        Kpi::CapacityUtilization => 3,
    }
}

/// Lower utilization means higher suitability.
#[inline]
pub fn suitability(norm_capacity: Option<f64>) -> Option<f64> {
    norm_capacity.map(|n| 1.0 - n)
}

/// Weighted composite with per-row neutral fill, clipped to `[0, 1]`.
pub fn composite_score(n: &NormalizedKpis, w: &KpiWeights) -> f64 {
    let raw: f64 = Kpi::ALL
        .iter()
        .map(|&k| w.for_kpi(k) * n.component(k).unwrap_or(NEUTRAL))
        .sum();
    if !raw.is_finite() {
        return NEUTRAL;
    }
    canonical_zero(raw.clamp(0.0, 1.0))
}
