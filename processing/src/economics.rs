//! Economic impact estimator – maps grid statistics and field area to a
//! monetary estimate of targeted treatment.
//!
//! Only the infected share of the field is treated; the rest is the
//! saving over blanket spraying.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cropscan_common::config::EconomicRates;
use cropscan_common::geo::FieldBounds;

use crate::stats::GridStats;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomicImpact {
    pub crop_loss_untreated: f64,
    pub treatment_cost: f64,
    pub expected_savings: f64,
    /// Percent.
    pub roi: f64,
    pub affected_area_hectares: f64,
    /// Chemical not sprayed on healthy area compared with blanket spraying.
    #[serde(default)]
    pub chemical_saved_litres: f64,
}

/// Return on investment in percent, guarded against a zero treatment cost.
pub fn roi(expected_savings: f64, treatment_cost: f64) -> f64 {
    if treatment_cost > 0.0 {
        expected_savings / treatment_cost * 100.0
    } else if expected_savings > 0.0 {
        100.0
    } else {
        0.0
    }
}

pub fn estimate(stats: &GridStats, bounds: &FieldBounds, rates: &EconomicRates) -> EconomicImpact {
    let total_area = bounds.area_hectares();
    let affected = total_area * stats.infected_fraction();
    let crop_loss_untreated = affected * rates.loss_rate_per_ha;
    let treatment_cost = affected * rates.treatment_rate_per_ha;
    let expected_savings = crop_loss_untreated - treatment_cost;

    EconomicImpact {
        crop_loss_untreated,
        treatment_cost,
        expected_savings,
        roi: roi(expected_savings, treatment_cost),
        affected_area_hectares: affected,
        chemical_saved_litres: (total_area - affected) * rates.chemical_dose_l_per_ha,
    }
}

// ── legacy payloads ──────────────────────────────────────────────────────

const LOSS_KEYS: &[&str] = &[
    "cropLossUntreated",
    "crop_loss_untreated",
    "estimatedLoss",
    "estimated_loss",
    "potentialLoss",
    "potential_loss",
];
const COST_KEYS: &[&str] = &["treatmentCost", "treatment_cost"];
const SAVINGS_KEYS: &[&str] = &["expectedSavings", "expected_savings", "savings"];
const ROI_KEYS: &[&str] = &["roi", "ROI"];
const AREA_KEYS: &[&str] = &["affectedAreaHectares", "affected_area_hectares", "affectedArea"];
const CHEMICAL_KEYS: &[&str] = &["chemicalSavedLitres", "chemical_saved_litres"];

/// First key present with a numeric (or numeric-string) value.
fn pick(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches(['₹', '$']).replace(',', "").parse().ok(),
        _ => None,
    })
}

impl EconomicImpact {
    /// Normalize an economic payload written by any historical client
    /// version (`estimatedLoss`, `potentialLoss`, `cropLossUntreated`,
    /// numbers sent as strings). Returns `None` when the value carries no
    /// recognizable loss or cost figure.
    pub fn from_legacy(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let loss = pick(obj, LOSS_KEYS);
        let cost = pick(obj, COST_KEYS);
        if loss.is_none() && cost.is_none() {
            return None;
        }
        let crop_loss_untreated = loss.unwrap_or(0.0);
        let treatment_cost = cost.unwrap_or(0.0);
        let expected_savings = pick(obj, SAVINGS_KEYS).unwrap_or(crop_loss_untreated - treatment_cost);

        Some(Self {
            crop_loss_untreated,
            treatment_cost,
            expected_savings,
            roi: pick(obj, ROI_KEYS).unwrap_or_else(|| roi(expected_savings, treatment_cost)),
            affected_area_hectares: pick(obj, AREA_KEYS).unwrap_or(0.0),
            chemical_saved_litres: pick(obj, CHEMICAL_KEYS).unwrap_or(0.0),
        })
    }
}
