//! Dynamic Yield Risk Score (DYRS) calculation
//!
//! Global invariants enforced:
//! - Deterministic risk calculations
//! - `final_score` always lies in [0, 100]
//! - Only the aggregate is clamped; components are reported as computed
//!
//! Composition:
//! DYRS = clamp(base + yield_index_points - anomaly_penalty - volatility_penalty, 0, 100)

use crate::error::{ensure_finite, RiskError};
use serde::{Deserialize, Serialize};

/// Neutral starting score
pub const DEFAULT_BASE_SCORE: f64 = 50.0;

/// Relative yield deviation at which the yield term saturates (+/- 20%)
pub const YIELD_DEVIATION_CAP: f64 = 0.20;

/// Points per unit of relative deviation (0.20 * 300 = 60)
pub const YIELD_POINTS_SCALE: f64 = 300.0;

/// NDVI z-score at or below which stress is severe
pub const SEVERE_STRESS_Z: f64 = -2.0;

/// NDVI z-score at or below which stress is minor
pub const MINOR_STRESS_Z: f64 = -1.0;

/// Points deducted for severe vegetation stress
pub const SEVERE_STRESS_PENALTY: f64 = 30.0;

/// Points deducted for minor vegetation stress
pub const MINOR_STRESS_PENALTY: f64 = 15.0;

/// Penalty points per unit of coefficient of variation (CV 0.40 => 10 points)
pub const VOLATILITY_SCALE: f64 = 25.0;

/// Lower bound of the final score
pub const MIN_SCORE: f64 = 0.0;

/// Upper bound of the final score
pub const MAX_SCORE: f64 = 100.0;

/// Anomaly tiers, most severe first. The first entry whose threshold is
/// >= the z-score wins.
const ANOMALY_PENALTIES: [(f64, f64); 2] = [
    (SEVERE_STRESS_Z, SEVERE_STRESS_PENALTY),
    (MINOR_STRESS_Z, MINOR_STRESS_PENALTY),
];

/// Inputs to a single DYRS computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskInputs {
    pub predicted_yield: f64,
    pub historical_avg_yield: f64,
    pub historical_yield_cv: f64,
    pub ndvi_z_score: f64,
    #[serde(default = "default_base_score")]
    pub base_score: f64,
}

fn default_base_score() -> f64 {
    DEFAULT_BASE_SCORE
}

impl RiskInputs {
    /// Build inputs with the default base score
    pub fn new(
        predicted_yield: f64,
        historical_avg_yield: f64,
        historical_yield_cv: f64,
        ndvi_z_score: f64,
    ) -> Self {
        RiskInputs {
            predicted_yield,
            historical_avg_yield,
            historical_yield_cv,
            ndvi_z_score,
            base_score: DEFAULT_BASE_SCORE,
        }
    }

    pub fn with_base_score(mut self, base_score: f64) -> Self {
        self.base_score = base_score;
        self
    }

    /// Validate inputs before any arithmetic happens
    pub fn validate(&self) -> Result<(), RiskError> {
        ensure_finite("predicted_yield", self.predicted_yield)?;
        ensure_finite("historical_avg_yield", self.historical_avg_yield)?;
        ensure_finite("historical_yield_cv", self.historical_yield_cv)?;
        ensure_finite("ndvi_z_score", self.ndvi_z_score)?;
        ensure_finite("base_score", self.base_score)?;

        if self.historical_avg_yield == 0.0 {
            return Err(RiskError::invalid(
                "historical_avg_yield",
                "must be non-zero (relative deviation is undefined)",
            ));
        }
        if self.historical_yield_cv < 0.0 {
            return Err(RiskError::invalid(
                "historical_yield_cv",
                format!("must be non-negative (got {})", self.historical_yield_cv),
            ));
        }
        Ok(())
    }
}

/// Itemized DYRS result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RiskBreakdown {
    pub yield_index_points: f64,
    pub anomaly_penalty: f64,
    pub volatility_penalty: f64,
    pub final_score: f64,
}

/// Risk tier classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    LowRisk,      // >= 75
    ModerateRisk, // 50-75
    HighRisk,     // < 50
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::LowRisk => "LOW_RISK",
            RiskTier::ModerateRisk => "MODERATE_RISK",
            RiskTier::HighRisk => "HIGH_RISK",
        }
    }

    /// Human-readable label used in explanations
    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::LowRisk => "Low Risk",
            RiskTier::ModerateRisk => "Moderate Risk",
            RiskTier::HighRisk => "High Risk",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configurable tier thresholds (inclusive lower bounds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierThresholds {
    pub low_risk: f64,
    pub moderate_risk: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        TierThresholds {
            low_risk: 75.0,
            moderate_risk: 50.0,
        }
    }
}

/// Yield accuracy points: clamp(relative deviation, -0.20, 0.20) * 300
///
/// Caller guarantees `historical_avg_yield != 0`.
pub fn yield_index_points(predicted_yield: f64, historical_avg_yield: f64) -> f64 {
    let deviation = (predicted_yield - historical_avg_yield) / historical_avg_yield;
    deviation.clamp(-YIELD_DEVIATION_CAP, YIELD_DEVIATION_CAP) * YIELD_POINTS_SCALE
}

/// Step penalty for real-time vegetation stress
pub fn anomaly_penalty(ndvi_z_score: f64) -> f64 {
    ANOMALY_PENALTIES
        .iter()
        .find(|(threshold, _)| ndvi_z_score <= *threshold)
        .map(|(_, penalty)| *penalty)
        .unwrap_or(0.0)
}

/// Linear penalty for historically erratic yields (uncapped)
pub fn volatility_penalty(historical_yield_cv: f64) -> f64 {
    historical_yield_cv * VOLATILITY_SCALE
}

/// Compute the DYRS breakdown
///
/// Fails with `InvalidInput` when `historical_avg_yield` is zero, the CV is
/// negative, any input is non-finite, or a component overflows. No partial
/// result is produced.
pub fn compute_risk_score(inputs: &RiskInputs) -> Result<RiskBreakdown, RiskError> {
    inputs.validate()?;

    // Finite inputs can still overflow a component (e.g. cv * 25)
    let yield_points = ensure_finite(
        "predicted_yield",
        yield_index_points(inputs.predicted_yield, inputs.historical_avg_yield),
    )?;
    let anomaly = ensure_finite("ndvi_z_score", anomaly_penalty(inputs.ndvi_z_score))?;
    let volatility = ensure_finite(
        "historical_yield_cv",
        volatility_penalty(inputs.historical_yield_cv),
    )?;

    let raw = inputs.base_score + yield_points - anomaly - volatility;

    Ok(RiskBreakdown {
        yield_index_points: yield_points,
        anomaly_penalty: anomaly,
        volatility_penalty: volatility,
        final_score: raw.clamp(MIN_SCORE, MAX_SCORE),
    })
}

/// Assign risk tier with default thresholds
pub fn classify(score: f64) -> RiskTier {
    classify_with_thresholds(score, &TierThresholds::default())
}

/// Assign risk tier with custom thresholds
pub fn classify_with_thresholds(score: f64, thresholds: &TierThresholds) -> RiskTier {
    if score >= thresholds.low_risk {
        RiskTier::LowRisk
    } else if score >= thresholds.moderate_risk {
        RiskTier::ModerateRisk
    } else {
        RiskTier::HighRisk
    }
}

/// Compute breakdown and tier with default thresholds
pub fn analyze_risk(inputs: &RiskInputs) -> Result<(RiskBreakdown, RiskTier), RiskError> {
    analyze_risk_with_config(inputs, &TierThresholds::default())
}

/// Compute breakdown and tier with custom thresholds
pub fn analyze_risk_with_config(
    inputs: &RiskInputs,
    thresholds: &TierThresholds,
) -> Result<(RiskBreakdown, RiskTier), RiskError> {
    let breakdown = compute_risk_score(inputs)?;
    let tier = classify_with_thresholds(breakdown.final_score, thresholds);
    Ok((breakdown, tier))
}
