//! District/crop risk assessment
//!
//! Resolves the collaborators (yield model, NDVI series, historical yields)
//! into plain numbers, runs the scoring engine, and applies the caller-level
//! fallback policy when the engine rejects its inputs. The engine itself
//! never substitutes a default.

use crate::history::{YieldHistory, YieldStats};
use crate::predictor::{FeatureVector, YieldPredictor};
use crate::risk::{
    analyze_risk_with_config, RiskBreakdown, RiskInputs, RiskTier, TierThresholds,
    DEFAULT_BASE_SCORE,
};
use crate::vegetation::{NdviBaseline, NdviSeries, VegetationHealth};
use crate::RiskError;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Minimum pre-season readings needed to derive an NDVI baseline
const MIN_BASELINE_READINGS: usize = 2;

/// What to report when the engine rejects its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Propagate the error to the caller
    Error,
    /// Report a fixed tier without a breakdown
    Tier(RiskTier),
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy::Tier(RiskTier::ModerateRisk)
    }
}

/// Scoring knobs for an assessment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssessmentSettings {
    pub base_score: f64,
    pub thresholds: TierThresholds,
    pub fallback: FallbackPolicy,
    pub default_ndvi: f64,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        AssessmentSettings {
            base_score: DEFAULT_BASE_SCORE,
            thresholds: TierThresholds::default(),
            fallback: FallbackPolicy::default(),
            default_ndvi: crate::config::DEFAULT_NDVI,
        }
    }
}

/// Resolved data sources, passed explicitly for every call
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub predictor: &'a dyn YieldPredictor,
    pub history: &'a YieldHistory,
    pub ndvi: &'a NdviSeries,
    /// Historical NDVI trend; derived from pre-season readings when absent
    pub baseline: Option<NdviBaseline>,
}

/// What to assess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssessmentRequest {
    pub district: String,
    pub crop: String,
    pub year: i32,
    /// Last day of the current-season window
    pub as_of: NaiveDate,
}

impl AssessmentRequest {
    /// First day of the season window (January 1 of `year`)
    pub fn season_start(&self) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, 1, 1)
            .with_context(|| format!("invalid season year: {}", self.year))
    }
}

/// Complete risk assessment for one district/crop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Assessment {
    pub district: String,
    pub crop: String,
    pub year: i32,
    pub season_ndvi: f64,
    pub ndvi_readings: usize,
    /// Absent when the baseline cannot standardize the season
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ndvi_z_score: Option<f64>,
    pub vegetation_health: VegetationHealth,
    pub predicted_yield: f64,
    pub history: YieldStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<RiskBreakdown>,
    pub tier: RiskTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub explanation: String,
}

impl Assessment {
    /// Score used for ordering; fallback results sort as their tier's floor
    pub fn sort_score(&self, thresholds: &TierThresholds) -> f64 {
        match self.breakdown {
            Some(b) => b.final_score,
            None => match self.tier {
                RiskTier::LowRisk => thresholds.low_risk,
                RiskTier::ModerateRisk => thresholds.moderate_risk,
                RiskTier::HighRisk => 0.0,
            },
        }
    }
}

/// Baseline from readings strictly before `season_start`
pub fn baseline_before(series: &NdviSeries, season_start: NaiveDate) -> Option<NdviBaseline> {
    let prior = series.window(NaiveDate::MIN, season_start.pred_opt()?);
    if prior.len() < MIN_BASELINE_READINGS {
        return None;
    }
    NdviBaseline::from_series(&prior)
}

/// Assess one district/crop
pub fn assess(
    request: &AssessmentRequest,
    collaborators: &Collaborators<'_>,
    settings: &AssessmentSettings,
) -> Result<Assessment> {
    let season_start = request.season_start()?;
    if request.as_of < season_start {
        anyhow::bail!(
            "as-of date {} is before the start of season {}",
            request.as_of,
            request.year
        );
    }

    // 1. Current-season vegetation
    let season = collaborators.ndvi.window(season_start, request.as_of);
    let season_ndvi = match season.mean() {
        Some(mean) => mean,
        None => {
            warn!(
                district = %request.district,
                year = request.year,
                default_ndvi = settings.default_ndvi,
                "no NDVI readings for season, using default"
            );
            settings.default_ndvi
        }
    };

    // 2. Historical yields
    let history = collaborators
        .history
        .stats(&request.district, &request.crop)
        .with_context(|| {
            format!(
                "no historical yields for {} / {}",
                request.district, request.crop
            )
        })?;

    // 3. Predicted yield
    let features = FeatureVector {
        year: request.year,
        district: request.district.clone(),
        crop: request.crop.clone(),
        ndvi: season_ndvi,
    };
    let predicted_yield = collaborators
        .predictor
        .predict(&features)
        .with_context(|| {
            format!(
                "yield prediction failed for {} / {}",
                request.district, request.crop
            )
        })?;

    // 4. Anomaly signal and engine
    let baseline = collaborators
        .baseline
        .or_else(|| baseline_before(collaborators.ndvi, season_start));

    let ndvi_z_score = anomaly_z_score(season_ndvi, baseline);
    let scored = ndvi_z_score.clone().and_then(|z| {
        let inputs = RiskInputs::new(predicted_yield, history.mean, history.cv, z)
            .with_base_score(settings.base_score);
        analyze_risk_with_config(&inputs, &settings.thresholds)
    });

    let (breakdown, tier, fallback_reason) = match scored {
        Ok((breakdown, tier)) => (Some(breakdown), tier, None),
        Err(err) => match settings.fallback {
            FallbackPolicy::Error => {
                return Err(err).with_context(|| {
                    format!("cannot score {} / {}", request.district, request.crop)
                })
            }
            FallbackPolicy::Tier(tier) => {
                warn!(
                    district = %request.district,
                    crop = %request.crop,
                    error = %err,
                    fallback = %tier,
                    "scoring rejected inputs, applying fallback tier"
                );
                (None, tier, Some(err.to_string()))
            }
        },
    };

    let vegetation_health = VegetationHealth::from_ndvi(season_ndvi);
    let explanation = explain(
        tier,
        vegetation_health,
        breakdown.as_ref(),
        fallback_reason.is_some(),
    );

    Ok(Assessment {
        district: crate::history::normalize_key(&request.district),
        crop: crate::history::normalize_key(&request.crop),
        year: request.year,
        season_ndvi,
        ndvi_readings: season.len(),
        ndvi_z_score: ndvi_z_score.ok(),
        vegetation_health,
        predicted_yield,
        history,
        breakdown,
        tier,
        fallback_reason,
        explanation,
    })
}

/// NDVI z-score against the baseline; zero when no baseline is available
fn anomaly_z_score(season_ndvi: f64, baseline: Option<NdviBaseline>) -> Result<f64, RiskError> {
    match baseline {
        Some(baseline) => baseline.z_score(season_ndvi),
        None => {
            debug!("no NDVI baseline available, assuming no anomaly");
            Ok(0.0)
        }
    }
}

/// Plain-language explanation of a tier in light of vegetation health
pub fn explain(
    tier: RiskTier,
    health: VegetationHealth,
    breakdown: Option<&RiskBreakdown>,
    fallback: bool,
) -> String {
    let stressed = health == VegetationHealth::Stressed;

    let analysis = match (tier, stressed) {
        (RiskTier::HighRisk, true) => {
            "The low yield forecast is consistent with stressed vegetation in the current satellite readings.".to_string()
        }
        (RiskTier::HighRisk, false) => format!(
            "Current vegetation looks {}, but the model still forecasts a yield well short of the historical baseline for this district and crop.",
            health.as_str().to_lowercase()
        ),
        (RiskTier::ModerateRisk, true) => {
            "Stressed vegetation is an early warning even though the forecast yield is not yet critical.".to_string()
        }
        (RiskTier::ModerateRisk, false) => format!(
            "Vegetation looks {}, yet the forecast suggests the yield may fall slightly below the historical average.",
            health.as_str().to_lowercase()
        ),
        (RiskTier::LowRisk, _) => format!(
            "The forecast yield and {} vegetation both point to a good season.",
            health.as_str().to_lowercase()
        ),
    };

    let recommendation = match tier {
        RiskTier::HighRisk => "Recommendation: treat this as a likely poor harvest that needs attention.",
        RiskTier::ModerateRisk => "Recommendation: monitor closely; conditions are not ideal.",
        RiskTier::LowRisk => "Recommendation: no action needed; all indicators are positive.",
    };

    let mut text = String::new();
    if fallback {
        text.push_str(&format!(
            "{} assumed: the inputs could not be scored.\n",
            tier.label()
        ));
    } else if let Some(b) = breakdown {
        text.push_str(&format!(
            "{} (DYRS {:.1}): yield {:+.1}, anomaly -{:.1}, volatility -{:.1}.\n",
            tier.label(),
            b.final_score,
            b.yield_index_points,
            b.anomaly_penalty,
            b.volatility_penalty
        ));
    }
    text.push_str(&analysis);
    text.push('\n');
    text.push_str(recommendation);
    text
}
