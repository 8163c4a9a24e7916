//! Reporting and output generation
//!
//! Global invariants enforced:
//! - Deterministic output ordering
//! - Byte-for-byte identical output across runs

use crate::assessment::Assessment;
use crate::risk::{RiskBreakdown, RiskInputs, RiskTier, TierThresholds};
use serde::Serialize;

/// Result of scoring raw numbers directly
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ScoreReport {
    pub inputs: RiskInputs,
    pub breakdown: RiskBreakdown,
    pub tier: RiskTier,
}

/// Sort assessments deterministically
pub fn sort_assessments(
    mut assessments: Vec<Assessment>,
    thresholds: &TierThresholds,
) -> Vec<Assessment> {
    assessments.sort_by(|a, b| {
        // 1. Score ascending (riskiest first)
        a.sort_score(thresholds)
            .partial_cmp(&b.sort_score(thresholds))
            .unwrap_or(std::cmp::Ordering::Equal)
            // 2. District ascending
            .then_with(|| a.district.cmp(&b.district))
            // 3. Crop ascending
            .then_with(|| a.crop.cmp(&b.crop))
    });
    assessments
}

/// Render a single score breakdown as text
pub fn render_score_text(report: &ScoreReport) -> String {
    let b = &report.breakdown;
    let anomaly = format!("-{:.2}", b.anomaly_penalty);
    let volatility = format!("-{:.2}", b.volatility_penalty);
    let mut output = String::new();
    output.push_str(&format!("{:<20} {:>8.2}\n", "Base score", report.inputs.base_score));
    output.push_str(&format!("{:<20} {:>+8.2}\n", "Yield index", b.yield_index_points));
    output.push_str(&format!("{:<20} {:>8}\n", "Anomaly penalty", anomaly));
    output.push_str(&format!("{:<20} {:>8}\n", "Volatility penalty", volatility));
    output.push_str(&format!("{:<20} {:>8.2}\n", "DYRS", b.final_score));
    output.push_str(&format!("{:<20} {:>8}\n", "Tier", report.tier.as_str()));
    output
}

/// Render assessments as a text table
pub fn render_text(assessments: &[Assessment], explain: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{:<8} {:<14} {:<16} {:<12} {:<10} {:<8} {}\n",
        "DYRS", "TIER", "DISTRICT", "CROP", "PREDICTED", "NDVI", "Z"
    ));

    for a in assessments {
        let score_str = match a.breakdown {
            Some(b) => format!("{:.2}", b.final_score),
            None => "-".to_string(),
        };
        let z_str = match a.ndvi_z_score {
            Some(z) => format!("{:.2}", z),
            None => "-".to_string(),
        };
        output.push_str(&format!(
            "{:<8} {:<14} {:<16} {:<12} {:<10.1} {:<8.4} {}\n",
            score_str,
            a.tier.as_str(),
            truncate_or_pad(&a.district, 16),
            truncate_or_pad(&a.crop, 12),
            a.predicted_yield,
            a.season_ndvi,
            z_str,
        ));
        if let Some(ref reason) = a.fallback_reason {
            output.push_str(&format!("         fallback: {}\n", reason));
        }
        if explain {
            for line in a.explanation.lines() {
                output.push_str(&format!("         {}\n", line));
            }
        }
    }

    output
}

/// Render assessments as JSON output
pub fn render_json(assessments: &[Assessment]) -> String {
    serde_json::to_string_pretty(assessments).unwrap_or_else(|_| "[]".to_string())
}

/// Render a score report as JSON output
pub fn render_score_json(report: &ScoreReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}
