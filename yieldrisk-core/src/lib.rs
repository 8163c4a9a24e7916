//! yieldrisk core library - Dynamic Yield Risk Score (DYRS) for district crop yields

// Global invariants enforced in this crate:
// - The scoring engine is a pure function of its numeric inputs
// - No global mutable state; models and datasets are passed explicitly
// - No randomness, clocks, threads, or async
// - Identical input yields bit-for-bit identical output

pub mod assessment;
pub mod config;
pub mod error;
pub mod history;
pub mod predictor;
pub mod report;
pub mod risk;
pub mod vegetation;

pub use assessment::{assess, Assessment, AssessmentRequest, Collaborators, FallbackPolicy};
pub use config::ResolvedConfig;
pub use error::RiskError;
pub use report::{render_json, render_text, sort_assessments, ScoreReport};
pub use risk::{classify, compute_risk_score, RiskBreakdown, RiskInputs, RiskTier};

/// Score raw inputs with default thresholds
pub fn score(inputs: &RiskInputs) -> Result<ScoreReport, RiskError> {
    score_with_config(inputs, None)
}

/// Score raw inputs, taking tier thresholds from the resolved configuration
///
/// The base score is taken from `inputs`; callers decide whether the
/// configured base score applies.
pub fn score_with_config(
    inputs: &RiskInputs,
    resolved_config: Option<&ResolvedConfig>,
) -> Result<ScoreReport, RiskError> {
    let thresholds = resolved_config
        .map(|c| c.thresholds)
        .unwrap_or_default();
    let (breakdown, tier) = risk::analyze_risk_with_config(inputs, &thresholds)?;
    Ok(ScoreReport {
        inputs: *inputs,
        breakdown,
        tier,
    })
}
