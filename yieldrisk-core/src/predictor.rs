//! Yield prediction
//!
//! The trained model is an injected dependency: callers hand a
//! `YieldPredictor` to the assessment layer instead of reaching for a
//! process-wide model.

use crate::history::normalize_key;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Model inputs for one district/crop/season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub year: i32,
    pub district: String,
    pub crop: String,
    /// Current-season mean NDVI
    pub ndvi: f64,
}

impl FeatureVector {
    /// One-hot encoded columns: `Year`, `ndvi`, `District_<NAME>`, `Crop_<NAME>`
    pub fn encode(&self) -> BTreeMap<String, f64> {
        let mut columns = BTreeMap::new();
        columns.insert("Year".to_string(), f64::from(self.year));
        columns.insert("ndvi".to_string(), self.ndvi);
        columns.insert(format!("District_{}", normalize_key(&self.district)), 1.0);
        columns.insert(format!("Crop_{}", normalize_key(&self.crop)), 1.0);
        columns
    }
}

/// Anything that turns a feature vector into a predicted yield
pub trait YieldPredictor: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<f64>;
}

/// Linear regression over one-hot encoded features, loaded from JSON
///
/// ```json
/// { "intercept": -12000.0, "coefficients": { "Year": 7.0, "ndvi": 900.0, "District_MYSURU": 150.0 } }
/// ```
///
/// Feature columns the model does not know are ignored; model columns the
/// feature vector does not produce count as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearYieldModel {
    pub intercept: f64,
    #[serde(default)]
    pub coefficients: BTreeMap<String, f64>,
}

impl LinearYieldModel {
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model file: {}", path.display()))?;
        let model: LinearYieldModel = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse model file: {}", path.display()))?;
        model
            .validate()
            .with_context(|| format!("invalid model in: {}", path.display()))?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.intercept.is_finite() {
            anyhow::bail!("intercept must be finite (got {})", self.intercept);
        }
        for (column, weight) in &self.coefficients {
            if !weight.is_finite() {
                anyhow::bail!("coefficient {} must be finite (got {})", column, weight);
            }
        }
        Ok(())
    }
}

impl YieldPredictor for LinearYieldModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let encoded = features.encode();
        let prediction = self.intercept
            + self
                .coefficients
                .iter()
                .map(|(column, weight)| weight * encoded.get(column).copied().unwrap_or(0.0))
                .sum::<f64>();

        if !prediction.is_finite() {
            anyhow::bail!(
                "model produced a non-finite prediction for {}/{}",
                features.district,
                features.crop
            );
        }
        Ok(prediction)
    }
}
