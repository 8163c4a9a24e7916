//! Configuration file support for yieldrisk
//!
//! Loads scoring configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.yieldriskrc.json` in project root
//! 3. `yieldrisk.config.json` in project root
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::assessment::{AssessmentSettings, FallbackPolicy};
use crate::risk::{RiskTier, TierThresholds, DEFAULT_BASE_SCORE, MAX_SCORE, MIN_SCORE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Season NDVI assumed when the vegetation source returns nothing
pub const DEFAULT_NDVI: f64 = 0.4;

const RC_FILE: &str = ".yieldriskrc.json";
const CONFIG_FILE: &str = "yieldrisk.config.json";

/// yieldrisk configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YieldRiskConfig {
    /// Neutral starting score (default: 50.0)
    #[serde(default)]
    pub base_score: Option<f64>,

    /// Custom tier thresholds
    #[serde(default)]
    pub thresholds: Option<ThresholdConfig>,

    /// What to report when the engine rejects inputs (default: moderate)
    #[serde(default)]
    pub fallback: Option<FallbackSetting>,

    /// Season NDVI used when no readings are available (default: 0.4)
    #[serde(default)]
    pub default_ndvi: Option<f64>,

    /// Maximum number of batch results to show
    #[serde(default)]
    pub top: Option<usize>,
}

/// Custom tier thresholds (inclusive lower bounds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Score at or above which risk is low (default: 75.0)
    pub low_risk: Option<f64>,
    /// Score at or above which risk is moderate (default: 50.0)
    pub moderate_risk: Option<f64>,
}

/// Fallback policy as written in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackSetting {
    Low,
    Moderate,
    High,
    Error,
}

impl From<FallbackSetting> for FallbackPolicy {
    fn from(setting: FallbackSetting) -> Self {
        match setting {
            FallbackSetting::Low => FallbackPolicy::Tier(RiskTier::LowRisk),
            FallbackSetting::Moderate => FallbackPolicy::Tier(RiskTier::ModerateRisk),
            FallbackSetting::High => FallbackPolicy::Tier(RiskTier::HighRisk),
            FallbackSetting::Error => FallbackPolicy::Error,
        }
    }
}

/// Resolved configuration with defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_score: f64,
    pub thresholds: TierThresholds,
    pub fallback: FallbackPolicy,
    pub default_ndvi: f64,
    pub top_n: Option<usize>,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl YieldRiskConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(base) = self.base_score {
            if !base.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&base) {
                anyhow::bail!("base_score must be within 0..=100 (got {})", base);
            }
        }

        // Validate thresholds are in range and ordered
        if let Some(ref t) = self.thresholds {
            let defaults = TierThresholds::default();
            let low = t.low_risk.unwrap_or(defaults.low_risk);
            let moderate = t.moderate_risk.unwrap_or(defaults.moderate_risk);

            for (name, value) in [("low_risk", low), ("moderate_risk", moderate)] {
                if !value.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&value) {
                    anyhow::bail!("thresholds.{} must be within 0..=100 (got {})", name, value);
                }
            }
            if moderate >= low {
                anyhow::bail!(
                    "thresholds.moderate_risk ({}) must be less than thresholds.low_risk ({})",
                    moderate,
                    low
                );
            }
        }

        if let Some(ndvi) = self.default_ndvi {
            if !ndvi.is_finite() || !(-1.0..=1.0).contains(&ndvi) {
                anyhow::bail!("default_ndvi must be within -1..=1 (got {})", ndvi);
            }
        }

        if self.top == Some(0) {
            anyhow::bail!("top must be at least 1");
        }

        Ok(())
    }

    /// Resolve config into the form used by scoring and assessment
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let defaults = TierThresholds::default();
        let thresholds = match &self.thresholds {
            Some(t) => TierThresholds {
                low_risk: t.low_risk.unwrap_or(defaults.low_risk),
                moderate_risk: t.moderate_risk.unwrap_or(defaults.moderate_risk),
            },
            None => defaults,
        };

        Ok(ResolvedConfig {
            base_score: self.base_score.unwrap_or(DEFAULT_BASE_SCORE),
            thresholds,
            fallback: self
                .fallback
                .map(FallbackPolicy::from)
                .unwrap_or_default(),
            default_ndvi: self.default_ndvi.unwrap_or(DEFAULT_NDVI),
            top_n: self.top,
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        YieldRiskConfig::default().resolve()
    }

    /// Settings handed to the assessment layer
    pub fn assessment_settings(&self) -> AssessmentSettings {
        AssessmentSettings {
            base_score: self.base_score,
            thresholds: self.thresholds,
            fallback: self.fallback,
            default_ndvi: self.default_ndvi,
        }
    }
}

/// Discover and load a config file from the project root
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(project_root: &Path) -> Result<Option<(YieldRiskConfig, PathBuf)>> {
    for name in [RC_FILE, CONFIG_FILE] {
        let path = project_root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<YieldRiskConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: YieldRiskConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config for a project
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config from the project root.
/// Returns default config if nothing is found.
pub fn load_and_resolve(project_root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(project_root)? {
            Some((config, path)) => (config, Some(path)),
            None => (YieldRiskConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config_is_valid() {
        let config = YieldRiskConfig::default();
        config.validate().expect("default config should be valid");
        let resolved = config.resolve().expect("default config should resolve");
        assert_eq!(resolved.base_score, 50.0);
        assert_eq!(resolved.thresholds.low_risk, 75.0);
        assert_eq!(resolved.thresholds.moderate_risk, 50.0);
        assert_eq!(resolved.fallback, FallbackPolicy::Tier(RiskTier::ModerateRisk));
        assert_eq!(resolved.default_ndvi, 0.4);
        assert!(resolved.top_n.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "base_score": 55.0,
            "thresholds": {
                "low_risk": 80.0,
                "moderate_risk": 45.0
            },
            "fallback": "error",
            "default_ndvi": 0.35,
            "top": 20
        }"#;
        let config: YieldRiskConfig = serde_json::from_str(json).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.base_score, 55.0);
        assert_eq!(resolved.thresholds.low_risk, 80.0);
        assert_eq!(resolved.thresholds.moderate_risk, 45.0);
        assert_eq!(resolved.fallback, FallbackPolicy::Error);
        assert_eq!(resolved.default_ndvi, 0.35);
        assert_eq!(resolved.top_n, Some(20));
    }

    #[test]
    fn test_reject_unknown_fields() {
        let result: Result<YieldRiskConfig, _> = serde_json::from_str(r#"{"weights": {}}"#);
        assert!(result.is_err(), "unknown fields should be rejected");
    }

    #[test]
    fn test_reject_unknown_fallback() {
        let result: Result<YieldRiskConfig, _> =
            serde_json::from_str(r#"{"fallback": "medium"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_base_score_out_of_range() {
        let config: YieldRiskConfig = serde_json::from_str(r#"{"base_score": 120.0}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_unordered_thresholds() {
        let json = r#"{"thresholds": {"low_risk": 40.0, "moderate_risk": 60.0}}"#;
        let config: YieldRiskConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_partial_threshold_crossing_default() {
        // moderate_risk 80 against the default low_risk 75
        let json = r#"{"thresholds": {"moderate_risk": 80.0}}"#;
        let config: YieldRiskConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_thresholds_use_defaults_for_rest() {
        let json = r#"{"thresholds": {"low_risk": 90.0}}"#;
        let config: YieldRiskConfig = serde_json::from_str(json).unwrap();
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.thresholds.low_risk, 90.0);
        assert_eq!(resolved.thresholds.moderate_risk, 50.0); // default
    }

    #[test]
    fn test_reject_default_ndvi_out_of_range() {
        let config: YieldRiskConfig = serde_json::from_str(r#"{"default_ndvi": 1.5}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_zero_top() {
        let config: YieldRiskConfig = serde_json::from_str(r#"{"top": 0}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fallback_settings_map_to_policies() {
        assert_eq!(
            FallbackPolicy::from(FallbackSetting::High),
            FallbackPolicy::Tier(RiskTier::HighRisk)
        );
        assert_eq!(
            FallbackPolicy::from(FallbackSetting::Low),
            FallbackPolicy::Tier(RiskTier::LowRisk)
        );
        assert_eq!(FallbackPolicy::from(FallbackSetting::Error), FallbackPolicy::Error);
    }

    #[test]
    fn test_discover_rc_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".yieldriskrc.json");
        fs::write(&config_path, r#"{"base_score": 60.0}"#).unwrap();

        let (config, path) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.base_score, Some(60.0));
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_config_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("yieldrisk.config.json"), r#"{"top": 10}"#).unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.top, Some(10));
    }

    #[test]
    fn test_discover_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".yieldriskrc.json"), r#"{"top": 1}"#).unwrap();
        fs::write(dir.path().join("yieldrisk.config.json"), r#"{"top": 2}"#).unwrap();

        let (config, _) = discover_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.top, Some(1), ".yieldriskrc.json should take priority");
    }

    #[test]
    fn test_no_config_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_config(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_discovered_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".yieldriskrc.json"), r#"{"base_score": -1}"#).unwrap();
        assert!(discover_config(dir.path()).is_err());
    }

    #[test]
    fn test_load_and_resolve_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = load_and_resolve(dir.path(), None).unwrap();
        assert!(resolved.config_path.is_none());
        assert_eq!(resolved.base_score, 50.0);
    }

    #[test]
    fn test_load_and_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("custom.json");
        fs::write(&config_path, r#"{"fallback": "high"}"#).unwrap();

        let resolved = load_and_resolve(dir.path(), Some(&config_path)).unwrap();
        assert_eq!(resolved.fallback, FallbackPolicy::Tier(RiskTier::HighRisk));
        assert_eq!(resolved.config_path, Some(config_path));
    }
}
