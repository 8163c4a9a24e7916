//! Integration tests for district assessments over fixture data

use chrono::NaiveDate;
use std::path::PathBuf;
use yieldrisk_core::assessment::{assess, AssessmentRequest, AssessmentSettings, Collaborators};
use yieldrisk_core::config;
use yieldrisk_core::history::YieldHistory;
use yieldrisk_core::predictor::LinearYieldModel;
use yieldrisk_core::vegetation::{NdviCatalog, VegetationHealth};
use yieldrisk_core::{sort_assessments, Assessment, FallbackPolicy, RiskTier};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("tests")
        .join("fixtures")
        .join("data")
        .join(name)
}

struct Fixtures {
    history: YieldHistory,
    ndvi: NdviCatalog,
    model: LinearYieldModel,
}

fn load_fixtures() -> Fixtures {
    Fixtures {
        history: YieldHistory::from_csv_path(&fixture_path("yield_history.csv")).unwrap(),
        ndvi: NdviCatalog::from_csv_path(&fixture_path("ndvi_districts.csv")).unwrap(),
        model: LinearYieldModel::from_json_path(&fixture_path("yield_model.json")).unwrap(),
    }
}

fn request(district: &str, crop: &str) -> AssessmentRequest {
    AssessmentRequest {
        district: district.to_string(),
        crop: crop.to_string(),
        year: 2024,
        as_of: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
    }
}

fn run(fixtures: &Fixtures, district: &str, crop: &str, settings: &AssessmentSettings) -> Assessment {
    let collaborators = Collaborators {
        predictor: &fixtures.model,
        history: &fixtures.history,
        ndvi: fixtures.ndvi.series_for(district),
        baseline: None,
    };
    assess(&request(district, crop), &collaborators, settings).unwrap()
}

#[test]
fn test_history_fixture_loads() {
    let fixtures = load_fixtures();
    assert_eq!(fixtures.history.districts(), vec!["HASSAN", "MYSURU", "UDUPI"]);

    let hassan = fixtures.history.stats("Hassan", "Maize").unwrap();
    assert_eq!(hassan.count, 4, "row without a yield is skipped");
    assert_eq!(hassan.mean, 3000.0);
}

#[test]
fn test_strong_forecast_is_low_risk() {
    let fixtures = load_fixtures();
    let a = run(&fixtures, "Mysuru", "Rice", &AssessmentSettings::default());

    // 2500 + 1000 * 0.6 = 3100, 24% above the 2500 average -> saturated
    assert!((a.predicted_yield - 3100.0).abs() < 1e-9);
    assert_eq!(a.ndvi_readings, 2);
    assert_eq!(a.vegetation_health, VegetationHealth::FairToGood);

    let b = a.breakdown.expect("scored");
    assert_eq!(b.yield_index_points, 60.0);
    assert_eq!(b.anomaly_penalty, 0.0);
    assert!(b.volatility_penalty > 0.0 && b.volatility_penalty < 1.0);
    assert_eq!(b.final_score, 100.0);
    assert_eq!(a.tier, RiskTier::LowRisk);
}

#[test]
fn test_stressed_volatile_district_is_high_risk() {
    let fixtures = load_fixtures();
    let a = run(&fixtures, "Hassan", "Maize", &AssessmentSettings::default());

    // August reading is after the as-of date
    assert_eq!(a.ndvi_readings, 2);
    assert!((a.season_ndvi - 0.45).abs() < 1e-12);
    // (0.45 - 0.6) / 0.1414 ~= -1.06 -> minor stress
    let z = a.ndvi_z_score.unwrap();
    assert!(z <= -1.0 && z > -2.0);

    let b = a.breakdown.expect("scored");
    assert!((b.yield_index_points + 15.0).abs() < 1e-9);
    assert_eq!(b.anomaly_penalty, 15.0);
    assert!((b.volatility_penalty - 6.804).abs() < 1e-3);
    assert!((b.final_score - 13.196).abs() < 1e-3);
    assert_eq!(a.tier, RiskTier::HighRisk);
}

#[test]
fn test_zero_average_district_uses_fallback() {
    let fixtures = load_fixtures();
    let a = run(&fixtures, "Udupi", "Rice", &AssessmentSettings::default());

    assert!(a.breakdown.is_none());
    assert_eq!(a.tier, RiskTier::ModerateRisk);
    assert_eq!(a.season_ndvi, 0.4, "no readings -> default NDVI");
    assert!(a.fallback_reason.is_some());
    assert_eq!(a.ndvi_z_score, Some(0.0), "no baseline -> no anomaly");

    let strict = AssessmentSettings {
        fallback: FallbackPolicy::Error,
        ..AssessmentSettings::default()
    };
    let collaborators = Collaborators {
        predictor: &fixtures.model,
        history: &fixtures.history,
        ndvi: fixtures.ndvi.series_for("Udupi"),
        baseline: None,
    };
    assert!(assess(&request("Udupi", "Rice"), &collaborators, &strict).is_err());
}

#[test]
fn test_batch_ordering_is_deterministic() {
    let fixtures = load_fixtures();
    let settings = AssessmentSettings::default();

    let run_all = || {
        let assessments: Vec<Assessment> = fixtures
            .history
            .keys()
            .iter()
            .map(|(district, crop)| run(&fixtures, district, crop, &settings))
            .collect();
        sort_assessments(assessments, &settings.thresholds)
    };

    let first = run_all();
    let order: Vec<&str> = first.iter().map(|a| a.district.as_str()).collect();
    assert_eq!(order, vec!["HASSAN", "UDUPI", "MYSURU"]);

    let second = run_all();
    assert_eq!(first, second);
    assert_eq!(
        yieldrisk_core::render_json(&first),
        yieldrisk_core::render_json(&second)
    );
}

#[test]
fn test_fixture_config_resolves() {
    let resolved = config::load_and_resolve(
        &fixture_path(""),
        Some(&fixture_path("yieldrisk.config.json")),
    )
    .unwrap();
    let settings = resolved.assessment_settings();
    assert_eq!(settings, AssessmentSettings::default());
}
