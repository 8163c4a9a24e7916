//! Historical yield records and per-key statistics
//!
//! Records are keyed by (district, crop). Keys are trimmed and upper-cased
//! on load and on lookup; no other cleaning is applied.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// One historical yield observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldRecord {
    pub district: String,
    pub crop: String,
    pub year: i32,
    pub yield_value: f64,
}

/// Raw CSV row (`District,Crop,Year,Yield`); extra columns are ignored
#[derive(Debug, Deserialize)]
struct YieldRow {
    #[serde(rename = "District")]
    district: String,
    #[serde(rename = "Crop")]
    crop: String,
    #[serde(rename = "Year")]
    year: String,
    #[serde(rename = "Yield")]
    yield_value: Option<f64>,
}

/// Summary statistics over a set of yield observations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct YieldStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation (n - 1 denominator)
    pub std_dev: f64,
    /// Coefficient of variation: std_dev / |mean|
    pub cv: f64,
}

impl YieldStats {
    /// Compute statistics; `None` when there are no observations
    pub fn from_observations(values: &[f64]) -> Option<YieldStats> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std_dev = sample_std_dev(values, mean);

        // A zero mean is reported as-is; the scoring engine rejects it
        let cv = if mean == 0.0 { 0.0 } else { std_dev / mean.abs() };

        Some(YieldStats {
            count,
            mean,
            min,
            max,
            std_dev,
            cv,
        })
    }
}

/// Sample standard deviation; 0 for fewer than two values
pub(crate) fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Normalize a district or crop key for lookup
pub fn normalize_key(key: &str) -> String {
    key.trim().to_uppercase()
}

/// Parse a year column; ranges like "2015-16" use the leading year
fn parse_year(raw: &str) -> Option<i32> {
    raw.split('-').next()?.trim().parse().ok()
}

/// In-memory historical yield store
#[derive(Debug, Clone, Default)]
pub struct YieldHistory {
    records: BTreeMap<(String, String), Vec<YieldRecord>>,
}

impl YieldHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records from a CSV file
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open yield history: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("failed to load yield history: {}", path.display()))
    }

    /// Load records from any CSV reader with a header row
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut history = YieldHistory::new();
        let mut skipped = 0usize;

        for (index, row) in csv_reader.deserialize::<YieldRow>().enumerate() {
            // Header is line 1
            let line = index + 2;
            let row = row.with_context(|| format!("malformed yield row at line {}", line))?;

            let Some(year) = parse_year(&row.year) else {
                warn!(line, year = %row.year, "skipping yield row with unparseable year");
                skipped += 1;
                continue;
            };
            let Some(yield_value) = row.yield_value.filter(|v| v.is_finite()) else {
                warn!(line, "skipping yield row without a yield value");
                skipped += 1;
                continue;
            };

            history.insert(YieldRecord {
                district: row.district,
                crop: row.crop,
                year,
                yield_value,
            });
        }

        debug!(
            keys = history.records.len(),
            skipped, "loaded yield history"
        );
        Ok(history)
    }

    /// Add a record, normalizing its key
    pub fn insert(&mut self, mut record: YieldRecord) {
        record.district = normalize_key(&record.district);
        record.crop = normalize_key(&record.crop);
        self.records
            .entry((record.district.clone(), record.crop.clone()))
            .or_default()
            .push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Yield observations for a key, ordered by year
    pub fn observations(&self, district: &str, crop: &str) -> Vec<f64> {
        let key = (normalize_key(district), normalize_key(crop));
        let Some(records) = self.records.get(&key) else {
            return Vec::new();
        };
        let mut sorted: Vec<&YieldRecord> = records.iter().collect();
        sorted.sort_by_key(|r| r.year);
        sorted.iter().map(|r| r.yield_value).collect()
    }

    /// Summary statistics for a key, `None` if unknown
    pub fn stats(&self, district: &str, crop: &str) -> Option<YieldStats> {
        YieldStats::from_observations(&self.observations(district, crop))
    }

    /// All known districts, sorted
    pub fn districts(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.records.keys().map(|(d, _)| d).collect();
        set.into_iter().cloned().collect()
    }

    /// Crops with history for a district, sorted
    pub fn crops_for_district(&self, district: &str) -> Vec<String> {
        let district = normalize_key(district);
        self.records
            .keys()
            .filter(|(d, _)| *d == district)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// All (district, crop) keys, sorted
    pub fn keys(&self) -> Vec<(String, String)> {
        self.records.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
District,Crop,Year,Yield
Mysuru,Rice,2018,2400
 mysuru ,rice,2019,2600
MYSURU,RICE,2020-21,2500
Mysuru,Maize,2019,3100
Belagavi,Rice,2019,
Belagavi,Rice,unknown,2000
Belagavi,Rice,2020,1800
";

    #[test]
    fn test_stats_basic() {
        let stats = YieldStats::from_observations(&[2400.0, 2600.0, 2500.0]).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, 2500.0);
        assert_eq!(stats.min, 2400.0);
        assert_eq!(stats.max, 2600.0);
        // sample variance = (10000 + 10000 + 0) / 2 = 10000
        assert_eq!(stats.std_dev, 100.0);
        assert!((stats.cv - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_stats_single_observation_has_zero_spread() {
        let stats = YieldStats::from_observations(&[1800.0]).unwrap();
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.cv, 0.0);
    }

    #[test]
    fn test_stats_empty_is_none() {
        assert!(YieldStats::from_observations(&[]).is_none());
    }

    #[test]
    fn test_stats_zero_mean_reports_zero_cv() {
        let stats = YieldStats::from_observations(&[-1.0, 1.0]).unwrap();
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.cv, 0.0);
    }

    #[test]
    fn test_load_normalizes_keys_and_skips_bad_rows() {
        let history = YieldHistory::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(history.observations("mysuru", "Rice"), vec![2400.0, 2600.0, 2500.0]);
        assert_eq!(history.observations("BELAGAVI", "rice"), vec![1800.0]);
        assert!(history.observations("Hassan", "Rice").is_empty());
    }

    #[test]
    fn test_districts_and_crops() {
        let history = YieldHistory::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(history.districts(), vec!["BELAGAVI", "MYSURU"]);
        assert_eq!(history.crops_for_district("Mysuru"), vec!["MAIZE", "RICE"]);
        assert!(history.crops_for_district("Hassan").is_empty());
    }

    #[test]
    fn test_stats_lookup() {
        let history = YieldHistory::from_reader(SAMPLE.as_bytes()).unwrap();
        let stats = history.stats("Mysuru", "Rice").unwrap();
        assert_eq!(stats.mean, 2500.0);
        assert!(history.stats("Mysuru", "Wheat").is_none());
    }

    #[test]
    fn test_malformed_yield_is_error() {
        let csv = "District,Crop,Year,Yield\nMysuru,Rice,2019,abc\n";
        assert!(YieldHistory::from_reader(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("2019"), Some(2019));
        assert_eq!(parse_year("2015-16"), Some(2015));
        assert_eq!(parse_year(" 2012 - 13"), Some(2012));
        assert_eq!(parse_year("n/a"), None);
    }
}
