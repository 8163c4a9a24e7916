//! Vegetation index (NDVI) time series
//!
//! Observations arrive in no particular order from the upstream source and
//! are kept sorted by date. The season mean feeds the yield predictor; the
//! z-score against a historical baseline feeds the anomaly penalty.

use crate::error::{ensure_finite, RiskError};
use crate::history::{normalize_key, sample_std_dev};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// NDVI above which vegetation is considered excellent
pub const EXCELLENT_NDVI: f64 = 0.6;

/// NDVI at or above which vegetation is fair to good
pub const FAIR_NDVI: f64 = 0.3;

/// One dated NDVI reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NdviObservation {
    pub date: NaiveDate,
    pub ndvi: f64,
}

/// Chronologically ordered NDVI readings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NdviSeries {
    observations: Vec<NdviObservation>,
}

impl NdviSeries {
    /// Build a series from unordered observations; non-finite readings are dropped
    pub fn new(observations: impl IntoIterator<Item = NdviObservation>) -> Self {
        let mut observations: Vec<NdviObservation> = observations
            .into_iter()
            .filter(|o| o.ndvi.is_finite())
            .collect();
        observations.sort_by_key(|o| o.date);
        NdviSeries { observations }
    }

    /// Load a `date,ndvi` CSV file
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open NDVI series: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("failed to load NDVI series: {}", path.display()))
    }

    /// Load from any CSV reader with a `date,ndvi` header; extra columns are ignored
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut observations = Vec::new();
        for (index, row) in csv_reader.deserialize::<NdviObservation>().enumerate() {
            let row = row.with_context(|| format!("malformed NDVI row at line {}", index + 2))?;
            if !row.ndvi.is_finite() {
                warn!(line = index + 2, "dropping non-finite NDVI reading");
                continue;
            }
            observations.push(row);
        }
        let series = NdviSeries::new(observations);
        debug!(count = series.len(), "loaded NDVI series");
        Ok(series)
    }

    pub fn observations(&self) -> &[NdviObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Readings within [start, end], inclusive
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> NdviSeries {
        NdviSeries {
            observations: self
                .observations
                .iter()
                .filter(|o| o.date >= start && o.date <= end)
                .copied()
                .collect(),
        }
    }

    /// Mean NDVI, `None` for an empty series
    pub fn mean(&self) -> Option<f64> {
        if self.observations.is_empty() {
            return None;
        }
        let sum: f64 = self.observations.iter().map(|o| o.ndvi).sum();
        Some(sum / self.observations.len() as f64)
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.ndvi).collect()
    }
}

/// Raw CSV row for a multi-district file (`date,ndvi,District`)
#[derive(Debug, Deserialize)]
struct CatalogRow {
    date: NaiveDate,
    ndvi: f64,
    #[serde(rename = "District", default)]
    district: Option<String>,
}

/// NDVI series keyed by district
///
/// Rows without a district apply to every district that has no series of
/// its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NdviCatalog {
    by_district: BTreeMap<String, NdviSeries>,
    shared: NdviSeries,
}

impl NdviCatalog {
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open NDVI file: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("failed to load NDVI file: {}", path.display()))
    }

    /// Load from a CSV reader with `date,ndvi` and an optional `District` column
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut grouped: BTreeMap<String, Vec<NdviObservation>> = BTreeMap::new();
        let mut shared = Vec::new();

        for (index, row) in csv_reader.deserialize::<CatalogRow>().enumerate() {
            let row = row.with_context(|| format!("malformed NDVI row at line {}", index + 2))?;
            let observation = NdviObservation {
                date: row.date,
                ndvi: row.ndvi,
            };
            match row.district.as_deref().map(normalize_key) {
                Some(district) if !district.is_empty() => {
                    grouped.entry(district).or_default().push(observation)
                }
                _ => shared.push(observation),
            }
        }

        let catalog = NdviCatalog {
            by_district: grouped
                .into_iter()
                .map(|(district, obs)| (district, NdviSeries::new(obs)))
                .collect(),
            shared: NdviSeries::new(shared),
        };
        debug!(
            districts = catalog.by_district.len(),
            shared = catalog.shared.len(),
            "loaded NDVI catalog"
        );
        Ok(catalog)
    }

    /// Series for a district, falling back to rows without a district
    pub fn series_for(&self, district: &str) -> &NdviSeries {
        self.by_district
            .get(&normalize_key(district))
            .unwrap_or(&self.shared)
    }

    pub fn districts(&self) -> Vec<String> {
        self.by_district.keys().cloned().collect()
    }
}

/// Historical NDVI trend used to standardize the current season
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NdviBaseline {
    pub mean: f64,
    pub std_dev: f64,
}

impl NdviBaseline {
    /// Mean and sample standard deviation of historical readings
    pub fn from_values(values: &[f64]) -> Option<NdviBaseline> {
        if values.is_empty() {
            return None;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(NdviBaseline {
            mean,
            std_dev: sample_std_dev(values, mean),
        })
    }

    pub fn from_series(series: &NdviSeries) -> Option<NdviBaseline> {
        Self::from_values(&series.values())
    }

    /// Number of standard deviations `value` lies from the baseline mean
    pub fn z_score(&self, value: f64) -> Result<f64, RiskError> {
        ensure_finite("ndvi", value)?;
        ensure_finite("ndvi_baseline_mean", self.mean)?;
        if !self.std_dev.is_finite() || self.std_dev <= 0.0 {
            return Err(RiskError::invalid(
                "ndvi_baseline_std_dev",
                format!("must be positive (got {})", self.std_dev),
            ));
        }
        Ok((value - self.mean) / self.std_dev)
    }
}

/// Coarse vegetation condition label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VegetationHealth {
    Excellent,
    FairToGood,
    Stressed,
}

impl VegetationHealth {
    pub fn from_ndvi(ndvi: f64) -> Self {
        if ndvi > EXCELLENT_NDVI {
            VegetationHealth::Excellent
        } else if ndvi >= FAIR_NDVI {
            VegetationHealth::FairToGood
        } else {
            VegetationHealth::Stressed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VegetationHealth::Excellent => "Excellent",
            VegetationHealth::FairToGood => "Fair to Good",
            VegetationHealth::Stressed => "Stressed",
        }
    }
}
