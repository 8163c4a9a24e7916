//! yieldrisk CLI - Dynamic Yield Risk Score for district crop yields

// Global invariants enforced:
// - Deterministic output ordering
// - Identical input yields byte-for-byte identical output

use anyhow::Context;
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yieldrisk_core::assessment::{AssessmentSettings, Collaborators};
use yieldrisk_core::config::{self, ResolvedConfig};
use yieldrisk_core::history::YieldHistory;
use yieldrisk_core::predictor::LinearYieldModel;
use yieldrisk_core::report::{render_score_json, render_score_text};
use yieldrisk_core::vegetation::{NdviBaseline, NdviCatalog, NdviSeries};
use yieldrisk_core::{
    assess, render_json, render_text, sort_assessments, Assessment, AssessmentRequest,
    FallbackPolicy, RiskInputs,
};

#[derive(Parser)]
#[command(name = "yieldrisk")]
#[command(about = "Crop yield risk scoring (DYRS) from yield forecasts, NDVI and yield history")]
#[command(version = env!("YIELDRISK_VERSION"))]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score raw inputs directly
    #[command(allow_negative_numbers = true)]
    Score {
        /// Predicted yield for the current season
        #[arg(long)]
        predicted: f64,

        /// Historical average yield
        #[arg(long)]
        average: f64,

        /// Coefficient of variation of historical yields
        #[arg(long)]
        cv: f64,

        /// NDVI z-score against the historical baseline
        #[arg(long)]
        z_score: f64,

        /// Starting score before adjustments (overrides config file)
        #[arg(long)]
        base_score: Option<f64>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Assess one district/crop from data files
    Assess {
        /// District name (case-insensitive)
        #[arg(long)]
        district: String,

        /// Crop name (case-insensitive)
        #[arg(long)]
        crop: String,

        #[command(flatten)]
        data: DataArgs,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Show plain-language analysis and recommendation
        #[arg(long)]
        explain: bool,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Assess every district/crop pair in the yield history
    Batch {
        #[command(flatten)]
        data: DataArgs,

        /// Show only the top N riskiest results (overrides config file)
        #[arg(long)]
        top: Option<usize>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Show plain-language analysis and recommendation
        #[arg(long)]
        explain: bool,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List districts in the yield history, or the crops of one district
    Districts {
        /// Historical yields CSV (District, Crop, Year, Yield)
        #[arg(long)]
        history: PathBuf,

        /// List the crops recorded for this district instead
        #[arg(long)]
        district: Option<String>,
    },
    /// Validate or inspect a configuration file
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
struct DataArgs {
    /// Historical yields CSV (District, Crop, Year, Yield)
    #[arg(long)]
    history: PathBuf,

    /// NDVI CSV (date, ndvi, optional District)
    #[arg(long)]
    ndvi: PathBuf,

    /// Linear yield model JSON
    #[arg(long)]
    model: PathBuf,

    /// Historical NDVI CSV for the anomaly baseline (default: pre-season readings)
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Season year (default: current year)
    #[arg(long)]
    year: Option<i32>,

    /// Last day of the season window, YYYY-MM-DD (default: today, or Dec 31 for past years)
    #[arg(long)]
    as_of: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without scoring anything
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Loaded data files shared by `assess` and `batch`
struct Dataset {
    history: YieldHistory,
    ndvi: NdviCatalog,
    model: LinearYieldModel,
    baseline: Option<NdviBaseline>,
    year: i32,
    as_of: NaiveDate,
}

impl Dataset {
    fn load(args: &DataArgs) -> anyhow::Result<Self> {
        let history = YieldHistory::from_csv_path(&normalize(&args.history)?)?;
        if history.is_empty() {
            anyhow::bail!("no usable rows in {}", args.history.display());
        }
        let ndvi = NdviCatalog::from_csv_path(&normalize(&args.ndvi)?)?;
        let model = LinearYieldModel::from_json_path(&normalize(&args.model)?)?;

        let baseline = match &args.baseline {
            Some(path) => {
                let series = NdviSeries::from_csv_path(&normalize(path)?)?;
                let baseline = NdviBaseline::from_series(&series).with_context(|| {
                    format!("baseline needs at least two readings: {}", path.display())
                })?;
                Some(baseline)
            }
            None => None,
        };

        let today = Local::now().date_naive();
        let year = args.year.unwrap_or_else(|| today.year());
        let as_of = match args.as_of {
            Some(date) => date,
            None if year < today.year() => NaiveDate::from_ymd_opt(year, 12, 31)
                .with_context(|| format!("invalid season year: {}", year))?,
            None => today,
        };

        info!(
            pairs = history.keys().len(),
            ndvi_districts = ndvi.districts().len(),
            year,
            %as_of,
            "loaded dataset"
        );

        Ok(Dataset {
            history,
            ndvi,
            model,
            baseline,
            year,
            as_of,
        })
    }

    fn assess(
        &self,
        district: &str,
        crop: &str,
        settings: &AssessmentSettings,
    ) -> anyhow::Result<Assessment> {
        let request = AssessmentRequest {
            district: district.to_string(),
            crop: crop.to_string(),
            year: self.year,
            as_of: self.as_of,
        };
        let collaborators = Collaborators {
            predictor: &self.model,
            history: &self.history,
            ndvi: self.ndvi.series_for(district),
            baseline: self.baseline,
        };
        assess(&request, &collaborators, settings)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Score {
            predicted,
            average,
            cv,
            z_score,
            base_score,
            format,
            config: config_path,
        } => {
            let resolved_config = load_config(config_path.as_deref())?;

            // CLI flags override config file values
            let inputs = RiskInputs::new(predicted, average, cv, z_score)
                .with_base_score(base_score.unwrap_or(resolved_config.base_score));

            let report = yieldrisk_core::score_with_config(&inputs, Some(&resolved_config))
                .context("cannot score inputs")?;

            match format {
                OutputFormat::Text => print!("{}", render_score_text(&report)),
                OutputFormat::Json => println!("{}", render_score_json(&report)),
            }
        }
        Commands::Assess {
            district,
            crop,
            data,
            format,
            explain,
            config: config_path,
        } => {
            let resolved_config = load_config(config_path.as_deref())?;
            let settings = resolved_config.assessment_settings();
            let dataset = Dataset::load(&data)?;

            let assessment = dataset.assess(&district, &crop, &settings)?;
            let assessments = vec![assessment];

            match format {
                OutputFormat::Text => print!("{}", render_text(&assessments, explain)),
                OutputFormat::Json => println!("{}", render_json(&assessments)),
            }
        }
        Commands::Batch {
            data,
            top,
            format,
            explain,
            config: config_path,
        } => {
            let resolved_config = load_config(config_path.as_deref())?;
            let settings = resolved_config.assessment_settings();
            let dataset = Dataset::load(&data)?;

            let keys = dataset.history.keys();
            let progress = create_progress_bar(keys.len())?;

            let results: Vec<Option<Assessment>> = keys
                .par_iter()
                .map(|(district, crop)| {
                    let result = dataset.assess(district, crop, &settings);
                    progress.inc(1);
                    match result {
                        Ok(assessment) => Some(assessment),
                        Err(e) => {
                            warn!(%district, %crop, error = %format!("{:#}", e), "skipping");
                            None
                        }
                    }
                })
                .collect();
            progress.finish_and_clear();

            let total = results.len();
            let assessments: Vec<Assessment> = results.into_iter().flatten().collect();
            if assessments.len() < total {
                eprintln!(
                    "Skipped {} of {} district/crop pairs (run with -v for details)",
                    total - assessments.len(),
                    total
                );
            }

            let mut sorted = sort_assessments(assessments, &settings.thresholds);

            // CLI flags override config file values
            if let Some(n) = top.or(resolved_config.top_n) {
                sorted.truncate(n);
            }

            match format {
                OutputFormat::Text => print!("{}", render_text(&sorted, explain)),
                OutputFormat::Json => println!("{}", render_json(&sorted)),
            }
        }
        Commands::Districts { history, district } => {
            let history = YieldHistory::from_csv_path(&normalize(&history)?)?;
            let names = match &district {
                Some(district) => {
                    let crops = history.crops_for_district(district);
                    if crops.is_empty() {
                        anyhow::bail!("no crops recorded for district: {}", district);
                    }
                    crops
                }
                None => history.districts(),
            };
            for name in names {
                println!("{}", name);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref());

                match resolved {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref())
                    .context("failed to load configuration")?;
                print_config(&resolved);
            }
        },
    }

    Ok(())
}

/// Load configuration from `--config` or the current directory
fn load_config(config_path: Option<&Path>) -> anyhow::Result<ResolvedConfig> {
    let project_root = std::env::current_dir()?;
    let config_path = config_path.map(normalize).transpose()?;
    let resolved = config::load_and_resolve(&project_root, config_path.as_deref())
        .context("failed to load configuration")?;

    if let Some(path) = &resolved.config_path {
        eprintln!("Using config: {}", path.display());
    }
    Ok(resolved)
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!("Scoring:");
    println!("  base_score: {}", resolved.base_score);
    println!("  default_ndvi: {}", resolved.default_ndvi);
    println!(
        "  fallback: {}",
        match resolved.fallback {
            FallbackPolicy::Error => "error",
            FallbackPolicy::Tier(tier) => tier.as_str(),
        }
    );
    println!();
    println!("Thresholds:");
    println!("  low_risk: {}", resolved.thresholds.low_risk);
    println!("  moderate_risk: {}", resolved.thresholds.moderate_risk);
    println!();
    println!("Filters:");
    println!(
        "  top: {}",
        resolved
            .top_n
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
}

fn create_progress_bar(total: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} assessments")
            .context("invalid progress template")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

/// Resolve a path against the current directory and check it exists
fn normalize(path: &Path) -> anyhow::Result<PathBuf> {
    let normalized = if path.is_relative() {
        std::env::current_dir()?.join(path)
    } else {
        path.to_path_buf()
    };

    if !normalized.exists() {
        anyhow::bail!("Path does not exist: {}", normalized.display());
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_accepts_negative_numbers() {
        let cli = Cli::try_parse_from([
            "yieldrisk",
            "score",
            "--predicted",
            "-100",
            "--average",
            "-500",
            "--cv",
            "-0.1",
            "--z-score",
            "-2.5",
            "--base-score",
            "-1",
        ])
        .unwrap();

        match cli.command {
            Commands::Score {
                predicted,
                average,
                cv,
                z_score,
                base_score,
                ..
            } => {
                assert_eq!(predicted, -100.0);
                assert_eq!(average, -500.0);
                assert_eq!(cv, -0.1);
                assert_eq!(z_score, -2.5);
                assert_eq!(base_score, Some(-1.0));
            }
            _ => panic!("expected score command"),
        }
    }

    #[test]
    fn test_negative_cv_reaches_engine() {
        let inputs = RiskInputs::new(100.0, -500.0, -0.1, 0.0);
        let err = yieldrisk_core::score(&inputs).unwrap_err();
        assert_eq!(err.field(), "historical_yield_cv");
    }

    #[test]
    fn test_districts_parses_optional_district() {
        let cli =
            Cli::try_parse_from(["yieldrisk", "districts", "--history", "yields.csv"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Districts { district: None, .. }
        ));

        let cli = Cli::try_parse_from([
            "yieldrisk",
            "districts",
            "--history",
            "yields.csv",
            "--district",
            "Mysuru",
        ])
        .unwrap();
        match cli.command {
            Commands::Districts { district, .. } => assert_eq!(district.as_deref(), Some("Mysuru")),
            _ => panic!("expected districts command"),
        }
    }

    #[test]
    fn test_unknown_subcommand_rejected() {
        assert!(Cli::try_parse_from(["yieldrisk", "forecast"]).is_err());
    }
}
