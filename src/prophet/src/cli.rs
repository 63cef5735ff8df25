//! CLI commands for tjk-prophet.
//!
//! Supports training an artifact, scoring a program with it, and walk-forward evaluation.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use tjk_prophet::config::AppConfig;
use tjk_prophet::types::Metrics;
use tjk_prophet::{create_shared_artifact, load_inputs, predict, prepare, train, walk_forward, PreparedRaces};

#[derive(Parser)]
#[command(name = "tjk-prophet")]
#[command(version, about = "TJK Prophet: calibrated win probabilities for race programs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train base predictors, ensemble and calibrator into a model artifact
    Train {
        /// Program CSV
        #[arg(long)]
        program: PathBuf,

        /// Optional workout CSV
        #[arg(long)]
        workouts: Option<PathBuf>,

        /// First validation date (YYYY-MM-DD); earlier races train
        #[arg(long)]
        val_date: NaiveDate,

        /// Artifact path override
        #[arg(long)]
        artifact: Option<PathBuf>,

        /// Metrics output path override
        #[arg(long)]
        meta_out: Option<PathBuf>,
    },

    /// Score a program with a trained artifact
    Predict {
        /// Program CSV
        #[arg(long)]
        program: PathBuf,

        /// Optional workout CSV
        #[arg(long)]
        workouts: Option<PathBuf>,

        /// Artifact path override
        #[arg(long)]
        artifact: Option<PathBuf>,

        /// Output JSON path
        #[arg(long)]
        out: PathBuf,
    },

    /// Retrain at the latest race days and report metrics per cutoff
    Backtest {
        /// Program CSV
        #[arg(long)]
        program: PathBuf,

        /// Optional workout CSV
        #[arg(long)]
        workouts: Option<PathBuf>,

        /// Number of walk-forward cutoffs
        #[arg(long, default_value_t = 3)]
        splits: usize,
    },
}

fn prepare_inputs(
    program: &Path,
    workouts: Option<&Path>,
    config: &AppConfig,
) -> anyhow::Result<PreparedRaces> {
    let (program_data, workout_rows) = load_inputs(program, workouts)
        .with_context(|| format!("Failed to ingest {}", program.display()))?;
    Ok(prepare(&program_data, workout_rows.as_deref(), config)?)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Train and save an artifact.
pub fn run_train(
    program: PathBuf,
    workouts: Option<PathBuf>,
    val_date: NaiveDate,
    artifact_path: Option<PathBuf>,
    meta_out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;

    // Override paths if provided
    if let Some(path) = artifact_path {
        config.paths.artifact = path.to_string_lossy().to_string();
    }
    if let Some(path) = meta_out {
        config.paths.meta_out = path.to_string_lossy().to_string();
    }

    let prepared = prepare_inputs(&program, workouts.as_deref(), &config)?;
    let artifact = train(&prepared, val_date, &config).context("Training failed")?;

    artifact
        .save(&config.paths.artifact)
        .with_context(|| format!("Failed to save artifact to {}", config.paths.artifact))?;
    write_json(Path::new(&config.paths.meta_out), &artifact.metrics)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": "ok",
            "metrics": artifact.metrics,
        }))?
    );
    Ok(())
}

/// Score a program and write the race summaries.
pub fn run_predict(
    program: PathBuf,
    workouts: Option<PathBuf>,
    artifact_path: Option<PathBuf>,
    out: PathBuf,
) -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;

    if let Some(path) = artifact_path {
        config.paths.artifact = path.to_string_lossy().to_string();
    }

    tracing::info!("Loading artifact from: {}", config.paths.artifact);
    let artifact = create_shared_artifact(&config.paths.artifact)
        .with_context(|| format!("Failed to load artifact {}", config.paths.artifact))?;

    let prepared = prepare_inputs(&program, workouts.as_deref(), &config)?;
    let races = predict(&artifact, &prepared).context("Prediction failed")?;
    write_json(&out, &races)?;

    eprintln!(
        "Wrote {} races ({} row errors) to {}",
        races.len(),
        prepared.errors.len(),
        out.display()
    );
    Ok(())
}

/// Walk-forward evaluation over the latest race days.
pub fn run_backtest(program: PathBuf, workouts: Option<PathBuf>, splits: usize) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let prepared = prepare_inputs(&program, workouts.as_deref(), &config)?;
    let results = walk_forward(&prepared, splits, &config).context("Walk-forward evaluation failed")?;
    print_walk_forward_table(&results);
    Ok(())
}

fn fmt_metric(metrics: &Metrics, name: &str) -> String {
    match metrics.get(name).copied().flatten() {
        Some(v) => format!("{v:.4}"),
        None => "-".to_string(),
    }
}

/// Print walk-forward metrics in table format.
pub fn print_walk_forward_table(results: &[(NaiveDate, Metrics)]) {
    println!("=== Walk-forward Results ===");
    println!();
    println!(
        "  {:12} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "Cutoff", "AUC", "Brier", "LogLoss", "NDCG@3", "ECE"
    );
    println!("  {}", "-".repeat(58));
    for (cutoff, metrics) in results {
        println!(
            "  {:12} {:>8} {:>8} {:>8} {:>8} {:>8}",
            cutoff.to_string(),
            fmt_metric(metrics, "auc"),
            fmt_metric(metrics, "brier"),
            fmt_metric(metrics, "logloss"),
            fmt_metric(metrics, "ndcg@3"),
            fmt_metric(metrics, "ece"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_args() {
        let cli = Cli::try_parse_from([
            "tjk-prophet",
            "train",
            "--program",
            "data/program.csv",
            "--val-date",
            "2024-06-01",
        ])
        .unwrap();
        match cli.command {
            Commands::Train {
                val_date, artifact, ..
            } => {
                assert_eq!(val_date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
                assert!(artifact.is_none());
            }
            _ => panic!("expected train"),
        }
    }

    #[test]
    fn test_predict_requires_out() {
        assert!(Cli::try_parse_from(["tjk-prophet", "predict", "--program", "p.csv"]).is_err());
    }

    #[test]
    fn test_fmt_metric() {
        let metrics = Metrics::from([("auc".to_string(), None), ("ece".to_string(), Some(0.01234))]);
        assert_eq!(fmt_metric(&metrics, "auc"), "-");
        assert_eq!(fmt_metric(&metrics, "ece"), "0.0123");
        assert_eq!(fmt_metric(&metrics, "missing"), "-");
    }
}
