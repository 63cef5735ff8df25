//! Training and prediction pipelines.
//!
//! Both start from ingested records: merge workouts, build the entrant table and run the
//! feature engine. Training fits base predictors, the ensemble and a calibrator into a
//! [`ModelArtifact`]; prediction replays the same transforms through a loaded artifact.

use chrono::NaiveDate;
use ndarray::{Array1, Array2, Axis};
use std::path::Path;
use tracing::info;

use crate::artifact::{ModelArtifact, SlotModel, TrainMeta};
use crate::backtest::{time_based_split, walk_forward_splits};
use crate::calibration::Calibrator;
use crate::config::AppConfig;
use crate::error::Result;
use crate::features::build_features;
use crate::ingest::{read_program_csv, read_workouts_csv, ProgramData};
use crate::merge::RecordMerger;
use crate::metrics::evaluate;
use crate::models::{
    BasePredictor, Capabilities, ContextGatedEnsemble, Predictor, PREDICTOR_SLOTS,
};
use crate::summary::summarize_races;
use crate::table::EntrantTable;
use crate::types::{Metrics, RacePrediction, RowError, WorkoutRecord};

/// Enriched entrant table plus the ingestion errors that travel with the output.
#[derive(Debug, Clone)]
pub struct PreparedRaces {
    pub table: EntrantTable,
    pub errors: Vec<RowError>,
}

/// Read the program and optional workout CSVs.
pub fn load_inputs(
    program: &Path,
    workouts: Option<&Path>,
) -> Result<(ProgramData, Option<Vec<WorkoutRecord>>)> {
    let program = read_program_csv(program)?;
    let workouts = workouts.map(read_workouts_csv).transpose()?;
    Ok((program, workouts))
}

/// Merge workouts and run the feature engine.
pub fn prepare(
    program: &ProgramData,
    workouts: Option<&[WorkoutRecord]>,
    config: &AppConfig,
) -> Result<PreparedRaces> {
    let merged = RecordMerger::new(config.merge.match_score_threshold).merge(program, workouts);
    let table = build_features(&EntrantTable::new(merged.entrants)?)?;
    info!(
        "Prepared {} entrants in {} races ({} row errors)",
        table.len(),
        table.races().len(),
        merged.errors.len()
    );
    Ok(PreparedRaces {
        table,
        errors: merged.errors,
    })
}

/// Win labels: the recorded result when any entrant carries one, otherwise the entrants
/// holding their race's shortest odds.
pub fn win_targets(table: &EntrantTable) -> Vec<f64> {
    let entrants = table.entrants();
    if entrants.iter().any(|e| e.result_win.is_some()) {
        return entrants.iter().map(|e| e.result_win.unwrap_or(0.0)).collect();
    }
    table.races().map_groups(entrants, |race| {
        let favourite = race
            .iter()
            .filter_map(|e| e.odds)
            .min_by(|a, b| a.total_cmp(b));
        race.iter()
            .map(|e| match (e.odds, favourite) {
                (Some(odds), Some(min)) if odds == min => 1.0,
                _ => 0.0,
            })
            .collect()
    })
}

fn base_probabilities(models: &[SlotModel], x: &Array2<f64>) -> Result<Vec<Array1<f64>>> {
    models
        .iter()
        .map(|slot| Ok(slot.model.predict_proba(x)?.column(1).to_owned()))
        .collect()
}

/// Calibrated win probability of every table row, clipped to `[0, 1]`.
pub fn score(artifact: &ModelArtifact, table: &EntrantTable) -> Result<Vec<f64>> {
    let x = table.feature_matrix(&artifact.feature_columns);
    let base = base_probabilities(&artifact.models, &x)?;
    let combined = artifact.ensemble.combine(&base, &table.row_contexts())?.to_vec();
    Ok(artifact.calibrator.apply(&combined))
}

/// Fit every component on the prepared races and assemble the artifact.
pub fn train(prepared: &PreparedRaces, val_date: NaiveDate, config: &AppConfig) -> Result<ModelArtifact> {
    let table = &prepared.table;
    let capabilities = Capabilities::from_config(&config.models);
    let feature_columns = table.feature_names();
    let x = table.feature_matrix(&feature_columns);
    let y = Array1::from(win_targets(table));

    let dates: Vec<NaiveDate> = table.entrants().iter().map(|e| e.race_date).collect();
    let split = time_based_split(&dates, val_date).with_fallbacks(table.len(), config.training.val_fraction);
    info!(
        "Split at {}: {} train rows, {} validation rows",
        val_date,
        split.train_idx.len(),
        split.val_idx.len()
    );

    let x_train = x.select(Axis(0), &split.train_idx);
    let y_train = y.select(Axis(0), &split.train_idx);
    let validation = (!split.val_idx.is_empty()).then(|| {
        (
            x.select(Axis(0), &split.val_idx),
            y.select(Axis(0), &split.val_idx),
        )
    });

    let mut models = Vec::with_capacity(PREDICTOR_SLOTS.len());
    for slot in &PREDICTOR_SLOTS {
        let mut model = BasePredictor::for_slot(slot, &capabilities, &config.training)?;
        model.fit(
            &x_train,
            &y_train,
            validation.as_ref().map(|(xv, _)| xv),
            validation.as_ref().map(|(_, yv)| yv),
        )?;
        models.push(SlotModel {
            name: slot.name.to_string(),
            model,
        });
    }

    let base = base_probabilities(&models, &x)?;
    let mut base_matrix = Array2::<f64>::zeros((x.nrows(), base.len()));
    for (j, column) in base.iter().enumerate() {
        base_matrix.column_mut(j).assign(column);
    }
    let labels = Array2::from_shape_fn((y.len(), 2), |(i, j)| if j == 1 { y[i] } else { 1.0 - y[i] });
    let contexts = table.row_contexts();
    let mut ensemble = ContextGatedEnsemble::new();
    ensemble.fit(
        &base_matrix,
        &contexts,
        &labels,
        &capabilities,
        config.training.ensemble_max_iter,
    )?;
    let combined = ensemble.combine(&base, &contexts)?.to_vec();

    let calibrator = if split.val_idx.is_empty() {
        Calibrator::default()
    } else {
        let val_probs: Vec<f64> = split.val_idx.iter().map(|&i| combined[i]).collect();
        let val_labels: Vec<f64> = split.val_idx.iter().map(|&i| y[i]).collect();
        Calibrator::choose_best(&val_probs, &val_labels, &config.calibration.temperature_grid())
    };
    info!("Selected {} calibration", calibrator.descriptor().method);

    let calibrated = calibrator.apply(&combined);
    let metrics = evaluate(&y.to_vec(), &calibrated, &table.column_or_null("implied_prob"));

    Ok(ModelArtifact {
        feature_columns,
        models,
        ensemble,
        calibrator,
        metrics,
        meta: TrainMeta {
            val_date,
            train_size: split.train_idx.len(),
            val_size: split.val_idx.len(),
            random_seed: config.training.seed,
        },
    })
}

/// Retrain at each of the latest `n_splits` race days and collect the run metrics.
pub fn walk_forward(
    prepared: &PreparedRaces,
    n_splits: usize,
    config: &AppConfig,
) -> Result<Vec<(NaiveDate, Metrics)>> {
    let dates: Vec<NaiveDate> = prepared.table.entrants().iter().map(|e| e.race_date).collect();
    walk_forward_splits(&dates, n_splits)
        .into_iter()
        .map(|split| {
            let artifact = train(prepared, split.cutoff, config)?;
            Ok((split.cutoff, artifact.metrics))
        })
        .collect()
}

/// Score the prepared races and build the per-race output records.
pub fn predict(artifact: &ModelArtifact, prepared: &PreparedRaces) -> Result<Vec<RacePrediction>> {
    let win_probs = score(artifact, &prepared.table)?;
    summarize_races(
        &prepared.table,
        &win_probs,
        &artifact.calibrator.descriptor(),
        &artifact.metrics,
        &prepared.errors,
    )
}
