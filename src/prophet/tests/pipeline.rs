//! End-to-end tests: CSV ingestion through training, artifact round trip and race summaries.

use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

use tjk_prophet::config::AppConfig;
use tjk_prophet::models::EnsembleWeights;
use tjk_prophet::types::RowErrorReason;
use tjk_prophet::{create_shared_artifact, load_inputs, predict, prepare, train, walk_forward, PipelineError};

const HEADER: &str = "Tarih,Hipodrom,Koşu ID,Koşu Saati,Mesafe,Pist Tipi,Çim Durumu,Kum Durumu,\
At İsmi,Start No,Ganyan,AGF,Yaş Bilgisi,Sıklet,Handikap Puanı,En İyi Derece,Donanım Kodları,Baba,Result_Win";

/// Four race days with two six-horse races each; the shortest-priced horse always wins.
fn program_csv() -> String {
    let mut lines = vec![HEADER.to_string()];
    for day in 1..=4 {
        for race in 1..=2 {
            let (track, distance) = if race == 1 { ("Çim", 1400) } else { ("Kum", 1900) };
            for horse in 1..=6 {
                let odds = 1.5 + horse as f64 * 1.7;
                let agf = 40 - horse * 5;
                let best = format!("1.{}.{}", 30 + horse, 10 * horse);
                let won = if horse == 1 { 1 } else { 0 };
                let kg = if horse % 2 == 0 { "KG DB" } else { "" };
                lines.push(format!(
                    "0{day}/06/2024,İstanbul,{day}{race},1{race}:30,{distance},{track},Islak,Normal,\
                     At {day}{race}{horse},{horse},{odds:.1},{agf},{},{},{},{best},{kg},Sire {horse},{won}",
                    3 + horse % 3,
                    55 + horse,
                    60 + horse * 2,
                ));
            }
        }
    }
    lines.join("\n")
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn val_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 4).unwrap()
}

#[test]
fn test_train_save_load_predict() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_file(dir.path(), "program.csv", &program_csv());
    let config = AppConfig::default();

    let (program_data, workouts) = load_inputs(&program, None).unwrap();
    assert!(workouts.is_none());
    assert_eq!(program_data.entrants.len(), 48);
    let prepared = prepare(&program_data, None, &config).unwrap();

    let artifact = train(&prepared, val_date(), &config).unwrap();
    assert_eq!(artifact.meta.train_size, 36);
    assert_eq!(artifact.meta.val_size, 12);
    assert_eq!(artifact.models.len(), 2);
    assert_eq!(artifact.feature_columns, prepared.table.feature_names());
    for key in ["auc", "pr_auc", "brier", "logloss", "ndcg@3", "ece", "edge_mean"] {
        assert!(artifact.metrics.contains_key(key), "missing metric {key}");
    }

    let path = dir.path().join("artifacts").join("model.json");
    artifact.save(&path).unwrap();
    let shared = create_shared_artifact(&path).unwrap();

    let races = predict(&shared, &prepared).unwrap();
    assert_eq!(races.len(), 8);
    let ids: Vec<_> = races.iter().map(|r| r.race_id.clone()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);

    let descriptor = shared.calibrator.descriptor();
    for race in &races {
        assert_eq!(race.meta.calibration, descriptor);
        assert_eq!(race.predictions.len(), 6);
        assert_eq!(race.metrics, shared.metrics);
        for p in &race.predictions {
            assert!((0.0..=1.0).contains(&p.win_prob));
            assert!((0.0..=1.0).contains(&p.place_prob));
            assert!((p.place_prob - p.win_prob.sqrt()).abs() < 1e-12);
            assert!((p.expected_finish - (1.0 + (1.0 - p.win_prob) * 3.0)).abs() < 1e-9);
            assert!(p.extras.gate_context_key.is_some());
        }
        for pair in race.predictions.windows(2) {
            assert!(
                pair[0].win_prob > pair[1].win_prob
                    || (pair[0].win_prob == pair[1].win_prob
                        && pair[0].expected_finish <= pair[1].expected_finish)
            );
        }
    }

    let first = &races[0];
    assert_eq!(first.race_id, "2024-06-01_istanbul_11");
    assert_eq!(first.meta.distance, 1400);
    assert_eq!(first.meta.time, "11:30");
    let key = first.predictions[0].extras.gate_context_key.as_deref().unwrap();
    assert_eq!(key, "cim|Islak|<=1400|istanbul");
}

#[test]
fn test_non_finite_cells_are_treated_as_missing() {
    let dir = tempfile::tempdir().unwrap();
    let csv = program_csv().replacen(",3.2,35,4,56,62,", ",inf,35,4,Infinity,62,", 1);
    assert!(csv.contains("Infinity"));
    let program = write_file(dir.path(), "program.csv", &csv);
    let config = AppConfig::default();

    let (program_data, _) = load_inputs(&program, None).unwrap();
    assert_eq!(program_data.entrants.len(), 48);
    let first = &program_data.entrants[0];
    assert_eq!(first.odds, None);
    assert_eq!(first.weight, None);

    let prepared = prepare(&program_data, None, &config).unwrap();
    let artifact = train(&prepared, val_date(), &config).unwrap();
    let path = dir.path().join("model.json");
    artifact.save(&path).unwrap();
    let shared = create_shared_artifact(&path).unwrap();

    let races = predict(&shared, &prepared).unwrap();
    assert_eq!(races.len(), 8);
    for p in races.iter().flat_map(|r| &r.predictions) {
        assert!((0.0..=1.0).contains(&p.win_prob), "win_prob {}", p.win_prob);
        assert!(p.expected_finish.is_finite());
    }
}

#[test]
fn test_invalid_track_excludes_whole_race() {
    let dir = tempfile::tempdir().unwrap();
    let mut csv = program_csv();
    // second horse of the first race gets an unknown surface
    csv = csv.replacen("1400,Çim,Islak,Normal,At 112", "1400,Grass,Islak,Normal,At 112", 1);
    let program = write_file(dir.path(), "program.csv", &csv);

    let (program_data, _) = load_inputs(&program, None).unwrap();
    assert_eq!(program_data.entrants.len(), 42);
    assert!(program_data
        .entrants
        .iter()
        .all(|e| e.race_uid != "2024-06-01_istanbul_11"));
    assert_eq!(program_data.errors.len(), 1);
    assert_eq!(program_data.errors[0].reason, RowErrorReason::InvalidTrack);
    assert_eq!(program_data.errors[0].value.as_deref(), Some("Grass"));

    let config = AppConfig::default();
    let prepared = prepare(&program_data, None, &config).unwrap();
    let artifact = train(&prepared, val_date(), &config).unwrap();
    let races = predict(&artifact, &prepared).unwrap();
    assert_eq!(races.len(), 7);
    assert!(races.iter().all(|r| r.errors.len() == 1));
}

#[test]
fn test_market_features_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    let csv = "Tarih,Hipodrom,Koşu Saati,Mesafe,Pist Tipi,At İsmi,Ganyan\n\
               01/06/2024,Bursa,14:00,1200,Kum,A,2.0\n\
               01/06/2024,Bursa,14:00,1200,Kum,B,4.0\n\
               01/06/2024,Bursa,14:00,1200,Kum,C,\n";
    let program = write_file(dir.path(), "program.csv", csv);
    let (program_data, _) = load_inputs(&program, None).unwrap();
    let prepared = prepare(&program_data, None, &AppConfig::default()).unwrap();
    let table = &prepared.table;

    // without a race id or number every row is keyed as its own race
    assert_eq!(table.len(), 3);
    assert_eq!(table.races().len(), 3);
    let implied = table.column("implied_prob").unwrap();
    assert_eq!(implied[0], Some(0.5));
    assert_eq!(implied[1], Some(0.25));
    assert_eq!(implied[2], None);
}

#[test]
fn test_market_overround_within_race() {
    let dir = tempfile::tempdir().unwrap();
    let csv = "Tarih,Hipodrom,Koşu ID,Koşu Saati,Mesafe,Pist Tipi,At İsmi,Ganyan\n\
               01/06/2024,Bursa,7,14:00,1200,Kum,A,2.0\n\
               01/06/2024,Bursa,7,14:00,1200,Kum,B,4.0\n\
               01/06/2024,Bursa,7,14:00,1200,Kum,C,\n";
    let program = write_file(dir.path(), "program.csv", csv);
    let (program_data, _) = load_inputs(&program, None).unwrap();
    let prepared = prepare(&program_data, None, &AppConfig::default()).unwrap();
    let table = &prepared.table;

    assert_eq!(table.races().len(), 1);
    let overround = table.column("market_overround").unwrap();
    assert!(overround.iter().all(|o| (o.unwrap() - 0.75).abs() < 1e-12));
    let market = table.column("market_prob").unwrap();
    assert!((market[0].unwrap() - 2.0 / 3.0).abs() < 1e-9);
    assert!((market[1].unwrap() - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(market[2], None);
}

#[test]
fn test_missing_required_column_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_file(
        dir.path(),
        "program.csv",
        "Tarih,Hipodrom,Mesafe,Pist Tipi,At İsmi\n01/06/2024,Bursa,1200,Kum,A\n",
    );
    match load_inputs(&program, None) {
        Err(PipelineError::MissingColumns { columns, .. }) => {
            assert_eq!(columns, vec!["Koşu Saati".to_string()]);
        }
        other => panic!("expected missing columns, got {other:?}"),
    }
}

#[test]
fn test_workouts_attach_only_when_matched() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_file(
        dir.path(),
        "program.csv",
        "Tarih,Hipodrom,Koşu ID,Koşu Saati,Mesafe,Pist Tipi,At İsmi,W_Data_Quality\n\
         01/06/2024,Bursa,7,14:00,1200,Kum,Rüzgar,matched\n\
         01/06/2024,Bursa,7,14:00,1200,Kum,Fırtına,partial\n",
    );
    let workouts = write_file(
        dir.path(),
        "workouts.csv",
        "Tarih,Hipodrom,Koşu ID,At İsmi,Workout Tarih,w800_s,match_score\n\
         01/06/2024,Bursa,7,rüzgar,20/05/2024,50.1,\n\
         01/06/2024,Bursa,7,Rüzgar,25/05/2024,49.8,\n\
         01/06/2024,Bursa,7,Fırtına,26/05/2024,51.0,99\n",
    );

    let (program_data, workout_rows) = load_inputs(&program, Some(workouts.as_path())).unwrap();
    let prepared = prepare(&program_data, workout_rows.as_deref(), &AppConfig::default()).unwrap();
    let entrants = prepared.table.entrants();

    let ruzgar = &entrants[0].workout_sequence;
    // name match for both Rüzgar rows, score match for the Fırtına row
    assert_eq!(ruzgar.len(), 3);
    assert_eq!(ruzgar[0].workout_date, NaiveDate::from_ymd_opt(2024, 5, 26));
    assert_eq!(ruzgar[2].segments.w800, Some(50.1));
    assert!(entrants[1].workout_sequence.is_empty());
    assert_eq!(prepared.table.column("has_workout").unwrap(), &[Some(1.0), Some(0.0)]);
}

#[test]
fn test_fallback_predictors_and_linear_blend() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_file(dir.path(), "program.csv", &program_csv());
    let mut config = AppConfig::default();
    config.models.disabled = vec![
        "stump_boost".to_string(),
        "MLP".to_string(),
        "logistic_solver".to_string(),
    ];

    let (program_data, _) = load_inputs(&program, None).unwrap();
    let prepared = prepare(&program_data, None, &config).unwrap();
    let artifact = train(&prepared, val_date(), &config).unwrap();
    assert!(artifact
        .models
        .iter()
        .all(|m| m.model.algorithm() == tjk_prophet::models::Algorithm::Logistic));
    assert!(matches!(
        artifact.ensemble.weights(),
        Some(EnsembleWeights::LinearFallback(_))
    ));

    config.models.disabled.push("logistic".to_string());
    match train(&prepared, val_date(), &config) {
        Err(PipelineError::PredictorUnavailable { slot, .. }) => assert_eq!(slot, "gbdt"),
        other => panic!("expected unavailable predictor, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_validation_fallback_and_walk_forward() {
    let dir = tempfile::tempdir().unwrap();
    let program = write_file(dir.path(), "program.csv", &program_csv());
    let config = AppConfig::default();
    let (program_data, _) = load_inputs(&program, None).unwrap();
    let prepared = prepare(&program_data, None, &config).unwrap();

    // every race precedes the cutoff: the last 20% of rows validate
    let late = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let artifact = train(&prepared, late, &config).unwrap();
    assert_eq!(artifact.meta.val_size, 9);
    assert_eq!(artifact.meta.train_size, 39);

    let results = walk_forward(&prepared, 2, &config).unwrap();
    let cutoffs: Vec<_> = results.iter().map(|(d, _)| *d).collect();
    assert_eq!(
        cutoffs,
        vec![
            NaiveDate::from_ymd_opt(2024, 6, 4).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
        ]
    );
    assert!(results.iter().all(|(_, m)| m.contains_key("brier")));
}
