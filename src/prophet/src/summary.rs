//! Race summaries: ranked per-entrant predictions grouped by race.

use tracing::debug;

use crate::calibration::CalibrationDescriptor;
use crate::error::{PipelineError, Result};
use crate::stats::{bernoulli_std, median};
use crate::table::EntrantTable;
use crate::types::{
    EntrantPrediction, Metrics, PredictionExtras, RaceMeta, RacePrediction, RowError, Uncertainty,
};

/// Race time used when neither the entrant nor its race has a best time.
pub const FALLBACK_RACE_TIME: f64 = 95.0;

/// Heuristic place probability `sqrt(win)`. Monotone in the win probability but not calibrated.
pub fn place_probability(win_prob: f64) -> f64 {
    win_prob.max(0.0).sqrt().clamp(0.0, 1.0)
}

pub fn expected_finish(win_prob: f64, field_size: usize) -> f64 {
    1.0 + (1.0 - win_prob) * (field_size as f64 / 2.0)
}

/// Build one output record per race, in `race_uid` order.
///
/// `win_probs` is aligned with the table rows. Every record carries the same calibration
/// descriptor, run metrics and ingestion errors.
pub fn summarize_races(
    table: &EntrantTable,
    win_probs: &[f64],
    calibration: &CalibrationDescriptor,
    metrics: &Metrics,
    errors: &[RowError],
) -> Result<Vec<RacePrediction>> {
    if win_probs.len() != table.len() {
        return Err(PipelineError::ShapeMismatch {
            context: "race summary probabilities".to_string(),
            expected: table.len(),
            actual: win_probs.len(),
        });
    }
    let gate_rank = table.column_or_null("gate_rank_pct");
    let drift = table.column_or_null("drift_dp15");
    let mdi = table.column_or_null("mdi");
    let implied = table.column_or_null("implied_prob");
    let context_keys = table.label("gate_context_key");

    let mut races = Vec::with_capacity(table.races().len());
    for group in table.races().groups() {
        let entrants = &table.entrants()[group.range.clone()];
        let Some(first) = entrants.first() else {
            continue;
        };
        let field_size = group.len();
        let best_times: Vec<f64> = entrants.iter().filter_map(|e| e.best_time).collect();
        let median_best_time = median(&best_times);

        let mut predictions: Vec<EntrantPrediction> = group
            .range
            .clone()
            .zip(entrants)
            .map(|(row, entrant)| {
                let win_prob = win_probs[row];
                let place_prob = place_probability(win_prob);
                EntrantPrediction {
                    horse_id: entrant.horse_uid.clone(),
                    name: entrant.name.clone(),
                    start_no: entrant.start_no,
                    win_prob,
                    place_prob,
                    expected_finish: expected_finish(win_prob, field_size),
                    race_time: entrant
                        .best_time
                        .or(median_best_time)
                        .unwrap_or(FALLBACK_RACE_TIME),
                    uncertainty: Uncertainty {
                        win_std: bernoulli_std(win_prob),
                        place_std: bernoulli_std(place_prob),
                    },
                    odds: entrant.odds,
                    implied_prob: implied[row],
                    edge: win_prob - implied[row].unwrap_or(0.0),
                    divergence_index: mdi[row],
                    drift: drift[row],
                    extras: PredictionExtras {
                        has_equipment_flag: entrant.has_equipment_flag,
                        gate_rank_pct: gate_rank[row],
                        gate_context_key: context_keys.and_then(|keys| keys[row].clone()),
                    },
                }
            })
            .collect();
        predictions.sort_by(|a, b| {
            b.win_prob
                .total_cmp(&a.win_prob)
                .then(a.expected_finish.total_cmp(&b.expected_finish))
        });

        races.push(RacePrediction {
            race_id: group.race_uid.clone(),
            meta: RaceMeta {
                venue: first.venue.clone(),
                date: first.race_date.format("%Y-%m-%d").to_string(),
                time: first.post_time.clone(),
                class: first.race_class.clone(),
                distance: first.distance,
                track_type: first.track_type,
                calibration: calibration.clone(),
            },
            predictions,
            metrics: metrics.clone(),
            errors: errors.to_vec(),
        });
    }
    races.sort_by(|a, b| a.race_id.cmp(&b.race_id));
    debug!("Summarized {} races", races.len());
    Ok(races)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::build_features;
    use crate::types::{Entrant, RowErrorReason};

    fn entrant(race: &str, name: &str, odds: Option<f64>, best_time: Option<f64>) -> Entrant {
        Entrant {
            race_uid: race.to_string(),
            horse_uid: format!("{race}-{name}"),
            name: name.to_string(),
            venue: "Adana".to_string(),
            post_time: "14:30".to_string(),
            distance: 1600,
            start_no: Some(name.len() as i64),
            odds,
            implied_prob: odds.map(|o| 1.0 / o),
            best_time,
            ..Default::default()
        }
    }

    fn descriptor() -> CalibrationDescriptor {
        CalibrationDescriptor {
            method: "temperature".to_string(),
            param: Some(1.0),
        }
    }

    fn table() -> EntrantTable {
        let table = EntrantTable::new(vec![
            entrant("r2", "a", Some(2.0), Some(96.0)),
            entrant("r2", "bb", Some(4.0), None),
            entrant("r2", "ccc", None, Some(98.0)),
            entrant("r1", "d", None, None),
        ])
        .unwrap();
        build_features(&table).unwrap()
    }

    #[test]
    fn test_summary_derivations() {
        let table = table();
        let errors = vec![RowError {
            row: 7,
            reason: RowErrorReason::MissingHorse,
            value: None,
        }];
        let races = summarize_races(
            &table,
            &[0.2, 0.5, 0.2, 0.9],
            &descriptor(),
            &Metrics::new(),
            &errors,
        )
        .unwrap();

        assert_eq!(races.len(), 2);
        assert_eq!(races[0].race_id, "r1");
        assert_eq!(races[1].race_id, "r2");
        assert_eq!(races[1].errors, errors);
        assert_eq!(races[1].meta.calibration, descriptor());

        let preds = &races[1].predictions;
        let names: Vec<_> = preds.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names[0], "bb");
        let bb = &preds[0];
        assert!((bb.place_prob - 0.5f64.sqrt()).abs() < 1e-12);
        assert!((bb.expected_finish - 1.75).abs() < 1e-12);
        assert_eq!(bb.race_time, 97.0);
        assert!((bb.edge - 0.25).abs() < 1e-12);
        assert!((bb.uncertainty.win_std - 0.5).abs() < 1e-12);
        assert_eq!(bb.drift, None);

        let ccc = preds.iter().find(|p| p.name == "ccc").unwrap();
        assert_eq!(ccc.edge, 0.2);
        assert_eq!(ccc.race_time, 98.0);

        let lone = &races[0].predictions[0];
        assert_eq!(lone.race_time, FALLBACK_RACE_TIME);
        assert_eq!(lone.extras.gate_context_key.as_deref(), Some("cim|none|1400-2000|adana"));
    }

    #[test]
    fn test_ordering_is_total() {
        let table = table();
        let races = summarize_races(
            &table,
            &[0.3, 0.3, 0.7, 0.1],
            &descriptor(),
            &Metrics::new(),
            &[],
        )
        .unwrap();
        let preds = &races[1].predictions;
        for pair in preds.windows(2) {
            assert!(
                pair[0].win_prob > pair[1].win_prob
                    || (pair[0].win_prob == pair[1].win_prob
                        && pair[0].expected_finish <= pair[1].expected_finish)
            );
            assert!(pair[0].place_prob == pair[0].win_prob.sqrt());
        }
    }

    #[test]
    fn test_length_mismatch() {
        let table = table();
        assert!(summarize_races(&table, &[0.1], &descriptor(), &Metrics::new(), &[]).is_err());
    }
}
