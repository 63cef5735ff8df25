//! Attach workout histories to program entrants.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::info;

use crate::ingest::ProgramData;
use crate::types::{Entrant, WorkoutMatch, WorkoutRecord};

/// Upstream data-quality flag required before any workout is attached.
pub const MATCHED_QUALITY: &str = "matched";

type WorkoutKey<'a> = (NaiveDate, &'a str, Option<&'a str>);

/// Joins entrants with workout rows on `(date, venue, race id)` plus name or score matching.
pub struct RecordMerger {
    match_score_threshold: f64,
}

impl RecordMerger {
    pub fn new(match_score_threshold: f64) -> Self {
        Self {
            match_score_threshold,
        }
    }

    /// Return a copy of the program with every entrant's `workout_sequence` filled.
    ///
    /// Row errors pass through unchanged.
    pub fn merge(&self, program: &ProgramData, workouts: Option<&[WorkoutRecord]>) -> ProgramData {
        let workouts = workouts.unwrap_or_default();
        let mut groups: HashMap<WorkoutKey<'_>, Vec<&WorkoutRecord>> = HashMap::new();
        for record in workouts {
            let key = (
                record.race_date,
                record.venue.as_str(),
                record.race_id.as_deref(),
            );
            groups.entry(key).or_default().push(record);
        }

        let mut attached = 0usize;
        let entrants: Vec<Entrant> = program
            .entrants
            .iter()
            .map(|entrant| {
                // An entrant without a race id lands on the (date, venue, null) group directly.
                let key = (
                    entrant.race_date,
                    entrant.venue.as_str(),
                    entrant.race_id.as_deref(),
                );
                let candidates = groups.get(&key).map(Vec::as_slice).unwrap_or_default();
                let sequence = self.sequence_for(entrant, candidates);
                attached += sequence.len();
                Entrant {
                    workout_sequence: sequence,
                    ..entrant.clone()
                }
            })
            .collect();

        info!(
            "Merged {} workout rows: {} workouts attached to {} entrants",
            workouts.len(),
            attached,
            entrants.len()
        );

        ProgramData {
            entrants,
            errors: program.errors.clone(),
        }
    }

    fn sequence_for(&self, entrant: &Entrant, candidates: &[&WorkoutRecord]) -> Vec<WorkoutMatch> {
        if entrant.data_quality.as_deref().map(str::trim) != Some(MATCHED_QUALITY) {
            return Vec::new();
        }

        let name = normalize_name(&entrant.name);
        let matches: Vec<WorkoutMatch> = candidates
            .iter()
            .filter(|w| {
                normalize_name(&w.horse_name) == name
                    || w.match_score.is_some_and(|s| s >= self.match_score_threshold)
            })
            .map(|w| WorkoutMatch {
                workout_date: w.workout_date,
                match_score: w.match_score,
                match_method: w.match_method.clone(),
                segments: w.segments.clone(),
                workout_type: w.workout_type.clone(),
                workout_status: w.workout_status.clone(),
            })
            .collect();

        let mut dated: Vec<WorkoutMatch> = matches
            .iter()
            .filter(|m| m.workout_date.is_some())
            .cloned()
            .collect();
        if dated.is_empty() {
            return matches;
        }
        dated.sort_by(|a, b| b.workout_date.cmp(&a.workout_date));
        dated
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
