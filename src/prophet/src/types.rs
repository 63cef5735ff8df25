//! Records flowing through the pipeline and the per-race output document.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::calibration::CalibrationDescriptor;

/// Run-level metrics, keyed by metric name. Undefined metrics are `None`.
pub type Metrics = BTreeMap<String, Option<f64>>;

/// Racing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrackType {
    #[default]
    #[serde(rename = "cim")]
    Turf,
    #[serde(rename = "kum")]
    Dirt,
    #[serde(rename = "sentetik")]
    Synthetic,
}

impl TrackType {
    /// Parse a raw track label; anything unrecognized is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "çim" | "cim" => Some(TrackType::Turf),
            "kum" => Some(TrackType::Dirt),
            "sentetik" => Some(TrackType::Synthetic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Turf => "cim",
            TrackType::Dirt => "kum",
            TrackType::Synthetic => "sentetik",
        }
    }
}

/// Workout split times at the six standard distances, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentTimes {
    pub w1200: Option<f64>,
    pub w1000: Option<f64>,
    pub w800: Option<f64>,
    pub w600: Option<f64>,
    pub w400: Option<f64>,
    pub w200: Option<f64>,
}

/// One row of the optional workout table.
#[derive(Debug, Clone, Default)]
pub struct WorkoutRecord {
    pub race_date: NaiveDate,
    pub venue: String,
    pub race_id: Option<String>,
    pub horse_name: String,
    pub workout_date: Option<NaiveDate>,
    pub workout_venue: Option<String>,
    pub workout_track: Option<String>,
    pub workout_type: Option<String>,
    pub workout_status: Option<String>,
    pub workout_jockey: Option<String>,
    pub segments: SegmentTimes,
    pub matched_name: Option<String>,
    pub matched_url: Option<String>,
    pub match_method: Option<String>,
    pub match_score: Option<f64>,
}

/// A workout attached to an entrant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutMatch {
    pub workout_date: Option<NaiveDate>,
    pub match_score: Option<f64>,
    pub match_method: Option<String>,
    pub segments: SegmentTimes,
    pub workout_type: Option<String>,
    pub workout_status: Option<String>,
}

/// Workout summary columns carried on the program itself.
#[derive(Debug, Clone, Default)]
pub struct WorkoutSummary {
    pub count: Option<i64>,
    pub latest_date: Option<NaiveDate>,
    pub latest_venue: Option<String>,
    pub best_800m: Option<f64>,
    pub best_600m: Option<f64>,
    pub match_score: Option<f64>,
    pub match_method: Option<String>,
}

/// One horse's participation in one race.
#[derive(Debug, Clone, Default)]
pub struct Entrant {
    pub row_index: usize,
    pub race_uid: String,
    pub horse_uid: String,
    pub race_date: NaiveDate,
    pub venue: String,
    pub race_id: Option<String>,
    pub race_no: Option<String>,
    pub post_time: String,
    pub race_class: Option<String>,
    pub distance: u32,
    pub track_type: TrackType,
    pub track_condition: Option<String>,
    pub weather: Option<String>,
    pub air_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub base_weight: Option<f64>,
    pub race_conditions: Option<String>,
    pub program_order: Option<i64>,
    pub name: String,
    pub start_no: Option<i64>,
    pub start_tag: String,
    pub odds: Option<f64>,
    pub implied_prob: Option<f64>,
    /// Public-money fraction in `[0, 1]`.
    pub public_money: Option<f64>,
    pub best_time: Option<f64>,
    pub best_time_hist: Option<f64>,
    pub age: Option<i64>,
    pub weight: Option<f64>,
    pub handicap: Option<f64>,
    pub kgs: Option<f64>,
    pub s20: Option<f64>,
    pub last_six: Option<String>,
    pub equipment: Option<String>,
    pub has_equipment_flag: bool,
    pub jockey: Option<String>,
    pub owner: Option<String>,
    pub trainer: Option<String>,
    pub genealogy_tokens: Vec<String>,
    pub workout_summary: WorkoutSummary,
    pub data_quality: Option<String>,
    pub result_win: Option<f64>,
    pub result_place: Option<f64>,
    /// Newest first; filled by the record merger.
    pub workout_sequence: Vec<WorkoutMatch>,
}

/// Reason code of a rejected program row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorReason {
    InvalidDate,
    MissingVenue,
    InvalidTime,
    InvalidDistance,
    InvalidTrack,
    MissingHorse,
}

impl RowErrorReason {
    /// Whether the failing attribute identifies the race rather than the entrant.
    pub fn invalidates_race(&self) -> bool {
        matches!(
            self,
            RowErrorReason::InvalidTime | RowErrorReason::InvalidDistance | RowErrorReason::InvalidTrack
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub reason: RowErrorReason,
    pub value: Option<String>,
}

/// Race-level aggregate broadcast to every entrant of a race.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceContext {
    pub field_size: usize,
    pub distance: Option<f64>,
    pub track_type: Option<TrackType>,
    pub track_condition: Option<String>,
    pub venue: Option<String>,
    pub race_class: Option<String>,
    pub weather: Option<String>,
    pub median_handicap: Option<f64>,
    pub median_best_time: Option<f64>,
    pub median_public_money: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Uncertainty {
    pub win_std: f64,
    pub place_std: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionExtras {
    pub has_equipment_flag: bool,
    pub gate_rank_pct: Option<f64>,
    pub gate_context_key: Option<String>,
}

/// Per-entrant prediction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrantPrediction {
    pub horse_id: String,
    pub name: String,
    pub start_no: Option<i64>,
    pub win_prob: f64,
    pub place_prob: f64,
    pub expected_finish: f64,
    pub race_time: f64,
    pub uncertainty: Uncertainty,
    pub odds: Option<f64>,
    pub implied_prob: Option<f64>,
    pub edge: f64,
    pub divergence_index: Option<f64>,
    pub drift: Option<f64>,
    pub extras: PredictionExtras,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceMeta {
    pub venue: String,
    pub date: String,
    pub time: String,
    pub class: Option<String>,
    pub distance: u32,
    pub track_type: TrackType,
    pub calibration: CalibrationDescriptor,
}

/// Output record for one race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RacePrediction {
    pub race_id: String,
    pub meta: RaceMeta,
    pub predictions: Vec<EntrantPrediction>,
    pub metrics: Metrics,
    pub errors: Vec<RowError>,
}
