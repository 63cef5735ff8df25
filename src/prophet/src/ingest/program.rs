//! Program CSV ingestion.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use super::parsers::{
    genealogy_token, normalize_distance, parse_best_time, parse_date, parse_float, parse_int,
    parse_public_money, parse_time, slugify,
};
use super::{clean, RawFrame};
use crate::error::Result;
use crate::types::{Entrant, RowError, RowErrorReason, TrackType, WorkoutSummary};

/// Odds above this are treated as missing.
const MAX_ODDS: f64 = 250.0;

pub const REQUIRED_COLUMNS: [&str; 6] = [
    "Tarih",
    "Hipodrom",
    "Koşu Saati",
    "Mesafe",
    "Pist Tipi",
    "At İsmi",
];

const KNOWN_COLUMNS: &[&str] = &[
    "Tarih",
    "Hipodrom",
    "Koşu Saati",
    "Mesafe",
    "Pist Tipi",
    "At İsmi",
    "Çim Durumu",
    "Kum Durumu",
    "Hava Durumu",
    "Hava Sıcaklığı",
    "Nem",
    "Koşu ID",
    "Koşu Başlık",
    "Koşu Numarası",
    "Koşu Sınıfı",
    "Baz Sıklet",
    "En İyi Derece (Tarihçe)",
    "Koşu Koşulları",
    "Program Sırası",
    "Donanım Kodları",
    "Yaş Bilgisi",
    "Baba",
    "Anne",
    "Kısrak Babası",
    "Sıklet",
    "Jokey",
    "Sahip",
    "Antrenör",
    "Start No",
    "Handikap Puanı",
    "Son 6 Yarış",
    "KGS",
    "s20",
    "En İyi Derece",
    "Ganyan",
    "AGF",
    "W_Workout_Count",
    "W_Latest_Date",
    "W_Latest_Hip",
    "W_800m_Best",
    "W_600m_Best",
    "W_Match_Score",
    "W_Match_Method",
    "W_Data_Quality",
    "Result_Win",
    "Result_Place",
];

/// Ingested program: accepted entrants in file order plus rejected rows.
#[derive(Debug, Clone, Default)]
pub struct ProgramData {
    pub entrants: Vec<Entrant>,
    pub errors: Vec<RowError>,
}

/// `(date, venue, race identifier)` as seen during the scan.
type RaceKey = (NaiveDate, String, String);

pub fn read_program_csv<P: AsRef<Path>>(path: P) -> Result<ProgramData> {
    let frame = RawFrame::from_csv(path.as_ref())?;
    info!("Loaded program CSV {:?} ({} rows)", path.as_ref(), frame.height());
    parse_program(frame)
}

fn record_rejection(
    error: RowError,
    race_key: &RaceKey,
    errors: &mut Vec<RowError>,
    invalid_races: &mut HashSet<RaceKey>,
) {
    if error.reason.invalidates_race() {
        invalid_races.insert(race_key.clone());
    }
    errors.push(error);
}

/// Validate and type every program row.
///
/// Rows failing on time, distance or track type poison their whole race: all rows sharing
/// the race key are excluded, including ones accepted earlier in the scan.
pub fn parse_program(frame: RawFrame) -> Result<ProgramData> {
    let frame = frame.canonicalize(KNOWN_COLUMNS);
    frame.require("program", &REQUIRED_COLUMNS)?;

    let mut errors = Vec::new();
    let mut accepted: Vec<(RaceKey, Entrant)> = Vec::new();
    let mut invalid_races: HashSet<RaceKey> = HashSet::new();
    let mut start_counters: HashMap<String, usize> = HashMap::new();

    for row in 0..frame.height() {
        let cell = |name: &str| frame.get(name, row);
        let reject = |reason: RowErrorReason, column: &str| RowError {
            row,
            reason,
            value: cell(column).map(str::to_string),
        };

        let Some(race_date) = parse_date(cell("Tarih")) else {
            errors.push(reject(RowErrorReason::InvalidDate, "Tarih"));
            continue;
        };
        let Some(venue) = clean(cell("Hipodrom")) else {
            errors.push(reject(RowErrorReason::MissingVenue, "Hipodrom"));
            continue;
        };

        let race_id = clean(cell("Koşu ID"));
        let race_no = clean(cell("Koşu Numarası"));
        let race_ident = race_id
            .clone()
            .or_else(|| race_no.clone())
            .unwrap_or_else(|| format!("race{row}"));
        let race_key: RaceKey = (race_date, venue.clone(), race_ident.clone());
        if invalid_races.contains(&race_key) {
            continue;
        }

        let Some(post_time) = parse_time(cell("Koşu Saati")) else {
            record_rejection(reject(RowErrorReason::InvalidTime, "Koşu Saati"), &race_key, &mut errors, &mut invalid_races);
            continue;
        };
        let Some(distance) = normalize_distance(cell("Mesafe")) else {
            record_rejection(reject(RowErrorReason::InvalidDistance, "Mesafe"), &race_key, &mut errors, &mut invalid_races);
            continue;
        };
        let Some(track_type) = cell("Pist Tipi").and_then(TrackType::parse) else {
            record_rejection(reject(RowErrorReason::InvalidTrack, "Pist Tipi"), &race_key, &mut errors, &mut invalid_races);
            continue;
        };
        let track_condition = match track_type {
            TrackType::Turf => clean(cell("Çim Durumu")),
            _ => clean(cell("Kum Durumu")),
        };

        let Some(name) = clean(cell("At İsmi")) else {
            record_rejection(reject(RowErrorReason::MissingHorse, "At İsmi"), &race_key, &mut errors, &mut invalid_races);
            continue;
        };

        let race_component = race_id.clone().or_else(|| race_no.clone()).unwrap_or_else(|| {
            slugify(&clean(cell("Koşu Başlık")).unwrap_or_else(|| race_ident.clone()))
        });
        let race_uid = format!("{}_{}_{}", race_date, slugify(&venue), race_component);

        let start_no = parse_int(cell("Start No"));
        let start_tag = match start_no {
            Some(n) => n.to_string(),
            None => {
                let counter = start_counters.entry(race_uid.clone()).or_insert(0);
                *counter += 1;
                format!("x{counter}")
            }
        };
        let horse_uid = format!("{}-{}-{}", race_uid, start_tag, slugify(&name));

        let odds = parse_float(cell("Ganyan")).filter(|o| *o <= MAX_ODDS);
        let implied_prob = odds.filter(|o| *o > 0.0).map(|o| 1.0 / o);
        let equipment = clean(cell("Donanım Kodları"));
        let has_equipment_flag = equipment
            .as_deref()
            .is_some_and(|e| e.to_uppercase().contains("KG"));
        let genealogy_tokens = ["Baba", "Anne", "Kısrak Babası"]
            .iter()
            .filter_map(|&col| genealogy_token(cell(col)))
            .collect();

        let entrant = Entrant {
            row_index: row,
            race_uid,
            horse_uid,
            race_date,
            venue,
            race_id,
            race_no,
            post_time,
            race_class: clean(cell("Koşu Sınıfı")),
            distance,
            track_type,
            track_condition,
            weather: clean(cell("Hava Durumu")),
            air_temperature: parse_float(cell("Hava Sıcaklığı")),
            humidity: parse_float(cell("Nem")),
            base_weight: parse_float(cell("Baz Sıklet")),
            race_conditions: clean(cell("Koşu Koşulları")),
            program_order: parse_int(cell("Program Sırası")),
            name,
            start_no,
            start_tag,
            odds,
            implied_prob,
            public_money: parse_public_money(cell("AGF")),
            best_time: parse_best_time(cell("En İyi Derece")),
            best_time_hist: parse_best_time(cell("En İyi Derece (Tarihçe)")),
            age: parse_int(cell("Yaş Bilgisi")),
            weight: parse_float(cell("Sıklet")),
            handicap: parse_float(cell("Handikap Puanı")),
            kgs: parse_float(cell("KGS")),
            s20: parse_float(cell("s20")),
            last_six: clean(cell("Son 6 Yarış")),
            equipment,
            has_equipment_flag,
            jockey: clean(cell("Jokey")),
            owner: clean(cell("Sahip")),
            trainer: clean(cell("Antrenör")),
            genealogy_tokens,
            workout_summary: WorkoutSummary {
                count: parse_int(cell("W_Workout_Count")),
                latest_date: parse_date(cell("W_Latest_Date")),
                latest_venue: clean(cell("W_Latest_Hip")),
                best_800m: parse_float(cell("W_800m_Best")),
                best_600m: parse_float(cell("W_600m_Best")),
                match_score: parse_float(cell("W_Match_Score")),
                match_method: clean(cell("W_Match_Method")),
            },
            data_quality: clean(cell("W_Data_Quality")),
            result_win: parse_float(cell("Result_Win")),
            result_place: parse_float(cell("Result_Place")),
            workout_sequence: Vec::new(),
        };
        accepted.push((race_key, entrant));
    }

    let before = accepted.len();
    let entrants: Vec<Entrant> = accepted
        .into_iter()
        .filter(|(key, _)| !invalid_races.contains(key))
        .map(|(_, entrant)| entrant)
        .collect();

    if !invalid_races.is_empty() {
        warn!(
            "Excluded {} races ({} previously accepted rows) with invalid race attributes",
            invalid_races.len(),
            before - entrants.len()
        );
    }
    info!(
        "Program ingested: {} entrants accepted, {} rows rejected",
        entrants.len(),
        errors.len()
    );

    Ok(ProgramData { entrants, errors })
}
