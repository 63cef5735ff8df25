//! Optional workout CSV ingestion.

use std::path::Path;
use tracing::info;

use super::parsers::{parse_date, parse_float};
use super::{clean, RawFrame};
use crate::error::Result;
use crate::types::{SegmentTimes, WorkoutRecord};

const KNOWN_COLUMNS: &[&str] = &[
    "Tarih",
    "Hipodrom",
    "Koşu ID",
    "At İsmi",
    "Workout Tarih",
    "W_Hip",
    "W_Pist",
    "W_Type",
    "W_Status",
    "W_Jokey",
    "w1200_s",
    "w1000_s",
    "w800_s",
    "w600_s",
    "w400_s",
    "w200_s",
    "matched_name",
    "matched_url",
    "match_method",
    "match_score",
];

pub fn read_workouts_csv<P: AsRef<Path>>(path: P) -> Result<Vec<WorkoutRecord>> {
    let frame = RawFrame::from_csv(path.as_ref())?;
    info!("Loaded workout CSV {:?} ({} rows)", path.as_ref(), frame.height());
    parse_workouts(frame)
}

/// Rows without a race date, venue or horse name are skipped.
pub fn parse_workouts(frame: RawFrame) -> Result<Vec<WorkoutRecord>> {
    let frame = frame.canonicalize(KNOWN_COLUMNS);
    frame.require("workouts", &["Tarih"])?;

    let records: Vec<WorkoutRecord> = (0..frame.height())
        .filter_map(|row| {
            let cell = |name: &str| frame.get(name, row);
            let race_date = parse_date(cell("Tarih"))?;
            let venue = clean(cell("Hipodrom"))?;
            let horse_name = clean(cell("At İsmi"))?;
            Some(WorkoutRecord {
                race_date,
                venue,
                race_id: clean(cell("Koşu ID")),
                horse_name,
                workout_date: parse_date(cell("Workout Tarih")),
                workout_venue: clean(cell("W_Hip")),
                workout_track: clean(cell("W_Pist")),
                workout_type: clean(cell("W_Type")),
                workout_status: clean(cell("W_Status")),
                workout_jockey: clean(cell("W_Jokey")),
                segments: SegmentTimes {
                    w1200: parse_float(cell("w1200_s")),
                    w1000: parse_float(cell("w1000_s")),
                    w800: parse_float(cell("w800_s")),
                    w600: parse_float(cell("w600_s")),
                    w400: parse_float(cell("w400_s")),
                    w200: parse_float(cell("w200_s")),
                },
                matched_name: clean(cell("matched_name")),
                matched_url: clean(cell("matched_url")),
                match_method: clean(cell("match_method")),
                match_score: parse_float(cell("match_score")),
            })
        })
        .collect();

    info!(
        "Workouts ingested: {} of {} rows usable",
        records.len(),
        frame.height()
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workouts_skips_incomplete_rows() {
        let frame = RawFrame::from_columns(vec![
            ("tarih", vec![Some("01/03/2024"), Some("01/03/2024"), Some("x")]),
            ("Hipodrom", vec![Some("Bursa"), Some("Bursa"), Some("Bursa")]),
            ("At İsmi", vec![Some("Rüzgar"), None, Some("Rüzgar")]),
            ("Workout Tarih", vec![Some("20/02/2024"), None, None]),
            ("w800_s", vec![Some("51,2"), None, None]),
            ("match_score", vec![Some("92"), None, None]),
        ]);
        let records = parse_workouts(frame).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.horse_name, "Rüzgar");
        assert_eq!(r.race_id, None);
        assert_eq!(r.segments.w800, Some(51.2));
        assert_eq!(r.match_score, Some(92.0));
        assert_eq!(
            r.workout_date,
            chrono::NaiveDate::from_ymd_opt(2024, 2, 20)
        );
    }

    #[test]
    fn test_parse_workouts_requires_date_column() {
        let frame = RawFrame::from_columns(vec![("Hipodrom", vec![Some("Bursa")])]);
        assert!(parse_workouts(frame).is_err());
    }
}
