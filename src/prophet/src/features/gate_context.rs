//! Gate position and race-context features.

use crate::error::Result;
use crate::ingest::parsers::slugify;
use crate::stats::average_rank_pct;
use crate::table::EntrantTable;
use crate::types::RaceContext;

/// Upper bounds (inclusive) of the distance buckets.
const DISTANCE_BUCKETS: [(f64, &str); 2] = [(1400.0, "<=1400"), (2000.0, "1400-2000")];
const LONG_BUCKET: &str = ">2000";

pub fn distance_bucket(distance: Option<f64>) -> Option<&'static str> {
    let d = distance.filter(|d| !d.is_nan())?;
    let bucket = DISTANCE_BUCKETS
        .iter()
        .find(|(upper, _)| d <= *upper)
        .map(|(_, label)| *label)
        .unwrap_or(LONG_BUCKET);
    Some(bucket)
}

fn first_some<T: Clone>(values: impl IntoIterator<Item = Option<T>>) -> Option<T> {
    values.into_iter().flatten().next()
}

/// Add `gate_rank_pct`, the `distance_bucket` / `gate_context_key` labels and one
/// [`RaceContext`] per race.
pub fn compute(table: &EntrantTable) -> Result<EntrantTable> {
    let mut out = table.clone();
    let races = table.races();
    let entrants = table.entrants();

    let start_no = table.column_or_null("start_no");
    let gate_rank = races.map_groups(&start_no, average_rank_pct);

    let distance = table.column_or_null("distance");
    let buckets: Vec<Option<&str>> = distance.iter().map(|d| distance_bucket(*d)).collect();
    let keys: Vec<Option<String>> = entrants
        .iter()
        .zip(&buckets)
        .map(|(e, bucket)| {
            bucket.map(|b| {
                format!(
                    "{}|{}|{}|{}",
                    e.track_type.as_str(),
                    e.track_condition.as_deref().unwrap_or("none"),
                    b,
                    slugify(&e.venue)
                )
            })
        })
        .collect();

    let handicap_median = table.column_or_null("handicap_median");
    let best_time_median = table.column_or_null("best_time_median");
    let public_money_median = table.column_or_null("public_money_median");

    let contexts: Vec<RaceContext> = races
        .groups()
        .iter()
        .map(|g| {
            let rows = &entrants[g.range.clone()];
            let first = |column: &[Option<f64>]| first_some(column[g.range.clone()].iter().copied());
            RaceContext {
                field_size: g.len(),
                distance: first(distance.as_slice()),
                track_type: rows.first().map(|e| e.track_type),
                track_condition: first_some(rows.iter().map(|e| e.track_condition.clone())),
                venue: rows.first().map(|e| e.venue.clone()),
                race_class: first_some(rows.iter().map(|e| e.race_class.clone())),
                weather: first_some(rows.iter().map(|e| e.weather.clone())),
                median_handicap: first(handicap_median.as_slice()),
                median_best_time: first(best_time_median.as_slice()),
                median_public_money: first(public_money_median.as_slice()),
            }
        })
        .collect();

    out.set_column("gate_rank_pct", gate_rank)?;
    out.set_label(
        "distance_bucket",
        buckets.iter().map(|b| b.map(str::to_string)).collect(),
    )?;
    out.set_label("gate_context_key", keys)?;
    out.set_contexts(contexts)?;
    Ok(out)
}
