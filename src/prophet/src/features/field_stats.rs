//! Per-race field statistics.

use crate::error::Result;
use crate::stats::{average_rank_pct, mean, median, population_std};
use crate::table::EntrantTable;

/// Attributes summarized within each race.
pub const STAT_FIELDS: [&str; 9] = [
    "age",
    "weight",
    "handicap",
    "kgs",
    "s20",
    "best_time",
    "public_money",
    "implied_prob",
    "start_no",
];

const MIN_STD: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
struct GroupStats {
    mean: Option<f64>,
    std: f64,
    median: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

impl GroupStats {
    fn of(values: &[Option<f64>]) -> Self {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        Self {
            mean: mean(&present),
            std: population_std(&present).unwrap_or(0.0),
            median: median(&present),
            min: present.iter().copied().reduce(f64::min),
            max: present.iter().copied().reduce(f64::max),
        }
    }
}

/// Add `field_size` and, for every attribute in [`STAT_FIELDS`], the race mean, std,
/// median, min, max plus each entrant's z-score, percentile rank and median deviation.
pub fn compute(table: &EntrantTable) -> Result<EntrantTable> {
    let mut out = table.clone();
    let races = table.races();

    let field_size = races.map_groups(table.entrants(), |race| {
        vec![Some(race.len() as f64); race.len()]
    });
    out.set_column("field_size", field_size)?;

    for field in STAT_FIELDS {
        let values = table.column_or_null(field);
        let per_race: Vec<GroupStats> = races
            .groups()
            .iter()
            .map(|g| GroupStats::of(&values[g.range.clone()]))
            .collect();
        let stats = races.broadcast(&per_race);
        let ranks = races.map_groups(&values, average_rank_pct);

        let column = |f: fn(&GroupStats) -> Option<f64>| stats.iter().map(f).collect::<Vec<_>>();
        out.set_column(&format!("{field}_mean"), column(|s| s.mean))?;
        out.set_column(&format!("{field}_std"), column(|s| Some(s.std)))?;
        out.set_column(&format!("{field}_median"), column(|s| s.median))?;
        out.set_column(&format!("{field}_min"), column(|s| s.min))?;
        out.set_column(&format!("{field}_max"), column(|s| s.max))?;

        let rel_z = values
            .iter()
            .zip(&stats)
            .map(|(v, s)| Some((v.as_ref()? - s.mean?) / s.std.max(MIN_STD)))
            .collect();
        let delta_med = values
            .iter()
            .zip(&stats)
            .map(|(v, s)| Some(v.as_ref()? - s.median?))
            .collect();
        out.set_column(&format!("{field}_rel_z"), rel_z)?;
        out.set_column(&format!("{field}_rank_pct"), ranks)?;
        out.set_column(&format!("{field}_delta_med"), delta_med)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Entrant;

    fn entrant(race: &str, weight: Option<f64>) -> Entrant {
        Entrant {
            race_uid: race.to_string(),
            weight,
            distance: 1600,
            ..Default::default()
        }
    }

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn test_field_statistics_per_race() {
        let table = EntrantTable::new(vec![
            entrant("r1", Some(50.0)),
            entrant("r1", Some(54.0)),
            entrant("r1", None),
            entrant("r2", Some(60.0)),
        ])
        .unwrap();
        let out = compute(&table).unwrap();

        assert_eq!(
            out.column("field_size").unwrap(),
            &[Some(3.0), Some(3.0), Some(3.0), Some(1.0)]
        );
        let mean = out.column("weight_mean").unwrap();
        assert!(approx(mean[0], 52.0));
        assert!(approx(mean[3], 60.0));
        let std = out.column("weight_std").unwrap();
        assert!(approx(std[0], 2.0));
        assert!(approx(std[3], 0.0));
        assert!(approx(out.column("weight_min").unwrap()[2], 50.0));
        assert!(approx(out.column("weight_max").unwrap()[2], 54.0));

        let z = out.column("weight_rel_z").unwrap();
        assert!(approx(z[0], -1.0));
        assert!(approx(z[1], 1.0));
        assert_eq!(z[2], None);
        assert!(approx(z[3], 0.0));

        let rank = out.column("weight_rank_pct").unwrap();
        assert!(approx(rank[0], 0.5));
        assert!(approx(rank[1], 1.0));
        assert_eq!(rank[2], None);

        let delta = out.column("weight_delta_med").unwrap();
        assert!(approx(delta[1], 2.0));
    }

    #[test]
    fn test_all_null_field_has_zero_std() {
        let table = EntrantTable::new(vec![entrant("r1", None), entrant("r1", None)]).unwrap();
        let out = compute(&table).unwrap();
        assert_eq!(out.column("kgs_mean").unwrap(), &[None, None]);
        assert_eq!(out.column("kgs_std").unwrap(), &[Some(0.0), Some(0.0)]);
        assert_eq!(out.column("kgs_rank_pct").unwrap(), &[None, None]);
    }
}
