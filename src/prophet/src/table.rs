//! Entrant table: typed records, a race-group arena and columnar features.

use ndarray::Array2;
use std::collections::HashMap;
use std::ops::Range;

use crate::error::{PipelineError, Result};
use crate::types::{Entrant, RaceContext};

/// One race's contiguous slice of the entrant table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceGroup {
    pub race_uid: String,
    pub range: Range<usize>,
}

impl RaceGroup {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Arena of race groups in first-appearance order.
#[derive(Debug, Clone, Default)]
pub struct RaceIndex {
    groups: Vec<RaceGroup>,
    group_of: Vec<usize>,
}

impl RaceIndex {
    /// Entrants must already be contiguous per race.
    fn from_contiguous(entrants: &[Entrant]) -> Self {
        let mut groups: Vec<RaceGroup> = Vec::new();
        let mut group_of = Vec::with_capacity(entrants.len());
        for (i, entrant) in entrants.iter().enumerate() {
            match groups.last_mut() {
                Some(last) if last.race_uid == entrant.race_uid => last.range.end = i + 1,
                _ => groups.push(RaceGroup {
                    race_uid: entrant.race_uid.clone(),
                    range: i..i + 1,
                }),
            }
            group_of.push(groups.len() - 1);
        }
        Self { groups, group_of }
    }

    pub fn groups(&self) -> &[RaceGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group position of an entrant row.
    pub fn group_of(&self, row: usize) -> usize {
        self.group_of[row]
    }

    /// Compute one value per row, race by race.
    ///
    /// `f` receives the race's slice of `values` and returns one output per entrant.
    pub fn map_groups<T, U, F>(&self, values: &[T], mut f: F) -> Vec<U>
    where
        F: FnMut(&[T]) -> Vec<U>,
    {
        let mut out = Vec::with_capacity(values.len());
        for group in &self.groups {
            out.extend(f(&values[group.range.clone()]));
        }
        out
    }

    /// Repeat one value per race across that race's rows.
    pub fn broadcast<T: Clone>(&self, per_group: &[T]) -> Vec<T> {
        self.group_of.iter().map(|&g| per_group[g].clone()).collect()
    }
}

/// Named nullable columns kept in insertion order.
#[derive(Debug, Clone)]
pub struct ColumnStore<T> {
    height: usize,
    order: Vec<String>,
    columns: HashMap<String, Vec<Option<T>>>,
}

pub type FeatureColumns = ColumnStore<f64>;
pub type LabelColumns = ColumnStore<String>;

impl<T> ColumnStore<T> {
    pub fn new(height: usize) -> Self {
        Self {
            height,
            order: Vec::new(),
            columns: HashMap::new(),
        }
    }

    /// Add or replace a column; a replaced column keeps its position.
    pub fn insert(&mut self, name: &str, values: Vec<Option<T>>) -> Result<()> {
        if values.len() != self.height {
            return Err(PipelineError::ShapeMismatch {
                context: format!("column {name}"),
                expected: self.height,
                actual: values.len(),
            });
        }
        if self.columns.insert(name.to_string(), values).is_none() {
            self.order.push(name.to_string());
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[Option<T>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }
}

impl FeatureColumns {
    /// Dense matrix over `columns` in the given order; absent columns and nulls become 0.
    pub fn matrix(&self, columns: &[String]) -> Array2<f64> {
        let mut x = Array2::zeros((self.height, columns.len()));
        for (j, name) in columns.iter().enumerate() {
            if let Some(values) = self.columns.get(name) {
                for (i, v) in values.iter().enumerate() {
                    x[[i, j]] = v.unwrap_or(0.0);
                }
            }
        }
        x
    }
}

/// Entrants grouped contiguously by race, with derived columns and race contexts.
#[derive(Debug, Clone)]
pub struct EntrantTable {
    entrants: Vec<Entrant>,
    races: RaceIndex,
    numeric: FeatureColumns,
    labels: LabelColumns,
    contexts: Vec<RaceContext>,
}

fn as_f64(v: Option<i64>) -> Option<f64> {
    v.map(|x| x as f64)
}

impl EntrantTable {
    /// Reorder entrants so each race is contiguous (races keep first-appearance order)
    /// and seed the raw numeric columns.
    pub fn new(entrants: Vec<Entrant>) -> Result<Self> {
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        for e in &entrants {
            let next = first_seen.len();
            first_seen.entry(e.race_uid.clone()).or_insert(next);
        }
        let mut entrants = entrants;
        entrants.sort_by_key(|e| first_seen[&e.race_uid]);

        let races = RaceIndex::from_contiguous(&entrants);
        let mut numeric = FeatureColumns::new(entrants.len());
        let raw: [(&str, fn(&Entrant) -> Option<f64>); 21] = [
            ("distance", |e| Some(e.distance as f64)),
            ("air_temperature", |e| e.air_temperature),
            ("humidity", |e| e.humidity),
            ("base_weight", |e| e.base_weight),
            ("program_order", |e| as_f64(e.program_order)),
            ("start_no", |e| as_f64(e.start_no)),
            ("odds", |e| e.odds),
            ("implied_prob", |e| e.implied_prob),
            ("public_money", |e| e.public_money),
            ("best_time", |e| e.best_time),
            ("best_time_hist", |e| e.best_time_hist),
            ("age", |e| as_f64(e.age)),
            ("weight", |e| e.weight),
            ("handicap", |e| e.handicap),
            ("kgs", |e| e.kgs),
            ("s20", |e| e.s20),
            ("has_equipment_flag", |e| Some(if e.has_equipment_flag { 1.0 } else { 0.0 })),
            ("workout_count", |e| as_f64(e.workout_summary.count)),
            ("workout_best_800m", |e| e.workout_summary.best_800m),
            ("workout_best_600m", |e| e.workout_summary.best_600m),
            ("workout_match_score", |e| e.workout_summary.match_score),
        ];
        for (name, get) in raw {
            numeric.insert(name, entrants.iter().map(get).collect())?;
        }

        Ok(Self {
            labels: LabelColumns::new(entrants.len()),
            entrants,
            races,
            numeric,
            contexts: Vec::new(),
        })
    }

    pub fn entrants(&self) -> &[Entrant] {
        &self.entrants
    }

    pub fn races(&self) -> &RaceIndex {
        &self.races
    }

    pub fn len(&self) -> usize {
        self.entrants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entrants.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.numeric.get(name)
    }

    /// Column values, or all-null when the column does not exist.
    pub fn column_or_null(&self, name: &str) -> Vec<Option<f64>> {
        self.column(name)
            .map(<[Option<f64>]>::to_vec)
            .unwrap_or_else(|| vec![None; self.len()])
    }

    pub fn set_column(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<()> {
        self.numeric.insert(name, values)
    }

    pub fn label(&self, name: &str) -> Option<&[Option<String>]> {
        self.labels.get(name)
    }

    pub fn set_label(&mut self, name: &str, values: Vec<Option<String>>) -> Result<()> {
        self.labels.insert(name, values)
    }

    /// Numeric columns in table order.
    pub fn feature_names(&self) -> Vec<String> {
        self.numeric.names().to_vec()
    }

    pub fn feature_matrix(&self, columns: &[String]) -> Array2<f64> {
        self.numeric.matrix(columns)
    }

    /// Attach one context per race group.
    pub fn set_contexts(&mut self, contexts: Vec<RaceContext>) -> Result<()> {
        if contexts.len() != self.races.len() {
            return Err(PipelineError::ShapeMismatch {
                context: "race contexts".to_string(),
                expected: self.races.len(),
                actual: contexts.len(),
            });
        }
        self.contexts = contexts;
        Ok(())
    }

    pub fn race_contexts(&self) -> &[RaceContext] {
        &self.contexts
    }

    /// Context of every entrant, aligned with table rows.
    pub fn row_contexts(&self) -> Vec<RaceContext> {
        if self.contexts.is_empty() {
            return Vec::new();
        }
        self.races.broadcast(&self.contexts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entrant(race: &str, name: &str, start_no: Option<i64>) -> Entrant {
        Entrant {
            race_uid: race.to_string(),
            name: name.to_string(),
            start_no,
            distance: 1400,
            ..Default::default()
        }
    }

    #[test]
    fn test_races_become_contiguous() {
        let table = EntrantTable::new(vec![
            entrant("r2", "a", Some(1)),
            entrant("r1", "b", Some(1)),
            entrant("r2", "c", Some(2)),
        ])
        .unwrap();

        let names: Vec<_> = table.entrants().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "b"]);
        let groups = table.races().groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].race_uid, "r2");
        assert_eq!(groups[0].range, 0..2);
        assert_eq!(groups[1].range, 2..3);
        assert_eq!(table.races().group_of(2), 1);
        assert_eq!(table.column("start_no").unwrap(), &[Some(1.0), Some(2.0), Some(1.0)]);
    }

    #[test]
    fn test_map_groups_and_broadcast() {
        let table = EntrantTable::new(vec![
            entrant("r1", "a", None),
            entrant("r1", "b", None),
            entrant("r2", "c", None),
        ])
        .unwrap();
        let sizes = table
            .races()
            .map_groups(table.entrants(), |race| vec![race.len(); race.len()]);
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(table.races().broadcast(&["x", "y"]), vec!["x", "x", "y"]);
    }

    #[test]
    fn test_feature_matrix_fills_missing() {
        let mut table = EntrantTable::new(vec![entrant("r1", "a", None)]).unwrap();
        table.set_column("extra", vec![Some(2.5)]).unwrap();
        let x = table.feature_matrix(&["extra".to_string(), "absent".to_string(), "start_no".to_string()]);
        assert_eq!(x.shape(), &[1, 3]);
        assert_eq!(x[[0, 0]], 2.5);
        assert_eq!(x[[0, 1]], 0.0);
        assert_eq!(x[[0, 2]], 0.0);
    }

    #[test]
    fn test_column_length_checked() {
        let mut table = EntrantTable::new(vec![entrant("r1", "a", None)]).unwrap();
        assert!(table.set_column("bad", vec![None, None]).is_err());
        let names = table.feature_names();
        table.set_column("distance", vec![Some(1.0)]).unwrap();
        assert_eq!(table.feature_names(), names);
    }
}
