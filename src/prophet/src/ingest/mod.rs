//! Program and workout CSV ingestion.
//!
//! Produces canonical typed records and collects row validation errors.

pub mod parsers;
pub mod program;
pub mod workouts;

pub use program::{parse_program, read_program_csv, ProgramData};
pub use workouts::{parse_workouts, read_workouts_csv};

use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// String cells of a CSV, addressed by canonical column name.
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
    columns: HashMap<String, Vec<Option<String>>>,
    height: usize,
}

impl RawFrame {
    /// Load every column as a string column.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()?;

        let mut columns = HashMap::new();
        for column in df.get_columns() {
            let values: Vec<Option<String>> = column
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            columns.insert(column.name().trim().to_string(), values);
        }
        Ok(Self {
            columns,
            height: df.height(),
        })
    }

    /// Build a frame from `(header, cells)` pairs; all cells must have the same length.
    pub fn from_columns(columns: Vec<(&str, Vec<Option<&str>>)>) -> Self {
        let height = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let columns = columns
            .into_iter()
            .map(|(name, values)| {
                (
                    name.trim().to_string(),
                    values.into_iter().map(|v| v.map(str::to_string)).collect(),
                )
            })
            .collect();
        Self { columns, height }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Cell value, or `None` when the column is absent or the cell is null.
    pub fn get(&self, name: &str, row: usize) -> Option<&str> {
        self.columns
            .get(name)
            .and_then(|col| col.get(row))
            .and_then(|v| v.as_deref())
    }

    /// Rename headers to their canonical spelling when they match case-insensitively.
    pub fn canonicalize(mut self, expected: &[&str]) -> Self {
        let lower: HashMap<String, String> = self
            .columns
            .keys()
            .map(|k| (k.to_lowercase(), k.clone()))
            .collect();
        for name in expected {
            if self.columns.contains_key(*name) {
                continue;
            }
            if let Some(actual) = lower.get(&name.to_lowercase()) {
                if let Some(values) = self.columns.remove(actual) {
                    self.columns.insert((*name).to_string(), values);
                }
            }
        }
        self
    }

    /// Fail with a schema error when any required column is absent.
    pub fn require(&self, source_name: &str, required: &[&str]) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::MissingColumns {
                source_name: source_name.to_string(),
                columns: missing,
            })
        }
    }
}

/// Trimmed, non-empty cell text.
pub(crate) fn clean(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_canonicalize_case_insensitive() {
        let frame = RawFrame::from_columns(vec![("tarih", vec![Some("01/01/2024")])])
            .canonicalize(&["Tarih"]);
        assert!(frame.has_column("Tarih"));
        assert_eq!(frame.get("Tarih", 0), Some("01/01/2024"));
    }

    #[test]
    fn test_require_reports_missing() {
        let frame = RawFrame::from_columns(vec![("Tarih", vec![None])]);
        let err = frame.require("program", &["Tarih", "Hipodrom"]).unwrap_err();
        match err {
            PipelineError::MissingColumns { columns, .. } => {
                assert_eq!(columns, vec!["Hipodrom".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_csv_reads_strings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, " Tarih ,Mesafe").unwrap();
        writeln!(file, "01/02/2024,1400").unwrap();
        writeln!(file, "02/02/2024,").unwrap();
        file.flush().unwrap();

        let frame = RawFrame::from_csv(file.path()).unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.get("Tarih", 0), Some("01/02/2024"));
        assert_eq!(frame.get("Mesafe", 0), Some("1400"));
        assert_eq!(clean(frame.get("Mesafe", 1)), None);
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean(Some("  a ")), Some("a".to_string()));
        assert_eq!(clean(Some("   ")), None);
        assert_eq!(clean(None), None);
    }
}
