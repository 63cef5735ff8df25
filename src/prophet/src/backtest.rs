//! Date-based train/validation splits.
//!
//! Provides the single cutoff split used for training and walk-forward cutoffs
//! for evaluating a model over successive race days.

use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Row indices on each side of a date cutoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train_idx: Vec<usize>,
    pub val_idx: Vec<usize>,
    pub cutoff: NaiveDate,
}

impl Split {
    /// Repair a split with an empty side so both base fitting and calibration have rows.
    ///
    /// An empty training side trains on all but the last row and validates on the last one
    /// (a single row is used for both). An empty validation side holds out the last
    /// `max(1, floor(val_fraction * n))` rows.
    pub fn with_fallbacks(self, n_rows: usize, val_fraction: f64) -> Self {
        if n_rows == 0 {
            return self;
        }
        let all: Vec<usize> = (0..n_rows).collect();
        if self.train_idx.is_empty() {
            warn!("No rows before {}; holding out the last row", self.cutoff);
            let (train_idx, val_idx) = if n_rows > 1 {
                (all[..n_rows - 1].to_vec(), vec![n_rows - 1])
            } else {
                (all.clone(), all)
            };
            return Self {
                train_idx,
                val_idx,
                cutoff: self.cutoff,
            };
        }
        if self.val_idx.is_empty() {
            let val_size = ((val_fraction * n_rows as f64).floor() as usize).clamp(1, n_rows);
            warn!(
                "No rows on or after {}; holding out the last {} rows",
                self.cutoff, val_size
            );
            let val_idx = all[n_rows - val_size..].to_vec();
            let train_idx = if val_size < n_rows {
                all[..n_rows - val_size].to_vec()
            } else {
                all
            };
            return Self {
                train_idx,
                val_idx,
                cutoff: self.cutoff,
            };
        }
        self
    }
}

/// Rows dated before `cutoff` train, rows on or after it validate.
pub fn time_based_split(dates: &[NaiveDate], cutoff: NaiveDate) -> Split {
    let (train_idx, val_idx): (Vec<usize>, Vec<usize>) =
        (0..dates.len()).partition(|&i| dates[i] < cutoff);
    Split {
        train_idx,
        val_idx,
        cutoff,
    }
}

/// One split per cutoff, taking the latest `n_splits` distinct dates newest first.
///
/// When there are too few distinct dates, `n_splits` shrinks to `max(1, dates - 1)`.
pub fn walk_forward_splits(dates: &[NaiveDate], n_splits: usize) -> Vec<Split> {
    let distinct: Vec<NaiveDate> = dates.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    if distinct.is_empty() {
        return Vec::new();
    }
    let n_splits = if distinct.len() < n_splits + 1 {
        (distinct.len() - 1).max(1)
    } else {
        n_splits
    };

    let splits: Vec<Split> = distinct
        .iter()
        .rev()
        .take(n_splits)
        .map(|&cutoff| time_based_split(dates, cutoff))
        .collect();
    info!(
        "Walk-forward: {} cutoffs over {} race days",
        splits.len(),
        distinct.len()
    );
    splits
}
