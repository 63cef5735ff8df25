//! Feature engine.
//!
//! Three enrichers run in a fixed order, each reading raw columns and the output of the
//! stages before it and returning a new table:
//! field statistics, market features, gate/context.

pub mod field_stats;
pub mod gate_context;
pub mod market;

use tracing::debug;

use crate::error::Result;
use crate::table::EntrantTable;

pub use gate_context::distance_bucket;

/// Run every enricher and add the entrant-level count columns.
pub fn build_features(table: &EntrantTable) -> Result<EntrantTable> {
    let table = field_stats::compute(table)?;
    let table = market::compute(&table)?;
    let mut table = gate_context::compute(&table)?;

    let genealogy_count = table
        .entrants()
        .iter()
        .map(|e| Some(e.genealogy_tokens.len() as f64))
        .collect();
    let has_workout = table
        .entrants()
        .iter()
        .map(|e| Some(if e.workout_sequence.is_empty() { 0.0 } else { 1.0 }))
        .collect();
    table.set_column("genealogy_count", genealogy_count)?;
    table.set_column("has_workout", has_workout)?;

    debug!(
        "Feature engine produced {} columns for {} entrants in {} races",
        table.feature_names().len(),
        table.len(),
        table.races().len()
    );
    Ok(table)
}
