//! Error taxonomy for the scoring pipeline.
//!
//! Row-level validation problems are not errors here: they are collected as
//! [`RowError`](crate::types::RowError) values and travel with the output.
//! Everything in [`PipelineError`] aborts the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required identifying columns are absent from an input file.
    #[error("missing required columns in {source_name}: {columns:?}")]
    MissingColumns {
        source_name: String,
        columns: Vec<String>,
    },

    /// Neither the primary algorithm nor its fallback can run in this build/config.
    #[error(
        "predictor '{slot}' unavailable: neither '{primary}' nor fallback '{fallback}' is enabled \
         (check `models.disabled` and compiled features)"
    )]
    PredictorUnavailable {
        slot: String,
        primary: String,
        fallback: String,
    },

    /// Inference attempted before fitting.
    #[error("{0} used before it was fitted")]
    NotFitted(&'static str),

    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("solver failed: {0}")]
    Solver(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] polars::error::PolarsError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
