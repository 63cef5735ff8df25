//! TJK Prophet
//!
//! Calibrated win probabilities for horse-race programs: ingestion, workout merging,
//! per-race feature engineering, base predictors blended by a context-gated ensemble,
//! calibration and race summaries.

pub mod artifact;
pub mod backtest;
pub mod calibration;
pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod merge;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod stats;
pub mod summary;
pub mod table;
pub mod types;

pub use artifact::{create_shared_artifact, ModelArtifact, SharedArtifact};
pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{load_inputs, predict, prepare, train, walk_forward, PreparedRaces};
