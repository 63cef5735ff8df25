//! Trained model artifact.
//!
//! The artifact fixes the feature-vector layout and carries every fitted component.
//! It is loaded once and shared read-only.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::calibration::Calibrator;
use crate::error::Result;
use crate::models::{BasePredictor, ContextGatedEnsemble};
use crate::types::Metrics;

/// A fitted base predictor in its ensemble column position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotModel {
    pub name: String,
    pub model: BasePredictor,
}

/// Training run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainMeta {
    pub val_date: NaiveDate,
    pub train_size: usize,
    pub val_size: usize,
    pub random_seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Feature-vector layout; prediction must build its matrix in exactly this order.
    pub feature_columns: Vec<String>,
    pub models: Vec<SlotModel>,
    pub ensemble: ContextGatedEnsemble,
    pub calibrator: Calibrator,
    #[serde(default)]
    pub metrics: Metrics,
    pub meta: TrainMeta,
}

/// Shared, immutable artifact handle.
pub type SharedArtifact = Arc<ModelArtifact>;

impl ModelArtifact {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved model artifact to {:?}", path);
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let artifact: ModelArtifact = serde_json::from_str(&fs::read_to_string(path)?)?;
        info!(
            "Loaded model artifact from {:?} ({} features, {} models, {} calibration)",
            path,
            artifact.feature_columns.len(),
            artifact.models.len(),
            artifact.calibrator.descriptor().method
        );
        Ok(artifact)
    }
}

/// Load an artifact into a shared handle.
pub fn create_shared_artifact<P: AsRef<Path>>(path: P) -> Result<SharedArtifact> {
    Ok(Arc::new(ModelArtifact::load(path)?))
}
