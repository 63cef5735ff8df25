//! Configuration for the prophet pipeline.

use serde::{Deserialize, Serialize};

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_artifact_path")]
    pub artifact: String,
    #[serde(default = "default_meta_path")]
    pub meta_out: String,
}

fn default_artifact_path() -> String {
    "artifacts/model.json".to_string()
}

fn default_meta_path() -> String {
    "artifacts/train_meta.json".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifact: default_artifact_path(),
            meta_out: default_meta_path(),
        }
    }
}

/// Record merger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Workouts with a match score at or above this value attach regardless of name.
    #[serde(default = "default_match_score_threshold")]
    pub match_score_threshold: f64,
}

fn default_match_score_threshold() -> f64 {
    85.0
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            match_score_threshold: default_match_score_threshold(),
        }
    }
}

/// Temperature grid searched by the calibrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_temperature_min")]
    pub temperature_min: f64,
    #[serde(default = "default_temperature_max")]
    pub temperature_max: f64,
    #[serde(default = "default_temperature_steps")]
    pub temperature_steps: usize,
}

fn default_temperature_min() -> f64 {
    0.5
}

fn default_temperature_max() -> f64 {
    3.0
}

fn default_temperature_steps() -> usize {
    26
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            temperature_min: default_temperature_min(),
            temperature_max: default_temperature_max(),
            temperature_steps: default_temperature_steps(),
        }
    }
}

impl CalibrationConfig {
    /// Evenly spaced temperatures, endpoints included.
    pub fn temperature_grid(&self) -> Vec<f64> {
        let steps = self.temperature_steps.max(1);
        if steps == 1 {
            return vec![self.temperature_min];
        }
        let span = self.temperature_max - self.temperature_min;
        (0..steps)
            .map(|i| self.temperature_min + span * i as f64 / (steps - 1) as f64)
            .collect()
    }
}

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Share of rows held out when the date split leaves no validation rows.
    #[serde(default = "default_val_fraction")]
    pub val_fraction: f64,
    #[serde(default = "default_stump_rounds")]
    pub stump_rounds: usize,
    #[serde(default = "default_stump_learning_rate")]
    pub stump_learning_rate: f64,
    #[serde(default = "default_stump_bins")]
    pub stump_bins: usize,
    #[serde(default = "default_mlp_hidden")]
    pub mlp_hidden: usize,
    #[serde(default = "default_mlp_epochs")]
    pub mlp_epochs: usize,
    #[serde(default = "default_mlp_learning_rate")]
    pub mlp_learning_rate: f64,
    #[serde(default = "default_logistic_epochs")]
    pub logistic_epochs: usize,
    #[serde(default = "default_logistic_learning_rate")]
    pub logistic_learning_rate: f64,
    #[serde(default = "default_l2")]
    pub l2: f64,
    /// Iteration cap for the ensemble's logistic solver.
    #[serde(default = "default_ensemble_max_iter")]
    pub ensemble_max_iter: u64,
}

fn default_seed() -> u64 {
    42
}

fn default_val_fraction() -> f64 {
    0.2
}

fn default_stump_rounds() -> usize {
    200
}

fn default_stump_learning_rate() -> f64 {
    0.1
}

fn default_stump_bins() -> usize {
    32
}

fn default_mlp_hidden() -> usize {
    32
}

fn default_mlp_epochs() -> usize {
    300
}

fn default_mlp_learning_rate() -> f64 {
    0.05
}

fn default_logistic_epochs() -> usize {
    300
}

fn default_logistic_learning_rate() -> f64 {
    0.1
}

fn default_l2() -> f64 {
    1e-4
}

fn default_ensemble_max_iter() -> u64 {
    200
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            val_fraction: default_val_fraction(),
            stump_rounds: default_stump_rounds(),
            stump_learning_rate: default_stump_learning_rate(),
            stump_bins: default_stump_bins(),
            mlp_hidden: default_mlp_hidden(),
            mlp_epochs: default_mlp_epochs(),
            mlp_learning_rate: default_mlp_learning_rate(),
            logistic_epochs: default_logistic_epochs(),
            logistic_learning_rate: default_logistic_learning_rate(),
            l2: default_l2(),
            ensemble_max_iter: default_ensemble_max_iter(),
        }
    }
}

/// Algorithm availability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Algorithm names declared unavailable (`stump_boost`, `mlp`, `logistic`,
    /// `logistic_solver`).
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

impl AppConfig {
    /// Load configuration from defaults, an optional `prophet.*` file and the environment
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("prophet").required(false))
            // PROPHET_MERGE__MATCH_SCORE_THRESHOLD=90, PROPHET_MODELS__DISABLED=mlp,logistic
            .add_source(
                config::Environment::with_prefix("PROPHET")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("models.disabled"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_temperature_grid() {
        let grid = CalibrationConfig::default().temperature_grid();
        assert_eq!(grid.len(), 26);
        assert!((grid[0] - 0.5).abs() < 1e-12);
        assert!((grid[5] - 1.0).abs() < 1e-12);
        assert!((grid[25] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.merge.match_score_threshold, 85.0);
        assert_eq!(config.training.seed, 42);
        assert!(config.models.disabled.is_empty());
        assert_eq!(config.paths.artifact, "artifacts/model.json");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"merge": {"match_score_threshold": 90.0}}"#).unwrap();
        assert_eq!(config.merge.match_score_threshold, 90.0);
        assert_eq!(config.calibration.temperature_steps, 26);
    }
}
