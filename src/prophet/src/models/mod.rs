//! Base predictors and the context-gated ensemble.
//!
//! Every base predictor satisfies [`Predictor`]. Which algorithm backs a predictor slot is
//! decided once, from [`Capabilities`], when the slot is constructed.

pub mod ensemble;
pub mod logistic;
pub mod mlp;
pub mod stump;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::config::{ModelsConfig, TrainingConfig};
use crate::error::{PipelineError, Result};
use crate::stats::PROB_EPS;

pub use ensemble::{ContextGatedEnsemble, EnsembleWeights, CONTEXT_DIM};
pub use logistic::LogisticModel;
pub use mlp::MlpModel;
pub use stump::StumpBoostModel;

/// Uniform fit / predict-probability contract.
pub trait Predictor {
    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_val: Option<&Array2<f64>>,
        y_val: Option<&Array1<f64>>,
    ) -> Result<()>;

    /// Class probabilities `[N, 2]`; column 1 is the positive class.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Stack positive-class probabilities into the `[N, 2]` layout.
pub(crate) fn two_column(positive: &Array1<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((positive.len(), 2));
    for (i, &p) in positive.iter().enumerate() {
        out[[i, 0]] = 1.0 - p;
        out[[i, 1]] = p;
    }
    out
}

pub(crate) fn check_training_shape(x: &Array2<f64>, y: &Array1<f64>, context: &str) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::ShapeMismatch {
            context: context.to_string(),
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    if x.nrows() == 0 {
        return Err(PipelineError::Solver(format!("{context}: empty training set")));
    }
    Ok(())
}

pub(crate) fn check_width(expected: usize, x: &Array2<f64>, context: &str) -> Result<()> {
    if x.ncols() != expected {
        return Err(PipelineError::ShapeMismatch {
            context: context.to_string(),
            expected,
            actual: x.ncols(),
        });
    }
    Ok(())
}

/// Mean binary cross-entropy with probabilities clipped away from 0 and 1.
pub(crate) fn mean_log_loss(y: &Array1<f64>, p: &Array1<f64>) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let total: f64 = y
        .iter()
        .zip(p.iter())
        .map(|(&t, &q)| {
            let q = q.clamp(PROB_EPS, 1.0 - PROB_EPS);
            -(t * q.ln() + (1.0 - t) * (1.0 - q).ln())
        })
        .sum();
    total / y.len() as f64
}

/// Per-column z-scoring fitted on training rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standardizer {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Standardizer {
    pub fn fit(x: &Array2<f64>) -> Self {
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let std = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > 1e-6 { s } else { 1.0 });
        Self { mean, std }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.std
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    StumpBoost,
    Mlp,
    Logistic,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::StumpBoost => "stump_boost",
            Algorithm::Mlp => "mlp",
            Algorithm::Logistic => "logistic",
        }
    }
}

/// Capability name of the ensemble's logistic solver.
pub const LOGISTIC_SOLVER: &str = "logistic_solver";

/// Algorithms available in this runtime.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    disabled: HashSet<String>,
}

impl Capabilities {
    pub fn from_config(config: &ModelsConfig) -> Self {
        Self {
            disabled: config
                .disabled
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect(),
        }
    }

    pub fn has(&self, algorithm: Algorithm) -> bool {
        !self.disabled.contains(algorithm.name())
    }

    /// The solver is compiled in with the `logistic` feature and may still be disabled.
    pub fn has_logistic_solver(&self) -> bool {
        cfg!(feature = "logistic") && !self.disabled.contains(LOGISTIC_SOLVER)
    }
}

/// A named predictor position with a primary algorithm and its declared fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorSlot {
    pub name: &'static str,
    pub primary: Algorithm,
    pub fallback: Algorithm,
}

/// Slots fitted for every artifact, in ensemble column order.
pub const PREDICTOR_SLOTS: [PredictorSlot; 2] = [
    PredictorSlot {
        name: "gbdt",
        primary: Algorithm::StumpBoost,
        fallback: Algorithm::Logistic,
    },
    PredictorSlot {
        name: "set_mlp",
        primary: Algorithm::Mlp,
        fallback: Algorithm::Logistic,
    },
];

impl PredictorSlot {
    /// Pick the algorithm for this slot.
    pub fn resolve(&self, capabilities: &Capabilities) -> Result<Algorithm> {
        if capabilities.has(self.primary) {
            Ok(self.primary)
        } else if capabilities.has(self.fallback) {
            warn!(
                "Predictor slot {}: {} unavailable, using fallback {}",
                self.name,
                self.primary.name(),
                self.fallback.name()
            );
            Ok(self.fallback)
        } else {
            Err(PipelineError::PredictorUnavailable {
                slot: self.name.to_string(),
                primary: self.primary.name().to_string(),
                fallback: self.fallback.name().to_string(),
            })
        }
    }
}

/// A fitted (or to-be-fitted) base predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum BasePredictor {
    StumpBoost(StumpBoostModel),
    Mlp(MlpModel),
    Logistic(LogisticModel),
}

impl BasePredictor {
    /// Construct the unfitted predictor for `slot` from the available algorithms.
    pub fn for_slot(
        slot: &PredictorSlot,
        capabilities: &Capabilities,
        training: &TrainingConfig,
    ) -> Result<Self> {
        let algorithm = slot.resolve(capabilities)?;
        info!("Predictor slot {} uses {}", slot.name, algorithm.name());
        Ok(Self::new(algorithm, training))
    }

    pub fn new(algorithm: Algorithm, training: &TrainingConfig) -> Self {
        match algorithm {
            Algorithm::StumpBoost => BasePredictor::StumpBoost(StumpBoostModel::new(
                training.stump_rounds,
                training.stump_learning_rate,
                training.stump_bins,
            )),
            Algorithm::Mlp => BasePredictor::Mlp(MlpModel::new(
                training.mlp_hidden,
                training.mlp_epochs,
                training.mlp_learning_rate,
                training.l2,
                training.seed,
            )),
            Algorithm::Logistic => BasePredictor::Logistic(LogisticModel::new(
                training.logistic_epochs,
                training.logistic_learning_rate,
                training.l2,
                training.seed,
            )),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            BasePredictor::StumpBoost(_) => Algorithm::StumpBoost,
            BasePredictor::Mlp(_) => Algorithm::Mlp,
            BasePredictor::Logistic(_) => Algorithm::Logistic,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Predictor {
        match self {
            BasePredictor::StumpBoost(m) => m,
            BasePredictor::Mlp(m) => m,
            BasePredictor::Logistic(m) => m,
        }
    }

    fn inner(&self) -> &dyn Predictor {
        match self {
            BasePredictor::StumpBoost(m) => m,
            BasePredictor::Mlp(m) => m,
            BasePredictor::Logistic(m) => m,
        }
    }
}

impl Predictor for BasePredictor {
    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_val: Option<&Array2<f64>>,
        y_val: Option<&Array1<f64>>,
    ) -> Result<()> {
        self.inner_mut().fit(x, y, x_val, y_val)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.inner().predict_proba(x)
    }
}
