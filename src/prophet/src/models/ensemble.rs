//! Context-gated ensemble.
//!
//! The design matrix is `[base probabilities | race context | 1]`. Weights come from a
//! logistic fit when the solver is available and the labels contain both classes,
//! otherwise from an unregularized least-squares fit. Both strategies combine as
//! `sigmoid(design · w)`.

use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::Capabilities;
use crate::error::{PipelineError, Result};
use crate::stats::sigmoid;
use crate::types::{RaceContext, TrackType};

/// Width of the race-context block.
pub const CONTEXT_DIM: usize = 8;

/// Context block: field size, distance, turf / dirt / synthetic flags and the race medians
/// of handicap, best time and public money. Missing values are 0.
pub fn context_vector(ctx: &RaceContext) -> [f64; CONTEXT_DIM] {
    let flag = |t: TrackType| if ctx.track_type == Some(t) { 1.0 } else { 0.0 };
    [
        ctx.field_size as f64,
        ctx.distance.unwrap_or(0.0),
        flag(TrackType::Turf),
        flag(TrackType::Dirt),
        flag(TrackType::Synthetic),
        ctx.median_handicap.unwrap_or(0.0),
        ctx.median_best_time.unwrap_or(0.0),
        ctx.median_public_money.unwrap_or(0.0),
    ]
}

/// Fitted blend weights, one per design column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "weights", rename_all = "snake_case")]
pub enum EnsembleWeights {
    Logistic(Vec<f64>),
    LinearFallback(Vec<f64>),
}

impl EnsembleWeights {
    pub fn weights(&self) -> &[f64] {
        match self {
            EnsembleWeights::Logistic(w) | EnsembleWeights::LinearFallback(w) => w,
        }
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            EnsembleWeights::Logistic(_) => "logistic",
            EnsembleWeights::LinearFallback(_) => "linear_fallback",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextGatedEnsemble {
    #[serde(default)]
    n_models: usize,
    #[serde(default)]
    weights: Option<EnsembleWeights>,
}

impl ContextGatedEnsemble {
    pub fn new() -> Self {
        Self::default()
    }

    /// An ensemble with known weights.
    pub fn from_weights(n_models: usize, weights: EnsembleWeights) -> Result<Self> {
        let expected = n_models + CONTEXT_DIM + 1;
        if weights.weights().len() != expected {
            return Err(PipelineError::ShapeMismatch {
                context: "ensemble weights".to_string(),
                expected,
                actual: weights.weights().len(),
            });
        }
        Ok(Self {
            n_models,
            weights: Some(weights),
        })
    }

    pub fn weights(&self) -> Option<&EnsembleWeights> {
        self.weights.as_ref()
    }

    /// Fit against one-hot win labels `[N, 2]` (column 1 is the winner flag).
    pub fn fit(
        &mut self,
        base: &Array2<f64>,
        contexts: &[RaceContext],
        labels: &Array2<f64>,
        capabilities: &Capabilities,
        max_iter: u64,
    ) -> Result<()> {
        if labels.nrows() != base.nrows() || labels.ncols() != 2 {
            return Err(PipelineError::ShapeMismatch {
                context: "ensemble labels".to_string(),
                expected: base.nrows(),
                actual: labels.nrows(),
            });
        }
        let design = design_matrix(base, contexts)?;
        let target = labels.column(1).to_owned();
        let positives = target.iter().filter(|&&t| t > 0.5).count();
        let both_classes = positives > 0 && positives < target.len();

        let logistic = if capabilities.has_logistic_solver() && both_classes {
            match fit_logistic(&design, &target, max_iter) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!("Logistic ensemble fit failed ({e}); using least-squares blend");
                    None
                }
            }
        } else {
            if !both_classes {
                warn!("Ensemble labels contain a single class; using least-squares blend");
            }
            None
        };
        let weights = match logistic {
            Some(w) => EnsembleWeights::Logistic(w),
            None => EnsembleWeights::LinearFallback(least_squares(&design, &target)?),
        };
        info!(
            "Ensemble fitted with {} strategy over {} design columns",
            weights.strategy(),
            design.ncols()
        );
        self.n_models = base.ncols();
        self.weights = Some(weights);
        Ok(())
    }

    /// Blend per-model probability arrays, aligned entrant-for-entrant with `contexts`.
    pub fn combine(&self, predictions: &[Array1<f64>], contexts: &[RaceContext]) -> Result<Array1<f64>> {
        let weights = self
            .weights
            .as_ref()
            .ok_or(PipelineError::NotFitted("ensemble"))?;
        if predictions.len() != self.n_models {
            return Err(PipelineError::ShapeMismatch {
                context: "ensemble base models".to_string(),
                expected: self.n_models,
                actual: predictions.len(),
            });
        }
        let base = stack_columns(predictions, contexts.len())?;
        let design = design_matrix(&base, contexts)?;
        let w = Array1::from(weights.weights().to_vec());
        Ok(design.dot(&w).mapv(sigmoid))
    }
}

fn stack_columns(predictions: &[Array1<f64>], rows: usize) -> Result<Array2<f64>> {
    let mut base = Array2::zeros((rows, predictions.len()));
    for (j, p) in predictions.iter().enumerate() {
        if p.len() != rows {
            return Err(PipelineError::ShapeMismatch {
                context: "ensemble base predictions".to_string(),
                expected: rows,
                actual: p.len(),
            });
        }
        base.column_mut(j).assign(p);
    }
    Ok(base)
}

/// `[base | context | 1]`.
pub fn design_matrix(base: &Array2<f64>, contexts: &[RaceContext]) -> Result<Array2<f64>> {
    if base.nrows() != contexts.len() {
        return Err(PipelineError::ShapeMismatch {
            context: "ensemble contexts".to_string(),
            expected: base.nrows(),
            actual: contexts.len(),
        });
    }
    let m = base.ncols();
    let mut design = Array2::zeros((base.nrows(), m + CONTEXT_DIM + 1));
    design.slice_mut(s![.., ..m]).assign(base);
    for (i, ctx) in contexts.iter().enumerate() {
        for (k, v) in context_vector(ctx).into_iter().enumerate() {
            design[[i, m + k]] = v;
        }
        design[[i, m + CONTEXT_DIM]] = 1.0;
    }
    Ok(design)
}

#[cfg(feature = "logistic")]
fn fit_logistic(design: &Array2<f64>, target: &Array1<f64>, max_iter: u64) -> Result<Vec<f64>> {
    use linfa::traits::Fit;
    use linfa::Dataset;
    use linfa_logistic::LogisticRegression;

    let labels: Array1<usize> = target.mapv(|t| usize::from(t > 0.5));
    let dataset = Dataset::new(design.clone(), labels);
    let fitted = LogisticRegression::default()
        .with_intercept(false)
        .max_iterations(max_iter)
        .fit(&dataset)
        .map_err(|e| PipelineError::Solver(e.to_string()))?;
    Ok(fitted.params().to_vec())
}

#[cfg(not(feature = "logistic"))]
fn fit_logistic(_design: &Array2<f64>, _target: &Array1<f64>, _max_iter: u64) -> Result<Vec<f64>> {
    Err(PipelineError::Solver(
        "logistic solver not compiled in (enable the `logistic` feature)".to_string(),
    ))
}

/// Least squares through the normal equations with a vanishing ridge, which keeps
/// collinear or constant design columns solvable.
fn least_squares(design: &Array2<f64>, target: &Array1<f64>) -> Result<Vec<f64>> {
    let mut gram = design.t().dot(design);
    let rhs = design.t().dot(target);
    let scale = gram.diag().iter().fold(0.0f64, |a, &b| a.max(b.abs())).max(1.0);
    for i in 0..gram.nrows() {
        gram[[i, i]] += scale * 1e-10;
    }
    solve(gram, rhs)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < 1e-300 {
            return Err(PipelineError::Solver("singular least-squares system".to_string()));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}
