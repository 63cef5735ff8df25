//! Logistic regression trained with shuffled mini-batch gradient descent.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{check_training_shape, check_width, two_column, Predictor, Standardizer};
use crate::error::{PipelineError, Result};
use crate::stats::sigmoid;

const BATCH_SIZE: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogisticWeights {
    scaler: Standardizer,
    weights: Array1<f64>,
    bias: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub seed: u64,
    #[serde(default)]
    fitted: Option<LogisticWeights>,
}

impl LogisticModel {
    pub fn new(epochs: usize, learning_rate: f64, l2: f64, seed: u64) -> Self {
        Self {
            epochs,
            learning_rate,
            l2: l2.max(0.0),
            seed,
            fitted: None,
        }
    }
}

impl Predictor for LogisticModel {
    /// Validation rows are not used by this model.
    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        _x_val: Option<&Array2<f64>>,
        _y_val: Option<&Array1<f64>>,
    ) -> Result<()> {
        check_training_shape(x, y, "logistic fit")?;
        let scaler = Standardizer::fit(x);
        let xs = scaler.transform(x);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut weights = Array1::<f64>::zeros(xs.ncols());
        let mut bias = 0.0;
        let mut indices: Vec<usize> = (0..xs.nrows()).collect();

        for _epoch in 0..self.epochs {
            indices.shuffle(&mut rng);
            for chunk in indices.chunks(BATCH_SIZE) {
                let batch = xs.select(Axis(0), chunk);
                let p = (batch.dot(&weights) + bias).mapv(sigmoid);
                let target = chunk.iter().map(|&i| y[i]).collect::<Array1<f64>>();
                let err = (p - target) / chunk.len() as f64;
                let grad_w = batch.t().dot(&err) + &(&weights * self.l2);
                weights.scaled_add(-self.learning_rate, &grad_w);
                bias -= self.learning_rate * err.sum();
            }
        }

        self.fitted = Some(LogisticWeights {
            scaler,
            weights,
            bias,
        });
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fitted = self.fitted.as_ref().ok_or(PipelineError::NotFitted("logistic"))?;
        check_width(fitted.scaler.width(), x, "logistic predict")?;
        let xs = fitted.scaler.transform(x);
        let p = (xs.dot(&fitted.weights) + fitted.bias).mapv(sigmoid);
        Ok(two_column(&p))
    }
}
