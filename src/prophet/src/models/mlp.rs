//! One-hidden-layer perceptron with a sigmoid output.
//!
//! Inputs are standardized with training statistics. Training is full-batch gradient
//! descent; the weights with the lowest monitored loss (validation when supplied,
//! training otherwise) are kept.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_training_shape, check_width, mean_log_loss, two_column, Predictor, Standardizer};
use crate::error::{PipelineError, Result};
use crate::stats::sigmoid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MlpWeights {
    scaler: Standardizer,
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array1<f64>,
    b2: f64,
}

impl MlpWeights {
    /// Hidden pre-activations, hidden activations and output probabilities.
    fn forward(&self, xs: &Array2<f64>) -> (Array2<f64>, Array2<f64>, Array1<f64>) {
        let pre = xs.dot(&self.w1) + &self.b1;
        let hidden = pre.mapv(|v| v.max(0.0));
        let out = (hidden.dot(&self.w2) + self.b2).mapv(sigmoid);
        (pre, hidden, out)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpModel {
    pub hidden: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub seed: u64,
    #[serde(default)]
    weights: Option<MlpWeights>,
}

impl MlpModel {
    pub fn new(hidden: usize, epochs: usize, learning_rate: f64, l2: f64, seed: u64) -> Self {
        Self {
            hidden: hidden.max(1),
            epochs,
            learning_rate,
            l2: l2.max(0.0),
            seed,
            weights: None,
        }
    }

    fn init(&self, scaler: Standardizer) -> MlpWeights {
        let inputs = scaler.width();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let limit1 = (6.0 / (inputs + self.hidden) as f64).sqrt();
        let limit2 = (6.0 / (self.hidden + 1) as f64).sqrt();
        let w1 = Array2::from_shape_fn((inputs, self.hidden), |_| {
            (rng.random::<f64>() * 2.0 - 1.0) * limit1
        });
        let w2 = Array1::from_shape_fn(self.hidden, |_| (rng.random::<f64>() * 2.0 - 1.0) * limit2);
        MlpWeights {
            scaler,
            w1,
            b1: Array1::zeros(self.hidden),
            w2,
            b2: 0.0,
        }
    }
}

impl Predictor for MlpModel {
    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_val: Option<&Array2<f64>>,
        y_val: Option<&Array1<f64>>,
    ) -> Result<()> {
        check_training_shape(x, y, "mlp fit")?;
        let scaler = Standardizer::fit(x);
        let xs = scaler.transform(x);
        let monitor = match (x_val, y_val) {
            (Some(xv), Some(yv)) if xv.nrows() > 0 => {
                check_training_shape(xv, yv, "mlp validation")?;
                check_width(x.ncols(), xv, "mlp validation")?;
                Some((scaler.transform(xv), yv.clone()))
            }
            _ => None,
        };

        let mut state = self.init(scaler);
        let n = xs.nrows() as f64;
        let monitored_loss = |state: &MlpWeights| match &monitor {
            Some((xv, yv)) => mean_log_loss(yv, &state.forward(xv).2),
            None => mean_log_loss(y, &state.forward(&xs).2),
        };
        let mut best = (monitored_loss(&state), state.clone(), 0usize);

        for epoch in 0..self.epochs {
            let (pre, hidden, p) = state.forward(&xs);
            let d_out = (&p - y) / n;

            let grad_w2 = hidden.t().dot(&d_out) + &(&state.w2 * self.l2);
            let grad_b2 = d_out.sum();
            let d_hidden = d_out
                .view()
                .insert_axis(Axis(1))
                .dot(&state.w2.view().insert_axis(Axis(0)))
                * &pre.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
            let grad_w1 = xs.t().dot(&d_hidden) + &(&state.w1 * self.l2);
            let grad_b1 = d_hidden.sum_axis(Axis(0));

            state.w1.scaled_add(-self.learning_rate, &grad_w1);
            state.b1.scaled_add(-self.learning_rate, &grad_b1);
            state.w2.scaled_add(-self.learning_rate, &grad_w2);
            state.b2 -= self.learning_rate * grad_b2;

            let loss = monitored_loss(&state);
            if loss < best.0 {
                best = (loss, state.clone(), epoch + 1);
            }
        }

        debug!("mlp fitted: best epoch {} loss {:.5}", best.2, best.0);
        self.weights = Some(best.1);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let weights = self.weights.as_ref().ok_or(PipelineError::NotFitted("mlp"))?;
        check_width(weights.scaler.width(), x, "mlp predict")?;
        let xs = weights.scaler.transform(x);
        Ok(two_column(&weights.forward(&xs).2))
    }
}
