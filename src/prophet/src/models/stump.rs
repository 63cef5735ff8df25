//! Gradient-boosted decision stumps for binary log-loss.
//!
//! Split search runs over equal-width bins; leaves hold the mean residual of their rows.
//! When validation rows are supplied, the ensemble is truncated to the round with the
//! lowest validation log-loss.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_training_shape, check_width, mean_log_loss, two_column, Predictor};
use crate::error::{PipelineError, Result};
use crate::stats::{logit, sigmoid};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stump {
    pub feature: usize,
    pub threshold: f64,
    pub left: f64,
    pub right: f64,
}

impl Stump {
    fn predict(&self, row: ArrayView1<f64>) -> f64 {
        if row[self.feature] < self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StumpBoostModel {
    pub rounds: usize,
    pub learning_rate: f64,
    pub bins: usize,
    #[serde(default)]
    n_features: usize,
    #[serde(default)]
    init_raw: Option<f64>,
    #[serde(default)]
    stumps: Vec<Stump>,
}

impl StumpBoostModel {
    pub fn new(rounds: usize, learning_rate: f64, bins: usize) -> Self {
        Self {
            rounds,
            learning_rate,
            bins: bins.clamp(2, 256),
            n_features: 0,
            init_raw: None,
            stumps: Vec::new(),
        }
    }

    /// Stumps kept after validation truncation.
    pub fn stumps(&self) -> &[Stump] {
        &self.stumps
    }

    fn raw_scores(&self, init: f64, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                init + self.learning_rate * self.stumps.iter().map(|s| s.predict(row)).sum::<f64>()
            })
            .collect()
    }
}

fn feature_ranges(x: &Array2<f64>) -> Vec<(f64, f64)> {
    x.columns()
        .into_iter()
        .map(|col| {
            let finite = col.iter().copied().filter(|v| v.is_finite());
            let min = finite.clone().fold(f64::INFINITY, f64::min);
            let max = finite.fold(f64::NEG_INFINITY, f64::max);
            if min.is_finite() {
                (min, max)
            } else {
                (0.0, 0.0)
            }
        })
        .collect()
}

/// Mean residual on each side of `threshold` for `feature`.
fn leaf_means(x: &Array2<f64>, residuals: &Array1<f64>, feature: usize, threshold: f64) -> (f64, f64) {
    let (mut sl, mut nl, mut sr, mut nr) = (0.0, 0usize, 0.0, 0usize);
    for (v, r) in x.column(feature).iter().zip(residuals.iter()) {
        if *v < threshold {
            sl += r;
            nl += 1;
        } else {
            sr += r;
            nr += 1;
        }
    }
    let mean = |s: f64, n: usize| if n == 0 { 0.0 } else { s / n as f64 };
    (mean(sl, nl), mean(sr, nr))
}

fn fit_stump(x: &Array2<f64>, residuals: &Array1<f64>, ranges: &[(f64, f64)], bins: usize) -> Stump {
    let n = residuals.len();
    let total: f64 = residuals.sum();
    let mut best: Option<(f64, usize, f64)> = None;

    for (feature, &(min, max)) in ranges.iter().enumerate() {
        if max <= min {
            continue;
        }
        let width = (max - min) / bins as f64;
        let mut counts = vec![0usize; bins];
        let mut sums = vec![0.0f64; bins];
        for (v, r) in x.column(feature).iter().zip(residuals.iter()) {
            let b = (((v - min) / width).floor().max(0.0) as usize).min(bins - 1);
            counts[b] += 1;
            sums[b] += r;
        }

        let (mut nl, mut sl) = (0usize, 0.0f64);
        for k in 1..bins {
            nl += counts[k - 1];
            sl += sums[k - 1];
            let nr = n - nl;
            if nl == 0 || nr == 0 {
                continue;
            }
            let sr = total - sl;
            let gain = sl * sl / nl as f64 + sr * sr / nr as f64;
            if best.map_or(true, |(g, _, _)| gain > g) {
                best = Some((gain, feature, min + width * k as f64));
            }
        }
    }

    match best {
        Some((_, feature, threshold)) => {
            let (left, right) = leaf_means(x, residuals, feature, threshold);
            Stump {
                feature,
                threshold,
                left,
                right,
            }
        }
        None => {
            let mean = if n == 0 { 0.0 } else { total / n as f64 };
            Stump {
                feature: 0,
                threshold: f64::MAX,
                left: mean,
                right: mean,
            }
        }
    }
}

impl Predictor for StumpBoostModel {
    fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_val: Option<&Array2<f64>>,
        y_val: Option<&Array1<f64>>,
    ) -> Result<()> {
        check_training_shape(x, y, "stump_boost fit")?;
        let validation = match (x_val, y_val) {
            (Some(xv), Some(yv)) if xv.nrows() > 0 => {
                check_training_shape(xv, yv, "stump_boost validation")?;
                check_width(x.ncols(), xv, "stump_boost validation")?;
                Some((xv, yv))
            }
            _ => None,
        };

        let init = logit(y.mean().unwrap_or(0.5));
        let ranges = feature_ranges(x);
        self.n_features = x.ncols();
        self.stumps.clear();

        let mut raw = Array1::from_elem(x.nrows(), init);
        let mut val_raw = validation.map(|(xv, _)| Array1::from_elem(xv.nrows(), init));
        let mut best_loss = match (&val_raw, validation) {
            (Some(vr), Some((_, yv))) => mean_log_loss(yv, &vr.mapv(sigmoid)),
            _ => f64::INFINITY,
        };
        let mut best_rounds = 0usize;

        for round in 0..self.rounds {
            let residuals = y - &raw.mapv(sigmoid);
            let stump = fit_stump(x, &residuals, &ranges, self.bins);
            for (r, row) in raw.iter_mut().zip(x.rows()) {
                *r += self.learning_rate * stump.predict(row);
            }
            if let (Some(vr), Some((xv, yv))) = (val_raw.as_mut(), validation) {
                for (r, row) in vr.iter_mut().zip(xv.rows()) {
                    *r += self.learning_rate * stump.predict(row);
                }
                let loss = mean_log_loss(yv, &vr.mapv(sigmoid));
                if loss < best_loss {
                    best_loss = loss;
                    best_rounds = round + 1;
                }
            }
            self.stumps.push(stump);
        }

        if validation.is_some() {
            self.stumps.truncate(best_rounds);
        }
        self.init_raw = Some(init);
        debug!(
            "stump_boost fitted: {} of {} rounds kept",
            self.stumps.len(),
            self.rounds
        );
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let init = self.init_raw.ok_or(PipelineError::NotFitted("stump_boost"))?;
        check_width(self.n_features, x, "stump_boost predict")?;
        Ok(two_column(&self.raw_scores(init, x).mapv(sigmoid)))
    }
}
