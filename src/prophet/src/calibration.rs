//! Probability calibration methods.
//!
//! Calibration adjusts blended probabilities to better match observed win frequencies.
//! Two families are fitted and the one with the lower Brier score is kept.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::metrics::{brier, log_loss};
use crate::stats::{logit, sigmoid, PROB_EPS};

/// Temperature scaling calibration.
///
/// Applies a learned temperature to scale logits:
/// calibrated_prob = sigmoid(logit / temperature)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureScaling {
    pub temperature: f64,
}

impl Default for TemperatureScaling {
    fn default() -> Self {
        Self { temperature: 1.0 }
    }
}

impl TemperatureScaling {
    pub fn new(temperature: f64) -> Self {
        Self { temperature }
    }

    /// Calibrate a single probability.
    pub fn calibrate(&self, prob: f64) -> f64 {
        sigmoid(logit(prob) / self.temperature.max(PROB_EPS))
    }

    pub fn calibrate_vec(&self, probs: &[f64]) -> Vec<f64> {
        probs.iter().map(|p| self.calibrate(*p)).collect()
    }

    /// Grid search for the temperature with the lowest log-loss; the first grid point wins ties.
    pub fn fit(probs: &[f64], labels: &[f64], grid: &[f64]) -> Self {
        let mut best = Self::default();
        let mut best_loss = f64::INFINITY;
        for &temperature in grid {
            let candidate = Self::new(temperature);
            let loss = log_loss(labels, &candidate.calibrate_vec(probs)).unwrap_or(f64::INFINITY);
            if loss < best_loss {
                best_loss = loss;
                best = candidate;
            }
        }
        best
    }
}

/// Monotone non-decreasing step map fitted with pool-adjacent-violators.
///
/// Between fitted points the map is linearly interpolated; outside the fitted range it
/// is clipped to the boundary values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IsotonicCalibration {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl IsotonicCalibration {
    pub fn fit(probs: &[f64], labels: &[f64]) -> Self {
        let mut pairs: Vec<(f64, f64)> = probs
            .iter()
            .copied()
            .zip(labels.iter().copied())
            .filter(|(p, _)| p.is_finite())
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // tied inputs are pooled first: (x, sum_y, weight)
        let mut unique: Vec<(f64, f64, f64)> = Vec::new();
        for (x, y) in pairs {
            match unique.last_mut() {
                Some(last) if last.0 == x => {
                    last.1 += y;
                    last.2 += 1.0;
                }
                _ => unique.push((x, y, 1.0)),
            }
        }

        // blocks: (first index, mean, weight)
        let mut blocks: Vec<(usize, f64, f64)> = Vec::with_capacity(unique.len());
        for (i, &(_, sum, weight)) in unique.iter().enumerate() {
            blocks.push((i, sum / weight, weight));
            while blocks.len() > 1 {
                let n = blocks.len();
                let (_, m_prev, w_prev) = blocks[n - 2];
                let (_, m_last, w_last) = blocks[n - 1];
                if m_prev <= m_last {
                    break;
                }
                let weight = w_prev + w_last;
                blocks[n - 2].1 = (m_prev * w_prev + m_last * w_last) / weight;
                blocks[n - 2].2 = weight;
                blocks.pop();
            }
        }

        let mut y = vec![0.0; unique.len()];
        for (b, &(start, mean, _)) in blocks.iter().enumerate() {
            let end = blocks.get(b + 1).map(|next| next.0).unwrap_or(unique.len());
            y[start..end].fill(mean);
        }
        Self {
            x: unique.iter().map(|u| u.0).collect(),
            y,
        }
    }

    pub fn calibrate(&self, prob: f64) -> f64 {
        let (Some(&x_first), Some(&x_last)) = (self.x.first(), self.x.last()) else {
            return prob;
        };
        if prob.is_nan() {
            return prob;
        }
        if prob <= x_first {
            return self.y[0];
        }
        if prob >= x_last {
            return self.y[self.y.len() - 1];
        }
        let hi = self.x.partition_point(|&x| x <= prob);
        let lo = hi - 1;
        let (x0, x1) = (self.x[lo], self.x[hi]);
        let (y0, y1) = (self.y[lo], self.y[hi]);
        y0 + (y1 - y0) * (prob - x0) / (x1 - x0)
    }

    pub fn calibrate_vec(&self, probs: &[f64]) -> Vec<f64> {
        probs.iter().map(|p| self.calibrate(*p)).collect()
    }
}

/// Calibration method and its scalar parameter, as reported with every race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDescriptor {
    pub method: String,
    pub param: Option<f64>,
}

/// Calibrator selected at training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Calibrator {
    Temperature(TemperatureScaling),
    Isotonic(IsotonicCalibration),
}

impl Default for Calibrator {
    fn default() -> Self {
        Calibrator::Temperature(TemperatureScaling::default())
    }
}

impl Calibrator {
    /// Calibrated probabilities, always within `[0, 1]`; NaN scores map to 0.
    pub fn apply(&self, probs: &[f64]) -> Vec<f64> {
        let calibrated = match self {
            Calibrator::Temperature(t) => t.calibrate_vec(probs),
            Calibrator::Isotonic(i) => i.calibrate_vec(probs),
        };
        calibrated
            .into_iter()
            .map(|p| if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) })
            .collect()
    }

    pub fn descriptor(&self) -> CalibrationDescriptor {
        match self {
            Calibrator::Temperature(t) => CalibrationDescriptor {
                method: "temperature".to_string(),
                param: Some(t.temperature),
            },
            Calibrator::Isotonic(_) => CalibrationDescriptor {
                method: "isotonic".to_string(),
                param: None,
            },
        }
    }

    /// Fit both families and keep the one with the lower Brier score; ties keep temperature.
    pub fn choose_best(probs: &[f64], labels: &[f64], grid: &[f64]) -> Self {
        let temperature = Calibrator::Temperature(TemperatureScaling::fit(probs, labels, grid));
        let isotonic = Calibrator::Isotonic(IsotonicCalibration::fit(probs, labels));
        let temperature_brier = brier(labels, &temperature.apply(probs)).unwrap_or(f64::INFINITY);
        let isotonic_brier = brier(labels, &isotonic.apply(probs)).unwrap_or(f64::INFINITY);
        info!(
            "Calibration Brier: temperature {:.6}, isotonic {:.6}",
            temperature_brier, isotonic_brier
        );
        if temperature_brier <= isotonic_brier {
            temperature
        } else {
            isotonic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalibrationConfig;

    #[test]
    fn test_temperature_scaling() {
        let ts = TemperatureScaling::new(1.5);

        // High probability gets pulled down
        let calibrated = ts.calibrate(0.9);
        assert!(calibrated < 0.9);
        assert!(calibrated > 0.5);

        // Low probability gets pulled up
        let calibrated = ts.calibrate(0.1);
        assert!(calibrated > 0.1);
        assert!(calibrated < 0.5);

        // 0.5 stays at 0.5
        let calibrated = ts.calibrate(0.5);
        assert!((calibrated - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_unit_temperature_is_identity() {
        let ts = TemperatureScaling::new(1.0);
        for p in [0.0, 1e-4, 0.2, 0.5, 0.77, 0.999, 1.0] {
            assert!((ts.calibrate(p) - p).abs() < 1e-5, "p = {p}");
        }
    }

    #[test]
    fn test_temperature_fit_softens_overconfident_scores() {
        // predictions are far more extreme than the outcomes justify
        let probs = [0.95, 0.95, 0.95, 0.95, 0.05, 0.05, 0.05, 0.05];
        let labels = [1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let grid = CalibrationConfig::default().temperature_grid();
        let fitted = TemperatureScaling::fit(&probs, &labels, &grid);
        assert!((fitted.temperature - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_isotonic_pools_violators() {
        let iso = IsotonicCalibration::fit(&[0.1, 0.2, 0.3, 0.4], &[0.0, 1.0, 0.0, 1.0]);
        assert_eq!(iso.x, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(iso.y, vec![0.0, 0.5, 0.5, 1.0]);
        // interpolation and clipping
        assert!((iso.calibrate(0.15) - 0.25).abs() < 1e-12);
        assert_eq!(iso.calibrate(0.0), 0.0);
        assert_eq!(iso.calibrate(0.9), 1.0);
    }

    #[test]
    fn test_isotonic_is_monotone_with_ties() {
        let probs = [0.3, 0.3, 0.1, 0.5, 0.7, 0.6];
        let labels = [1.0, 0.0, 0.0, 1.0, 0.0, 1.0];
        let iso = IsotonicCalibration::fit(&probs, &labels);
        assert_eq!(iso.x.len(), 5);
        assert!(iso.y.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_choose_best_prefers_isotonic_on_step_data() {
        let probs = [0.1, 0.2, 0.3, 0.4, 0.6, 0.7, 0.8, 0.9];
        let labels = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let grid = CalibrationConfig::default().temperature_grid();
        let chosen = Calibrator::choose_best(&probs, &labels, &grid);
        assert_eq!(chosen.descriptor().method, "isotonic");
        assert_eq!(chosen.descriptor().param, None);
    }

    #[test]
    fn test_choose_best_tie_keeps_temperature() {
        let probs = [0.5, 0.5];
        let labels = [1.0, 0.0];
        let chosen = Calibrator::choose_best(&probs, &labels, &[1.0]);
        assert_eq!(
            chosen.descriptor(),
            CalibrationDescriptor {
                method: "temperature".to_string(),
                param: Some(1.0)
            }
        );
    }

    #[test]
    fn test_apply_is_clipped() {
        let iso = Calibrator::Isotonic(IsotonicCalibration {
            x: vec![0.0, 1.0],
            y: vec![-0.2, 1.3],
        });
        let out = iso.apply(&[0.0, 0.5, 1.0]);
        assert!(out.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_apply_maps_nan_scores_into_range() {
        let iso = Calibrator::Isotonic(IsotonicCalibration::fit(&[0.1, 0.4, 0.8], &[0.0, 1.0, 1.0]));
        let out = iso.apply(&[f64::NAN, 0.5, f64::INFINITY]);
        assert_eq!(out[0], 0.0);
        assert!(out.iter().all(|p| (0.0..=1.0).contains(p)));

        let temp = Calibrator::Temperature(TemperatureScaling::new(2.0));
        assert_eq!(temp.apply(&[f64::NAN]), vec![0.0]);
    }

    #[test]
    fn test_calibrator_json_roundtrip_tag() {
        let json = serde_json::to_string(&Calibrator::default()).unwrap();
        assert!(json.contains("\"method\":\"temperature\""));
        let back: Calibrator = serde_json::from_str(&json).unwrap();
        assert_eq!(back.descriptor().param, Some(1.0));
    }
}
