//! Small numeric helpers shared by the feature engine, models and calibration.

/// Lower/upper clip applied before any logit transform.
pub const PROB_EPS: f64 = 1e-6;

/// Logistic function that saturates instead of overflowing.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Log-odds of a probability clipped to `[PROB_EPS, 1 - PROB_EPS]`.
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
    (p / (1.0 - p)).ln()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (ddof = 0).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Percentile ranks with the average-rank tie convention.
///
/// Nulls stay null and are excluded from the denominator, so the largest
/// non-null value always maps to 1.0.
pub fn average_rank_pct(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    let n = present.len();
    let mut out = vec![None; values.len()];
    if n == 0 {
        return out;
    }
    present.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && present[end].1 == present[start].1 {
            end += 1;
        }
        // 1-based ranks start+1..=end share their average
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &(idx, _) in &present[start..end] {
            out[idx] = Some(avg_rank / n as f64);
        }
        start = end;
    }
    out
}

/// Bernoulli standard deviation `sqrt(p(1-p))`.
pub fn bernoulli_std(p: f64) -> f64 {
    (p * (1.0 - p)).max(0.0).sqrt()
}
