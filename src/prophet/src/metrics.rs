//! Evaluation metrics over calibrated win probabilities.

use crate::stats::{average_rank_pct, mean, median, PROB_EPS};
use crate::types::Metrics;

/// ROC AUC from average ranks; undefined unless both classes are present.
pub fn auc(labels: &[f64], probs: &[f64]) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&y| y > 0.5).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }
    let n = probs.len() as f64;
    let ranks = average_rank_pct(&probs.iter().map(|&p| Some(p)).collect::<Vec<_>>());
    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, &y)| y > 0.5)
        .map(|(r, _)| r.unwrap_or(0.0) * n)
        .sum();
    let (n_pos, n_neg) = (n_pos as f64, n_neg as f64);
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Average precision: precision at each distinct score threshold weighted by the recall gained.
pub fn pr_auc(labels: &[f64], probs: &[f64]) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&y| y > 0.5).count();
    if n_pos == 0 || n_pos == labels.len() {
        return None;
    }
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let mut ap = 0.0;
    let mut tp = 0usize;
    let mut seen = 0usize;
    let mut prev_recall = 0.0;
    let mut i = 0;
    while i < order.len() {
        let score = probs[order[i]];
        while i < order.len() && probs[order[i]] == score {
            if labels[order[i]] > 0.5 {
                tp += 1;
            }
            seen += 1;
            i += 1;
        }
        let recall = tp as f64 / n_pos as f64;
        let precision = tp as f64 / seen as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    Some(ap)
}

/// Mean squared error between probabilities and outcomes.
pub fn brier(labels: &[f64], probs: &[f64]) -> Option<f64> {
    let squared: Vec<f64> = labels
        .iter()
        .zip(probs)
        .map(|(y, p)| (y - p).powi(2))
        .collect();
    mean(&squared)
}

/// Mean binary cross-entropy with probabilities clipped to `[PROB_EPS, 1 - PROB_EPS]`.
pub fn log_loss(labels: &[f64], probs: &[f64]) -> Option<f64> {
    let losses: Vec<f64> = labels
        .iter()
        .zip(probs)
        .map(|(&y, &p)| {
            let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .collect();
    mean(&losses)
}

/// NDCG over the top `k` scored rows of the whole set; 0 when no row has positive gain.
pub fn ndcg_at_k(labels: &[f64], scores: &[f64], k: usize) -> f64 {
    let dcg = |order: &[usize]| -> f64 {
        order
            .iter()
            .take(k)
            .enumerate()
            .map(|(rank, &i)| (2f64.powf(labels[i]) - 1.0) / (rank as f64 + 2.0).log2())
            .sum()
    };
    let mut by_score: Vec<usize> = (0..labels.len()).collect();
    by_score.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    let mut ideal: Vec<usize> = (0..labels.len()).collect();
    ideal.sort_by(|&a, &b| labels[b].total_cmp(&labels[a]));

    let idcg = dcg(&ideal);
    if idcg == 0.0 {
        return 0.0;
    }
    dcg(&by_score) / idcg
}

/// Expected calibration error over `n_bins` equal-width bins.
///
/// Bins are half-open `[lo, hi)`; a probability of exactly 1.0 falls past the last bin
/// and is not counted.
pub fn expected_calibration_error(labels: &[f64], probs: &[f64], n_bins: usize) -> Option<f64> {
    if probs.is_empty() || n_bins == 0 {
        return None;
    }
    let edges: Vec<f64> = (0..=n_bins).map(|i| i as f64 / n_bins as f64).collect();
    let mut sums = vec![(0.0, 0.0, 0usize); n_bins];
    for (&y, &p) in labels.iter().zip(probs) {
        let upper = edges.partition_point(|&e| e <= p);
        if upper == 0 || upper > n_bins {
            continue;
        }
        let bin = &mut sums[upper - 1];
        bin.0 += y;
        bin.1 += p;
        bin.2 += 1;
    }
    let n = probs.len() as f64;
    Some(
        sums.iter()
            .filter(|b| b.2 > 0)
            .map(|&(acc, conf, count)| {
                let count = count as f64;
                (acc / count - conf / count).abs() * count / n
            })
            .sum(),
    )
}

/// Mean, median and positive share of `win - implied` (missing implied counts as 0).
pub fn edge_statistics(win_probs: &[f64], implied: &[Option<f64>]) -> Metrics {
    let diff: Vec<f64> = win_probs
        .iter()
        .zip(implied)
        .map(|(w, i)| w - i.filter(|v| v.is_finite()).unwrap_or(0.0))
        .collect();
    let positive_rate = if diff.is_empty() {
        None
    } else {
        Some(diff.iter().filter(|&&d| d > 0.0).count() as f64 / diff.len() as f64)
    };
    Metrics::from([
        ("edge_mean".to_string(), mean(&diff)),
        ("edge_median".to_string(), median(&diff)),
        ("edge_positive_rate".to_string(), positive_rate),
    ])
}

/// Full training metric set.
pub fn evaluate(labels: &[f64], probs: &[f64], implied: &[Option<f64>]) -> Metrics {
    let mut metrics = Metrics::from([
        ("auc".to_string(), auc(labels, probs)),
        ("pr_auc".to_string(), pr_auc(labels, probs)),
        ("brier".to_string(), brier(labels, probs)),
        ("logloss".to_string(), log_loss(labels, probs)),
        ("ndcg@3".to_string(), Some(ndcg_at_k(labels, probs, 3))),
        (
            "ece".to_string(),
            expected_calibration_error(labels, probs, 10),
        ),
    ]);
    metrics.extend(edge_statistics(probs, implied));
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(auc(&labels, &[0.1, 0.4, 0.35, 0.8]), Some(0.75));
        assert_eq!(auc(&labels, &[0.1, 0.2, 0.3, 0.4]), Some(1.0));
        // ties count half
        assert_eq!(auc(&labels, &[0.5, 0.5, 0.5, 0.5]), Some(0.5));
        assert_eq!(auc(&[1.0, 1.0], &[0.2, 0.3]), None);
    }

    #[test]
    fn test_pr_auc() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        let ap = pr_auc(&labels, &[0.1, 0.4, 0.35, 0.8]).unwrap();
        assert!((ap - 0.8333333333).abs() < 1e-9);
        assert_eq!(pr_auc(&[0.0, 0.0], &[0.1, 0.2]), None);
    }

    #[test]
    fn test_brier_and_log_loss() {
        let labels = [1.0, 0.0];
        assert!((brier(&labels, &[0.8, 0.4]).unwrap() - 0.1).abs() < 1e-12);
        let ll = log_loss(&labels, &[1.0, 0.0]).unwrap();
        assert!(ll > 0.0 && ll < 1e-5);
        assert_eq!(brier(&[], &[]), None);
    }

    #[test]
    fn test_ndcg() {
        assert!((ndcg_at_k(&[0.0, 1.0, 0.0], &[0.2, 0.9, 0.1], 3) - 1.0).abs() < 1e-12);
        let second = ndcg_at_k(&[1.0, 0.0, 0.0], &[0.5, 0.9, 0.1], 3);
        assert!((second - 1.0 / 3f64.log2()).abs() < 1e-12);
        assert_eq!(ndcg_at_k(&[0.0, 0.0], &[0.5, 0.4], 3), 0.0);
    }

    #[test]
    fn test_ece_bins() {
        // one bin [0.2, 0.3): confidence 0.25, accuracy 0.5
        let ece = expected_calibration_error(&[1.0, 0.0], &[0.25, 0.25], 10).unwrap();
        assert!((ece - 0.25).abs() < 1e-12);
        // p == 1.0 is ignored but still counts in the denominator
        let ece = expected_calibration_error(&[1.0, 1.0], &[1.0, 0.95], 10).unwrap();
        assert!((ece - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_edge_statistics() {
        let stats = edge_statistics(&[0.5, 0.2, 0.1], &[Some(0.4), None, Some(0.3)]);
        assert!((stats["edge_mean"].unwrap() - 0.1 / 3.0).abs() < 1e-12);
        assert!((stats["edge_median"].unwrap() - 0.1).abs() < 1e-12);
        assert!((stats["edge_positive_rate"].unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_keys() {
        let metrics = evaluate(&[1.0, 1.0], &[0.6, 0.7], &[None, None]);
        assert_eq!(metrics.len(), 9);
        assert_eq!(metrics["auc"], None);
        assert!(metrics["brier"].is_some());
        assert!(metrics.contains_key("ndcg@3"));
    }
}
