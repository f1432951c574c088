use crate::common::*;

/// Smallest empirical p-value representable with `n_iter` permutation
/// trials. The `n_iter = 0` boundary degenerates to 1.0.
pub fn min_p_value(n_iter: usize) -> f64 {
    if n_iter == 0 {
        1.0
    } else {
        1.0 / (n_iter as f64 + 1.0)
    }
}

/// Benjamini-Hochberg adjusted p-values for one family of tests.
///
/// Step-up procedure: sort ascending, scale by `m / rank`, enforce
/// monotonicity from the largest p downward, cap at 1.
pub fn fdr_bh(pvals: &[f64]) -> Vec<f64> {
    let m = pvals.len();
    if m == 0 {
        return vec![];
    }

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| pvals[a].partial_cmp(&pvals[b]).unwrap());

    let mut adjusted = vec![0.0_f64; m];
    let mut running = 1.0_f64;
    for rank in (0..m).rev() {
        let idx = order[rank];
        let scaled = (pvals[idx] * m as f64 / (rank + 1) as f64).min(1.0);
        running = running.min(scaled);
        adjusted[idx] = running;
    }

    adjusted
}

/// Turn permutation counts into multiple-testing corrected SAFE scores.
///
/// Per feature column: empirical p = count / n_iter clipped below at
/// `min_p`, BH-corrected across the node family, then mapped through
/// `log10(p) / log10(min_p)` so that p = min_p scores 1 and p = 1
/// scores 0. `n_iter = 0` yields all-zero scores.
pub fn counts_to_safe_scores(counts: &CountMat, n_iter: usize) -> Mat {
    let (n_nodes, n_features) = counts.dim();
    let mut scores = Mat::zeros((n_nodes, n_features));

    if n_iter == 0 {
        return scores;
    }

    let min_p = min_p_value(n_iter);
    let log_min_p = min_p.log10();

    for j in 0..n_features {
        let pvals: Vec<f64> = (0..n_nodes)
            .map(|i| (counts[(i, j)] as f64 / n_iter as f64).max(min_p))
            .collect();

        let adjusted = fdr_bh(&pvals);

        for (i, &p) in adjusted.iter().enumerate() {
            scores[(i, j)] = p.log10() / log_min_p;
        }
    }

    scores
}
