use crate::convert::min_p_value;
use crate::safe::FeatureScores;

/// SAFE-score cutoff equivalent to a p-value at a given trial count.
/// Inverse of the score transform: scores at or above this value
/// correspond to corrected p-values at or below `pvalue`.
pub fn safe_score_threshold(pvalue: f64, n_iter: usize) -> f64 {
    let min_p = min_p_value(n_iter);
    if min_p >= 1.0 {
        return 0.0;
    }
    pvalue.log10() / min_p.log10()
}

/// Per-feature significant node sets.
///
/// `centroids[f]` holds the nodes whose own score clears the cutoff;
/// `expanded[f]` is the deduplicated union of those centroids'
/// neighborhoods. Both are indexed by feature position.
#[derive(Debug, Clone)]
pub struct SignificantNodes {
    pub centroids: Vec<Vec<usize>>,
    pub expanded: Vec<Vec<usize>>,
}

/// Select significant centroids per feature and expand each set
/// through its neighborhood mapping.
pub fn significant_nodes(
    scores: &FeatureScores,
    threshold: f64,
    neighborhoods: &[Vec<usize>],
) -> SignificantNodes {
    let mut centroids = Vec::with_capacity(scores.n_features());
    let mut expanded = Vec::with_capacity(scores.n_features());

    for row in scores.scores.rows() {
        let picked: Vec<usize> = row
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s >= threshold)
            .map(|(n, _)| n)
            .collect();

        let mut union: Vec<usize> = picked
            .iter()
            .flat_map(|&n| neighborhoods[n].iter().copied())
            .collect();
        union.sort_unstable();
        union.dedup();

        centroids.push(picked);
        expanded.push(union);
    }

    SignificantNodes {
        centroids,
        expanded,
    }
}
